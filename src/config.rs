//! Manager configuration.
//!
//! Loaded from TOML. Every field is optional; a missing file section falls
//! back to [`ManagerConfig::default`].
//!
//! ```toml
//! haptic_enabled = true
//! default_activation = "built_in"   # or "all", "none"
//! ```
//!
//! [`Manager::shared`](crate::manager::Manager::shared) reads the file named
//! by the `OPENMT_CONFIG` environment variable, if set.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Environment variable naming the config file used by the shared manager.
pub const CONFIG_ENV: &str = "OPENMT_CONFIG";

/// Which devices to open when the first listener arrives and none is active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultActivation {
    /// The first built-in device, else the first device found.
    #[default]
    BuiltIn,
    /// Every known device.
    All,
    /// Nothing; the application selects devices itself.
    None,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Initial state of the haptic enable flag.
    pub haptic_enabled: bool,
    pub default_activation: DefaultActivation,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            haptic_enabled: true,
            default_activation: DefaultActivation::BuiltIn,
        }
    }
}

impl ManagerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Config from `OPENMT_CONFIG`, or defaults. A broken file is logged and
    /// ignored.
    pub fn from_env() -> Self {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(&path).unwrap_or_else(|e| {
                warn!(path = ?path, "ignoring config: {e}");
                Self::default()
            }),
            None => Self::default(),
        }
    }
}
