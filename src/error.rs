//! Error types.
//!
//! Every fallible operation on [`Manager`](crate::manager::Manager) reports
//! failure through [`Error`]. Nothing in this crate panics across the public
//! boundary; handler panics raised inside listeners are caught by the
//! dispatcher and only ever surface as a logged [`Error::HandlerFault`].

use thiserror::Error;

/// Errors reported by the manager, the registry and the backends.
#[derive(Error, Debug)]
pub enum Error {
    /// A requested device is not among the known devices (or vanished since
    /// the last refresh).
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Haptic actuation was requested while haptics are disabled.
    #[error("haptic feedback is disabled")]
    HapticDisabled,

    /// No active device is able to actuate.
    #[error("no active haptic-capable device")]
    NoHapticDevice,

    /// The listener id is stale or was never issued.
    #[error("listener not found")]
    ListenerNotFound,

    /// A listener's handler panicked during dispatch.
    #[error("listener handler fault: {0}")]
    HandlerFault(String),

    /// The hardware layer rejected a request.
    #[error("backend error: {0}")]
    Backend(String),

    /// The hardware layer does not implement the requested primitive.
    #[error("operation not supported by the {0} backend")]
    Unsupported(&'static str),

    /// The manager has been torn down.
    #[error("manager has been shut down")]
    ShutDown,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(feature = "hid")]
impl From<hidapi::HidError> for Error {
    fn from(e: hidapi::HidError) -> Self {
        Error::Backend(e.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
