//! Device identity.
//!
//! Three views of one physical trackpad exist:
//! - [`HardwareDevice`]: what a backend reports on enumeration, including the
//!   backend-private [`DeviceRef`].
//! - [`DeviceInfo`]: the public, cloneable value handed to applications.
//!   It never carries the [`DeviceRef`]; the manager maps between the two.
//! - [`DeviceRef`]: the device handle. Only the manager and the backend see it.
//!
//! ## Identity conventions
//! - `DeviceInfo::id` is the decimal rendering of the hardware's numeric id.
//!   It is stable for as long as the device stays connected, so it survives
//!   refreshes and is suitable for re-selecting a device.
//! - Equality and hashing of [`DeviceInfo`] use the id only. Two copies with
//!   the same id refer to the same device even if the display name changed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Backend-private handle for a live device.
///
/// Opaque to applications. Backends choose the value (a registry index, a
/// pointer-sized token, ...) and must keep it unique among connected devices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceRef(pub u64);

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev#{}", self.0)
    }
}

/// One device as reported by a backend's enumeration.
#[derive(Clone, Debug)]
pub struct HardwareDevice {
    pub device_ref: DeviceRef,
    /// Hardware identifier. Stable while connected.
    pub numeric_id: u64,
    pub name: String,
    pub is_built_in: bool,
    /// Whether the device carries a force-feedback actuator.
    pub supports_haptics: bool,
}

impl HardwareDevice {
    pub fn info(&self) -> DeviceInfo {
        DeviceInfo::new(&self.name, self.numeric_id, self.is_built_in)
    }
}

/// Public description of a multitouch device.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Display name (e.g. `"Apple Internal Keyboard / Trackpad"`).
    pub name: String,
    /// Stable identifier derived from the hardware's numeric id.
    pub id: String,
    /// `true` for the built-in trackpad of a laptop.
    pub is_built_in: bool,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, numeric_id: u64, is_built_in: bool) -> Self {
        Self {
            name: name.into(),
            id: numeric_id.to_string(),
            is_built_in,
        }
    }

    /// The numeric hardware id this info was derived from.
    ///
    /// `None` if `id` was not produced by [`DeviceInfo::new`] (for example a
    /// hand-edited or foreign value).
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.parse().ok()
    }
}

impl PartialEq for DeviceInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DeviceInfo {}

impl Hash for DeviceInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.id)?;
        if self.is_built_in {
            write!(f, " (built-in)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn id_is_decimal_numeric_id() {
        let info = DeviceInfo::new("Trackpad", 0x2000_0000_0042, true);
        assert_eq!(info.id, "35184372088898");
        assert_eq!(info.numeric_id(), Some(0x2000_0000_0042));
    }

    #[test]
    fn equality_ignores_name() {
        let a = DeviceInfo::new("Magic Trackpad", 7, false);
        let b = DeviceInfo::new("Magic Trackpad 2", 7, false);
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn foreign_id_has_no_numeric_form() {
        let info = DeviceInfo {
            name: "x".into(),
            id: "not-a-number".into(),
            is_built_in: false,
        };
        assert_eq!(info.numeric_id(), None);
    }
}
