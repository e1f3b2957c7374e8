//! Haptic actuation gate.
//!
//! The controller holds the process-lifetime enable flag and checks the
//! preconditions for an actuation before anything reaches the backend.
//! Command parameters are opaque tuning values; their valid ranges are the
//! caller's responsibility.

use crate::backends::MultitouchBackend;
use crate::device::DeviceRef;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// A raw actuation request, passed verbatim to the backend.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HapticCommand {
    pub actuation_id: i32,
    pub param1: u32,
    pub param2: f32,
    pub param3: f32,
}

impl HapticCommand {
    pub const fn new(actuation_id: i32, param1: u32, param2: f32, param3: f32) -> Self {
        Self {
            actuation_id,
            param1,
            param2,
            param3,
        }
    }
}

#[derive(Debug)]
pub struct HapticController {
    enabled: AtomicBool,
}

impl HapticController {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::AcqRel);
        if was != enabled {
            debug!(enabled, "haptic feedback toggled");
        }
    }

    /// Issue `command` on `target` if haptics are enabled and a target exists.
    ///
    /// Exactly one backend call is made on success; none when a precondition
    /// fails.
    pub fn trigger(
        &self,
        backend: &dyn MultitouchBackend,
        target: Option<DeviceRef>,
        command: HapticCommand,
    ) -> Result<()> {
        if !self.is_enabled() {
            return Err(Error::HapticDisabled);
        }
        let device = target.ok_or(Error::NoHapticDevice)?;
        debug!(%device, ?command, "actuating");
        backend.actuate(device, command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::{BackendCall, VirtualBackend};
    use crate::backends::{FrameSink, MultitouchBackend};
    use crate::touch::TouchSample;
    use std::sync::Arc;

    fn open(backend: &VirtualBackend, device: DeviceRef) {
        let sink: FrameSink = Arc::new(|_: DeviceRef, _: &[TouchSample], _: f64, _: i32| {});
        backend.open_stream(device, sink).unwrap();
        backend.clear_calls();
    }

    #[test]
    fn disabled_blocks_backend() {
        let backend = VirtualBackend::new();
        let dev = backend.plug("Force", 1, true, true);
        let haptic = HapticController::new(false);

        let res = haptic.trigger(&backend, Some(dev), HapticCommand::new(1, 0, 0.0, 0.0));
        assert!(matches!(res, Err(Error::HapticDisabled)));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn missing_target_blocks_backend() {
        let backend = VirtualBackend::new();
        let haptic = HapticController::new(true);

        let res = haptic.trigger(&backend, None, HapticCommand::new(1, 0, 0.0, 0.0));
        assert!(matches!(res, Err(Error::NoHapticDevice)));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn enabled_issues_one_command_verbatim() {
        let backend = VirtualBackend::new();
        let dev = backend.plug("Force", 1, true, true);
        open(&backend, dev);
        let haptic = HapticController::new(true);
        let cmd = HapticCommand::new(-3, 0xdead, 1.5, -0.25);

        haptic.trigger(&backend, Some(dev), cmd).unwrap();
        assert_eq!(backend.calls(), vec![BackendCall::Actuate(dev, cmd)]);
    }

    #[test]
    fn toggle() {
        let haptic = HapticController::new(true);
        haptic.set_enabled(false);
        assert!(!haptic.is_enabled());
        haptic.set_enabled(true);
        assert!(haptic.is_enabled());
    }
}
