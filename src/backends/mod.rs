//! Hardware backends for `openmt`.
//!
//! A backend is the only code that talks to the platform's multitouch
//! layer. It enumerates devices, opens and closes per-device frame streams,
//! and forwards actuation commands. Everything above it (registry, listeners,
//! dispatch, haptic gating) lives in the manager and is backend-agnostic.
//!
//! # Feature flags
//! - **`hid`** enables [`hid::HidBackend`], which reads touchpads exposed as
//!   HID digitizers through `hidapi`.
//!
//! [`virtual_input::VirtualBackend`] is always available. It keeps devices in
//! memory, records every call made to it, and lets callers inject frames.

use crate::device::{DeviceRef, HardwareDevice};
use crate::error::{Error, Result};
use crate::haptic::HapticCommand;
use crate::touch::TouchSample;
use std::sync::Arc;

#[cfg(feature = "hid")]
#[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
pub mod hid;
pub mod virtual_input;

/// The process-wide frame callback installed on every open stream.
///
/// Arguments: device handle, samples, timestamp (seconds), frame index.
/// Backends may call it from any thread, including several threads at once
/// for different devices.
pub type FrameSink = Arc<dyn Fn(DeviceRef, &[TouchSample], f64, i32) + Send + Sync>;

/// Platform multitouch layer.
///
/// Calls are synchronous and may be slow (they can block on the platform
/// layer), but must not block indefinitely. No timeout is applied on top.
pub trait MultitouchBackend: Send + Sync {
    /// Short backend name for logs and errors.
    fn name(&self) -> &'static str;

    /// Whether the platform exposes multitouch hardware at all. Must be cheap
    /// and side-effect free.
    fn is_supported(&self) -> bool;

    /// Query the platform for all multitouch-capable devices.
    fn enumerate(&self) -> Result<Vec<HardwareDevice>>;

    /// Start delivering frames for `device` into `sink`.
    ///
    /// The sink must not be invoked from inside this call; the manager holds
    /// its state lock while opening streams.
    fn open_stream(&self, device: DeviceRef, sink: FrameSink) -> Result<()>;

    /// Stop delivering frames for `device`. Closing a stream that is not
    /// open is not an error.
    fn close_stream(&self, device: DeviceRef) -> Result<()>;

    /// Issue an actuation command. Parameters pass through verbatim.
    fn actuate(&self, device: DeviceRef, command: HapticCommand) -> Result<()> {
        let _ = (device, command);
        Err(Error::Unsupported(self.name()))
    }
}

/// Pick the best backend available in this build.
///
/// With `hid` enabled and at least one HID touchpad present, that is the HID
/// backend. Otherwise an empty, unsupported [`virtual_input::VirtualBackend`].
pub fn default_backend() -> Arc<dyn MultitouchBackend> {
    #[cfg(feature = "hid")]
    {
        match hid::HidBackend::new() {
            Ok(backend) if backend.is_supported() => return Arc::new(backend),
            Ok(_) => tracing::debug!("hid backend found no touchpads"),
            Err(e) => tracing::warn!("hid backend unavailable: {e}"),
        }
    }

    Arc::new(virtual_input::VirtualBackend::unsupported())
}
