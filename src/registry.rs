//! Device registry.
//!
//! Keeps two sets:
//! - **known** devices, rebuilt only by an explicit [`refresh`](DeviceRegistry::refresh)
//!   (enumeration may be slow, so it is never triggered implicitly);
//! - **active** devices, each with an open stream and a route in the
//!   dispatcher's device table.
//!
//! Requests resolve against the known set only, so a device that vanished
//! in the last refresh cannot be selected. A refresh also reconciles the
//! active set: devices that disappeared are closed and dropped, and devices
//! that came back under a new handle are reopened on it.
//!
//! Activation is tracked per device as *explicit* (requested through
//! [`set_active`](DeviceRegistry::set_active)) or *implicit* (opened by the
//! manager's default policy for a listener). Implicit devices are released
//! again when the last listener goes away.

use crate::backends::{FrameSink, MultitouchBackend};
use crate::config::DefaultActivation;
use crate::device::{DeviceInfo, DeviceRef, HardwareDevice};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
struct ActiveDevice {
    device: HardwareDevice,
    implicit: bool,
}

#[derive(Default)]
pub(crate) struct DeviceRegistry {
    known: Vec<HardwareDevice>,
    active: Vec<ActiveDevice>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-enumerate devices, then reconcile the active set with the result.
    /// Duplicate numeric ids keep their first entry.
    pub fn refresh(
        &mut self,
        backend: &dyn MultitouchBackend,
        dispatcher: &Dispatcher,
        sink: &FrameSink,
    ) -> Result<()> {
        let mut seen = HashSet::new();
        let mut known = Vec::new();
        for device in backend.enumerate()? {
            if seen.insert(device.numeric_id) {
                known.push(device);
            } else {
                warn!(
                    id = device.numeric_id,
                    name = %device.name,
                    "duplicate device id from {}, ignoring",
                    backend.name()
                );
            }
        }
        debug!(count = known.len(), "device list refreshed");
        self.known = known;
        self.reconcile(backend, dispatcher, sink);
        Ok(())
    }

    fn reconcile(
        &mut self,
        backend: &dyn MultitouchBackend,
        dispatcher: &Dispatcher,
        sink: &FrameSink,
    ) {
        for entry in std::mem::take(&mut self.active) {
            let current = self
                .known
                .iter()
                .find(|d| d.numeric_id == entry.device.numeric_id)
                .cloned();
            match current {
                Some(device) if device.device_ref == entry.device.device_ref => {
                    self.active.push(ActiveDevice {
                        device,
                        implicit: entry.implicit,
                    });
                }
                Some(device) => {
                    close(backend, dispatcher, &entry.device);
                    match open(backend, dispatcher, sink, &device) {
                        Ok(()) => {
                            info!(name = %device.name, id = device.numeric_id, "device reopened on new handle");
                            self.active.push(ActiveDevice {
                                device,
                                implicit: entry.implicit,
                            });
                        }
                        Err(e) => warn!(id = device.numeric_id, "reopening device failed: {e}"),
                    }
                }
                None => {
                    info!(name = %entry.device.name, id = entry.device.numeric_id, "active device disconnected");
                    close(backend, dispatcher, &entry.device);
                }
            }
        }
    }

    pub fn available(&self) -> Vec<DeviceInfo> {
        self.known.iter().map(HardwareDevice::info).collect()
    }

    pub fn active(&self) -> Vec<DeviceInfo> {
        self.active.iter().map(|a| a.device.info()).collect()
    }

    pub fn has_known(&self) -> bool {
        !self.known.is_empty()
    }

    pub fn has_active(&self) -> bool {
        !self.active.is_empty()
    }

    /// First active device that can actuate.
    pub fn haptic_target(&self) -> Option<DeviceRef> {
        self.active
            .iter()
            .find(|a| a.device.supports_haptics)
            .map(|a| a.device.device_ref)
    }

    /// Map a public device description to a device of the last enumeration.
    fn resolve(&self, info: &DeviceInfo) -> Option<&HardwareDevice> {
        self.known
            .iter()
            .find(|d| d.numeric_id.to_string() == info.id)
    }

    /// Transition the active set to exactly `requested`.
    ///
    /// Unknown devices fail the whole call before anything changes. Past
    /// that point the transition is best-effort: a device whose stream
    /// cannot be opened is skipped and reported, the rest are committed.
    pub fn set_active(
        &mut self,
        backend: &dyn MultitouchBackend,
        dispatcher: &Dispatcher,
        sink: &FrameSink,
        requested: &[DeviceInfo],
    ) -> Result<()> {
        let mut targets: Vec<HardwareDevice> = Vec::with_capacity(requested.len());
        let mut missing = Vec::new();
        for info in requested {
            match self.resolve(info) {
                Some(d) if targets.iter().any(|t| t.numeric_id == d.numeric_id) => {}
                Some(d) => targets.push(d.clone()),
                None => missing.push(info.id.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(Error::DeviceNotFound(missing.join(", ")));
        }

        // an entry on an outdated handle is closed and reopened below
        let keep: HashSet<(u64, DeviceRef)> = targets
            .iter()
            .map(|t| (t.numeric_id, t.device_ref))
            .collect();
        let (stay, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|a| keep.contains(&(a.device.numeric_id, a.device.device_ref)));
        self.active = stay;
        for a in dropped {
            close(backend, dispatcher, &a.device);
        }

        // anything requested explicitly is no longer released with the
        // last listener
        for a in &mut self.active {
            a.implicit = false;
        }

        let mut failed = Vec::new();
        for device in targets {
            if self.is_active(device.numeric_id) {
                continue;
            }
            match open(backend, dispatcher, sink, &device) {
                Ok(()) => self.active.push(ActiveDevice {
                    device,
                    implicit: false,
                }),
                Err(e) => {
                    warn!(id = device.numeric_id, "activation failed: {e}");
                    failed.push(format!("{}: {e}", device.numeric_id));
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::Backend(failed.join("; ")))
        }
    }

    /// Open the devices `policy` selects, marked implicit. Used when the
    /// first listener arrives and nothing is active.
    pub fn activate_default(
        &mut self,
        backend: &dyn MultitouchBackend,
        dispatcher: &Dispatcher,
        sink: &FrameSink,
        policy: DefaultActivation,
    ) -> usize {
        let chosen: Vec<HardwareDevice> = match policy {
            DefaultActivation::None => Vec::new(),
            DefaultActivation::All => self.known.clone(),
            DefaultActivation::BuiltIn => self
                .known
                .iter()
                .find(|d| d.is_built_in)
                .or_else(|| self.known.first())
                .cloned()
                .into_iter()
                .collect(),
        };

        let mut opened = 0;
        for device in chosen {
            if self.is_active(device.numeric_id) {
                continue;
            }
            match open(backend, dispatcher, sink, &device) {
                Ok(()) => {
                    info!(name = %device.name, id = device.numeric_id, "default device activated");
                    self.active.push(ActiveDevice {
                        device,
                        implicit: true,
                    });
                    opened += 1;
                }
                Err(e) => warn!(id = device.numeric_id, "default activation failed: {e}"),
            }
        }
        opened
    }

    /// Close every implicitly activated device.
    pub fn release_implicit(&mut self, backend: &dyn MultitouchBackend, dispatcher: &Dispatcher) {
        let (implicit, explicit): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.active).into_iter().partition(|a| a.implicit);
        self.active = explicit;
        for a in implicit {
            close(backend, dispatcher, &a.device);
        }
    }

    /// Close everything.
    pub fn close_all(&mut self, backend: &dyn MultitouchBackend, dispatcher: &Dispatcher) {
        for a in std::mem::take(&mut self.active) {
            close(backend, dispatcher, &a.device);
        }
        dispatcher.clear_devices();
    }

    fn is_active(&self, numeric_id: u64) -> bool {
        self.active.iter().any(|a| a.device.numeric_id == numeric_id)
    }
}

/// Route first, then open, so the first frames are not dropped.
fn open(
    backend: &dyn MultitouchBackend,
    dispatcher: &Dispatcher,
    sink: &FrameSink,
    device: &HardwareDevice,
) -> Result<()> {
    dispatcher.insert_device(device.device_ref, device.numeric_id);
    if let Err(e) = backend.open_stream(device.device_ref, sink.clone()) {
        dispatcher.remove_device(device.device_ref);
        return Err(e);
    }
    debug!(name = %device.name, id = device.numeric_id, "stream opened");
    Ok(())
}

/// Unroute first, then close. Close failures are logged; the device counts
/// as inactive either way.
fn close(backend: &dyn MultitouchBackend, dispatcher: &Dispatcher, device: &HardwareDevice) {
    dispatcher.remove_device(device.device_ref);
    match backend.close_stream(device.device_ref) {
        Ok(()) => debug!(name = %device.name, id = device.numeric_id, "stream closed"),
        Err(e) => warn!(id = device.numeric_id, "closing stream failed: {e}"),
    }
}
