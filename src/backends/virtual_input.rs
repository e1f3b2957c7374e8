//! In-memory backend.
//!
//! Stands in for trackpad hardware in tests and demos. Devices are plugged
//! and unplugged by hand, frames are injected or replayed from a
//! [`Recording`], and every backend call is logged as a [`BackendCall`].
//! Like real hardware, it only actuates devices whose stream is open.

use crate::backends::{FrameSink, MultitouchBackend};
use crate::device::{DeviceRef, HardwareDevice};
use crate::error::{Error, Result};
use crate::haptic::HapticCommand;
use crate::recording::Recording;
use crate::touch::TouchSample;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// A call observed by [`VirtualBackend`].
#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    Enumerate,
    Open(DeviceRef),
    Close(DeviceRef),
    Actuate(DeviceRef, HapticCommand),
}

#[derive(Default)]
struct State {
    devices: Vec<HardwareDevice>,
    streams: HashMap<DeviceRef, FrameSink>,
    failing: HashSet<DeviceRef>,
    calls: Vec<BackendCall>,
    next_ref: u64,
}

/// In-memory backend.
///
/// Devices are plugged in by hand, frames are injected with
/// [`feed`](Self::feed) or [`replay`](Self::replay), and every call the
/// manager makes is recorded for inspection.
pub struct VirtualBackend {
    supported: bool,
    state: Mutex<State>,
}

impl Default for VirtualBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualBackend {
    pub fn new() -> Self {
        Self {
            supported: true,
            state: Mutex::new(State::default()),
        }
    }

    /// A backend that reports no multitouch support. Used as the fallback
    /// when no real hardware backend is available.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            state: Mutex::new(State::default()),
        }
    }

    /// Connect a device. Returns its handle.
    pub fn plug(
        &self,
        name: &str,
        numeric_id: u64,
        is_built_in: bool,
        supports_haptics: bool,
    ) -> DeviceRef {
        let mut st = self.state.lock();
        st.next_ref += 1;
        let device_ref = DeviceRef(st.next_ref);
        st.devices.push(HardwareDevice {
            device_ref,
            numeric_id,
            name: name.to_string(),
            is_built_in,
            supports_haptics,
        });
        device_ref
    }

    /// Disconnect a device. Its stream (if any) stops silently, as with a
    /// physical unplug.
    pub fn unplug(&self, device: DeviceRef) {
        let mut st = self.state.lock();
        st.devices.retain(|d| d.device_ref != device);
        st.streams.remove(&device);
    }

    /// Make every future `open_stream` for `device` fail.
    pub fn fail_open(&self, device: DeviceRef) {
        self.state.lock().failing.insert(device);
    }

    /// Deliver one frame as if the hardware produced it.
    ///
    /// Returns `false` if no stream is open for `device`. The sink runs
    /// without the backend lock held.
    pub fn feed(
        &self,
        device: DeviceRef,
        samples: &[TouchSample],
        timestamp: f64,
        frame: i32,
    ) -> bool {
        let sink = self.state.lock().streams.get(&device).cloned();
        match sink {
            Some(sink) => {
                sink(device, samples, timestamp, frame);
                true
            }
            None => false,
        }
    }

    /// Feed every frame of `recording` to the device whose numeric id it was
    /// captured from. Frames for devices that are not open are skipped.
    /// Returns the number of frames delivered.
    pub fn replay(&self, recording: &Recording) -> usize {
        let by_id: HashMap<u64, DeviceRef> = self
            .state
            .lock()
            .devices
            .iter()
            .map(|d| (d.numeric_id, d.device_ref))
            .collect();

        let mut delivered = 0;
        for f in &recording.frames {
            if let Some(&dev) = by_id.get(&f.device_id) {
                if self.feed(dev, &f.samples, f.timestamp, f.frame) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub fn is_open(&self, device: DeviceRef) -> bool {
        self.state.lock().streams.contains_key(&device)
    }

    pub fn open_streams(&self) -> usize {
        self.state.lock().streams.len()
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

impl MultitouchBackend for VirtualBackend {
    fn name(&self) -> &'static str {
        "virtual"
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn enumerate(&self) -> Result<Vec<HardwareDevice>> {
        let mut st = self.state.lock();
        st.calls.push(BackendCall::Enumerate);
        Ok(st.devices.clone())
    }

    fn open_stream(&self, device: DeviceRef, sink: FrameSink) -> Result<()> {
        let mut st = self.state.lock();
        st.calls.push(BackendCall::Open(device));
        if st.failing.contains(&device) {
            return Err(Error::Backend(format!("cannot open {device}")));
        }
        if !st.devices.iter().any(|d| d.device_ref == device) {
            return Err(Error::DeviceNotFound(device.to_string()));
        }
        st.streams.insert(device, sink);
        Ok(())
    }

    fn close_stream(&self, device: DeviceRef) -> Result<()> {
        let mut st = self.state.lock();
        st.calls.push(BackendCall::Close(device));
        st.streams.remove(&device);
        Ok(())
    }

    fn actuate(&self, device: DeviceRef, command: HapticCommand) -> Result<()> {
        let mut st = self.state.lock();
        st.calls.push(BackendCall::Actuate(device, command));
        match st.devices.iter().find(|d| d.device_ref == device) {
            None => Err(Error::DeviceNotFound(device.to_string())),
            Some(d) if !d.supports_haptics => Err(Error::Unsupported(self.name())),
            Some(_) if !st.streams.contains_key(&device) => {
                Err(Error::Backend(format!("{device} has no open stream")))
            }
            Some(_) => Ok(()),
        }
    }
}
