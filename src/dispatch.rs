//! Frame fan-out.
//!
//! The dispatcher runs on backend threads. It never takes the manager lock:
//! both the listener list and the device table are immutable `Arc`
//! snapshots, swapped wholesale by the manager on every mutation. A dispatch
//! therefore sees the listener set as it was when the frame arrived, and
//! additionally checks `dead()` right before each delivery so a removal is
//! honoured even mid-iteration.

use crate::device::DeviceRef;
use crate::listener::{Listener, ListenerKind};
use crate::touch::{RawFrame, TouchEvent, TouchSample};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

type DeviceTable = HashMap<DeviceRef, u64>;

pub(crate) struct Dispatcher {
    listeners: RwLock<Arc<[Arc<Listener>]>>,
    devices: RwLock<Arc<DeviceTable>>,
    frames: AtomicU64,
    faults: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Arc::from(Vec::new())),
            devices: RwLock::new(Arc::new(HashMap::new())),
            frames: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    pub fn publish_listeners(&self, listeners: Vec<Arc<Listener>>) {
        *self.listeners.write() = Arc::from(listeners);
    }

    /// Route frames from `device` under `device_id`. Must happen before the
    /// device's stream opens.
    pub fn insert_device(&self, device: DeviceRef, device_id: u64) {
        let mut guard = self.devices.write();
        let mut table = DeviceTable::clone(&guard);
        table.insert(device, device_id);
        *guard = Arc::new(table);
    }

    /// Stop routing frames from `device`. Frames still in flight from a
    /// closing stream are dropped.
    pub fn remove_device(&self, device: DeviceRef) {
        let mut guard = self.devices.write();
        if guard.contains_key(&device) {
            let mut table = DeviceTable::clone(&guard);
            table.remove(&device);
            *guard = Arc::new(table);
        }
    }

    pub fn clear_devices(&self) {
        *self.devices.write() = Arc::new(HashMap::new());
    }

    /// Deliver one hardware frame. Returns how many listeners received it.
    pub fn dispatch(
        &self,
        device: DeviceRef,
        samples: &[TouchSample],
        timestamp: f64,
        frame: i32,
    ) -> usize {
        let Some(device_id) = self.devices.read().get(&device).copied() else {
            trace!(%device, frame, "frame from inactive device dropped");
            return 0;
        };
        let listeners: Arc<[Arc<Listener>]> = self.listeners.read().clone();
        self.frames.fetch_add(1, Ordering::Relaxed);

        let raw = RawFrame {
            samples,
            timestamp,
            frame,
            device_id,
        };
        let mut event: Option<TouchEvent> = None;
        let mut delivered = 0;

        for listener in listeners.iter() {
            if listener.dead() || !listener.is_listening() || !listener.wants(device_id) {
                continue;
            }
            let res = match listener.kind() {
                ListenerKind::Raw => listener.listen_to_raw_frame(&raw),
                ListenerKind::Structured => {
                    let ev = event.get_or_insert_with(|| raw.to_event());
                    listener.listen_to_event(ev)
                }
            };
            match res {
                Ok(()) => delivered += 1,
                Err(e) => {
                    self.faults.fetch_add(1, Ordering::Relaxed);
                    warn!(device_id, frame, "{e}");
                }
            }
        }

        trace!(device_id, frame, count = samples.len(), delivered, "dispatched");
        delivered
    }

    pub fn frames_dispatched(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn handler_faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }
}
