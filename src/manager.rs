//! The multitouch manager.
//!
//! [`Manager`] owns the device registry, the listener set and the haptic
//! gate, and installs the single frame callback on every open stream.
//!
//! Most applications use the process-wide instance from
//! [`Manager::shared`]. Tests and embedders that bring their own backend
//! construct one explicitly with [`Manager::new`]; an explicit instance tears
//! itself down on drop.
//!
//! # Threading
//! Application calls serialize on one internal lock. Backend threads never
//! take it: frame dispatch reads immutable snapshots that every mutation
//! republishes. Removing a listener takes effect for every dispatch that has
//! not yet reached it, including one already in progress.
//!
//! # Example
//! ```no_run
//! use openmt::{Manager, RawFrame};
//!
//! let mgr = Manager::shared();
//! let id = mgr
//!     .add_raw_listener(|f: &RawFrame<'_>| {
//!         println!("{}: {} touches @ {:.3}", f.device_id, f.count(), f.timestamp);
//!     })
//!     .expect("listen");
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! mgr.remove_listener(id);
//! ```

use crate::arena::{ListenerArena, ListenerId};
use crate::backends::{default_backend, FrameSink, MultitouchBackend};
use crate::config::ManagerConfig;
use crate::device::{DeviceInfo, DeviceRef};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::haptic::{HapticCommand, HapticController};
use crate::listener::{Listener, ListenerOptions, TouchListener};
use crate::registry::DeviceRegistry;
use crate::touch::{RawFrame, TouchSample};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

static SHARED: OnceLock<Manager> = OnceLock::new();

struct State {
    registry: DeviceRegistry,
    listeners: ListenerArena,
}

/// Dispatch counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Frames routed to listeners (frames from inactive devices excluded).
    pub frames: u64,
    /// Handler panics caught during dispatch.
    pub handler_faults: u64,
}

pub struct Manager {
    backend: Arc<dyn MultitouchBackend>,
    config: ManagerConfig,
    state: Mutex<State>,
    dispatcher: Arc<Dispatcher>,
    sink: FrameSink,
    haptic: HapticController,
    shut_down: AtomicBool,
}

impl Manager {
    /// Build a manager over `backend` and enumerate its devices once.
    /// An enumeration failure is logged; the device list then starts empty.
    pub fn new(backend: Arc<dyn MultitouchBackend>, config: ManagerConfig) -> Self {
        let dispatcher = Arc::new(Dispatcher::new());
        let sink: FrameSink = {
            let dispatcher = Arc::clone(&dispatcher);
            Arc::new(move |device: DeviceRef, samples: &[TouchSample], timestamp: f64, frame: i32| {
                dispatcher.dispatch(device, samples, timestamp, frame);
            })
        };

        let mut registry = DeviceRegistry::new();
        if let Err(e) = registry.refresh(&*backend, &dispatcher, &sink) {
            warn!("initial device enumeration on {} failed: {e}", backend.name());
        }
        info!(
            backend = backend.name(),
            devices = registry.available().len(),
            "multitouch manager ready"
        );

        Self {
            haptic: HapticController::new(config.haptic_enabled),
            backend,
            config,
            state: Mutex::new(State {
                registry,
                listeners: ListenerArena::new(),
            }),
            dispatcher,
            sink,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Explicit manager with default configuration.
    pub fn with_backend(backend: Arc<dyn MultitouchBackend>) -> Self {
        Self::new(backend, ManagerConfig::default())
    }

    /// The process-wide manager. The first call picks the default backend and
    /// reads configuration from `OPENMT_CONFIG`.
    pub fn shared() -> &'static Manager {
        SHARED.get_or_init(|| Manager::new(default_backend(), ManagerConfig::from_env()))
    }

    /// The process-wide manager, if something already created it.
    pub fn shared_if_initialized() -> Option<&'static Manager> {
        SHARED.get()
    }

    pub fn supports_multitouch(&self) -> bool {
        self.backend.is_supported()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // --- devices ---

    /// Devices found by the last enumeration.
    pub fn available_devices(&self) -> Vec<DeviceInfo> {
        self.lock_state().registry.available()
    }

    /// Re-enumerate devices.
    ///
    /// Active devices that are gone are closed and leave the active set.
    /// Active devices that reappear under a new handle are reopened on it.
    pub fn refresh_available_devices(&self) -> Result<()> {
        let mut st = self.lock_state();
        self.ensure_running()?;
        st.registry
            .refresh(&*self.backend, &self.dispatcher, &self.sink)
    }

    /// Devices currently delivering frames.
    pub fn active_devices(&self) -> Vec<DeviceInfo> {
        self.lock_state().registry.active()
    }

    /// Make exactly `devices` active.
    ///
    /// Fails with [`Error::DeviceNotFound`] and changes nothing if any device
    /// is unknown. Fails with [`Error::Backend`] if some stream could not be
    /// opened; the other devices are still committed.
    pub fn set_active_devices(&self, devices: &[DeviceInfo]) -> Result<()> {
        let mut st = self.lock_state();
        self.ensure_running()?;
        st.registry
            .set_active(&*self.backend, &self.dispatcher, &self.sink, devices)
    }

    // --- listeners ---

    /// Register a structured listener for every active device.
    ///
    /// Only a weak reference to `target` is kept. Dropping the last `Arc`
    /// ends delivery at once. The manager releases the slot, and any device
    /// opened by default for it, on its next call.
    pub fn add_listener<T>(&self, target: &Arc<T>) -> Result<ListenerId>
    where
        T: TouchListener + 'static,
    {
        self.add_listener_with(target, ListenerOptions::all())
    }

    pub fn add_listener_with<T>(&self, target: &Arc<T>, options: ListenerOptions) -> Result<ListenerId>
    where
        T: TouchListener + 'static,
    {
        self.register(|seq| Listener::structured(target, options, seq))
    }

    /// Register a raw-frame callback for every active device.
    pub fn add_raw_listener<F>(&self, callback: F) -> Result<ListenerId>
    where
        F: Fn(&RawFrame<'_>) + Send + Sync + 'static,
    {
        self.add_raw_listener_with(callback, ListenerOptions::all())
    }

    pub fn add_raw_listener_with<F>(&self, callback: F, options: ListenerOptions) -> Result<ListenerId>
    where
        F: Fn(&RawFrame<'_>) + Send + Sync + 'static,
    {
        self.register(|seq| Listener::raw(callback, options, seq))
    }

    /// Stop delivery to a listener. Unknown or already-removed ids are
    /// ignored.
    pub fn remove_listener(&self, id: ListenerId) {
        let mut st = self.lock_state();
        if st.listeners.remove(id).is_some() {
            debug!(?id, "listener removed");
            self.settle(&mut st);
        }
    }

    pub fn is_listener_alive(&self, id: ListenerId) -> bool {
        self.lock_state()
            .listeners
            .get(id)
            .is_some_and(|l| !l.dead())
    }

    /// Mute or resume a listener without removing it.
    ///
    /// A muted listener keeps its slot, and keeps default-activated devices
    /// open, but receives nothing until resumed.
    pub fn set_listening(&self, id: ListenerId, listening: bool) -> Result<()> {
        let st = self.lock_state();
        self.ensure_running()?;
        let listener = st
            .listeners
            .get(id)
            .filter(|l| !l.dead())
            .ok_or(Error::ListenerNotFound)?;
        if listener.set_listening(listening) != listening {
            debug!(?id, listening, "listener toggled");
        }
        Ok(())
    }

    /// `false` for muted, removed and unknown listeners.
    pub fn is_listening(&self, id: ListenerId) -> bool {
        self.lock_state()
            .listeners
            .get(id)
            .is_some_and(|l| !l.dead() && l.is_listening())
    }

    /// Live listeners, muted ones included.
    pub fn listener_count(&self) -> usize {
        self.lock_state().listeners.len()
    }

    // --- haptics ---

    pub fn is_haptic_enabled(&self) -> bool {
        self.haptic.is_enabled()
    }

    pub fn set_haptic_enabled(&self, enabled: bool) -> Result<()> {
        self.ensure_running()?;
        self.haptic.set_enabled(enabled);
        Ok(())
    }

    /// Actuate the first active haptic-capable device.
    ///
    /// Parameters are opaque tuning values passed through unchanged; their
    /// ranges are not validated here. The state lock is held until the
    /// backend returns, so the target cannot be closed in between.
    pub fn trigger_raw_haptic(
        &self,
        actuation_id: i32,
        param1: u32,
        param2: f32,
        param3: f32,
    ) -> Result<()> {
        let st = self.lock_state();
        self.ensure_running()?;
        self.haptic.trigger(
            &*self.backend,
            st.registry.haptic_target(),
            HapticCommand::new(actuation_id, param1, param2, param3),
        )
    }

    // --- lifecycle ---

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            frames: self.dispatcher.frames_dispatched(),
            handler_faults: self.dispatcher.handler_faults(),
        }
    }

    /// Close every stream and drop every listener. Later mutating calls fail
    /// with [`Error::ShutDown`]. Calling this twice is harmless.
    pub fn shutdown(&self) {
        let mut st = self.state.lock();
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        st.listeners.clear();
        self.dispatcher.publish_listeners(Vec::new());
        st.registry.close_all(&*self.backend, &self.dispatcher);
        info!(backend = self.backend.name(), "multitouch manager shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(Error::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Lock the state, settling first if a structured target was dropped.
    fn lock_state(&self) -> MutexGuard<'_, State> {
        let mut st = self.state.lock();
        if st.listeners.has_dead() {
            self.settle(&mut st);
        }
        st
    }

    fn register(&self, make: impl FnOnce(u64) -> Listener) -> Result<ListenerId> {
        let mut st = self.lock_state();
        self.ensure_running()?;

        let first = st.listeners.is_empty();
        let id = st.listeners.insert(make);
        debug!(?id, listeners = st.listeners.len(), "listener added");

        if first && !st.registry.has_active() {
            if !st.registry.has_known() {
                if let Err(e) = st
                    .registry
                    .refresh(&*self.backend, &self.dispatcher, &self.sink)
                {
                    warn!("device enumeration failed: {e}");
                }
            }
            st.registry.activate_default(
                &*self.backend,
                &self.dispatcher,
                &self.sink,
                self.config.default_activation,
            );
        }

        self.dispatcher.publish_listeners(st.listeners.snapshot());
        Ok(id)
    }

    /// Prune dead listeners, release implicit devices once nobody listens,
    /// and republish the dispatch snapshot.
    fn settle(&self, st: &mut State) {
        st.listeners.prune_dead();
        if st.listeners.is_empty() {
            st.registry.release_implicit(&*self.backend, &self.dispatcher);
        }
        self.dispatcher.publish_listeners(st.listeners.snapshot());
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
