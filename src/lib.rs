#![cfg_attr(docsrs, feature(doc_cfg))]

//! openmt: listener-based access to multitouch trackpads.
//!
//! Delivers raw per-frame touch data from one or more trackpads to any
//! number of independent listeners, keeps device selection consistent as
//! devices come and go, and gates haptic actuation.
//!
//! - [`Manager`] is the entry point: device enumeration and selection,
//!   listener registration, haptics.
//! - [`backends`] holds the hardware side ([`MultitouchBackend`]) and an
//!   in-memory [`VirtualBackend`] for tests and demos.
//! - Touch data arrives either as a borrowed [`RawFrame`] or as an owned
//!   [`TouchEvent`]; samples are passed through uninterpreted.

pub mod arena;
pub mod backends;
pub mod config;
pub mod device;
mod dispatch;
pub mod error;
pub mod haptic;
pub mod listener;
pub mod manager;
pub mod recording;
mod registry;
pub mod touch;

pub use arena::ListenerId;
pub use backends::virtual_input::VirtualBackend;
pub use backends::{FrameSink, MultitouchBackend};
pub use config::{DefaultActivation, ManagerConfig};
pub use device::{DeviceInfo, DeviceRef, HardwareDevice};
pub use error::{Error, Result};
pub use haptic::HapticCommand;
pub use listener::{ListenerKind, ListenerOptions, TouchListener};
pub use manager::{DispatchStats, Manager};
pub use recording::{FrameRecorder, RecordedFrame, Recording};
pub use touch::{RawFrame, TouchEvent, TouchSample, TouchState, Vector2};

/// Whether this machine has multitouch hardware openmt can read.
///
/// Side-effect free and safe to call before anything else. Asks the shared
/// manager's backend when it exists, otherwise asks the default backend
/// without creating the shared manager.
pub fn system_supports_multitouch() -> bool {
    match Manager::shared_if_initialized() {
        Some(mgr) => mgr.supports_multitouch(),
        None => backends::default_backend().is_supported(),
    }
}
