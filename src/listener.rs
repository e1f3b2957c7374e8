//! Listeners.
//!
//! A [`Listener`] is one subscriber's interest in touch frames. It comes in
//! two shapes:
//! - **structured**: bound to an application object implementing
//!   [`TouchListener`], which receives an owned [`TouchEvent`] per frame.
//!   Only a weak reference is kept; once the application drops its last
//!   `Arc` the listener is dead.
//! - **raw**: bound to a closure receiving the borrowed [`RawFrame`] exactly
//!   as the hardware delivered it.
//!
//! Liveness is one-way: a listener that is dead never delivers again.
//! Muting is not: a muted listener stays alive and can be resumed.

use crate::error::{Error, Result};
use crate::touch::{RawFrame, TouchEvent};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Application-side receiver of structured touch events.
pub trait TouchListener: Send + Sync {
    fn touches_changed(&self, event: &TouchEvent);
}

/// Closure receiving raw frames.
pub type RawFrameCallback = Box<dyn Fn(&RawFrame<'_>) + Send + Sync>;

/// Which devices a listener wants frames from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    device: Option<u64>,
}

impl ListenerOptions {
    /// Frames from every active device.
    pub fn all() -> Self {
        Self::default()
    }

    /// Frames from a single device, by numeric id
    /// (see [`DeviceInfo::numeric_id`](crate::device::DeviceInfo::numeric_id)).
    pub fn device(numeric_id: u64) -> Self {
        Self {
            device: Some(numeric_id),
        }
    }

    pub fn device_filter(&self) -> Option<u64> {
        self.device
    }
}

/// The two listener shapes, as seen by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerKind {
    Structured,
    Raw,
}

enum Target {
    Structured(Weak<dyn TouchListener>),
    Raw(RawFrameCallback),
}

pub struct Listener {
    target: Target,
    options: ListenerOptions,
    alive: AtomicBool,
    listening: AtomicBool,
    /// Registration order; fixes dispatch order.
    pub(crate) seq: u64,
}

impl Listener {
    pub(crate) fn structured<T>(target: &Arc<T>, options: ListenerOptions, seq: u64) -> Self
    where
        T: TouchListener + 'static,
    {
        let weak: Weak<T> = Arc::downgrade(target);
        Self {
            target: Target::Structured(weak),
            options,
            alive: AtomicBool::new(true),
            listening: AtomicBool::new(true),
            seq,
        }
    }

    pub(crate) fn raw<F>(callback: F, options: ListenerOptions, seq: u64) -> Self
    where
        F: Fn(&RawFrame<'_>) + Send + Sync + 'static,
    {
        Self {
            target: Target::Raw(Box::new(callback)),
            options,
            alive: AtomicBool::new(true),
            listening: AtomicBool::new(true),
            seq,
        }
    }

    pub fn kind(&self) -> ListenerKind {
        match self.target {
            Target::Structured(_) => ListenerKind::Structured,
            Target::Raw(_) => ListenerKind::Raw,
        }
    }

    /// Whether frames from `device_id` pass this listener's filter.
    #[inline]
    pub fn wants(&self, device_id: u64) -> bool {
        self.options.device.map_or(true, |d| d == device_id)
    }

    /// `true` once removed, or once the structured target has been dropped.
    pub fn dead(&self) -> bool {
        if !self.alive.load(Ordering::Acquire) {
            return true;
        }
        match &self.target {
            Target::Structured(weak) => weak.strong_count() == 0,
            Target::Raw(_) => false,
        }
    }

    /// `false` while muted. Independent of liveness.
    #[inline]
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// Mute or resume. Returns the previous state.
    pub(crate) fn set_listening(&self, listening: bool) -> bool {
        self.listening.swap(listening, Ordering::AcqRel)
    }

    /// Alive → Dead. Returns `false` if it was already dead.
    pub(crate) fn kill(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// Forward a structured event to the bound target.
    ///
    /// A panic in the target is caught and returned as
    /// [`Error::HandlerFault`]. Calling this on a raw listener is a no-op.
    pub fn listen_to_event(&self, event: &TouchEvent) -> Result<()> {
        let Target::Structured(weak) = &self.target else {
            return Ok(());
        };
        let Some(target) = weak.upgrade() else {
            self.kill();
            return Ok(());
        };
        guarded(|| target.touches_changed(event))
    }

    /// Forward a raw frame, unchanged, to the bound callback.
    ///
    /// A panic in the callback is caught and returned as
    /// [`Error::HandlerFault`]. Calling this on a structured listener is a
    /// no-op.
    pub fn listen_to_raw_frame(&self, frame: &RawFrame<'_>) -> Result<()> {
        match &self.target {
            Target::Raw(callback) => guarded(|| callback(frame)),
            Target::Structured(_) => Ok(()),
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("kind", &self.kind())
            .field("options", &self.options)
            .field("dead", &self.dead())
            .field("listening", &self.is_listening())
            .field("seq", &self.seq)
            .finish()
    }
}

fn guarded(f: impl FnOnce()) -> Result<()> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| Error::HandlerFault(panic_message(&*payload)))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::touch::TouchSample;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<TouchEvent>>);

    impl TouchListener for Collect {
        fn touches_changed(&self, event: &TouchEvent) {
            self.0.lock().push(event.clone());
        }
    }

    fn frame(samples: &[TouchSample]) -> RawFrame<'_> {
        RawFrame {
            samples,
            timestamp: 1000.0,
            frame: 5,
            device_id: 42,
        }
    }

    #[test]
    fn structured_dies_with_target() {
        let target = Arc::new(Collect::default());
        let listener = Listener::structured(&target, ListenerOptions::all(), 0);
        assert_eq!(listener.kind(), ListenerKind::Structured);
        assert!(!listener.dead());

        let samples = [TouchSample::default()];
        listener.listen_to_event(&frame(&samples).to_event()).unwrap();
        assert_eq!(target.0.lock().len(), 1);

        drop(target);
        assert!(listener.dead());
        listener.listen_to_event(&frame(&samples).to_event()).unwrap();
    }

    #[test]
    fn raw_receives_frame_unchanged() {
        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        let listener = Listener::raw(
            move |f: &RawFrame<'_>| {
                *s.lock() = Some((f.count(), f.timestamp, f.frame, f.device_id));
            },
            ListenerOptions::all(),
            0,
        );

        let samples = [TouchSample::default(); 2];
        listener.listen_to_raw_frame(&frame(&samples)).unwrap();
        assert_eq!(*seen.lock(), Some((2, 1000.0, 5, 42)));
    }

    #[test]
    fn kill_is_one_way() {
        let listener = Listener::raw(|_: &RawFrame<'_>| {}, ListenerOptions::all(), 0);
        assert!(listener.kill());
        assert!(listener.dead());
        assert!(!listener.kill());
        assert!(listener.dead());
    }

    #[test]
    fn handler_panic_becomes_fault() {
        let listener = Listener::raw(
            |_: &RawFrame<'_>| panic!("boom"),
            ListenerOptions::all(),
            0,
        );
        let err = listener.listen_to_raw_frame(&frame(&[])).unwrap_err();
        match err {
            Error::HandlerFault(msg) => assert_eq!(msg, "boom"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!listener.dead());
    }

    #[test]
    fn mute_is_reversible_and_not_death() {
        let listener = Listener::raw(|_: &RawFrame<'_>| {}, ListenerOptions::all(), 0);
        assert!(listener.is_listening());
        assert!(listener.set_listening(false));
        assert!(!listener.is_listening());
        assert!(!listener.dead());
        assert!(!listener.set_listening(true));
        assert!(listener.is_listening());
    }

    #[test]
    fn device_filter() {
        let any = Listener::raw(|_: &RawFrame<'_>| {}, ListenerOptions::all(), 0);
        let one = Listener::raw(|_: &RawFrame<'_>| {}, ListenerOptions::device(7), 1);
        assert!(any.wants(7) && any.wants(8));
        assert!(one.wants(7));
        assert!(!one.wants(8));
    }
}
