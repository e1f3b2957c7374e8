//! Integration tests for frame delivery.
//!
//! Drive a `Manager` through the public API with an in-memory backend:
//! register listeners, inject frames as the hardware would, and check who
//! receives what.

use openmt::{
    DefaultActivation, DeviceRef, FrameRecorder, ListenerId, ListenerOptions, Manager,
    ManagerConfig, RawFrame, Recording, TouchEvent, TouchListener, TouchSample, TouchState,
    Vector2, VirtualBackend,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn sample(id: i32, x: f32, y: f32) -> TouchSample {
    TouchSample {
        identifier: id,
        state: TouchState::Touching,
        position: Vector2::new(x, y),
        ..Default::default()
    }
}

fn setup() -> (Arc<VirtualBackend>, Manager, DeviceRef) {
    let backend = Arc::new(VirtualBackend::new());
    let dev = backend.plug("Built-in Trackpad", 42, true, true);
    let mgr = Manager::with_backend(backend.clone());
    (backend, mgr, dev)
}

#[derive(Default)]
struct Collect(Mutex<Vec<TouchEvent>>);

impl TouchListener for Collect {
    fn touches_changed(&self, event: &TouchEvent) {
        self.0.lock().push(event.clone());
    }
}

// ── Raw and structured listeners side by side ──

#[test]
fn raw_and_structured_listeners_see_the_same_frame() {
    let (backend, mgr, dev) = setup();

    let raw_seen: Arc<Mutex<Vec<(usize, f64, i32, u64)>>> = Arc::default();
    let r = Arc::clone(&raw_seen);
    let l1 = mgr
        .add_raw_listener(move |f: &RawFrame<'_>| {
            r.lock().push((f.count(), f.timestamp, f.frame, f.device_id));
        })
        .unwrap();
    let l2 = Arc::new(Collect::default());
    mgr.add_listener(&l2).unwrap();

    let touches = [sample(1, 0.25, 0.5), sample(2, 0.75, 0.5)];
    assert!(backend.feed(dev, &touches, 1000.0, 5));

    assert_eq!(*raw_seen.lock(), vec![(2, 1000.0, 5, 42)]);
    {
        let events = l2.0.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].device_id, 42);
        assert_eq!(events[0].frame, 5);
        assert_eq!(events[0].timestamp, 1000.0);
        assert_eq!(events[0].touches, touches.to_vec());
    }

    // After removal only the structured listener hears frame 6.
    mgr.remove_listener(l1);
    assert!(backend.feed(dev, &touches, 1000.016, 6));
    assert_eq!(raw_seen.lock().len(), 1);
    assert_eq!(l2.0.lock().len(), 2);
    assert_eq!(l2.0.lock()[1].frame, 6);
}

#[test]
fn delivery_follows_registration_order() {
    let (backend, mgr, dev) = setup();
    let order: Arc<Mutex<Vec<u32>>> = Arc::default();

    for n in 0..4 {
        let o = Arc::clone(&order);
        mgr.add_raw_listener(move |_: &RawFrame<'_>| o.lock().push(n))
            .unwrap();
    }
    backend.feed(dev, &[], 0.0, 1);
    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
}

#[test]
fn empty_frames_are_still_delivered() {
    let (backend, mgr, dev) = setup();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    mgr.add_raw_listener(move |f: &RawFrame<'_>| {
        assert_eq!(f.count(), 0);
        h.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    backend.feed(dev, &[], 3.0, 9);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

// ── Listener lifetime ──

#[test]
fn dropping_a_structured_target_ends_delivery() {
    let (backend, mgr, dev) = setup();
    let keep = Arc::new(Collect::default());
    let gone = Arc::new(Collect::default());
    mgr.add_listener(&keep).unwrap();
    let gone_id = mgr.add_listener(&gone).unwrap();

    drop(gone);
    assert!(!mgr.is_listener_alive(gone_id));
    assert_eq!(mgr.listener_count(), 1);

    backend.feed(dev, &[sample(1, 0.0, 0.0)], 1.0, 1);
    assert_eq!(keep.0.lock().len(), 1);
}

#[test]
fn muted_listener_misses_frames_until_resumed() {
    let (backend, mgr, dev) = setup();
    let muted = Arc::new(Collect::default());
    let other = Arc::new(Collect::default());
    let id = mgr.add_listener(&muted).unwrap();
    mgr.add_listener(&other).unwrap();

    mgr.set_listening(id, false).unwrap();
    backend.feed(dev, &[sample(1, 0.1, 0.1)], 1.0, 1);
    mgr.set_listening(id, true).unwrap();
    backend.feed(dev, &[sample(1, 0.2, 0.2)], 2.0, 2);

    let frames: Vec<i32> = muted.0.lock().iter().map(|e| e.frame).collect();
    assert_eq!(frames, vec![2]);
    assert_eq!(other.0.lock().len(), 2);
    assert!(mgr.is_listening(id));
}

#[test]
fn listener_removed_from_inside_a_handler_stops_at_once() {
    let (backend, mgr, dev) = setup();
    let mgr = Arc::new(mgr);
    let hits = Arc::new(AtomicUsize::new(0));

    let id_slot: Arc<Mutex<Option<ListenerId>>> = Arc::default();
    let (m, slot, h) = (Arc::downgrade(&mgr), Arc::clone(&id_slot), Arc::clone(&hits));
    let id = mgr
        .add_raw_listener(move |_: &RawFrame<'_>| {
            h.fetch_add(1, Ordering::SeqCst);
            if let (Some(m), Some(id)) = (m.upgrade(), *slot.lock()) {
                m.remove_listener(id);
            }
        })
        .unwrap();
    *id_slot.lock() = Some(id);

    // Keep the device open after the self-removing listener is gone.
    mgr.add_raw_listener(|_: &RawFrame<'_>| {}).unwrap();

    backend.feed(dev, &[], 0.0, 1);
    backend.feed(dev, &[], 0.0, 2);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!mgr.is_listener_alive(id));
}

#[test]
fn device_filter_limits_delivery() {
    let backend = Arc::new(VirtualBackend::new());
    let a = backend.plug("Built-in Trackpad", 42, true, false);
    let b = backend.plug("Magic Trackpad", 77, false, false);
    let mgr = Manager::with_backend(backend.clone());
    mgr.set_active_devices(&mgr.available_devices()).unwrap();

    let only_b = Arc::new(Collect::default());
    mgr.add_listener_with(&only_b, ListenerOptions::device(77))
        .unwrap();

    backend.feed(a, &[], 0.0, 1);
    backend.feed(b, &[], 0.0, 1);
    let events = only_b.0.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].device_id, 77);
}

// ── Fault isolation and counters ──

#[test]
fn panicking_handler_does_not_starve_others() {
    let (backend, mgr, dev) = setup();
    mgr.add_raw_listener(|_: &RawFrame<'_>| panic!("handler bug"))
        .unwrap();
    let after = Arc::new(Collect::default());
    mgr.add_listener(&after).unwrap();

    backend.feed(dev, &[], 0.0, 1);
    backend.feed(dev, &[], 0.0, 2);

    assert_eq!(after.0.lock().len(), 2);
    let stats = mgr.stats();
    assert_eq!(stats.frames, 2);
    assert_eq!(stats.handler_faults, 2);
}

#[test]
fn frames_from_inactive_devices_are_dropped() {
    let backend = Arc::new(VirtualBackend::new());
    let dev = backend.plug("Magic Trackpad", 77, false, false);
    let mgr = Manager::new(
        backend.clone(),
        ManagerConfig {
            default_activation: DefaultActivation::None,
            ..Default::default()
        },
    );

    let c = Arc::new(Collect::default());
    mgr.add_listener(&c).unwrap();
    assert!(!backend.feed(dev, &[], 0.0, 1));
    assert_eq!(mgr.stats().frames, 0);
    assert!(c.0.lock().is_empty());
}

// ── Concurrency ──

#[test]
fn concurrent_devices_and_registration() {
    let backend = Arc::new(VirtualBackend::new());
    let devs: Vec<DeviceRef> = (0..4)
        .map(|n| backend.plug(&format!("Trackpad {n}"), 100 + n, n == 0, false))
        .collect();
    let mgr = Arc::new(Manager::with_backend(backend.clone()));
    mgr.set_active_devices(&mgr.available_devices()).unwrap();

    let total = Arc::new(AtomicUsize::new(0));
    let t = Arc::clone(&total);
    mgr.add_raw_listener(move |_: &RawFrame<'_>| {
        t.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();

    let feeders: Vec<_> = devs
        .iter()
        .map(|&dev| {
            let backend = Arc::clone(&backend);
            std::thread::spawn(move || {
                for frame in 0..250 {
                    backend.feed(dev, &[sample(1, 0.5, 0.5)], frame as f64, frame);
                }
            })
        })
        .collect();

    let churn = {
        let mgr = Arc::clone(&mgr);
        std::thread::spawn(move || {
            for _ in 0..100 {
                let id = mgr.add_raw_listener(|_: &RawFrame<'_>| {}).unwrap();
                mgr.remove_listener(id);
            }
        })
    };

    for f in feeders {
        f.join().unwrap();
    }
    churn.join().unwrap();

    assert_eq!(total.load(Ordering::Relaxed), 4 * 250);
    assert_eq!(mgr.listener_count(), 1);
    assert_eq!(mgr.stats().frames, 4 * 250);
}

// ── Recording and replay ──

#[test]
fn recorded_session_replays_identically() {
    let (backend, mgr, dev) = setup();
    let recorder = Arc::new(FrameRecorder::new());
    mgr.add_listener(&recorder).unwrap();

    for frame in 1..=3 {
        let t = frame as f32 * 0.1;
        backend.feed(dev, &[sample(1, t, t)], frame as f64 / 60.0, frame);
    }
    let recording = recorder.take();
    assert_eq!(recording.len(), 3);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    recording.save(&path).unwrap();
    let loaded = Recording::load(&path).unwrap();
    assert_eq!(loaded, recording);

    let replayed = Arc::new(Collect::default());
    mgr.add_listener(&replayed).unwrap();
    assert_eq!(backend.replay(&loaded), 3);

    let events = replayed.0.lock();
    assert_eq!(events.len(), 3);
    for (ev, rec) in events.iter().zip(&loaded.frames) {
        assert_eq!(ev.frame, rec.frame);
        assert_eq!(ev.timestamp, rec.timestamp);
        assert_eq!(ev.touches, rec.samples);
    }
}
