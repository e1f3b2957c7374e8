//! Generation-counted listener slots.
//!
//! A [`ListenerId`] names a slot *and* the generation it was issued in. When
//! a listener is removed its slot's generation is bumped, so an old id can
//! never reach a newer listener that reuses the slot.

use crate::listener::Listener;
use std::sync::Arc;

/// Handle returned when a listener is registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId {
    index: u32,
    generation: u32,
}

struct Slot {
    generation: u32,
    entry: Option<Arc<Listener>>,
}

#[derive(Default)]
pub(crate) struct ListenerArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    next_seq: u64,
    live: usize,
}

impl ListenerArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a listener built by `make`, which receives the registration
    /// sequence number.
    pub fn insert(&mut self, make: impl FnOnce(u64) -> Listener) -> ListenerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = Some(Arc::new(make(seq)));
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = entry;
            ListenerId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entry,
            });
            ListenerId {
                index,
                generation: 0,
            }
        }
    }

    pub fn get(&self, id: ListenerId) -> Option<&Arc<Listener>> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_ref())
    }

    /// Kill and release the listener behind `id`. Stale ids return `None`.
    pub fn remove(&mut self, id: ListenerId) -> Option<Arc<Listener>> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        entry.kill();
        self.release(id.index);
        Some(entry)
    }

    pub fn has_dead(&self) -> bool {
        self.slots
            .iter()
            .any(|s| s.entry.as_ref().is_some_and(|l| l.dead()))
    }

    /// Release every slot whose listener is dead. Returns how many.
    pub fn prune_dead(&mut self) -> usize {
        let dead: Vec<u32> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.entry.as_ref().is_some_and(|l| l.dead()))
            .map(|(i, _)| i as u32)
            .collect();

        for &index in &dead {
            if let Some(entry) = self.slots[index as usize].entry.take() {
                entry.kill();
            }
            self.release(index);
        }
        dead.len()
    }

    /// Kill and release everything.
    pub fn clear(&mut self) {
        for index in 0..self.slots.len() as u32 {
            if let Some(entry) = self.slots[index as usize].entry.take() {
                entry.kill();
                self.release(index);
            }
        }
    }

    /// Live listeners in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Listener>> {
        let mut out: Vec<Arc<Listener>> = self
            .slots
            .iter()
            .filter_map(|s| s.entry.clone())
            .collect();
        out.sort_by_key(|l| l.seq);
        out
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn release(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.live -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::ListenerOptions;
    use crate::touch::RawFrame;

    fn raw(seq: u64) -> Listener {
        Listener::raw(|_: &RawFrame<'_>| {}, ListenerOptions::all(), seq)
    }

    #[test]
    fn stale_id_cannot_reach_reused_slot() {
        let mut arena = ListenerArena::new();
        let a = arena.insert(raw);
        let first = arena.remove(a).unwrap();
        assert!(first.dead());

        let b = arena.insert(raw);
        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
        assert!(arena.remove(a).is_none());
        assert!(arena.get(b).is_some());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut arena = ListenerArena::new();
        let a = arena.insert(raw);
        assert!(arena.remove(a).is_some());
        assert!(arena.remove(a).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    fn snapshot_keeps_registration_order_across_reuse() {
        let mut arena = ListenerArena::new();
        let a = arena.insert(raw);
        let _b = arena.insert(raw);
        arena.remove(a);
        let _c = arena.insert(raw); // reuses slot 0

        let seqs: Vec<u64> = arena.snapshot().iter().map(|l| l.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn prune_releases_dead() {
        let mut arena = ListenerArena::new();
        let a = arena.insert(raw);
        let b = arena.insert(raw);
        arena.get(a).unwrap().kill();

        assert!(arena.has_dead());
        assert_eq!(arena.prune_dead(), 1);
        assert!(!arena.has_dead());
        assert!(arena.get(a).is_none());
        assert!(arena.get(b).is_some());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn clear_kills_all() {
        let mut arena = ListenerArena::new();
        let a = arena.insert(raw);
        let held = Arc::clone(arena.get(a).unwrap());
        arena.insert(raw);

        arena.clear();
        assert!(arena.is_empty());
        assert!(held.dead());
        assert!(arena.snapshot().is_empty());
    }
}
