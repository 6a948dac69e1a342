//! Update coalescing
//!
//! Rapid repeated updates to the same row (tens of milliseconds apart)
//! would otherwise trigger one re-render each. The coalescer holds the
//! latest pending event per key for a short window; only the last one
//! survives. Time is injected so the logic is deterministic under test —
//! the owning task drives flushing from its own timer.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Pending<E> {
    deadline: Instant,
    event: E,
}

pub struct Coalescer<K: Eq + Hash + Clone, E> {
    window: Duration,
    pending: HashMap<K, Pending<E>>,
}

impl<K: Eq + Hash + Clone, E> Coalescer<K, E> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    /// Offer an event for a key, replacing any pending event for the same
    /// key. Returns the events whose window has expired and are now due.
    /// A hot key keeps its original deadline, so a steady update stream
    /// still flushes once per window instead of starving.
    pub fn offer(&mut self, key: K, event: E, now: Instant) -> Vec<E> {
        let due = self.drain_expired(now);
        match self.pending.get_mut(&key) {
            Some(pending) => pending.event = event,
            None => {
                self.pending.insert(
                    key,
                    Pending {
                        deadline: now + self.window,
                        event,
                    },
                );
            }
        }
        due
    }

    /// Remove and return every pending event whose deadline has passed.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<E> {
        let expired: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|k| self.pending.remove(&k))
            .map(|p| p.event)
            .collect()
    }

    /// Scope teardown: everything pending is due immediately.
    pub fn flush_all(&mut self) -> Vec<E> {
        self.pending.drain().map(|(_, p)| p.event).collect()
    }

    /// Earliest pending deadline, for the owner's sleep timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(50);

    #[test]
    fn test_rapid_updates_to_one_key_deliver_only_the_last() {
        let mut coalescer: Coalescer<&str, u32> = Coalescer::new(WINDOW);
        let t0 = Instant::now();

        assert!(coalescer.offer("lead-1", 1, t0).is_empty());
        assert!(coalescer.offer("lead-1", 2, t0 + Duration::from_millis(10)).is_empty());
        assert!(coalescer.offer("lead-1", 3, t0 + Duration::from_millis(20)).is_empty());

        let due = coalescer.drain_expired(t0 + WINDOW);
        assert_eq!(due, vec![3], "only the latest update survives the window");
        assert_eq!(coalescer.pending(), 0);
    }

    #[test]
    fn test_distinct_keys_do_not_coalesce_with_each_other() {
        let mut coalescer: Coalescer<&str, u32> = Coalescer::new(WINDOW);
        let t0 = Instant::now();

        coalescer.offer("lead-1", 1, t0);
        coalescer.offer("lead-2", 2, t0);

        let mut due = coalescer.drain_expired(t0 + WINDOW);
        due.sort();
        assert_eq!(due, vec![1, 2]);
    }

    #[test]
    fn test_offer_returns_events_already_due() {
        let mut coalescer: Coalescer<&str, u32> = Coalescer::new(WINDOW);
        let t0 = Instant::now();

        coalescer.offer("lead-1", 1, t0);
        let due = coalescer.offer("lead-2", 2, t0 + WINDOW);
        assert_eq!(due, vec![1]);
        assert_eq!(coalescer.pending(), 1);
    }

    #[test]
    fn test_hot_key_keeps_its_original_deadline() {
        let mut coalescer: Coalescer<&str, u32> = Coalescer::new(WINDOW);
        let t0 = Instant::now();

        coalescer.offer("lead-1", 1, t0);
        // Keep updating past the original deadline; the deadline must not slide.
        coalescer.offer("lead-1", 2, t0 + Duration::from_millis(40));
        let due = coalescer.offer("lead-1", 3, t0 + Duration::from_millis(60));
        assert_eq!(due, vec![2], "original window flushed despite continued updates");
    }

    #[test]
    fn test_flush_all_empties_pending() {
        let mut coalescer: Coalescer<&str, u32> = Coalescer::new(WINDOW);
        let t0 = Instant::now();
        coalescer.offer("a", 1, t0);
        coalescer.offer("b", 2, t0);

        let mut flushed = coalescer.flush_all();
        flushed.sort();
        assert_eq!(flushed, vec![1, 2]);
        assert_eq!(coalescer.pending(), 0);
        assert!(coalescer.next_deadline().is_none());
    }
}
