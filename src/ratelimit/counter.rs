//! Window counter storage.
//!
//! The evaluator only needs one operation from a counter store: atomically
//! increment a key and read back the new count, arming the key's expiry on
//! the first increment of a window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::clock::Clock;
use crate::error::Result;

/// Trait for counter store implementations.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter under `key` by one and return the new value.
    ///
    /// When the counter goes from absent to 1, its expiry is set to
    /// `window_secs` seconds from now. Unreachable stores fail with
    /// [`crate::error::LimiterError::StoreUnavailable`].
    async fn increment_and_get_count(&self, key: &str, window_secs: u64) -> Result<u64>;
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    count: u64,
    expires_at: u64,
}

/// Default minimum spacing between sweeps of expired counters, in seconds.
pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 1;

/// In-process counter store.
///
/// Increments are serialized per key by the map's entry lock. Expiry is
/// evaluated lazily against the injected clock: an expired slot is treated as
/// absent and restarted on the next increment. Expired slots are swept from
/// the map by increments, at most once per purge interval.
pub struct MemoryCounterStore {
    slots: DashMap<String, Slot>,
    clock: Arc<dyn Clock>,
    purge_interval_secs: u64,
    next_purge: AtomicU64,
}

impl MemoryCounterStore {
    /// Create a store that expires counters using `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_purge_interval(clock, DEFAULT_PURGE_INTERVAL_SECS)
    }

    /// Create a store that sweeps expired counters at most every `purge_interval_secs`.
    pub fn with_purge_interval(clock: Arc<dyn Clock>, purge_interval_secs: u64) -> Self {
        Self {
            slots: DashMap::new(),
            clock,
            purge_interval_secs,
            next_purge: AtomicU64::new(0),
        }
    }

    /// Current count under `key`, or 0 if absent or expired.
    pub fn get_count(&self, key: &str) -> u64 {
        let now = self.clock.now_secs();
        self.slots
            .get(key)
            .filter(|slot| now < slot.expires_at)
            .map(|slot| slot.count)
            .unwrap_or(0)
    }

    /// Drop every expired counter.
    pub fn purge_expired(&self) {
        self.purge_at(self.clock.now_secs());
    }

    fn purge_at(&self, now: u64) {
        let before = self.slots.len();
        self.slots.retain(|_, slot| now < slot.expires_at);
        let removed = before.saturating_sub(self.slots.len());
        if removed > 0 {
            debug!(removed = removed, remaining = self.slots.len(), "Purged expired counters");
        }
    }

    /// Sweep expired counters if the purge interval has elapsed. Only one
    /// caller wins each interval; the sweep must not run while an entry guard
    /// is held.
    fn maybe_purge(&self, now: u64) {
        let due = self.next_purge.load(Ordering::Relaxed);
        if now < due {
            return;
        }
        let next = now.saturating_add(self.purge_interval_secs);
        if self
            .next_purge
            .compare_exchange(due, next, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.purge_at(now);
        }
    }

    /// Number of counters held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.slots.clear();
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment_and_get_count(&self, key: &str, window_secs: u64) -> Result<u64> {
        let now = self.clock.now_secs();
        self.maybe_purge(now);

        let mut slot = self.slots.entry(key.to_string()).or_insert(Slot {
            count: 0,
            expires_at: 0,
        });

        if now >= slot.expires_at {
            slot.count = 0;
        }

        slot.count += 1;
        if slot.count == 1 {
            slot.expires_at = now.saturating_add(window_secs);
        }

        trace!(key = %key, count = slot.count, expires_at = slot.expires_at, "Incremented counter");
        Ok(slot.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::MockClock;

    fn store_at(start: u64) -> (MemoryCounterStore, MockClock) {
        let clock = MockClock::new(start);
        (MemoryCounterStore::new(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_increment_returns_post_increment_value() {
        let (store, _clock) = store_at(1_000);

        assert_eq!(store.increment_and_get_count("k", 60).await.unwrap(), 1);
        assert_eq!(store.increment_and_get_count("k", 60).await.unwrap(), 2);
        assert_eq!(store.increment_and_get_count("other", 60).await.unwrap(), 1);
        assert_eq!(store.get_count("k"), 2);
    }

    #[tokio::test]
    async fn test_expiry_armed_on_first_increment_only() {
        let (store, clock) = store_at(1_000);

        store.increment_and_get_count("k", 60).await.unwrap();
        clock.advance(30);
        store.increment_and_get_count("k", 60).await.unwrap();

        // Expiry stays at 1_060, not pushed out by the second increment.
        clock.set(1_059);
        assert_eq!(store.get_count("k"), 2);
        clock.set(1_060);
        assert_eq!(store.get_count("k"), 0);
        assert_eq!(store.increment_and_get_count("k", 60).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let clock = MockClock::new(0);
        let store = MemoryCounterStore::with_purge_interval(Arc::new(clock.clone()), u64::MAX);

        store.increment_and_get_count("short", 10).await.unwrap();
        store.increment_and_get_count("long", 100).await.unwrap();
        assert_eq!(store.len(), 2);

        clock.advance(10);
        store.purge_expired();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_count("long"), 1);

        store.clear();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_increments_sweep_expired_counters() {
        let (store, clock) = store_at(0);

        for i in 0..1_000 {
            let key = format!("source-{i}");
            assert_eq!(store.increment_and_get_count(&key, 60).await.unwrap(), 1);
            clock.advance(60);
        }

        assert!(store.len() <= 2, "slots held: {}", store.len());
    }

    #[tokio::test]
    async fn test_sweep_respects_interval() {
        let clock = MockClock::new(0);
        let store = MemoryCounterStore::with_purge_interval(Arc::new(clock.clone()), 100);

        store.increment_and_get_count("a", 10).await.unwrap();
        clock.advance(10);
        // The first increment swept; the next sweep is not due until 100.
        store.increment_and_get_count("b", 10).await.unwrap();
        clock.advance(10);
        store.increment_and_get_count("c", 10).await.unwrap();
        assert_eq!(store.len(), 3);

        clock.set(110);
        store.increment_and_get_count("d", 10).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_huge_window_does_not_overflow() {
        let (store, clock) = store_at(1_000);

        assert_eq!(store.increment_and_get_count("k", u64::MAX).await.unwrap(), 1);
        clock.advance(1_000_000);
        assert_eq!(store.increment_and_get_count("k", u64::MAX).await.unwrap(), 2);
        assert_eq!(store.get_count("k"), 2);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let (store, _clock) = store_at(0);
        let store = Arc::new(store);

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment_and_get_count("shared", 60).await })
            })
            .collect();

        let mut counts: Vec<u64> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();
        counts.sort_unstable();

        assert_eq!(counts, (1..=50).collect::<Vec<u64>>());
        assert_eq!(store.get_count("shared"), 50);
    }
}
