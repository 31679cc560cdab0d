//! Removal tombstones
//!
//! Remembers when keys were explicitly evicted and when the whole space was
//! last cleared. Demotions and promotions carry the time their value was
//! written or read. Before and after touching a tier they ask whether a
//! removal happened since then, and drop or undo their write if so.
//!
//! Times are stored as nanoseconds since the tombstones were created. Zero
//! means "never".

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::trace;

use crate::value::CacheKey;

/// Tombstone count that triggers the first prune
const PRUNE_AT: usize = 4096;

/// Eviction and clear times of one cache space
pub struct Tombstones<K> {
    origin: Instant,
    /// Last explicit eviction per key
    evicted: DashMap<K, u64>,
    /// Last clear of the whole space
    cleared: AtomicU64,
    /// Values older than this are treated as removed
    retention: Duration,
    prune_at: AtomicUsize,
}

impl<K: CacheKey> Tombstones<K> {
    pub fn new(retention: Duration) -> Self {
        Self {
            origin: Instant::now(),
            evicted: DashMap::new(),
            cleared: AtomicU64::new(0),
            retention,
            prune_at: AtomicUsize::new(PRUNE_AT),
        }
    }

    fn stamp(&self, at: Instant) -> u64 {
        let nanos = at.saturating_duration_since(self.origin).as_nanos();
        u64::try_from(nanos).unwrap_or(u64::MAX - 1) + 1
    }

    /// Record that `key` is being evicted now
    ///
    /// Must be called before the key is removed from either tier.
    pub fn record_evict(&self, key: &K) {
        let now = self.stamp(Instant::now());
        self.evicted.insert(key.clone(), now);

        if self.evicted.len() > self.prune_at.load(Ordering::Relaxed) {
            self.prune();
        }
    }

    /// Record that the whole space is being cleared now
    ///
    /// Must be called before either tier is emptied.
    pub fn record_clear(&self) {
        let now = self.stamp(Instant::now());
        self.cleared.fetch_max(now, Ordering::SeqCst);
        // Older key tombstones are covered by the clear
        self.evicted.retain(|_, at| *at > now);
    }

    /// Whether `key` was evicted or the space cleared at or after `written_at`
    ///
    /// Values older than the retention window count as removed, since their
    /// tombstones may already be pruned.
    pub fn removed_since(&self, key: &K, written_at: Instant) -> bool {
        if written_at.elapsed() >= self.retention {
            return true;
        }

        let written = self.stamp(written_at);
        if self.cleared.load(Ordering::SeqCst) >= written {
            return true;
        }
        self.evicted
            .get(key)
            .map(|at| *at >= written)
            .unwrap_or(false)
    }

    /// Number of keys with a live tombstone
    pub fn len(&self) -> usize {
        self.evicted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty()
    }

    /// Drop tombstones older than the retention window
    fn prune(&self) {
        let before = self.evicted.len();
        if let Some(horizon) = Instant::now().checked_sub(self.retention) {
            let horizon = self.stamp(horizon);
            self.evicted.retain(|_, at| *at >= horizon);
        }

        let after = self.evicted.len();
        self.prune_at
            .store(PRUNE_AT.max(after.saturating_mul(2)), Ordering::Relaxed);
        trace!(before = before, after = after, "Pruned tombstones");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3_600);

    #[test]
    fn test_evict_covers_earlier_writes_only() {
        let tombstones = Tombstones::new(HOUR);
        let before = Instant::now();
        std::thread::sleep(Duration::from_millis(2));

        tombstones.record_evict(&1u32);
        std::thread::sleep(Duration::from_millis(2));
        let after = Instant::now();

        assert!(tombstones.removed_since(&1, before));
        assert!(!tombstones.removed_since(&1, after));
        // Other keys are untouched
        assert!(!tombstones.removed_since(&2, before));
    }

    #[test]
    fn test_clear_covers_every_key() {
        let tombstones = Tombstones::new(HOUR);
        tombstones.record_evict(&1u32);
        let before = Instant::now();
        std::thread::sleep(Duration::from_millis(2));

        tombstones.record_clear();

        assert!(tombstones.removed_since(&1, before));
        assert!(tombstones.removed_since(&42, before));
        assert!(tombstones.is_empty());

        std::thread::sleep(Duration::from_millis(2));
        assert!(!tombstones.removed_since(&42, Instant::now()));
    }

    #[test]
    fn test_values_past_retention_count_as_removed() {
        let tombstones = Tombstones::<u32>::new(Duration::from_millis(1));
        let written = Instant::now();
        std::thread::sleep(Duration::from_millis(5));

        assert!(tombstones.removed_since(&1, written));
    }

    #[test]
    fn test_prune_keeps_recent_tombstones() {
        let tombstones = Tombstones::new(HOUR);
        for key in 0..=PRUNE_AT as u32 {
            tombstones.record_evict(&key);
        }

        // Nothing is old enough to go
        assert_eq!(tombstones.len(), PRUNE_AT + 1);
        assert!(tombstones.prune_at.load(Ordering::Relaxed) > PRUNE_AT);
    }
}
