//! Remote-hit accounting for promotion decisions
//!
//! Counts how often each key has been served by the remote tier. Counters
//! live in a sharded `DashMap`, so an increment only locks the shard that
//! holds its key.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::trace;

use crate::value::CacheKey;

/// Result of recording one remote hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitOutcome {
    /// Count after this hit
    pub count: u64,
    /// This hit reached the threshold; the counter has been reset
    pub should_promote: bool,
}

/// Per-key remote-hit counters for one cache space
pub struct AccessAccounting<K> {
    counters: DashMap<K, u64>,
    threshold: u64,
    /// Number of threshold crossings observed
    promotions: AtomicU64,
}

impl<K: CacheKey> AccessAccounting<K> {
    pub fn new(threshold: u64) -> Self {
        Self {
            counters: DashMap::new(),
            threshold: threshold.max(1),
            promotions: AtomicU64::new(0),
        }
    }

    /// Count a remote hit for `key`
    ///
    /// Increment, threshold check and reset happen under the key's shard
    /// lock, so concurrent hits never lose an increment and exactly one
    /// caller sees each crossing.
    pub fn record_hit(&self, key: &K) -> HitOutcome {
        let mut counter = self.counters.entry(key.clone()).or_insert(0);
        *counter += 1;
        let count = *counter;

        if count >= self.threshold {
            *counter = 0;
            drop(counter);
            self.counters.remove_if(key, |_, c| *c == 0);
            self.promotions.fetch_add(1, Ordering::Relaxed);
            trace!(key = ?key, count = count, "Access threshold reached");
            return HitOutcome {
                count,
                should_promote: true,
            };
        }

        HitOutcome {
            count,
            should_promote: false,
        }
    }

    /// Forget the counter of one key
    pub fn reset(&self, key: &K) {
        self.counters.remove(key);
    }

    /// Forget every counter
    pub fn clear(&self) {
        self.counters.clear();
    }

    /// Current count for `key` (0 when untracked)
    pub fn count(&self, key: &K) -> u64 {
        self.counters.get(key).map(|c| *c).unwrap_or(0)
    }

    /// Number of keys with a live counter
    pub fn tracked_keys(&self) -> usize {
        self.counters.len()
    }

    /// Number of threshold crossings since creation
    pub fn promotions(&self) -> u64 {
        self.promotions.load(Ordering::Relaxed)
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}
