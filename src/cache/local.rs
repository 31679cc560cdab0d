//! Local Tier Implementation
//!
//! Bounded in-process cache built on Moka. Every removal is reported as an
//! `EvictionEvent` so the owning cache space can react to capacity
//! pressure. Uses the synchronous cache so lookups never yield.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use crate::config::{CacheSpaceConfig, LocalEviction};
use crate::value::{CacheKey, CacheValue, CachedValue};

/// Cache entry with the time it was written
#[derive(Clone, Debug)]
pub struct LocalEntry<V> {
    /// The cached value
    pub value: CachedValue<V>,
    /// When this entry was cached
    pub cached_at: Instant,
}

/// Why an entry left the local tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionCause {
    /// Pushed out because the tier was full
    Size,
    /// Write or idle lifetime ran out
    Expired,
    /// Invalidated by the owner
    Explicit,
    /// Overwritten by a newer value
    Replaced,
}

impl From<RemovalCause> for EvictionCause {
    fn from(cause: RemovalCause) -> Self {
        match cause {
            RemovalCause::Size => EvictionCause::Size,
            RemovalCause::Expired => EvictionCause::Expired,
            RemovalCause::Explicit => EvictionCause::Explicit,
            RemovalCause::Replaced => EvictionCause::Replaced,
        }
    }
}

/// An entry that left the local tier
#[derive(Debug, Clone)]
pub struct EvictionEvent<K, V> {
    pub key: K,
    pub value: CachedValue<V>,
    pub cause: EvictionCause,
    /// When the entry was written to the local tier
    pub cached_at: Instant,
}

impl<K, V> EvictionEvent<K, V> {
    /// Time since the entry was written
    pub fn age(&self) -> Duration {
        self.cached_at.elapsed()
    }
}

/// Receiving end of a local tier's eviction events
pub struct EvictionEvents<K, V> {
    receiver: Mutex<mpsc::UnboundedReceiver<EvictionEvent<K, V>>>,
}

impl<K, V> EvictionEvents<K, V> {
    /// Take every event queued so far
    ///
    /// The lock is held only while the queue is emptied.
    pub async fn drain(&self) -> Vec<EvictionEvent<K, V>> {
        let mut receiver = self.receiver.lock().await;
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Construction parameters of a local tier
#[derive(Debug, Clone)]
pub struct LocalSettings {
    /// Cache space name, used for logging and as the Moka cache name
    pub name: String,
    /// Maximum number of entries
    pub capacity: u64,
    /// Lifetime from write
    pub time_to_live: Duration,
    /// Lifetime from last access
    pub time_to_idle: Duration,
    pub eviction: LocalEviction,
}

impl LocalSettings {
    /// Settings for a space's local tier holding `capacity` entries
    pub fn for_space(config: &CacheSpaceConfig, capacity: u64) -> Self {
        Self {
            name: config.name.clone(),
            capacity,
            time_to_live: config.expire_after_write,
            time_to_idle: config.expire_after_access,
            eviction: config.local_eviction,
        }
    }
}

/// Bounded in-process tier
pub struct LocalStore<K, V> {
    /// Entries by key
    cache: Cache<K, LocalEntry<V>>,
    /// Space name for logs
    name: String,
    /// Maximum number of entries
    capacity: u64,
    /// Cache hit counter
    hits: AtomicU64,
    /// Cache miss counter
    misses: AtomicU64,
}

impl<K: CacheKey, V: CacheValue> LocalStore<K, V> {
    /// Create a local tier without eviction events
    pub fn new(settings: LocalSettings) -> Self {
        let cache = Self::builder(&settings).build();
        Self::from_cache(cache, settings)
    }

    /// Create a local tier that reports every removal
    ///
    /// Returns the store and the receiving end of its eviction events.
    pub fn with_eviction_events(settings: LocalSettings) -> (Self, EvictionEvents<K, V>) {
        let (sender, receiver) = mpsc::unbounded_channel();

        let cache = Self::builder(&settings)
            .eviction_listener(move |key: Arc<K>, entry: LocalEntry<V>, cause: RemovalCause| {
                // Receiver is gone only while the owning space is dropped
                let _ = sender.send(EvictionEvent {
                    key: (*key).clone(),
                    value: entry.value,
                    cause: cause.into(),
                    cached_at: entry.cached_at,
                });
            })
            .build();

        let events = EvictionEvents {
            receiver: Mutex::new(receiver),
        };
        (Self::from_cache(cache, settings), events)
    }

    fn builder(
        settings: &LocalSettings,
    ) -> moka::sync::CacheBuilder<K, LocalEntry<V>, Cache<K, LocalEntry<V>>> {
        let policy = match settings.eviction {
            LocalEviction::TinyLfu => EvictionPolicy::tiny_lfu(),
            LocalEviction::Lru => EvictionPolicy::lru(),
        };

        Cache::builder()
            .name(&settings.name)
            .initial_capacity(settings.capacity.min(4096) as usize)
            .max_capacity(settings.capacity)
            .time_to_live(settings.time_to_live)
            .time_to_idle(settings.time_to_idle)
            .eviction_policy(policy)
    }

    fn from_cache(cache: Cache<K, LocalEntry<V>>, settings: LocalSettings) -> Self {
        debug!(
            space = %settings.name,
            capacity = settings.capacity,
            ttl_secs = settings.time_to_live.as_secs(),
            idle_secs = settings.time_to_idle.as_secs(),
            eviction = ?settings.eviction,
            "Local tier initialized"
        );

        Self {
            cache,
            name: settings.name,
            capacity: settings.capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a value from the local tier
    ///
    /// Updates hit/miss counters.
    pub fn get(&self, key: &K) -> Option<CachedValue<V>> {
        match self.cache.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(space = %self.name, key = ?key, "Local HIT");
                Some(entry.value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(space = %self.name, key = ?key, "Local MISS");
                None
            }
        }
    }

    /// Whether the key is present, without touching counters or access order
    pub fn contains(&self, key: &K) -> bool {
        self.cache.contains_key(key)
    }

    /// Insert or replace a value, stamped with the current time
    pub fn insert(&self, key: K, value: CachedValue<V>) {
        trace!(space = %self.name, key = ?key, "Local PUT");
        self.cache.insert(
            key,
            LocalEntry {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    /// Remove a key
    pub fn invalidate(&self, key: &K) {
        self.cache.invalidate(key);
        trace!(space = %self.name, key = ?key, "Local INVALIDATE");
    }

    /// Remove every entry and reset counters
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!(space = %self.name, "Cleared local tier");
    }

    /// Apply pending evictions so the size bound holds right now
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }

    /// Approximate number of entries
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Get tier statistics
    ///
    /// Returns (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        (hits, misses, hit_rate)
    }
}
