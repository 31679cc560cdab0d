//! In-process remote store
//!
//! A `RemoteStore` backed by a Moka cache with LRU eviction and per-entry
//! expiry. Stands in for a networked cache in tests and single-node
//! deployments. Clone it to share one store between several cache spaces.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use moka::Expiry;
use tracing::debug;

use super::RemoteStore;
use crate::error::RemoteError;
use crate::value::{CacheKey, CacheValue, CachedValue};

#[derive(Clone)]
struct RemoteEntry<V> {
    value: CachedValue<V>,
    ttl: Duration,
    idle: Duration,
}

/// Expires an entry at the earlier of its write and idle deadlines
struct EntryExpiry;

impl<K, V> Expiry<K, RemoteEntry<V>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &K,
        entry: &RemoteEntry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl.min(entry.idle))
    }

    fn expire_after_read(
        &self,
        _key: &K,
        entry: &RemoteEntry<V>,
        read_at: Instant,
        _duration_until_expiry: Option<Duration>,
        last_modified_at: Instant,
    ) -> Option<Duration> {
        let lived = read_at.saturating_duration_since(last_modified_at);
        Some(entry.ttl.saturating_sub(lived).min(entry.idle))
    }
}

/// Call counters of a `MemoryRemoteStore`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteStats {
    pub gets: u64,
    pub hits: u64,
    /// Values stored by `put_if_absent`
    pub writes: u64,
    /// `put_if_absent` calls that found the key present
    pub rejected_writes: u64,
    pub removals: u64,
}

#[derive(Default)]
struct Counters {
    gets: AtomicU64,
    hits: AtomicU64,
    writes: AtomicU64,
    rejected_writes: AtomicU64,
    removals: AtomicU64,
}

struct Inner<K, V> {
    /// Built on first use so the first max-size hint can bound it
    cache: OnceLock<Cache<K, RemoteEntry<V>>>,
    counters: Counters,
}

/// Remote store held in process memory
pub struct MemoryRemoteStore<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for MemoryRemoteStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: CacheKey, V: CacheValue> Default for MemoryRemoteStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: CacheKey, V: CacheValue> MemoryRemoteStore<K, V> {
    /// Unbounded until the first `try_set_max_size`
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cache: OnceLock::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// A store already bounded to `max_size` entries
    pub fn with_max_size(max_size: u64) -> Self {
        let store = Self::new();
        let _ = store.inner.cache.set(Self::build(Some(max_size)));
        store
    }

    fn build(max_size: Option<u64>) -> Cache<K, RemoteEntry<V>> {
        let builder = Cache::builder()
            .name("remote")
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(EntryExpiry);

        match max_size {
            Some(max) => builder.max_capacity(max).build(),
            None => builder.build(),
        }
    }

    fn cache(&self) -> &Cache<K, RemoteEntry<V>> {
        self.inner.cache.get_or_init(|| Self::build(None))
    }

    /// Whether the key is present, without refreshing its idle deadline
    pub fn contains(&self, key: &K) -> bool {
        self.cache().contains_key(key)
    }

    /// Number of live entries
    pub fn len(&self) -> u64 {
        let cache = self.cache();
        cache.run_pending_tasks();
        cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry cap, if one was set
    pub fn max_size(&self) -> Option<u64> {
        self.inner
            .cache
            .get()
            .and_then(|cache| cache.policy().max_capacity())
    }

    pub fn stats(&self) -> RemoteStats {
        let c = &self.inner.counters;
        RemoteStats {
            gets: c.gets.load(Ordering::Relaxed),
            hits: c.hits.load(Ordering::Relaxed),
            writes: c.writes.load(Ordering::Relaxed),
            rejected_writes: c.rejected_writes.load(Ordering::Relaxed),
            removals: c.removals.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl<K: CacheKey, V: CacheValue> RemoteStore<K, V> for MemoryRemoteStore<K, V> {
    async fn get(&self, key: &K) -> Result<Option<CachedValue<V>>, RemoteError> {
        let counters = &self.inner.counters;
        counters.gets.fetch_add(1, Ordering::Relaxed);

        let found = self.cache().get(key).map(|entry| entry.value);
        if found.is_some() {
            counters.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    async fn put_if_absent(
        &self,
        key: &K,
        value: CachedValue<V>,
        ttl: Duration,
        idle: Duration,
    ) -> Result<bool, RemoteError> {
        let cache = self.cache();
        let stored = cache
            .entry(key.clone())
            .or_insert_with(|| RemoteEntry { value, ttl, idle })
            .is_fresh();

        // Enforce the cap before returning so callers see a bounded store
        cache.run_pending_tasks();

        let counters = &self.inner.counters;
        if stored {
            counters.writes.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.rejected_writes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(stored)
    }

    async fn remove(&self, key: &K) -> Result<bool, RemoteError> {
        self.inner.counters.removals.fetch_add(1, Ordering::Relaxed);
        Ok(self.cache().remove(key).is_some())
    }

    async fn remove_all(&self) -> Result<(), RemoteError> {
        let cache = self.cache();
        cache.invalidate_all();
        cache.run_pending_tasks();
        Ok(())
    }

    async fn try_set_max_size(&self, max_size: u64) -> Result<bool, RemoteError> {
        let mut applied = false;
        self.inner.cache.get_or_init(|| {
            applied = true;
            Self::build(Some(max_size))
        });

        debug!(max_size = max_size, applied = applied, "Memory remote max size");
        Ok(applied)
    }
}
