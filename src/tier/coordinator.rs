//! Two-tier cache coordination
//!
//! `TierCoordinator` fronts a bounded local tier and a shared remote tier
//! for one cache space. Reads try local first. Writes are routed by the
//! space's priority. Entries move between the tiers under one of two
//! strategies:
//!
//! - `OverflowMaxSize`: entries pushed out of the full local tier are
//!   demoted to the remote tier with their remaining write lifetime.
//! - `AccessThreshold`: keys served by the remote tier often enough are
//!   promoted into the local tier by a background worker pool.
//!
//! Both moves can still be in flight when `evict` or `clear` runs. They
//! consult the space's tombstones and never bring back a removed key.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use super::worker::WorkerPool;
use crate::cache::{
    AccessAccounting, EvictionCause, EvictionEvent, EvictionEvents, LocalSettings, LocalStore,
    Tombstones,
};
use crate::config::{CacheChangeStrategy, CachePriority, CacheSpaceConfig};
use crate::error::{CacheError, CacheResult};
use crate::partition::TierCapacity;
use crate::remote::{RemoteStore, RemoteTier};
use crate::value::{CacheKey, CacheValue, CachedValue};

/// Where `put` writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteRoute {
    Both,
    Local,
    Remote,
}

/// Snapshot of a cache space's counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TierStats {
    pub local_hits: u64,
    pub remote_hits: u64,
    pub misses: u64,
    /// Keys copied into the local tier after reaching the access threshold
    pub promotions: u64,
    /// Entries written to the remote tier after local overflow
    pub demotions: u64,
    pub demotion_failures: u64,
    /// Demotions and promotions dropped or undone because the key was
    /// evicted or the space cleared meanwhile
    pub revoked_moves: u64,
    /// Promotion checks run on the caller because the queue was full
    pub inline_promotion_checks: u64,
    pub local_entries: u64,
}

impl TierStats {
    /// Share of lookups answered by either tier, in percent
    pub fn hit_rate(&self) -> f64 {
        let hits = self.local_hits + self.remote_hits;
        let total = hits + self.misses;
        if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Default)]
struct Counters {
    local_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
    demotions: AtomicU64,
    demotion_failures: AtomicU64,
    revoked_moves: Arc<AtomicU64>,
}

/// Coordinates the local and remote tier of one cache space
pub struct TierCoordinator<K, V> {
    config: CacheSpaceConfig,
    /// Shared with promotion jobs
    name: Arc<str>,
    capacity: TierCapacity,
    route: WriteRoute,
    local: Arc<LocalStore<K, V>>,
    remote: RemoteTier<K, V>,
    accounting: Arc<AccessAccounting<K>>,
    tombstones: Arc<Tombstones<K>>,
    /// Present under `AccessThreshold`
    promotion: Option<WorkerPool>,
    /// Present under `OverflowMaxSize`
    evictions: Option<EvictionEvents<K, V>>,
    counters: Counters,
}

impl<K: CacheKey, V: CacheValue> TierCoordinator<K, V> {
    /// Build the coordinator of a two-tier space
    ///
    /// Splits `max_size` between the tiers and sends the remote share to the
    /// store as its max-size hint. Single-tier priorities are rejected.
    pub async fn new(
        config: CacheSpaceConfig,
        remote: Arc<dyn RemoteStore<K, V>>,
    ) -> CacheResult<Self> {
        let route = match config.priority {
            CachePriority::LocalAndRemote => WriteRoute::Both,
            CachePriority::FirstLocal => WriteRoute::Local,
            CachePriority::FirstRemote => WriteRoute::Remote,
            CachePriority::OnlyLocal | CachePriority::OnlyRemote => {
                return Err(CacheError::invalid_config(format!(
                    "Cache space '{}' has single-tier priority {:?}",
                    config.name, config.priority
                )));
            }
        };

        let capacity = config.capacities()?;
        let remote = RemoteTier::new(remote, &config);
        match remote.set_max_size(capacity.remote).await {
            Ok(_) => {}
            Err(e) if config.tolerate_remote_outage => {
                warn!(space = %config.name, error = %e, "Could not set remote max size");
            }
            Err(e) => return Err(e),
        }

        let settings = LocalSettings::for_space(&config, capacity.local);
        let (local, evictions, promotion) = match config.change_strategy {
            CacheChangeStrategy::OverflowMaxSize => {
                let (local, events) = LocalStore::with_eviction_events(settings);
                (local, Some(events), None)
            }
            CacheChangeStrategy::AccessThreshold => {
                let pool = WorkerPool::new(
                    &config.name,
                    config.promotion_workers,
                    config.promotion_queue,
                )?;
                (LocalStore::new(settings), None, Some(pool))
            }
        };

        info!(
            space = %config.name,
            priority = ?config.priority,
            strategy = ?config.change_strategy,
            local_capacity = capacity.local,
            remote_capacity = capacity.remote,
            "Two-tier cache space created"
        );

        Ok(Self {
            name: Arc::from(config.name.as_str()),
            accounting: Arc::new(AccessAccounting::new(config.access_threshold)),
            tombstones: Arc::new(Tombstones::new(config.expire_after_write)),
            config,
            capacity,
            route,
            local: Arc::new(local),
            remote,
            promotion,
            evictions,
            counters: Counters::default(),
        })
    }

    /// Look up a key, local tier first
    ///
    /// `Some(CachedValue::Null)` is a cached null, `None` a miss in both
    /// tiers. A local hit never touches the remote tier.
    pub async fn lookup(&self, key: &K) -> CacheResult<Option<CachedValue<V>>> {
        if let Some(value) = self.local.get(key) {
            self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(value));
        }

        // Demoted entries must be readable from the remote tier
        self.demote_pending().await;

        let read_at = Instant::now();
        let found = match self.remote.get(key).await {
            Ok(found) => found,
            Err(e) if self.config.tolerate_remote_outage => {
                warn!(space = %self.name, key = ?key, error = %e, "Remote tier unavailable, treating as miss");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match found {
            Some(value) => {
                self.counters.remote_hits.fetch_add(1, Ordering::Relaxed);
                if let Some(pool) = &self.promotion {
                    self.schedule_promotion(pool, key, &value, read_at);
                }
                Ok(Some(value))
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                trace!(space = %self.name, key = ?key, "Cache MISS");
                Ok(None)
            }
        }
    }

    /// Look up a key, loading and caching it on a miss
    ///
    /// Loader errors surface as `CacheError::Load` and nothing is cached.
    pub async fn get_or_load<F, Fut, T, E>(&self, key: K, loader: F) -> CacheResult<Option<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Into<Option<V>>,
        E: Into<anyhow::Error>,
    {
        if let Some(found) = self.lookup(&key).await? {
            return Ok(found.into_option());
        }

        let loaded: Option<V> = loader()
            .await
            .map_err(|e| CacheError::Load(e.into()))?
            .into();
        debug!(space = %self.name, key = ?key, null = loaded.is_none(), "Loaded value");

        self.put(key, loaded.clone()).await?;
        Ok(loaded)
    }

    /// Store a value, routed by the space's priority
    ///
    /// `None` is cached as a null when the space allows null values and
    /// evicts the key otherwise.
    pub async fn put(&self, key: K, value: impl Into<Option<V>>) -> CacheResult<()> {
        let value = match value.into() {
            Some(v) => CachedValue::Value(v),
            None if self.config.allow_null_values => CachedValue::Null,
            None => return self.evict(&key).await,
        };

        let result = match self.route {
            WriteRoute::Both => {
                self.write_local(key.clone(), value.clone());
                self.remote.put_if_absent(&key, value).await.map(|_| ())
            }
            WriteRoute::Local => {
                self.write_local(key, value);
                Ok(())
            }
            WriteRoute::Remote => self.remote.put_if_absent(&key, value).await.map(|_| ()),
        };

        self.demote_pending().await;
        result
    }

    /// Remove a key from both tiers and forget its access count
    pub async fn evict(&self, key: &K) -> CacheResult<()> {
        self.demote_pending().await;
        self.tombstones.record_evict(key);
        self.local.invalidate(key);
        self.accounting.reset(key);
        self.remote.remove(key).await?;
        debug!(space = %self.name, key = ?key, "Evicted");
        Ok(())
    }

    /// Remove every entry from both tiers and reset all access counts
    pub async fn clear(&self) -> CacheResult<()> {
        self.demote_pending().await;
        self.tombstones.record_clear();
        self.local.invalidate_all();
        self.accounting.clear();
        self.remote.remove_all().await?;
        info!(space = %self.name, "Cleared cache space");
        Ok(())
    }

    /// Finish queued promotions and pending demotions
    pub async fn flush(&self) {
        if let Some(pool) = &self.promotion {
            pool.wait_idle().await;
        }
        self.local.run_pending_tasks();
        self.demote_pending().await;
    }

    fn write_local(&self, key: K, value: CachedValue<V>) {
        self.accounting.reset(&key);
        self.local.insert(key, value);
        if self.evictions.is_some() {
            self.local.run_pending_tasks();
        }
    }

    /// Count a remote hit read at `read_at` and promote on a threshold crossing
    fn schedule_promotion(
        &self,
        pool: &WorkerPool,
        key: &K,
        value: &CachedValue<V>,
        read_at: Instant,
    ) {
        let accounting = Arc::clone(&self.accounting);
        let tombstones = Arc::clone(&self.tombstones);
        let local = Arc::clone(&self.local);
        let revoked = Arc::clone(&self.counters.revoked_moves);
        let name = Arc::clone(&self.name);
        let key = key.clone();
        let value = value.clone();

        pool.submit(Box::new(move || {
            let outcome = accounting.record_hit(&key);
            if !outcome.should_promote {
                return;
            }
            if tombstones.removed_since(&key, read_at) {
                revoked.fetch_add(1, Ordering::Relaxed);
                debug!(space = %name, key = ?key, "Skipped promotion of removed key");
                return;
            }

            local.insert(key.clone(), value);
            // Evicted between the check and the insert
            if tombstones.removed_since(&key, read_at) {
                local.invalidate(&key);
                revoked.fetch_add(1, Ordering::Relaxed);
                debug!(space = %name, key = ?key, "Undid promotion of removed key");
                return;
            }
            debug!(space = %name, key = ?key, hits = outcome.count, "Promoted to local tier");
        }));
    }

    /// Demote every entry the local tier pushed out since the last call
    async fn demote_pending(&self) {
        let Some(events) = &self.evictions else {
            return;
        };

        for event in events.drain().await {
            if event.cause == EvictionCause::Size {
                self.demote(event).await;
            }
        }
    }

    async fn demote(&self, event: EvictionEvent<K, V>) {
        let remaining = match self.config.expire_after_write.checked_sub(event.age()) {
            Some(remaining) if !remaining.is_zero() => remaining,
            _ => {
                trace!(space = %self.name, key = ?event.key, "Dropping expired entry instead of demoting");
                return;
            }
        };

        if self.tombstones.removed_since(&event.key, event.cached_at) {
            self.counters.revoked_moves.fetch_add(1, Ordering::Relaxed);
            debug!(space = %self.name, key = ?event.key, "Skipped demotion of removed key");
            return;
        }

        match self
            .remote
            .put_if_absent_with_ttl(&event.key, event.value, remaining)
            .await
        {
            Ok(stored) => {
                // evict/clear may have run while the write was in flight
                if stored && self.tombstones.removed_since(&event.key, event.cached_at) {
                    self.revoke_demotion(&event.key).await;
                    return;
                }
                if stored {
                    self.counters.demotions.fetch_add(1, Ordering::Relaxed);
                }
                debug!(
                    space = %self.name,
                    key = ?event.key,
                    stored = stored,
                    ttl_secs = remaining.as_secs(),
                    "Demoted to remote tier"
                );
            }
            Err(e) => {
                self.counters.demotion_failures.fetch_add(1, Ordering::Relaxed);
                warn!(space = %self.name, key = ?event.key, error = %e, "Demotion failed, entry dropped");
            }
        }
    }

    async fn revoke_demotion(&self, key: &K) {
        self.counters.revoked_moves.fetch_add(1, Ordering::Relaxed);
        match self.remote.remove(key).await {
            Ok(_) => debug!(space = %self.name, key = ?key, "Undid demotion of removed key"),
            Err(e) => {
                warn!(space = %self.name, key = ?key, error = %e, "Could not undo demotion of removed key");
            }
        }
    }

    pub fn stats(&self) -> TierStats {
        TierStats {
            local_hits: self.counters.local_hits.load(Ordering::Relaxed),
            remote_hits: self.counters.remote_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            promotions: self.accounting.promotions(),
            demotions: self.counters.demotions.load(Ordering::Relaxed),
            demotion_failures: self.counters.demotion_failures.load(Ordering::Relaxed),
            revoked_moves: self.counters.revoked_moves.load(Ordering::Relaxed),
            inline_promotion_checks: self
                .promotion
                .as_ref()
                .map(|p| p.inline_runs())
                .unwrap_or(0),
            local_entries: self.local.entry_count(),
        }
    }

    /// Log a stats snapshot at debug level
    pub fn log_metrics(&self) {
        let stats = self.stats();
        debug!(
            space = %self.name,
            local_hits = stats.local_hits,
            remote_hits = stats.remote_hits,
            misses = stats.misses,
            hit_rate = format!("{:.1}%", stats.hit_rate()),
            promotions = stats.promotions,
            demotions = stats.demotions,
            demotion_failures = stats.demotion_failures,
            revoked_moves = stats.revoked_moves,
            inline_checks = stats.inline_promotion_checks,
            local_entries = stats.local_entries,
            "Cache space metrics"
        );
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CacheSpaceConfig {
        &self.config
    }

    pub fn capacity(&self) -> TierCapacity {
        self.capacity
    }

    /// The local tier, for inspection
    pub fn local(&self) -> &LocalStore<K, V> {
        &self.local
    }

    /// Remote-hit counters, for inspection
    pub fn accounting(&self) -> &AccessAccounting<K> {
        &self.accounting
    }
}
