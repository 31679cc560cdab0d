//! A cache space of either kind

use std::future::Future;
use std::sync::Arc;

use super::coordinator::{TierCoordinator, TierStats};
use super::single::SingleTierCache;
use crate::config::{CachePriority, CacheSpaceConfig};
use crate::error::CacheResult;
use crate::remote::RemoteStore;
use crate::value::{CacheKey, CacheValue, CachedValue};

/// One named cache space
pub enum CacheSpace<K, V> {
    Single(SingleTierCache<K, V>),
    TwoTier(TierCoordinator<K, V>),
}

impl<K: CacheKey, V: CacheValue> CacheSpace<K, V> {
    /// Build the space described by `config`
    ///
    /// `remote` is called only for spaces that use a remote tier.
    pub async fn build<F>(config: CacheSpaceConfig, remote: F) -> CacheResult<Self>
    where
        F: FnOnce(&CacheSpaceConfig) -> Arc<dyn RemoteStore<K, V>>,
    {
        match config.priority {
            CachePriority::OnlyLocal => Ok(CacheSpace::Single(SingleTierCache::local(config)?)),
            CachePriority::OnlyRemote => {
                let store = remote(&config);
                Ok(CacheSpace::Single(SingleTierCache::remote(config, store).await?))
            }
            _ => {
                let store = remote(&config);
                Ok(CacheSpace::TwoTier(TierCoordinator::new(config, store).await?))
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CacheSpace::Single(cache) => cache.name(),
            CacheSpace::TwoTier(cache) => cache.name(),
        }
    }

    pub fn config(&self) -> &CacheSpaceConfig {
        match self {
            CacheSpace::Single(cache) => cache.config(),
            CacheSpace::TwoTier(cache) => cache.config(),
        }
    }

    pub async fn lookup(&self, key: &K) -> CacheResult<Option<CachedValue<V>>> {
        match self {
            CacheSpace::Single(cache) => cache.lookup(key).await,
            CacheSpace::TwoTier(cache) => cache.lookup(key).await,
        }
    }

    pub async fn get_or_load<F, Fut, T, E>(&self, key: K, loader: F) -> CacheResult<Option<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Into<Option<V>>,
        E: Into<anyhow::Error>,
    {
        match self {
            CacheSpace::Single(cache) => cache.get_or_load(key, loader).await,
            CacheSpace::TwoTier(cache) => cache.get_or_load(key, loader).await,
        }
    }

    pub async fn put(&self, key: K, value: impl Into<Option<V>>) -> CacheResult<()> {
        match self {
            CacheSpace::Single(cache) => cache.put(key, value).await,
            CacheSpace::TwoTier(cache) => cache.put(key, value).await,
        }
    }

    pub async fn evict(&self, key: &K) -> CacheResult<()> {
        match self {
            CacheSpace::Single(cache) => cache.evict(key).await,
            CacheSpace::TwoTier(cache) => cache.evict(key).await,
        }
    }

    pub async fn clear(&self) -> CacheResult<()> {
        match self {
            CacheSpace::Single(cache) => cache.clear().await,
            CacheSpace::TwoTier(cache) => cache.clear().await,
        }
    }

    pub async fn flush(&self) {
        match self {
            CacheSpace::Single(cache) => cache.flush().await,
            CacheSpace::TwoTier(cache) => cache.flush().await,
        }
    }

    /// Counters of a two-tier space
    pub fn stats(&self) -> Option<TierStats> {
        match self {
            CacheSpace::Single(_) => None,
            CacheSpace::TwoTier(cache) => Some(cache.stats()),
        }
    }

    pub fn as_two_tier(&self) -> Option<&TierCoordinator<K, V>> {
        match self {
            CacheSpace::Single(_) => None,
            CacheSpace::TwoTier(cache) => Some(cache),
        }
    }
}
