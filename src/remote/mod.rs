//! Remote (shared) tier
//!
//! `RemoteStore` is the contract a networked cache must meet. `RemoteTier`
//! wraps a store for one cache space and applies the space's TTLs and call
//! timeout.

pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::config::CacheSpaceConfig;
use crate::error::{CacheError, CacheResult, RemoteError};
use crate::value::{CacheKey, CacheValue, CachedValue};

pub use memory::{MemoryRemoteStore, RemoteStats};
#[cfg(feature = "redis-store")]
pub use self::redis::RedisRemoteStore;

/// A networked cache shared across processes
///
/// Implementations must be thread-safe. Every call may fail with a
/// `RemoteError`; absence of a key is not an error.
#[async_trait]
pub trait RemoteStore<K: CacheKey, V: CacheValue>: Send + Sync {
    /// Read a value, refreshing its idle deadline
    async fn get(&self, key: &K) -> Result<Option<CachedValue<V>>, RemoteError>;

    /// Store a value unless the key is already present
    ///
    /// The entry expires `ttl` after this write or `idle` after its last
    /// read, whichever comes first. Returns whether the value was stored.
    async fn put_if_absent(
        &self,
        key: &K,
        value: CachedValue<V>,
        ttl: Duration,
        idle: Duration,
    ) -> Result<bool, RemoteError>;

    /// Remove a key. Returns whether it was present.
    async fn remove(&self, key: &K) -> Result<bool, RemoteError>;

    /// Remove every key of this store
    async fn remove_all(&self) -> Result<(), RemoteError>;

    /// Cap the number of entries if no cap is set yet
    ///
    /// Best effort: returns whether this call set the cap.
    async fn try_set_max_size(&self, max_size: u64) -> Result<bool, RemoteError>;
}

/// Remote store bound to one cache space
pub struct RemoteTier<K, V> {
    store: Arc<dyn RemoteStore<K, V>>,
    /// Space name for logs
    space: String,
    /// Upper bound for each call
    timeout: Option<Duration>,
    /// Write lifetime of new entries
    ttl: Duration,
    /// Idle lifetime of new entries
    idle: Duration,
}

impl<K: CacheKey, V: CacheValue> RemoteTier<K, V> {
    pub fn new(store: Arc<dyn RemoteStore<K, V>>, config: &CacheSpaceConfig) -> Self {
        Self {
            store,
            space: config.name.clone(),
            timeout: config.remote_timeout,
            ttl: config.expire_after_write,
            idle: config.expire_after_access,
        }
    }

    /// Run one store call under the space's timeout
    async fn call<T, F>(&self, operation: &'static str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(RemoteError::Timeout(limit)),
            },
            None => fut.await,
        };

        result.map_err(|e| {
            debug!(space = %self.space, operation = operation, error = %e, "Remote call failed");
            CacheError::remote(operation, e)
        })
    }

    pub async fn get(&self, key: &K) -> CacheResult<Option<CachedValue<V>>> {
        let found = self.call("get", self.store.get(key)).await?;
        trace!(space = %self.space, key = ?key, hit = found.is_some(), "Remote GET");
        Ok(found)
    }

    /// Store-if-absent with the space's full TTLs
    pub async fn put_if_absent(&self, key: &K, value: CachedValue<V>) -> CacheResult<bool> {
        self.put_if_absent_with_ttl(key, value, self.ttl).await
    }

    /// Store-if-absent with an explicit write TTL and the space's idle TTL
    pub async fn put_if_absent_with_ttl(
        &self,
        key: &K,
        value: CachedValue<V>,
        ttl: Duration,
    ) -> CacheResult<bool> {
        let stored = self
            .call("put", self.store.put_if_absent(key, value, ttl, self.idle))
            .await?;
        trace!(space = %self.space, key = ?key, stored = stored, "Remote PUT");
        Ok(stored)
    }

    pub async fn remove(&self, key: &K) -> CacheResult<bool> {
        self.call("remove", self.store.remove(key)).await
    }

    pub async fn remove_all(&self) -> CacheResult<()> {
        self.call("clear", self.store.remove_all()).await
    }

    /// Apply the max-size hint for this space
    pub async fn set_max_size(&self, max_size: u64) -> CacheResult<bool> {
        let applied = self
            .call("set_max_size", self.store.try_set_max_size(max_size))
            .await?;
        debug!(space = %self.space, max_size = max_size, applied = applied, "Remote max size hint");
        Ok(applied)
    }
}
