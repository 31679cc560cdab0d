//! Single-tier cache spaces
//!
//! Spaces with `OnlyLocal` or `OnlyRemote` priority use exactly one store
//! sized to the full `max_size`. There is no access accounting and nothing
//! moves between tiers.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{LocalSettings, LocalStore};
use crate::config::{CachePriority, CacheSpaceConfig};
use crate::error::{CacheError, CacheResult};
use crate::remote::{RemoteStore, RemoteTier};
use crate::value::{CacheKey, CacheValue, CachedValue};

enum Backend<K, V> {
    Local(LocalStore<K, V>),
    Remote(RemoteTier<K, V>),
}

/// Cache space backed by one store
pub struct SingleTierCache<K, V> {
    config: CacheSpaceConfig,
    backend: Backend<K, V>,
}

impl<K: CacheKey, V: CacheValue> SingleTierCache<K, V> {
    /// Local-only space
    pub fn local(config: CacheSpaceConfig) -> CacheResult<Self> {
        if config.priority != CachePriority::OnlyLocal {
            return Err(CacheError::invalid_config(format!(
                "Cache space '{}' has priority {:?}, expected onlyLocal",
                config.name, config.priority
            )));
        }

        let store = LocalStore::new(LocalSettings::for_space(&config, config.max_size));
        info!(space = %config.name, max_size = config.max_size, "Local cache space created");

        Ok(Self {
            config,
            backend: Backend::Local(store),
        })
    }

    /// Remote-only space; sends `max_size` to the store as its size hint
    pub async fn remote(
        config: CacheSpaceConfig,
        store: Arc<dyn RemoteStore<K, V>>,
    ) -> CacheResult<Self> {
        if config.priority != CachePriority::OnlyRemote {
            return Err(CacheError::invalid_config(format!(
                "Cache space '{}' has priority {:?}, expected onlyRemote",
                config.name, config.priority
            )));
        }

        let remote = RemoteTier::new(store, &config);
        match remote.set_max_size(config.max_size).await {
            Ok(_) => {}
            Err(e) if config.tolerate_remote_outage => {
                warn!(space = %config.name, error = %e, "Could not set remote max size");
            }
            Err(e) => return Err(e),
        }
        info!(space = %config.name, max_size = config.max_size, "Remote cache space created");

        Ok(Self {
            config,
            backend: Backend::Remote(remote),
        })
    }

    pub async fn lookup(&self, key: &K) -> CacheResult<Option<CachedValue<V>>> {
        match &self.backend {
            Backend::Local(store) => Ok(store.get(key)),
            Backend::Remote(remote) => match remote.get(key).await {
                Err(e) if self.config.tolerate_remote_outage => {
                    warn!(space = %self.config.name, key = ?key, error = %e, "Remote tier unavailable, treating as miss");
                    Ok(None)
                }
                result => result,
            },
        }
    }

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
        debug!(space = %self.config.name, key = ?key, null = loaded.is_none(), "Loaded value");

        self.put(key, loaded.clone()).await?;
        Ok(loaded)
    }

    /// Store a value; `None` follows the space's null rule
    pub async fn put(&self, key: K, value: impl Into<Option<V>>) -> CacheResult<()> {
        let value = match value.into() {
            Some(v) => CachedValue::Value(v),
            None if self.config.allow_null_values => CachedValue::Null,
            None => return self.evict(&key).await,
        };

        match &self.backend {
            Backend::Local(store) => store.insert(key, value),
            Backend::Remote(remote) => {
                remote.put_if_absent(&key, value).await?;
            }
        }
        Ok(())
    }

    pub async fn evict(&self, key: &K) -> CacheResult<()> {
        match &self.backend {
            Backend::Local(store) => store.invalidate(key),
            Backend::Remote(remote) => {
                remote.remove(key).await?;
            }
        }
        Ok(())
    }

    pub async fn clear(&self) -> CacheResult<()> {
        match &self.backend {
            Backend::Local(store) => store.invalidate_all(),
            Backend::Remote(remote) => remote.remove_all().await?,
        }
        info!(space = %self.config.name, "Cleared cache space");
        Ok(())
    }

    /// Apply pending local evictions
    pub async fn flush(&self) {
        if let Backend::Local(store) = &self.backend {
            store.run_pending_tasks();
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CacheSpaceConfig {
        &self.config
    }

    /// The local store of an `OnlyLocal` space
    pub fn local_store(&self) -> Option<&LocalStore<K, V>> {
        match &self.backend {
            Backend::Local(store) => Some(store),
            Backend::Remote(_) => None,
        }
    }
}
