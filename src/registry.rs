//! Cache space registry
//!
//! Holds every configured cache space by name. Callers get spaces from an
//! explicit registry handle rather than from global state.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::{CacheSpaceConfig, RegistryConfig};
use crate::error::CacheResult;
use crate::remote::RemoteStore;
use crate::tier::{CacheSpace, SingleTierCache, TierStats};
use crate::value::{CacheKey, CacheValue};

/// Named cache spaces of one application
pub struct CacheRegistry<K, V> {
    spaces: DashMap<String, Arc<CacheSpace<K, V>>>,
    /// Create local-only spaces for unknown names
    dynamic_fallback: bool,
}

impl<K: CacheKey, V: CacheValue> CacheRegistry<K, V> {
    /// Build one space per config
    ///
    /// `remote_factory` supplies the remote store of each space that needs
    /// one; it is never called for local-only spaces. Duplicate names keep
    /// the first definition.
    pub async fn build<F>(
        configs: Vec<CacheSpaceConfig>,
        dynamic_fallback: bool,
        remote_factory: F,
    ) -> CacheResult<Self>
    where
        F: Fn(&CacheSpaceConfig) -> Arc<dyn RemoteStore<K, V>>,
    {
        let spaces = DashMap::new();

        for config in configs {
            if spaces.contains_key(&config.name) {
                debug!(space = %config.name, "Dropping duplicate cache space definition");
                continue;
            }
            let name = config.name.clone();
            let space = CacheSpace::build(config, &remote_factory).await?;
            spaces.insert(name, Arc::new(space));
        }

        info!(
            spaces = spaces.len(),
            dynamic_fallback = dynamic_fallback,
            "Cache registry initialized"
        );

        Ok(Self {
            spaces,
            dynamic_fallback,
        })
    }

    /// Resolve a configuration file's spaces and build them
    pub async fn from_config<F>(config: &RegistryConfig, remote_factory: F) -> CacheResult<Self>
    where
        F: Fn(&CacheSpaceConfig) -> Arc<dyn RemoteStore<K, V>>,
    {
        Self::build(config.resolve()?, config.dynamic_fallback, remote_factory).await
    }

    /// A configured (or previously created) space
    pub fn space(&self, name: &str) -> Option<Arc<CacheSpace<K, V>>> {
        self.spaces.get(name).map(|space| Arc::clone(space.value()))
    }

    /// A space by name, created on first use when dynamic fallback is on
    ///
    /// Created spaces are local-only and hold at most 1000 entries for an
    /// hour after their last access.
    pub fn space_or_default(&self, name: &str) -> CacheResult<Option<Arc<CacheSpace<K, V>>>> {
        if let Some(space) = self.space(name) {
            return Ok(Some(space));
        }
        if !self.dynamic_fallback {
            return Ok(None);
        }

        let config = CacheSpaceConfig::on_demand(name)?;
        let space = Arc::new(CacheSpace::Single(SingleTierCache::local(config)?));

        // Another caller may have created it meanwhile; keep theirs
        let entry = self.spaces.entry(name.to_string()).or_insert(space);
        let space = Arc::clone(entry.value());
        drop(entry);

        info!(space = %name, "Created on-demand cache space");
        Ok(Some(space))
    }

    /// Names of all spaces, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.spaces.iter().map(|s| s.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    /// Clear one space. Returns false for unknown names.
    pub async fn clear_space(&self, name: &str) -> CacheResult<bool> {
        match self.space(name) {
            Some(space) => {
                space.clear().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Clear every space, stopping at the first failure
    pub async fn clear_all(&self) -> CacheResult<()> {
        for space in self.snapshot() {
            space.clear().await?;
        }
        Ok(())
    }

    /// Finish background work of every space
    pub async fn flush_all(&self) {
        for space in self.snapshot() {
            space.flush().await;
        }
    }

    /// Counters of every two-tier space, by name
    pub fn stats(&self) -> Vec<(String, TierStats)> {
        let mut stats: Vec<_> = self
            .snapshot()
            .into_iter()
            .filter_map(|space| space.stats().map(|s| (space.name().to_string(), s)))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    /// Log metrics of every two-tier space
    pub fn log_metrics(&self) {
        for space in self.snapshot() {
            if let Some(coordinator) = space.as_two_tier() {
                coordinator.log_metrics();
            }
        }
    }

    /// Spaces collected up front so no map guard is held across an await
    fn snapshot(&self) -> Vec<Arc<CacheSpace<K, V>>> {
        self.spaces.iter().map(|s| Arc::clone(s.value())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CachePriority, CacheSpaceDescriptor};
    use crate::remote::MemoryRemoteStore;
    use crate::value::CachedValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn space(name: &str, priority: CachePriority) -> CacheSpaceConfig {
        CacheSpaceDescriptor {
            priority,
            max_size: 100,
            ..CacheSpaceDescriptor::named(name)
        }
        .resolve()
        .unwrap()
    }

    #[tokio::test]
    async fn test_local_spaces_never_ask_for_a_remote() {
        let calls = AtomicUsize::new(0);

        let registry = CacheRegistry::build(
            vec![
                space("local", CachePriority::OnlyLocal),
                space("remote", CachePriority::OnlyRemote),
                space("both", CachePriority::LocalAndRemote),
            ],
            false,
            |_: &CacheSpaceConfig| -> Arc<dyn RemoteStore<String, u32>> {
                calls.fetch_add(1, Ordering::SeqCst);
                Arc::new(MemoryRemoteStore::new())
            },
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.names(), vec!["both", "local", "remote"]);
        assert!(registry.space("both").unwrap().as_two_tier().is_some());
        assert!(registry.space("local").unwrap().as_two_tier().is_none());
        assert_eq!(registry.stats().len(), 1);
    }

    #[tokio::test]
    async fn test_dynamic_fallback() {
        let factory = |_: &CacheSpaceConfig| -> Arc<dyn RemoteStore<String, u32>> {
            Arc::new(MemoryRemoteStore::new())
        };

        let strict = CacheRegistry::build(Vec::new(), false, factory).await.unwrap();
        assert!(strict.space_or_default("adhoc").unwrap().is_none());
        assert!(strict.is_empty());

        let lenient = CacheRegistry::build(Vec::new(), true, factory).await.unwrap();
        let created = lenient.space_or_default("adhoc").unwrap().unwrap();
        assert_eq!(created.config().priority, CachePriority::OnlyLocal);
        assert_eq!(created.config().max_size, 1000);

        created.put("k".to_string(), 1u32).await.unwrap();
        let again = lenient.space_or_default("adhoc").unwrap().unwrap();
        assert_eq!(
            again.lookup(&"k".to_string()).await.unwrap(),
            Some(CachedValue::Value(1))
        );
        assert_eq!(lenient.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_space() {
        let registry = CacheRegistry::build(
            vec![
                space("a", CachePriority::OnlyLocal),
                space("b", CachePriority::OnlyLocal),
            ],
            false,
            |_: &CacheSpaceConfig| -> Arc<dyn RemoteStore<String, u32>> {
                Arc::new(MemoryRemoteStore::new())
            },
        )
        .await
        .unwrap();

        let a = registry.space("a").unwrap();
        let b = registry.space("b").unwrap();
        a.put("k".to_string(), 1u32).await.unwrap();
        b.put("k".to_string(), 2u32).await.unwrap();

        assert!(registry.clear_space("a").await.unwrap());
        assert!(!registry.clear_space("missing").await.unwrap());
        assert!(a.lookup(&"k".to_string()).await.unwrap().is_none());
        assert!(b.lookup(&"k".to_string()).await.unwrap().is_some());

        registry.clear_all().await.unwrap();
        assert!(b.lookup(&"k".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_names_keep_first() {
        let mut first = space("users", CachePriority::OnlyLocal);
        first.max_size = 10;
        let second = space("users", CachePriority::OnlyLocal);

        let registry = CacheRegistry::build(
            vec![first, second],
            false,
            |_: &CacheSpaceConfig| -> Arc<dyn RemoteStore<String, u32>> {
                Arc::new(MemoryRemoteStore::new())
            },
        )
        .await
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.space("users").unwrap().config().max_size, 10);
    }
}
