//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use twotier_cache::{
    CacheChangeStrategy, CachePriority, CacheSpaceConfig, CacheSpaceDescriptor, CachedValue,
    LocalEviction, MemoryRemoteStore, RemoteError, RemoteStore,
};

/// Two-tier space config with deterministic (LRU) local eviction
pub fn space(
    priority: CachePriority,
    strategy: CacheChangeStrategy,
    max_size: i64,
    ratio: f64,
) -> CacheSpaceDescriptor {
    CacheSpaceDescriptor {
        name: "test".to_string(),
        priority,
        change_strategy: strategy,
        max_size,
        two_levels_ratio: ratio,
        local_eviction: LocalEviction::Lru,
        ..CacheSpaceDescriptor::default()
    }
}

pub fn resolve(descriptor: CacheSpaceDescriptor) -> CacheSpaceConfig {
    descriptor.resolve().unwrap()
}

/// Remote store that can be taken down, slowed down, and records write TTLs
pub struct StubStore {
    inner: MemoryRemoteStore<u32, String>,
    down: AtomicBool,
    delay: Mutex<Option<Duration>>,
    /// Extra delay before `put_if_absent` writes
    write_delay: Mutex<Option<Duration>>,
    ttls: Mutex<Vec<(u32, Duration)>>,
}

impl StubStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryRemoteStore::new(),
            down: AtomicBool::new(false),
            delay: Mutex::new(None),
            write_delay: Mutex::new(None),
            ttls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.lock().unwrap() = delay;
    }

    /// Write TTLs passed to `put_if_absent`, in call order
    pub fn ttls(&self) -> Vec<(u32, Duration)> {
        self.ttls.lock().unwrap().clone()
    }

    pub fn memory(&self) -> &MemoryRemoteStore<u32, String> {
        &self.inner
    }

    async fn gate(&self) -> Result<(), RemoteError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore<u32, String> for StubStore {
    async fn get(&self, key: &u32) -> Result<Option<CachedValue<String>>, RemoteError> {
        self.gate().await?;
        self.inner.get(key).await
    }

    async fn put_if_absent(
        &self,
        key: &u32,
        value: CachedValue<String>,
        ttl: Duration,
        idle: Duration,
    ) -> Result<bool, RemoteError> {
        self.gate().await?;
        let write_delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = write_delay {
            tokio::time::sleep(delay).await;
        }
        self.ttls.lock().unwrap().push((*key, ttl));
        self.inner.put_if_absent(key, value, ttl, idle).await
    }

    async fn remove(&self, key: &u32) -> Result<bool, RemoteError> {
        self.gate().await?;
        self.inner.remove(key).await
    }

    async fn remove_all(&self) -> Result<(), RemoteError> {
        self.gate().await?;
        self.inner.remove_all().await
    }

    async fn try_set_max_size(&self, max_size: u64) -> Result<bool, RemoteError> {
        self.gate().await?;
        self.inner.try_set_max_size(max_size).await
    }
}
