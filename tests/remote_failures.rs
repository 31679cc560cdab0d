//! Cache space behavior when the remote tier misbehaves

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{resolve, space, StubStore};
use twotier_cache::{
    CacheChangeStrategy, CacheError, CachePriority, CachedValue, RemoteError, SingleTierCache,
    TierCoordinator,
};

type Coordinator = TierCoordinator<u32, String>;

async fn coordinator(store: &Arc<StubStore>, tolerate: bool, timeout_ms: Option<u64>) -> Coordinator {
    let mut descriptor = space(
        CachePriority::LocalAndRemote,
        CacheChangeStrategy::OverflowMaxSize,
        100,
        1.0,
    );
    descriptor.tolerate_remote_outage = tolerate;
    descriptor.remote_timeout_ms = timeout_ms;
    Coordinator::new(resolve(descriptor), store.clone()).await.unwrap()
}

#[tokio::test]
async fn test_lookup_propagates_outage_by_default() {
    let store = StubStore::new();
    let cache = coordinator(&store, false, None).await;

    store.set_down(true);
    let result = cache.lookup(&1).await;

    match result {
        Err(CacheError::RemoteUnavailable { operation, source }) => {
            assert_eq!(operation, "get");
            assert!(matches!(source, RemoteError::Unavailable(_)));
        }
        other => panic!("expected RemoteUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_lookup_degrades_to_miss_when_tolerated() {
    let store = StubStore::new();
    let cache = coordinator(&store, true, None).await;

    cache.put(1, "one".to_string()).await.unwrap();
    store.set_down(true);

    // Local hits still work
    assert_eq!(
        cache.lookup(&1).await.unwrap(),
        Some(CachedValue::Value("one".to_string()))
    );
    assert_eq!(cache.lookup(&2).await.unwrap(), None);
    assert_eq!(cache.stats().misses, 1);
}

#[tokio::test]
async fn test_writes_surface_outage() {
    let store = StubStore::new();
    let cache = coordinator(&store, true, None).await;
    store.set_down(true);

    let put = cache.put(1, "one".to_string()).await;
    assert!(matches!(put, Err(ref e) if e.is_remote()));

    let evict = cache.evict(&1).await;
    assert!(matches!(evict, Err(CacheError::RemoteUnavailable { operation: "remove", .. })));

    let clear = cache.clear().await;
    assert!(matches!(clear, Err(CacheError::RemoteUnavailable { operation: "clear", .. })));
}

#[tokio::test(start_paused = true)]
async fn test_slow_remote_times_out() {
    let store = StubStore::new();
    let cache = coordinator(&store, false, Some(50)).await;

    store.set_delay(Some(Duration::from_secs(10)));
    let result = cache.lookup(&1).await;

    match result {
        Err(CacheError::RemoteUnavailable { source: RemoteError::Timeout(limit), .. }) => {
            assert_eq!(limit, Duration::from_millis(50));
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_tolerated_like_an_outage() {
    let store = StubStore::new();
    let cache = coordinator(&store, true, Some(50)).await;

    store.set_delay(Some(Duration::from_secs(10)));
    assert_eq!(cache.lookup(&1).await.unwrap(), None);
}

#[tokio::test]
async fn test_failed_demotion_is_counted_not_returned() {
    let store = StubStore::new();
    let cache = Coordinator::new(
        resolve(space(
            CachePriority::FirstLocal,
            CacheChangeStrategy::OverflowMaxSize,
            2,
            1.0,
        )),
        store.clone(),
    )
    .await
    .unwrap();
    assert_eq!(cache.capacity().local, 1);

    cache.put(1, "one".to_string()).await.unwrap();
    store.set_down(true);

    // Pushes key 1 out; its demotion fails but this write succeeds
    cache.put(2, "two".to_string()).await.unwrap();

    let stats = cache.stats();
    assert_eq!(stats.demotion_failures, 1);
    assert_eq!(stats.demotions, 0);

    store.set_down(false);
    assert!(!store.memory().contains(&1));
}

#[tokio::test]
async fn test_construction_needs_remote_unless_tolerated() {
    let store = StubStore::new();
    store.set_down(true);

    let strict = Coordinator::new(
        resolve(space(
            CachePriority::LocalAndRemote,
            CacheChangeStrategy::OverflowMaxSize,
            10,
            1.0,
        )),
        store.clone(),
    )
    .await;
    assert!(matches!(strict, Err(ref e) if e.is_remote()));

    let mut descriptor = space(
        CachePriority::LocalAndRemote,
        CacheChangeStrategy::OverflowMaxSize,
        10,
        1.0,
    );
    descriptor.tolerate_remote_outage = true;
    assert!(Coordinator::new(resolve(descriptor), store.clone()).await.is_ok());
}

#[tokio::test]
async fn test_remote_only_space_tolerates_outage() {
    let store = StubStore::new();
    let mut descriptor = space(
        CachePriority::OnlyRemote,
        CacheChangeStrategy::OverflowMaxSize,
        10,
        1.0,
    );
    descriptor.tolerate_remote_outage = true;
    let cache = SingleTierCache::<u32, String>::remote(resolve(descriptor), store.clone())
        .await
        .unwrap();

    cache.put(1, "one".to_string()).await.unwrap();
    store.set_down(true);
    assert_eq!(cache.lookup(&1).await.unwrap(), None);
    assert!(cache.put(2, "two".to_string()).await.is_err());
}
