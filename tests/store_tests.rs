use portfolio_site::{
    MemorySessionStore,
    session::{SessionStore, StorageScope},
};
use std::time::Duration;

async fn touch(store: &MemorySessionStore, sid: &str) {
    store
        .set(sid, StorageScope::Session, "k", "v".to_string())
        .await
        .unwrap();
}

async fn has(store: &MemorySessionStore, sid: &str) -> bool {
    store
        .get(sid, StorageScope::Session, "k")
        .await
        .unwrap()
        .is_some()
}

#[tokio::test]
async fn test_cookieless_traffic_cannot_grow_store_past_limit() {
    let store = MemorySessionStore::with_limits(Duration::from_secs(3600), 4);

    for i in 0..10 {
        touch(&store, &format!("visitor-{i}")).await;
    }

    assert!(store.bucket_count().await <= 4);
    assert!(has(&store, "visitor-9").await);
    assert!(!has(&store, "visitor-0").await);
}

#[tokio::test]
async fn test_recently_read_bucket_survives_eviction() {
    let store = MemorySessionStore::with_limits(Duration::from_secs(3600), 2);
    touch(&store, "regular").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    touch(&store, "passer-by").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(has(&store, "regular").await);
    tokio::time::sleep(Duration::from_millis(5)).await;

    touch(&store, "newcomer").await;

    assert!(has(&store, "regular").await);
    assert!(has(&store, "newcomer").await);
    assert!(!has(&store, "passer-by").await);
}

#[tokio::test]
async fn test_idle_buckets_expire() {
    let store = MemorySessionStore::with_limits(Duration::ZERO, 100);
    touch(&store, "a").await;

    touch(&store, "b").await;

    assert!(!has(&store, "a").await);
    assert!(has(&store, "b").await);
    assert_eq!(store.bucket_count().await, 1);
}

#[tokio::test]
async fn test_emptied_bucket_is_released() {
    let store = MemorySessionStore::new();
    touch(&store, "a").await;
    store
        .set("a", StorageScope::Durable, "theme", "dark".to_string())
        .await
        .unwrap();
    assert_eq!(store.bucket_count().await, 2);

    store.remove("a", StorageScope::Session, "k").await.unwrap();

    assert_eq!(store.bucket_count().await, 1);
    assert_eq!(
        store
            .get("a", StorageScope::Durable, "theme")
            .await
            .unwrap()
            .as_deref(),
        Some("dark")
    );
}
