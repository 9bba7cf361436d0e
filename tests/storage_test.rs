mod common;

use common::event;
use error_sentinel::{ErrorStore, InMemoryStore};

#[tokio::test]
async fn test_store_never_exceeds_capacity() {
    let store = InMemoryStore::new(3);

    for i in 0..5u64 {
        store.put(&event(&format!("/api/{}", i), 1_000 + i)).await.unwrap();
    }

    let all = store.get_all().await.unwrap();
    let endpoints: Vec<&str> = all.iter().map(|e| e.endpoint.as_str()).collect();
    assert_eq!(endpoints, vec!["/api/2", "/api/3", "/api/4"]);
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_zero_capacity_is_raised_to_one() {
    let store = InMemoryStore::new(0);
    assert_eq!(store.capacity(), 1);

    store.put(&event("/a", 1)).await.unwrap();
    store.put(&event("/b", 2)).await.unwrap();

    let all = store.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].endpoint, "/b");
}

#[tokio::test]
async fn test_time_range_is_inclusive_and_ordered() {
    let store = InMemoryStore::new(10);

    store.put(&event("/late", 300)).await.unwrap();
    store.put(&event("/early", 100)).await.unwrap();
    store.put(&event("/middle", 200)).await.unwrap();
    store.put(&event("/outside", 400)).await.unwrap();

    let selected = store.get_by_time_range(100, 300).await.unwrap();
    let endpoints: Vec<&str> = selected.iter().map(|e| e.endpoint.as_str()).collect();
    assert_eq!(endpoints, vec!["/early", "/middle", "/late"]);

    assert!(store.get_by_time_range(500, 900).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_clear_empties_the_store() {
    let store = InMemoryStore::new(10);
    store.put(&event("/a", 1)).await.unwrap();
    store.put(&event("/b", 2)).await.unwrap();

    store.clear().await.unwrap();

    assert_eq!(store.count().await.unwrap(), 0);
    assert!(store.get_all().await.unwrap().is_empty());
}
