use error_sentinel::{DedupCache, DedupKey};

fn key(endpoint: &str) -> DedupKey {
    DedupKey::new(endpoint, "GET", 500, "platform")
}

#[test]
fn test_repeat_inside_window_is_rejected() {
    let mut cache = DedupCache::new();

    assert!(cache.should_accept(&key("/api/users"), 0, 60_000));
    assert!(!cache.should_accept(&key("/api/users"), 30_000, 60_000));
    // Rejection does not refresh the entry.
    assert!(cache.should_accept(&key("/api/users"), 60_000, 60_000));
}

#[test]
fn test_repeat_after_window_is_accepted() {
    let mut cache = DedupCache::new();

    assert!(cache.should_accept(&key("/api/users"), 0, 60_000));
    assert!(cache.should_accept(&key("/api/users"), 70_000, 60_000));
    assert!(!cache.should_accept(&key("/api/users"), 100_000, 60_000));
}

#[test]
fn test_every_key_component_counts() {
    let mut cache = DedupCache::new();
    let base = DedupKey::new("/api/users", "GET", 500, "platform");

    assert!(cache.should_accept(&base, 0, 60_000));
    assert!(cache.should_accept(&DedupKey::new("/api/users", "POST", 500, "platform"), 1, 60_000));
    assert!(cache.should_accept(&DedupKey::new("/api/users", "GET", 503, "platform"), 2, 60_000));
    assert!(cache.should_accept(&DedupKey::new("/api/users", "GET", 500, "identity"), 3, 60_000));
    assert!(cache.should_accept(&DedupKey::new("/api/orders", "GET", 500, "platform"), 4, 60_000));
    assert_eq!(cache.len(), 5);
}

#[test]
fn test_zero_window_accepts_everything_and_records_nothing() {
    let mut cache = DedupCache::new();

    for now in 0..5 {
        assert!(cache.should_accept(&key("/api/users"), now, 0));
    }
    assert!(cache.is_empty());
}

#[test]
fn test_expired_entries_are_swept_on_acceptance() {
    let mut cache = DedupCache::new();

    cache.should_accept(&key("/a"), 0, 1_000);
    cache.should_accept(&key("/b"), 500, 1_000);
    assert_eq!(cache.len(), 2);

    // "/a" is out of the window by now, "/b" is not.
    cache.should_accept(&key("/c"), 1_200, 1_000);
    assert_eq!(cache.len(), 2);

    cache.sweep(10_000, 1_000);
    assert!(cache.is_empty());
}

#[test]
fn test_clear_forgets_all_keys() {
    let mut cache = DedupCache::new();
    cache.should_accept(&key("/a"), 0, 60_000);
    cache.clear();

    assert!(cache.should_accept(&key("/a"), 1, 60_000));
}
