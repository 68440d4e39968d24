// tests/integration/cache_test.rs

//! Integration tests for the session cache
//! Tests: get-or-create, lease release, drain and invalidation, concurrent connects

use super::test_helpers::{MockDriver, TEST_URL, init_tracing, test_key};
use clusterlink::core::errors::ClusterLinkError;
use clusterlink::core::{Lookup, Release, SessionKey};
use std::time::Duration;

// ===== Sharing =====

#[tokio::test]
async fn test_same_key_shares_one_session() {
    init_tracing();
    let driver = MockDriver::new();
    let cache = driver.cache();

    let first = cache.connect(test_key()).await.unwrap();
    let second = cache.connect(test_key()).await.unwrap();

    assert!(std::sync::Arc::ptr_eq(first.handle(), second.handle()));
    assert_eq!(first.handle().references(), 2);
    assert_eq!(driver.stats.builds(), 1);
    assert_eq!(driver.stats.connects(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(first.session().keyspace(), Some("app"));
}

#[tokio::test]
async fn test_get_or_create_reports_lookup() {
    let driver = MockDriver::new();
    let cache = driver.cache();
    let key = test_key();

    let (created, lookup) = cache.get_or_create(&key).await.unwrap();
    assert_eq!(lookup, Lookup::Created);
    assert_eq!(created.references(), 1);

    let (existing, lookup) = cache.get_or_create(&key).await.unwrap();
    assert_eq!(lookup, Lookup::Existing);
    assert!(std::sync::Arc::ptr_eq(&created, &existing));
    // An existing lookup takes no reference by itself.
    assert_eq!(existing.references(), 1);

    assert_eq!(created.release(), Release::Drained);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_different_overrides_build_distinct_sessions() {
    let driver = MockDriver::new();
    let cache = driver.cache();

    let plain = cache.connect_url(TEST_URL, Vec::<(String, String)>::new()).await.unwrap();
    let other = cache.connect_url(TEST_URL, [("keyspace", "audit")]).await.unwrap();

    assert!(!std::sync::Arc::ptr_eq(plain.handle(), other.handle()));
    assert_eq!(plain.session().keyspace(), Some("app"));
    assert_eq!(other.session().keyspace(), Some("audit"));
    assert_eq!(driver.stats.builds(), 2);
    assert_eq!(cache.len(), 2);
}

// ===== Release and drain =====

#[tokio::test]
async fn test_last_release_closes_and_evicts() {
    let driver = MockDriver::new();
    let cache = driver.cache();

    let a = cache.connect(test_key()).await.unwrap();
    let b = cache.connect(test_key()).await.unwrap();

    assert_eq!(a.release(), Release::Retained(1));
    assert_eq!(cache.len(), 1);
    assert_eq!(driver.stats.session_closes(), 0);

    let handle = b.handle().clone();
    assert_eq!(b.release(), Release::Drained);
    assert!(handle.is_drained());
    assert!(handle.session().is_closed());
    assert!(cache.is_empty());
    assert_eq!(driver.stats.session_closes(), 1);
    assert_eq!(driver.stats.cluster_closes(), 1);
}

#[tokio::test]
async fn test_dropping_a_lease_releases_it() {
    let driver = MockDriver::new();
    let cache = driver.cache();

    {
        let _lease = cache.connect(test_key()).await.unwrap();
        assert_eq!(cache.len(), 1);
    }
    assert!(cache.is_empty());
    assert_eq!(driver.stats.session_closes(), 1);
}

#[tokio::test]
async fn test_connect_after_drain_builds_a_fresh_session() {
    let driver = MockDriver::new();
    let cache = driver.cache();

    let first = cache.connect(test_key()).await.unwrap();
    let old = first.handle().clone();
    first.release();

    let second = cache.connect(test_key()).await.unwrap();
    assert!(!std::sync::Arc::ptr_eq(&old, second.handle()));
    assert!(!second.session().is_closed());
    assert_eq!(second.handle().references(), 1);
    assert_eq!(driver.stats.builds(), 2);
}

#[tokio::test]
async fn test_direct_release_evicts_the_entry() {
    let driver = MockDriver::new();
    let cache = driver.cache();
    let key = test_key();

    // Drain through the handle rather than a lease.
    let (handle, _) = cache.get_or_create(&key).await.unwrap();
    handle.release();
    assert!(cache.get(&key).is_none());

    let lease = cache.connect(key.clone()).await.unwrap();
    assert!(!lease.handle().is_drained());
    assert_eq!(driver.stats.builds(), 2);
}

#[tokio::test]
async fn test_invalidate_keeps_a_live_replacement() {
    let driver = MockDriver::new();
    let cache = driver.cache();
    let key = test_key();

    let lease = cache.connect(key.clone()).await.unwrap();
    cache.invalidate(&key);
    assert_eq!(cache.len(), 1);

    let live = cache.get(&key).unwrap();
    assert!(std::sync::Arc::ptr_eq(&live, lease.handle()));
}

// ===== Failures =====

#[tokio::test]
async fn test_construction_failure_leaves_cache_empty() {
    let driver = MockDriver::failing_connect();
    let cache = driver.cache();

    let err = cache.connect(test_key()).await.unwrap_err();
    assert!(err.is_connection_failure());
    assert!(cache.is_empty());
    assert_eq!(driver.stats.cluster_closes(), 1);

    // Nothing is memoized: the next attempt builds again.
    assert!(cache.connect(test_key()).await.is_err());
    assert_eq!(driver.stats.builds(), 2);
}

#[tokio::test]
async fn test_invalid_url_is_reported_before_building() {
    let driver = MockDriver::new();
    let cache = driver.cache();

    let err = cache
        .connect(SessionKey::new("jdbc:mysql://db/app", Vec::<(String, String)>::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterLinkError::InvalidUrl { .. }));
    assert!(!err.is_connection_failure());
    assert_eq!(driver.stats.builds(), 0);
    assert!(cache.is_empty());
}

// ===== Concurrency =====

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connects_build_once() {
    let driver = MockDriver::with_connect_delay(Duration::from_millis(50));
    let cache = driver.cache();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.connect(test_key()).await })
        })
        .collect();

    let mut leases = Vec::new();
    for task in tasks {
        leases.push(task.await.unwrap().unwrap());
    }

    assert_eq!(driver.stats.builds(), 1);
    assert_eq!(leases[0].handle().references(), 16);
    for lease in &leases[1..] {
        assert!(std::sync::Arc::ptr_eq(leases[0].handle(), lease.handle()));
    }

    drop(leases);
    assert!(cache.is_empty());
    assert_eq!(driver.stats.session_closes(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_churning_leases_never_hand_out_closed_sessions() {
    let driver = MockDriver::new();
    let cache = driver.cache();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let lease = cache.connect(test_key()).await.unwrap();
                    assert!(!lease.session().is_closed());
                    assert!(!lease.handle().is_drained());
                    drop(lease);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    // Every session that was built has been closed exactly once.
    assert!(cache.is_empty());
    assert_eq!(driver.stats.builds(), driver.stats.session_closes());
    assert_eq!(driver.stats.builds(), driver.stats.cluster_closes());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_build_locks_are_released_after_concurrent_misses() {
    let driver = MockDriver::with_connect_delay(Duration::from_millis(20));
    let cache = driver.cache();

    for round in 0..5 {
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.connect(test_key()).await })
            })
            .collect();
        let mut leases = Vec::new();
        for task in tasks {
            leases.push(task.await.unwrap().unwrap());
        }

        assert_eq!(cache.pending_builds(), 0, "round {round}");
        drop(leases);
        assert!(cache.is_empty());
    }
    assert_eq!(driver.stats.builds(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_build_locks_are_released_after_failed_builds() {
    let driver = MockDriver::failing_connect();
    let cache = driver.cache();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.connect(test_key()).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().is_err());
    }

    assert_eq!(cache.pending_builds(), 0);
    assert!(cache.is_empty());
    assert_eq!(driver.stats.builds(), 16);
}
