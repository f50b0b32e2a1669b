//! Keyed connection pool: reuse, expiry, repair on acquire, eviction at capacity.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use dbm_async_core::config::ConnectionPoolConfig;
use dbm_async_core::database::{
    ConnectionOptions, ConnectionPool, PoolError, PoolStats, PooledConnection,
};
use tokio_test::{assert_err, assert_ok};

const TTL: Duration = Duration::from_secs(60);

fn mock_pool() -> (MockFactory, ConnectionPool<MockConnection>) {
    let factory = MockFactory::default();
    let pool = ConnectionPool::new(factory.clone());
    (factory, pool)
}

fn bounded_pool(max_connections: usize) -> (MockFactory, ConnectionPool<MockConnection>) {
    let (factory, pool) = mock_pool();
    (factory, pool.with_max_connections(max_connections))
}

#[tokio::test]
async fn test_same_name_returns_same_connection() {
    let (factory, pool) = mock_pool();

    let first = assert_ok!(pool.get("orders").await);
    let second = assert_ok!(pool.get("orders").await);

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.resource_name, "orders");
    assert_eq!(factory.opened(), 1);
    assert_eq!(pool.len().await, 1);
    assert_eq!(pool.stats().await.connection_opened, 1);
}

#[tokio::test]
async fn test_distinct_names_get_distinct_connections() {
    let (factory, pool) = mock_pool();

    let orders = assert_ok!(pool.get("orders").await);
    let billing = assert_ok!(pool.get("billing").await);

    assert_ne!(orders.id, billing.id);
    assert_eq!(factory.opened(), 2);
}

#[tokio::test]
async fn test_expired_connection_is_pruned_and_replaced() {
    let (factory, pool) = mock_pool();
    let first = assert_ok!(pool.get_connection("orders", Duration::from_millis(50)).await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = assert_ok!(pool.get_connection("orders", TTL).await);

    assert_ne!(first.id, second.id);
    assert!(first.is_closed());
    assert!(!second.is_closed());
    assert_eq!(factory.opened(), 2);

    let stats = pool.stats().await;
    assert_eq!(stats.connection_pruned, 1);
    assert_eq!(stats.connection_closed, 1);
}

#[tokio::test]
async fn test_reacquire_extends_deadline() {
    let (_factory, pool) = mock_pool();
    let first = assert_ok!(pool.get_connection("orders", Duration::from_millis(150)).await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_ok!(pool.get_connection("orders", Duration::from_millis(150)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    pool.prune_connections().await;

    assert!(pool.contains("orders").await);
    assert!(!first.is_closed());
}

#[tokio::test]
async fn test_prune_closes_only_expired_connections() {
    let (_factory, pool) = mock_pool();
    let short = assert_ok!(pool.get_connection("short", Duration::from_millis(20)).await);
    let long = assert_ok!(pool.get_connection("long", TTL).await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    pool.prune_connections().await;

    assert!(short.is_closed());
    assert!(!long.is_closed());
    assert!(!pool.contains("short").await);
    assert!(pool.contains("long").await);
}

#[tokio::test]
async fn test_prune_removes_entry_when_close_fails() {
    let (_factory, pool) = mock_pool();
    let connection = assert_ok!(pool.get_connection("orders", Duration::from_millis(20)).await);
    connection.fail_on_close();

    tokio::time::sleep(Duration::from_millis(50)).await;
    pool.prune_connections().await;

    assert!(pool.is_empty().await);
    let stats = pool.stats().await;
    assert_eq!(stats.connection_pruned, 1);
    assert_eq!(stats.connection_closed_failed, 1);
    assert_eq!(stats.connection_closed, 0);
}

#[tokio::test]
async fn test_non_ready_connection_is_reset_on_acquire() {
    let (factory, pool) = mock_pool();
    let first = assert_ok!(pool.get("orders").await);
    first.leave_in_transaction();

    let second = assert_ok!(pool.get("orders").await);

    assert!(Arc::ptr_eq(&first, &second));
    assert!(second.is_ready());
    assert_eq!(second.resets(), 1);
    assert_eq!(factory.opened(), 1);
    assert_eq!(pool.stats().await.connection_reset, 1);
}

#[tokio::test]
async fn test_failed_reset_replaces_connection() {
    let (factory, pool) = mock_pool();
    let first = assert_ok!(pool.get("orders").await);
    first.leave_in_transaction();
    first.fail_on_reset();

    let second = assert_ok!(pool.get("orders").await);

    assert_ne!(first.id, second.id);
    assert!(first.is_closed());
    assert_eq!(factory.opened(), 2);
    assert_eq!(pool.stats().await.connection_closed, 1);
}

#[tokio::test]
async fn test_closed_connection_is_replaced() {
    let (factory, pool) = mock_pool();
    let first = assert_ok!(pool.get("orders").await);
    first.drop_from_server();

    let second = assert_ok!(pool.get("orders").await);

    assert_ne!(first.id, second.id);
    assert!(!second.is_closed());
    assert_eq!(factory.opened(), 2);
    assert_eq!(pool.len().await, 1);
}

#[tokio::test]
async fn test_close_all_connections() {
    let (_factory, pool) = mock_pool();
    let orders = assert_ok!(pool.get("orders").await);
    let billing = assert_ok!(pool.get("billing").await);

    assert!(pool.close_all_connections().await);

    assert!(orders.is_closed());
    assert!(billing.is_closed());
    assert!(pool.is_empty().await);
    assert_eq!(pool.stats().await.connection_closed, 2);

    // the pool stays usable
    let reopened = assert_ok!(pool.get("orders").await);
    assert_ne!(reopened.id, orders.id);
}

#[tokio::test]
async fn test_close_all_reports_failure_but_removes_entries() {
    let (_factory, pool) = mock_pool();
    let orders = assert_ok!(pool.get("orders").await);
    assert_ok!(pool.get("billing").await);
    orders.fail_on_close();

    assert!(!pool.close_all_connections().await);

    assert!(pool.is_empty().await);
    let stats = pool.stats().await;
    assert_eq!(stats.connection_closed, 1);
    assert_eq!(stats.connection_closed_failed, 1);
}

#[tokio::test]
async fn test_lru_eviction_at_capacity() {
    let (_factory, pool) = bounded_pool(2);
    let orders = assert_ok!(pool.get("orders").await);
    pool.release("orders").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_ok!(pool.get("billing").await);
    pool.release("billing").await;

    assert_ok!(pool.get("inventory").await);

    assert!(orders.is_closed());
    assert!(!pool.contains("orders").await);
    assert!(pool.contains("billing").await);
    assert!(pool.contains("inventory").await);
    assert_eq!(pool.stats().await.connection_evicted, 1);
}

#[tokio::test]
async fn test_persistent_connection_is_never_evicted() {
    let (_factory, pool) = bounded_pool(2);
    let persistent = ConnectionOptions::persistent();
    let orders = assert_ok!(pool.get_connection_with("orders", TTL, &persistent).await);
    pool.release("orders").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let billing = assert_ok!(pool.get("billing").await);
    pool.release("billing").await;

    assert_ok!(pool.get("inventory").await);

    assert!(!orders.is_closed());
    assert!(billing.is_closed());
    assert!(pool.contains("orders").await);
    assert!(!pool.contains("billing").await);
}

#[tokio::test]
async fn test_full_pool_without_evictable_connection_fails() {
    let (factory, pool) = bounded_pool(1);
    assert_ok!(pool.get("orders").await);

    let err = assert_err!(pool.get("billing").await);

    assert!(matches!(err, PoolError::PoolFull { max_connections: 1 }));
    assert_eq!(err.kind(), "pool_full");
    assert_eq!(factory.opened(), 1);
    assert!(pool.contains("orders").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_acquire_waits_for_release_within_timeout() {
    let (_factory, pool) = bounded_pool(1);
    let pool = Arc::new(pool);
    let orders = assert_ok!(pool.get("orders").await);

    let releaser = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            pool.release("orders").await;
        })
    };

    let options = ConnectionOptions::default().with_timeout(Duration::from_secs(2));
    let billing = assert_ok!(pool.get_connection_with("billing", TTL, &options).await);
    assert_ok!(releaser.await);

    assert_eq!(billing.resource_name, "billing");
    assert!(orders.is_closed());
    assert_eq!(pool.len().await, 1);
}

#[tokio::test]
async fn test_acquire_times_out_when_nothing_is_released() {
    let (_factory, pool) = bounded_pool(1);
    assert_ok!(pool.get("orders").await);

    let options = ConnectionOptions::default().with_timeout(Duration::from_millis(50));
    let err = assert_err!(pool.get_connection_with("billing", TTL, &options).await);

    assert!(matches!(err, PoolError::PoolFull { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquires_share_one_connection() {
    let (factory, pool) = mock_pool();
    let pool = Arc::new(pool);

    let acquires = (0..8).map(|_| {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.get("orders").await })
    });
    let connections: Vec<_> = futures::future::join_all(acquires)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(factory.opened(), 1);
    assert!(connections
        .iter()
        .all(|connection| Arc::ptr_eq(connection, &connections[0])));
}

#[tokio::test]
async fn test_prefixed_key_keeps_bare_resource_name() {
    let (_factory, pool) = mock_pool();
    let options = ConnectionOptions::default().with_prefix("activity");

    let prefixed = assert_ok!(pool.get_connection_with("orders", TTL, &options).await);
    let plain = assert_ok!(pool.get("orders").await);

    assert_eq!(prefixed.resource_name, "orders");
    assert_ne!(prefixed.id, plain.id);
    assert!(pool.contains("activity-orders").await);
    assert!(pool.contains("orders").await);
}

#[tokio::test]
async fn test_shutdown_rejects_new_acquisitions() {
    let (_factory, pool) = mock_pool();
    let orders = assert_ok!(pool.get("orders").await);

    assert!(pool.shutdown().await);

    assert!(orders.is_closed());
    assert!(pool.is_shutdown().await);
    assert!(matches!(pool.get("orders").await, Err(PoolError::Closed)));
}

#[tokio::test]
async fn test_reset_stats() {
    let (_factory, pool) = mock_pool();
    assert_ok!(pool.get("orders").await);
    assert_ne!(pool.stats().await, PoolStats::default());

    pool.reset_stats().await;

    assert_eq!(pool.stats().await, PoolStats::default());
    assert_eq!(pool.len().await, 1);
}

#[tokio::test]
async fn test_pool_from_config() {
    let config = ConnectionPoolConfig {
        default_ttl_ms: 30,
        max_connections: Some(1),
    };
    let pool: ConnectionPool<MockConnection> =
        ConnectionPool::from_config(&config, MockFactory::default());

    assert_eq!(pool.max_connections(), Some(1));
    let orders = assert_ok!(pool.get("orders").await);
    tokio::time::sleep(Duration::from_millis(60)).await;
    pool.prune_connections().await;

    assert!(orders.is_closed());
    assert!(pool.is_empty().await);
}
