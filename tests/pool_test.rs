//! 连接池行为测试：容量上限、排队交接、命中率、空闲回收与健康检查

mod common;

use std::time::Duration;

use futures::future::join_all;
use rat_quickpool::{ConnectionManager, ConnectionPool, HealthStatus, PoolConfig, QuickPoolError};
use tokio::time::Instant;

use common::{FakeManager, fake_pool, pool_config};

async fn wait_for_waiters<M: ConnectionManager>(pool: &ConnectionPool<M>, n: u32) {
    while pool.status().waiting < n {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_then_release_unblocks_pending_acquire() {
    let (manager, pool) = fake_pool(2, 4).await;
    assert_eq!(manager.connects(), 2);

    let mut held: Vec<_> = join_all((0..4).map(|_| pool.acquire()))
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    // 2 个预热连接被复用，另外 2 个新建
    assert_eq!(manager.connects(), 4);
    let status = pool.status();
    assert_eq!((status.active, status.idle, status.total), (4, 0, 4));

    let started = Instant::now();
    let err = pool
        .acquire_timeout(Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QuickPoolError::PoolExhausted {
            max_connections: 4,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(pool.metrics().connection_timeouts, 1);

    let pending = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire_timeout(Duration::from_secs(30)).await }
    });
    wait_for_waiters(&pool, 1).await;

    let released = held.swap_remove(0);
    let released_id = released.id();
    let before = Instant::now();
    drop(released);

    let conn = pending.await.unwrap().unwrap();
    assert_eq!(conn.id(), released_id);
    assert!(before.elapsed() < Duration::from_millis(10));
    assert_eq!(manager.connects(), 4);
    assert_eq!(pool.status().active, 4);
}

#[tokio::test(start_paused = true)]
async fn test_waiters_are_served_in_arrival_order() {
    let (_manager, pool) = fake_pool(1, 1).await;
    let held = pool.acquire().await.unwrap();

    let first = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire_timeout(Duration::from_secs(30)).await }
    });
    wait_for_waiters(&pool, 1).await;
    let second = tokio::spawn({
        let pool = pool.clone();
        async move {
            pool.acquire_timeout(Duration::from_millis(500))
                .await
                .map(|c| c.id())
        }
    });
    wait_for_waiters(&pool, 2).await;

    let id = held.id();
    drop(held);

    // 第一个等待者持有连接，第二个等待者超时
    let first_conn = first.await.unwrap().unwrap();
    assert_eq!(first_conn.id(), id);
    assert!(matches!(
        second.await.unwrap(),
        Err(QuickPoolError::PoolExhausted { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_hit_rate_counts_reused_acquisitions() {
    let (manager, pool) = fake_pool(0, 4).await;

    // 前 2 次新建
    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    drop(a);
    drop(b);
    // 后 3 次复用
    for _ in 0..3 {
        let conn = pool.acquire().await.unwrap();
        pool.release(conn).unwrap();
    }

    assert_eq!(manager.connects(), 2);
    let report = pool.metrics();
    assert_eq!(report.hit_count, 3);
    assert_eq!(report.miss_count, 2);
    assert!((report.hit_rate - 0.6).abs() < 1e-9);
    assert_eq!(report.peak_connections_used, 2);
}

#[tokio::test(start_paused = true)]
async fn test_released_connection_is_reused_first() {
    let (_manager, pool) = fake_pool(2, 4).await;
    let conn = pool.acquire().await.unwrap();
    let id = conn.id();
    pool.release(conn).unwrap();

    let again = pool.acquire().await.unwrap();
    assert_eq!(again.id(), id);
    assert_eq!(again.use_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_idle_connections_above_min_are_evicted() {
    let (manager, pool) = fake_pool(1, 4).await;
    let held: Vec<_> = join_all((0..3).map(|_| pool.acquire()))
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    drop(held);
    assert_eq!(pool.status().idle, 3);

    // 未超过空闲时间，不回收
    let outcome = pool.run_health_check().await;
    assert_eq!(outcome.evicted, 0);
    assert_eq!(outcome.probed, 3);

    tokio::time::advance(Duration::from_secs(61)).await;
    let outcome = pool.run_health_check().await;
    assert_eq!(outcome.evicted, 2);
    assert_eq!(outcome.probed, 1);
    assert_eq!(outcome.replaced, 0);

    let status = pool.status();
    assert_eq!((status.idle, status.total), (1, 1));
    assert_eq!(manager.closes(), 2);
    assert_eq!(pool.metrics().evicted_total, 2);

    // 已到最小连接数，即使空闲过久也保留
    tokio::time::advance(Duration::from_secs(120)).await;
    let outcome = pool.run_health_check().await;
    assert_eq!(outcome.evicted, 0);
    assert_eq!(pool.status().idle, 1);
}

#[tokio::test(start_paused = true)]
async fn test_long_loan_returns_to_idle_on_release() {
    let (manager, pool) = fake_pool(1, 4).await;
    let first = pool.acquire().await.unwrap();
    let second = pool.acquire().await.unwrap();

    tokio::time::advance(Duration::from_secs(61)).await;
    pool.release(first).unwrap();
    pool.release(second).unwrap();

    tokio::task::yield_now().await;
    assert_eq!(manager.closes(), 0);
    let status = pool.status();
    assert_eq!((status.idle, status.total), (2, 2));
    assert_eq!(pool.metrics().evicted_total, 0);

    // 空闲时间从归还时算起
    let outcome = pool.run_health_check().await;
    assert_eq!(outcome.evicted, 0);
    assert_eq!(outcome.probed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_long_loan_is_handed_to_waiter() {
    let (manager, pool) = fake_pool(1, 1).await;
    let held = pool.acquire().await.unwrap();
    let held_id = held.id();

    let pending = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire_timeout(Duration::from_secs(120)).await.map(|c| c.id()) }
    });
    wait_for_waiters(&pool, 1).await;

    tokio::time::advance(Duration::from_secs(61)).await;
    pool.release(held).unwrap();

    assert_eq!(pending.await.unwrap().unwrap(), held_id);
    assert_eq!(manager.connects(), 1);
    assert_eq!(manager.closes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_connect_is_bounded_by_acquire_timeout() {
    let (manager, pool) = fake_pool(0, 2).await;
    manager.set_connect_delay(Duration::from_secs(20));

    let started = Instant::now();
    let err = pool
        .acquire_timeout(Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, QuickPoolError::PoolExhausted { .. }));
    assert!(started.elapsed() <= Duration::from_secs(2));
    assert_eq!(pool.status().total, 0);
    assert_eq!(pool.metrics().connection_timeouts, 1);

    manager.set_connect_delay(Duration::ZERO);
    assert!(pool.acquire().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_slow_connect_after_handoff_is_bounded_by_acquire_timeout() {
    let (manager, pool) = fake_pool(1, 1).await;
    let mut held = pool.acquire().await.unwrap();
    held.mark_unhealthy();

    let pending = tokio::spawn({
        let pool = pool.clone();
        async move {
            let started = Instant::now();
            let result = pool.acquire_timeout(Duration::from_secs(2)).await;
            (started.elapsed(), result.map(|c| c.id()))
        }
    });
    wait_for_waiters(&pool, 1).await;

    // 不健康的连接被关闭，等待者拿到槽位后自行建连
    manager.set_connect_delay(Duration::from_secs(30));
    drop(held);

    let (elapsed, result) = pending.await.unwrap();
    assert!(matches!(result, Err(QuickPoolError::PoolExhausted { .. })));
    assert!(elapsed <= Duration::from_secs(3));
    assert_eq!(pool.status().total, 0);
}

#[tokio::test(start_paused = true)]
async fn test_acquire_succeeds_while_slow_connection_is_checked() {
    let (_manager, pool) = fake_pool(2, 2).await;
    let mut slow = pool.acquire().await.unwrap();
    let slow_id = slow.id();
    slow.ping_delay = Duration::from_millis(800);
    drop(slow);

    let tick = tokio::spawn({
        let pool = pool.clone();
        async move { pool.run_health_check().await }
    });
    // 快的连接检查完即回到空闲队列，慢的仍在检查中
    while pool.status().probing != 1 {
        tokio::task::yield_now().await;
    }

    let conn = pool
        .acquire_timeout(Duration::from_millis(100))
        .await
        .unwrap();
    assert_ne!(conn.id(), slow_id);
    assert_eq!(pool.status().probing, 1);
    drop(conn);

    let outcome = tick.await.unwrap();
    assert_eq!(outcome.probed, 2);
    assert_eq!(outcome.failed, 0);
    let status = pool.status();
    assert_eq!((status.idle, status.total, status.probing), (2, 2, 0));
}

#[tokio::test(start_paused = true)]
async fn test_background_ticker_evicts_and_replaces() {
    let manager = FakeManager::new();
    let config = PoolConfig {
        health_check_interval: Duration::from_secs(10),
        ..pool_config(2, 4)
    };
    let pool = ConnectionPool::new(manager.clone(), config).await.unwrap();
    assert!(pool.health_monitor_running());

    let held: Vec<_> = join_all((0..4).map(|_| pool.acquire()))
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    drop(held);
    assert_eq!(pool.status().idle, 4);

    // 第 70 秒的检查回收超过空闲时限的连接，直到最小连接数
    tokio::time::sleep(Duration::from_secs(75)).await;
    let status = pool.status();
    assert_eq!((status.idle, status.total), (2, 2));
    assert_eq!(manager.closes(), 2);
    assert_eq!(pool.metrics().evicted_total, 2);

    let mut broken = pool.acquire().await.unwrap();
    let broken_id = broken.id();
    broken.fail_probe = true;
    drop(broken);

    // 下一次检查关闭失败的连接并补足最小连接数
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(pool.raw_metrics().health_failures(), 1);
    assert_eq!(manager.closes(), 3);
    assert_eq!(manager.connects(), 5);
    let status = pool.status();
    assert_eq!((status.idle, status.total), (2, 2));
    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    assert_ne!(a.id(), broken_id);
    assert_ne!(b.id(), broken_id);
    drop((a, b));

    pool.shutdown().await;
    assert!(!pool.health_monitor_running());
    let (connects, closes) = (manager.connects(), manager.closes());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!((manager.connects(), manager.closes()), (connects, closes));
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_is_replaced() {
    let (manager, pool) = fake_pool(2, 4).await;

    let mut conn = pool.acquire().await.unwrap();
    let broken_id = conn.id();
    conn.fail_probe = true;
    drop(conn);
    assert_eq!(pool.status().idle, 2);
    let failures_before = pool.raw_metrics().health_failures();

    let outcome = pool.run_health_check().await;
    assert_eq!(outcome.probed, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.replaced, 1);
    assert_eq!(pool.raw_metrics().health_failures(), failures_before + 1);
    assert_eq!(manager.closes(), 1);
    assert_eq!(manager.connects(), 3);

    let status = pool.status();
    assert_eq!((status.idle, status.total), (2, 2));

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    assert_ne!(a.id(), broken_id);
    assert_ne!(b.id(), broken_id);
    drop((a, b));

    let report = pool.health().await;
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(report.failed_connections, 1);
    assert_eq!(report.total_connections, 2);
}

#[tokio::test(start_paused = true)]
async fn test_healthy_pool_reports_healthy() {
    let (_manager, pool) = fake_pool(1, 2).await;
    let report = pool.health().await;
    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.failed_connections, 0);
    assert_eq!(report.database_type, "sqlite");
}

#[tokio::test(start_paused = true)]
async fn test_unhealthy_connection_is_closed_on_release() {
    let (manager, pool) = fake_pool(1, 2).await;
    let mut conn = pool.acquire().await.unwrap();
    conn.mark_unhealthy();
    pool.release(conn).unwrap();

    // 关闭在派生任务中完成
    tokio::task::yield_now().await;
    assert_eq!(manager.closes(), 1);
    let status = pool.status();
    assert_eq!((status.idle, status.total), (0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_release_to_another_pool_is_rejected() {
    let (_a_manager, pool_a) = fake_pool(1, 2).await;
    let (_b_manager, pool_b) = fake_pool(1, 2).await;

    let conn = pool_a.acquire().await.unwrap();
    let err = pool_b.release(conn).unwrap_err();
    assert!(matches!(err, QuickPoolError::InvalidRelease { .. }));

    // 被拒绝的连接仍回到自己的池
    let status = pool_a.status();
    assert_eq!((status.active, status.idle), (0, 1));
    assert_eq!(pool_b.status().idle, 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_does_not_leak_capacity() {
    let (manager, pool) = fake_pool(0, 1).await;
    manager.set_fail_connect(true);
    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, QuickPoolError::ConnectionCreationFailed { .. }));
    assert_eq!(pool.status().total, 0);

    manager.set_fail_connect(false);
    assert!(pool.acquire().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_rejects_new_and_pending_acquires() {
    let (manager, pool) = fake_pool(1, 1).await;
    let held = pool.acquire().await.unwrap();

    let pending = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire_timeout(Duration::from_secs(30)).await.map(|c| c.id()) }
    });
    wait_for_waiters(&pool, 1).await;

    let closer = tokio::spawn({
        let pool = pool.clone();
        async move { pool.shutdown().await }
    });
    assert!(matches!(
        pending.await.unwrap(),
        Err(QuickPoolError::PoolClosed)
    ));

    drop(held);
    closer.await.unwrap();

    assert!(pool.is_closed());
    assert_eq!(pool.status().total, 0);
    assert!(matches!(
        pool.acquire().await,
        Err(QuickPoolError::PoolClosed)
    ));
    tokio::task::yield_now().await;
    assert_eq!(manager.closes(), 1);

    // 重复关闭无副作用
    pool.shutdown().await;
    assert_eq!(pool.health().await.status, HealthStatus::Unhealthy);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_disabled_keeps_counters_at_zero() {
    let manager = FakeManager::new();
    let config = rat_quickpool::PoolConfig {
        metrics_enabled: false,
        ..pool_config(1, 2)
    };
    let pool = ConnectionPool::new(manager, config).await.unwrap();

    let conn = pool.acquire().await.unwrap();
    let report = pool.metrics();
    assert_eq!(report.hit_count, 0);
    assert_eq!(report.miss_count, 0);
    assert_eq!(report.hit_rate, 0.0);
    assert_eq!(report.active_connections, 1);
    drop(conn);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let manager = FakeManager::new();
    let result = ConnectionPool::new(manager.clone(), pool_config(3, 2)).await;
    assert!(matches!(result, Err(QuickPoolError::ValidationError { .. })));
    assert_eq!(manager.connects(), 0);
}
