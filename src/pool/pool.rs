//! 连接池核心
//!
//! 空闲队列、借出集合、等待队列和容量计数由同一把锁保护，锁内只做列表操作，
//! 建连、探测和关闭连接都在锁外进行。空闲连接按 LIFO 复用，等待者按 FIFO 唤醒。

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rat_logger::{debug, info, warn};
use tokio::sync::{Notify, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use super::health::HealthMonitor;
use super::manager::ConnectionManager;
use super::metrics::{PoolGauges, PoolMetrics, PoolMetricsReport};
use super::types::{ConnectionId, ConnectionSink, ManagedConnection, PooledConnection};
use crate::debug_log;
use crate::error::{QuickPoolError, QuickPoolResult};
use crate::types::{DatabaseType, PoolConfig};

/// 交给等待者的东西：一个现成的连接，或一个可用于新建连接的槽位
pub(crate) enum Handoff<C> {
    Connection(ManagedConnection<C>),
    Slot,
}

pub(crate) struct PoolState<C> {
    /// 空闲连接，尾部是最近归还的
    pub(crate) idle: VecDeque<ManagedConnection<C>>,
    /// 已借出（或已交给等待者）的连接ID
    pub(crate) active: HashSet<ConnectionId>,
    /// 空闲、借出、探测中和正在建立的连接总数，不超过 max_connections
    pub(crate) total: u32,
    /// 正在被健康检查探测的连接数
    pub(crate) probing: u32,
    pub(crate) waiters: VecDeque<oneshot::Sender<Handoff<C>>>,
    pub(crate) closed: bool,
}

impl<C> PoolState<C> {
    fn new() -> Self {
        Self {
            idle: VecDeque::new(),
            active: HashSet::new(),
            total: 0,
            probing: 0,
            waiters: VecDeque::new(),
            closed: false,
        }
    }

    /// 交给最早的存活等待者；没有等待者时原样返回
    fn offer(&mut self, mut handoff: Handoff<C>) -> Option<Handoff<C>> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.send(handoff) {
                Ok(()) => return None,
                Err(returned) => handoff = returned,
            }
        }
        Some(handoff)
    }

    /// 放回一个可用连接：优先交给等待者，否则压入空闲队列尾部
    pub(crate) fn put_back(&mut self, conn: ManagedConnection<C>) {
        let id = conn.id;
        self.active.insert(id);
        if let Some(Handoff::Connection(conn)) = self.offer(Handoff::Connection(conn)) {
            self.active.remove(&id);
            self.idle.push_back(conn);
        }
    }

    /// 释放一个容量单位：池未关闭时转交给等待者新建连接，否则总数减一
    pub(crate) fn release_slot(&mut self) {
        if !self.closed && self.offer(Handoff::Slot).is_none() {
            return;
        }
        self.total = self.total.saturating_sub(1);
    }

    fn gauges(&self) -> PoolGauges {
        PoolGauges {
            active: self.active.len() as u32,
            idle: self.idle.len() as u32,
            total: self.total,
        }
    }
}

pub(crate) struct PoolShared<M: ConnectionManager> {
    pub(crate) id: Uuid,
    pub(crate) manager: Arc<M>,
    pub(crate) config: PoolConfig,
    pub(crate) state: Mutex<PoolState<M::Connection>>,
    pub(crate) metrics: PoolMetrics,
    next_id: AtomicU64,
    /// 关闭后连接总数归零时通知
    drained: Notify,
    monitor: Mutex<Option<HealthMonitor>>,
}

impl<M: ConnectionManager> PoolShared<M> {
    pub(crate) fn next_connection_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn notify_if_drained(&self, state: &PoolState<M::Connection>) {
        if state.closed && state.total == 0 {
            self.drained.notify_waiters();
        }
    }

    /// 在锁外逐个关闭连接
    pub(crate) async fn close_all(&self, conns: Vec<M::Connection>, reason: &str) {
        if conns.is_empty() {
            return;
        }
        debug!("关闭 {} 个连接: 原因={}", conns.len(), reason);
        self.metrics.record_closed(conns.len() as u64);
        for conn in conns {
            self.manager.close(conn).await;
        }
    }

    /// 从同步上下文关闭连接：有运行时则派生任务关闭，否则直接丢弃
    pub(crate) fn spawn_close(&self, conns: Vec<M::Connection>, reason: &'static str) {
        if conns.is_empty() {
            return;
        }
        debug_log!("异步关闭 {} 个连接: 原因={}", conns.len(), reason);
        self.metrics.record_closed(conns.len() as u64);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let manager = self.manager.clone();
                handle.spawn(async move {
                    for conn in conns {
                        manager.close(conn).await;
                    }
                });
            }
            Err(_) => drop(conns),
        }
    }

    /// 收回一个已交出但没有被等待者取走的交接物
    fn reclaim(&self, handoff: Handoff<M::Connection>) {
        let mut state = self.state.lock();
        match handoff {
            Handoff::Connection(conn) => {
                state.active.remove(&conn.id);
                if state.closed {
                    state.total = state.total.saturating_sub(1);
                    self.notify_if_drained(&state);
                    drop(state);
                    self.spawn_close(vec![conn.native], "shutdown");
                } else {
                    state.put_back(conn);
                }
            }
            Handoff::Slot => {
                state.release_slot();
                self.notify_if_drained(&state);
            }
        }
    }
}

impl<M: ConnectionManager> ConnectionSink<M::Connection> for PoolShared<M> {
    fn checkin(&self, mut conn: ManagedConnection<M::Connection>) -> QuickPoolResult<()> {
        let mut state = self.state.lock();
        if !state.active.remove(&conn.id) {
            return Err(QuickPoolError::InvalidRelease {
                message: format!("连接 {} 未处于借出状态", conn.id),
            });
        }

        // 借出时长不计入空闲时间，空闲超时只由健康检查回收
        let close_reason = if state.closed {
            Some("shutdown")
        } else if !conn.healthy {
            Some("unhealthy")
        } else {
            None
        };
        conn.check_in();

        match close_reason {
            None => {
                state.put_back(conn);
                Ok(())
            }
            Some(reason) => {
                state.release_slot();
                self.notify_if_drained(&state);
                drop(state);
                debug_log!("归还时关闭连接: id={}, 原因={}", conn.id, reason);
                self.spawn_close(vec![conn.native], reason);
                Ok(())
            }
        }
    }
}

/// 正在建立的连接占用的槽位，未提交就被丢弃时归还容量
struct SlotGuard<M: ConnectionManager> {
    shared: Arc<PoolShared<M>>,
    committed: bool,
}

impl<M: ConnectionManager> SlotGuard<M> {
    fn new(shared: Arc<PoolShared<M>>) -> Self {
        Self {
            shared,
            committed: false,
        }
    }

    /// 槽位已由新连接占用
    fn commit(mut self) {
        self.committed = true;
    }
}

impl<M: ConnectionManager> Drop for SlotGuard<M> {
    fn drop(&mut self) {
        if !self.committed {
            let mut state = self.shared.state.lock();
            state.release_slot();
            self.shared.notify_if_drained(&state);
        }
    }
}

/// 排队中的获取请求
///
/// 超时或被取消时关闭接收端，并收回与超时竞争中已经送达的交接物，
/// 保证调用者在超时之后不会拿到连接。
struct Waiter<M: ConnectionManager> {
    rx: Option<oneshot::Receiver<Handoff<M::Connection>>>,
    shared: Arc<PoolShared<M>>,
}

impl<M: ConnectionManager> Waiter<M> {
    async fn recv(&mut self) -> Option<Handoff<M::Connection>> {
        let rx = self.rx.as_mut()?;
        let received = rx.await.ok();
        self.rx = None;
        received
    }
}

impl<M: ConnectionManager> Drop for Waiter<M> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if let Ok(handoff) = rx.try_recv() {
                self.shared.reclaim(handoff);
            }
        }
    }
}

enum AcquireStep<C> {
    Ready(ManagedConnection<C>),
    Create,
    Wait(oneshot::Receiver<Handoff<C>>),
}

/// 连接池状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub active: u32,
    pub idle: u32,
    pub probing: u32,
    pub total: u32,
    pub waiting: u32,
    pub closed: bool,
}

/// 通用连接池
///
/// 由 `ConnectionManager` 决定连接的建立与探测方式。克隆得到的句柄共享同一个池。
pub struct ConnectionPool<M: ConnectionManager> {
    pub(crate) shared: Arc<PoolShared<M>>,
}

impl<M: ConnectionManager> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<M: ConnectionManager> ConnectionPool<M> {
    /// 创建连接池：校验配置，预热 `min_connections` 个连接，并启动健康检查任务
    pub async fn new(manager: M, config: PoolConfig) -> QuickPoolResult<Self> {
        config.validate()?;

        let shared = Arc::new(PoolShared {
            id: Uuid::new_v4(),
            manager: Arc::new(manager),
            metrics: PoolMetrics::new(config.metrics_enabled),
            config,
            state: Mutex::new(PoolState::new()),
            next_id: AtomicU64::new(1),
            drained: Notify::new(),
            monitor: Mutex::new(None),
        });
        let pool = Self { shared };

        info!(
            "创建连接池: 类型={}, 最小连接数={}, 最大连接数={}",
            pool.database_type(),
            pool.shared.config.min_connections,
            pool.shared.config.max_connections
        );

        if let Err(e) = pool.prewarm().await {
            pool.shutdown().await;
            return Err(e);
        }

        let monitor = HealthMonitor::start(&pool);
        *pool.shared.monitor.lock() = Some(monitor);
        Ok(pool)
    }

    async fn prewarm(&self) -> QuickPoolResult<()> {
        let shared = &self.shared;
        for _ in 0..shared.config.min_connections {
            let native = shared.manager.connect().await?;
            let conn = ManagedConnection::new(shared.next_connection_id(), native);
            shared.metrics.record_created();
            let mut state = shared.state.lock();
            state.total += 1;
            state.idle.push_back(conn);
        }
        info!("连接池预热完成: {} 个连接", shared.config.min_connections);
        Ok(())
    }

    /// 使用配置的 `acquire_timeout` 获取连接
    pub async fn acquire(&self) -> QuickPoolResult<PooledConnection<M::Connection>> {
        self.acquire_timeout(self.shared.config.acquire_timeout).await
    }

    /// 获取连接，最多等待 `timeout`
    ///
    /// 优先复用最近归还的空闲连接；没有空闲连接且未达上限时新建；
    /// 否则排队等待归还，超时返回 `PoolExhausted`。
    pub async fn acquire_timeout(
        &self,
        timeout: Duration,
    ) -> QuickPoolResult<PooledConnection<M::Connection>> {
        let started = Instant::now();
        let result = self.acquire_until(started, started + timeout).await;
        match &result {
            Ok(_) => self.shared.metrics.record_acquire(started.elapsed()),
            Err(QuickPoolError::PoolExhausted { waited_ms, .. }) => {
                self.shared.metrics.record_timeout();
                warn!("获取连接超时: 已等待 {}ms", waited_ms);
            }
            Err(_) => {}
        }
        result
    }

    async fn acquire_until(
        &self,
        started: Instant,
        deadline: Instant,
    ) -> QuickPoolResult<PooledConnection<M::Connection>> {
        let shared = &self.shared;
        let step = {
            let mut state = shared.state.lock();
            if state.closed {
                return Err(QuickPoolError::PoolClosed);
            }
            if let Some(conn) = state.idle.pop_back() {
                state.active.insert(conn.id);
                AcquireStep::Ready(conn)
            } else if state.total < shared.config.max_connections {
                state.total += 1;
                AcquireStep::Create
            } else {
                state.waiters.retain(|waiter| !waiter.is_closed());
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                AcquireStep::Wait(rx)
            }
        };

        match step {
            AcquireStep::Ready(conn) => {
                shared.metrics.record_hit();
                Ok(self.lend(conn))
            }
            AcquireStep::Create => {
                let slot = SlotGuard::new(shared.clone());
                shared.metrics.record_miss();
                self.open_connection(slot, started, deadline).await
            }
            AcquireStep::Wait(rx) => {
                let mut waiter = Waiter {
                    rx: Some(rx),
                    shared: shared.clone(),
                };
                match tokio::time::timeout_at(deadline, waiter.recv()).await {
                    Ok(Some(Handoff::Connection(conn))) => {
                        shared.metrics.record_hit();
                        Ok(self.lend(conn))
                    }
                    Ok(Some(Handoff::Slot)) => {
                        let slot = SlotGuard::new(shared.clone());
                        shared.metrics.record_miss();
                        self.open_connection(slot, started, deadline).await
                    }
                    // 等待队列在关闭时被清空
                    Ok(None) => Err(QuickPoolError::PoolClosed),
                    Err(_) => {
                        drop(waiter);
                        Err(QuickPoolError::PoolExhausted {
                            max_connections: shared.config.max_connections,
                            waited_ms: started.elapsed().as_millis() as u64,
                        })
                    }
                }
            }
        }
    }

    /// 在已占用的槽位上建立新连接
    ///
    /// 建连同样受获取截止时间约束，超时后槽位归还并返回 `PoolExhausted`。
    async fn open_connection(
        &self,
        slot: SlotGuard<M>,
        started: Instant,
        deadline: Instant,
    ) -> QuickPoolResult<PooledConnection<M::Connection>> {
        let shared = &self.shared;
        let native = match tokio::time::timeout_at(deadline, shared.manager.connect()).await {
            Ok(result) => result?,
            Err(_) => {
                drop(slot);
                warn!("建立连接超过获取截止时间");
                return Err(QuickPoolError::PoolExhausted {
                    max_connections: shared.config.max_connections,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
        };
        let conn = ManagedConnection::new(shared.next_connection_id(), native);
        shared.metrics.record_created();
        debug_log!("新建连接: id={}", conn.id);

        let accepted = {
            let mut state = shared.state.lock();
            if state.closed {
                false
            } else {
                state.active.insert(conn.id);
                true
            }
        };

        if accepted {
            slot.commit();
            Ok(self.lend(conn))
        } else {
            drop(slot);
            shared.spawn_close(vec![conn.native], "shutdown");
            Err(QuickPoolError::PoolClosed)
        }
    }

    fn lend(&self, mut conn: ManagedConnection<M::Connection>) -> PooledConnection<M::Connection> {
        conn.check_out();
        let in_use = self.shared.state.lock().active.len();
        self.shared.metrics.observe_in_use(in_use);
        debug_log!("借出连接: id={}, 使用次数={}", conn.id, conn.use_count);
        let sink: Arc<dyn ConnectionSink<M::Connection>> = self.shared.clone();
        PooledConnection::new(conn, sink, self.shared.id)
    }

    /// 归还连接
    ///
    /// 不会挂起。连接不属于本池时返回 `InvalidRelease`（该连接仍会回到它自己的池）。
    pub fn release(&self, conn: PooledConnection<M::Connection>) -> QuickPoolResult<()> {
        if conn.pool_id() != self.shared.id {
            return Err(QuickPoolError::InvalidRelease {
                message: format!("连接 {} 不属于连接池 {}", conn.id(), self.shared.id),
            });
        }
        conn.release()
    }

    /// 关闭连接池
    ///
    /// 关闭所有空闲连接并停止健康检查，此后的获取请求立即失败；
    /// 最多等待 `acquire_timeout` 让借出的连接归还，归还的连接随即关闭。
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        let (idle, waiters) = {
            let mut state = shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let idle: Vec<_> = state.idle.drain(..).map(|conn| conn.native).collect();
            state.total = state.total.saturating_sub(idle.len() as u32);
            let waiters = std::mem::take(&mut state.waiters);
            (idle, waiters)
        };
        info!("开始关闭连接池: 类型={}, 空闲连接={}", self.database_type(), idle.len());

        // 丢弃发送端，排队中的获取请求收到 PoolClosed
        drop(waiters);

        let monitor = shared.monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }

        shared.close_all(idle, "shutdown").await;

        let deadline = Instant::now() + shared.config.acquire_timeout;
        loop {
            let drained = shared.drained.notified();
            let remaining = {
                let state = shared.state.lock();
                shared.notify_if_drained(&state);
                state.total
            };
            if remaining == 0 {
                break;
            }
            if tokio::time::timeout_at(deadline, drained).await.is_err() {
                warn!("等待借出连接归还超时，仍有 {} 个连接未归还", remaining);
                break;
            }
        }
        info!("连接池已关闭: 类型={}", self.database_type());
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn database_type(&self) -> DatabaseType {
        self.shared.manager.database_type()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// 后台健康检查任务是否仍在运行
    pub fn health_monitor_running(&self) -> bool {
        self.shared
            .monitor
            .lock()
            .as_ref()
            .is_some_and(HealthMonitor::is_running)
    }

    /// 当前状态快照
    pub fn status(&self) -> PoolStatus {
        let state = self.shared.state.lock();
        PoolStatus {
            active: state.active.len() as u32,
            idle: state.idle.len() as u32,
            probing: state.probing,
            total: state.total,
            waiting: state.waiters.iter().filter(|w| !w.is_closed()).count() as u32,
            closed: state.closed,
        }
    }

    /// 指标报告
    pub fn metrics(&self) -> PoolMetricsReport {
        let gauges = self.shared.state.lock().gauges();
        self.shared
            .metrics
            .report(self.database_type().as_str(), gauges)
    }

    /// 底层指标对象
    pub fn raw_metrics(&self) -> &PoolMetrics {
        &self.shared.metrics
    }
}
