//! 连接池类型定义模块

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use uuid::Uuid;

use crate::error::QuickPoolResult;
use crate::types::DatabaseType;

/// 连接ID，在单个连接池实例内唯一
pub type ConnectionId = u64;

/// 原生数据库连接
pub enum DatabaseConnection {
    /// SQLite 连接
    SQLite(sqlx::SqliteConnection),
    /// PostgreSQL 连接
    PostgreSQL(sqlx::PgConnection),
}

impl DatabaseConnection {
    /// 连接对应的数据库类型
    pub fn database_type(&self) -> DatabaseType {
        match self {
            DatabaseConnection::SQLite(_) => DatabaseType::SQLite,
            DatabaseConnection::PostgreSQL(_) => DatabaseType::PostgreSQL,
        }
    }
}

impl std::fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DatabaseConnection::{}", self.database_type())
    }
}

/// 受池管理的连接：原生句柄加簿记元数据
///
/// 在任一时刻，它要么位于池的空闲队列中，要么借给唯一的调用者
#[derive(Debug)]
pub struct ManagedConnection<C> {
    pub(crate) id: ConnectionId,
    pub(crate) native: C,
    pub(crate) created_at: Instant,
    pub(crate) last_used_at: Instant,
    pub(crate) in_use: bool,
    pub(crate) healthy: bool,
    pub(crate) use_count: u64,
}

impl<C> ManagedConnection<C> {
    pub(crate) fn new(id: ConnectionId, native: C) -> Self {
        let now = Instant::now();
        Self {
            id,
            native,
            created_at: now,
            last_used_at: now,
            in_use: false,
            healthy: true,
            use_count: 0,
        }
    }

    /// 标记为借出
    pub(crate) fn check_out(&mut self) {
        self.in_use = true;
        self.last_used_at = Instant::now();
        self.use_count += 1;
    }

    /// 标记为归还
    pub(crate) fn check_in(&mut self) {
        self.in_use = false;
        self.last_used_at = Instant::now();
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    pub fn in_use(&self) -> bool {
        self.in_use
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    /// 距上次使用经过的时间
    pub fn idle_for(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    pub fn native(&self) -> &C {
        &self.native
    }

    pub fn native_mut(&mut self) -> &mut C {
        &mut self.native
    }
}

/// 连接归还目标，由连接池实现
pub(crate) trait ConnectionSink<C>: Send + Sync {
    fn checkin(&self, conn: ManagedConnection<C>) -> QuickPoolResult<()>;
}

/// 借出的连接
///
/// 通过 `Deref`/`DerefMut` 访问原生句柄。显式调用 `ConnectionPool::release`
/// 或直接 drop 都会把连接归还给池，任何退出路径都不会泄漏连接槽位。
pub struct PooledConnection<C: Send + 'static> {
    conn: Option<ManagedConnection<C>>,
    sink: Arc<dyn ConnectionSink<C>>,
    pool_id: Uuid,
}

impl<C: Send + 'static> PooledConnection<C> {
    pub(crate) fn new(
        conn: ManagedConnection<C>,
        sink: Arc<dyn ConnectionSink<C>>,
        pool_id: Uuid,
    ) -> Self {
        Self {
            conn: Some(conn),
            sink,
            pool_id,
        }
    }

    /// 连接ID
    pub fn id(&self) -> ConnectionId {
        self.managed().id
    }

    /// 所属连接池实例的ID
    pub fn pool_id(&self) -> Uuid {
        self.pool_id
    }

    /// 连接被借出的次数（包括本次）
    pub fn use_count(&self) -> u64 {
        self.managed().use_count
    }

    /// 连接创建时间
    pub fn created_at(&self) -> Instant {
        self.managed().created_at
    }

    /// 标记连接不可用，归还时池会关闭它而不是放回空闲队列
    pub fn mark_unhealthy(&mut self) {
        self.managed_mut().healthy = false;
    }

    pub fn is_healthy(&self) -> bool {
        self.managed().healthy
    }

    /// 立即归还连接
    pub fn release(mut self) -> QuickPoolResult<()> {
        match self.conn.take() {
            Some(conn) => self.sink.checkin(conn),
            None => Ok(()),
        }
    }

    // conn 只在 release(self) 与 Drop 中被取走，二者都结束了守卫的生命周期，
    // 因此守卫可被访问时 conn 一定存在
    fn managed(&self) -> &ManagedConnection<C> {
        self.conn
            .as_ref()
            .expect("借出的连接在归还前始终存在")
    }

    fn managed_mut(&mut self) -> &mut ManagedConnection<C> {
        self.conn
            .as_mut()
            .expect("借出的连接在归还前始终存在")
    }
}

impl<C: Send + 'static> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.managed().native
    }
}

impl<C: Send + 'static> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.managed_mut().native
    }
}

impl<C: Send + 'static> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = self.sink.checkin(conn) {
                rat_logger::error!("连接自动归还失败: {}", e);
            }
        }
    }
}

impl<C: Send + 'static> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.conn.as_ref().map(|c| c.id))
            .field("pool_id", &self.pool_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        returned: Mutex<Vec<(ConnectionId, bool, u32)>>,
    }

    impl ConnectionSink<u32> for RecordingSink {
        fn checkin(&self, conn: ManagedConnection<u32>) -> QuickPoolResult<()> {
            self.returned.lock().push((conn.id, conn.healthy, conn.native));
            Ok(())
        }
    }

    fn lend(sink: &Arc<RecordingSink>, id: ConnectionId) -> PooledConnection<u32> {
        let mut conn = ManagedConnection::new(id, 0);
        conn.check_out();
        let sink: Arc<dyn ConnectionSink<u32>> = sink.clone();
        PooledConnection::new(conn, sink, Uuid::nil())
    }

    #[tokio::test]
    async fn test_guard_accessors_until_release() {
        let sink = Arc::new(RecordingSink::default());
        let mut guard = lend(&sink, 7);

        *guard += 41;
        guard.mark_unhealthy();
        assert_eq!(guard.id(), 7);
        assert_eq!(*guard, 41);
        assert_eq!(guard.use_count(), 1);
        assert!(!guard.is_healthy());
        assert!(sink.returned.lock().is_empty());

        guard.release().unwrap();
        assert_eq!(*sink.returned.lock(), vec![(7, false, 41)]);
    }

    #[tokio::test]
    async fn test_guard_returns_once_on_drop() {
        let sink = Arc::new(RecordingSink::default());
        {
            let _guard = lend(&sink, 3);
        }
        assert_eq!(*sink.returned.lock(), vec![(3, true, 0)]);
    }
}
