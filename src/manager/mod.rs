//! 连接池管理器模块
//!
//! 按别名管理多个数据库连接池。管理器由调用者显式创建并传递，不存在进程级全局实例。

mod database_ops;
mod maintenance;
mod manager;

pub use manager::PoolManager;
