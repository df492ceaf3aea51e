//! 错误处理模块
//!
//! 定义连接池、后端适配器与批量操作共享的错误类型。
//! 批量操作的失败总是整体回滚，因此只有一种批量错误：`BatchRolledBack`。

use thiserror::Error;

/// 连接池统一错误类型
#[derive(Error, Debug)]
pub enum QuickPoolError {
    /// 在获取超时内没有可用连接
    #[error("连接池已耗尽: 上限 {max_connections} 个连接，已等待 {waited_ms}ms")]
    PoolExhausted { max_connections: u32, waited_ms: u64 },

    /// 连接池已关闭
    #[error("连接池已关闭")]
    PoolClosed,

    /// 后端拒绝建立新连接
    #[error("连接创建失败: {message}")]
    ConnectionCreationFailed {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// 已借出的连接在使用中断开（IO、TLS 或协议错误）
    #[error("连接错误: {message}")]
    ConnectionError {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// 存活探测失败，只在池内部使用
    #[error("健康检查失败: {message}")]
    HealthCheckFailed { message: String },

    /// 语句执行失败
    #[error("查询错误: {message}")]
    QueryError {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// 唯一性、外键、非空或检查约束被违反
    #[error("约束冲突: {message}")]
    ConstraintViolation {
        message: String,
        constraint: Option<String>,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// 批量操作失败，整批已回滚
    #[error("批量操作 {operation} 失败，已整体回滚: {source}")]
    BatchRolledBack {
        operation: String,
        #[source]
        source: Box<QuickPoolError>,
    },

    /// 按主键查询的记录不存在
    #[error("记录不存在: {table}.id = {id}")]
    NotFound { table: String, id: String },

    /// 归还的连接不属于本池或并未借出
    #[error("非法归还: {message}")]
    InvalidRelease { message: String },

    /// 数据库别名未找到
    #[error("数据库别名未找到: {alias}")]
    AliasNotFound { alias: String },

    /// 配置错误
    #[error("配置错误: {message}")]
    ConfigError { message: String },

    /// 数据验证错误
    #[error("数据验证失败: {field} - {message}")]
    ValidationError { field: String, message: String },

    /// 序列化错误
    #[error("序列化错误: {message}")]
    SerializationError { message: String },

    /// IO错误
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),
}

/// 连接池结果类型
pub type QuickPoolResult<T> = Result<T, QuickPoolError>;

impl QuickPoolError {
    /// 是否值得在退避后重试
    ///
    /// 只有池耗尽是瞬时状态，其余错误重试不会改变结果
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuickPoolError::PoolExhausted { .. })
    }

    /// 是否为约束冲突（包括被批量操作包装的约束冲突）
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            QuickPoolError::ConstraintViolation { .. } => true,
            QuickPoolError::BatchRolledBack { source, .. } => source.is_constraint_violation(),
            _ => false,
        }
    }

    /// 是否说明底层连接已不可用，归还时应标记为不健康
    pub fn is_connection_error(&self) -> bool {
        match self {
            QuickPoolError::ConnectionError { .. }
            | QuickPoolError::ConnectionCreationFailed { .. }
            | QuickPoolError::HealthCheckFailed { .. } => true,
            QuickPoolError::BatchRolledBack { source, .. } => source.is_connection_error(),
            _ => false,
        }
    }

    /// 包装为批量回滚错误
    pub fn into_batch(self, operation: &str) -> Self {
        match self {
            already @ QuickPoolError::BatchRolledBack { .. } => already,
            other => QuickPoolError::BatchRolledBack {
                operation: operation.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// 将 sqlx 错误映射为连接池错误
///
/// 约束类数据库错误映射为 `ConstraintViolation`，传输层错误映射为
/// `ConnectionError`，其余映射为 `QueryError`
pub fn map_sqlx_error(context: &str, err: sqlx::Error) -> QuickPoolError {
    use sqlx::error::ErrorKind;

    match &err {
        sqlx::Error::Database(db_err) => match db_err.kind() {
            ErrorKind::UniqueViolation
            | ErrorKind::ForeignKeyViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation => QuickPoolError::ConstraintViolation {
                message: format!("{}: {}", context, db_err.message()),
                constraint: db_err.constraint().map(str::to_string),
                source: Some(err),
            },
            _ => QuickPoolError::QueryError {
                message: format!("{}: {}", context, db_err.message()),
                source: Some(err),
            },
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => QuickPoolError::ConnectionError {
            message: format!("{}: {}", context, err),
            source: Some(err),
        },
        _ => QuickPoolError::QueryError {
            message: format!("{}: {}", context, err),
            source: Some(err),
        },
    }
}

impl From<serde_json::Error> for QuickPoolError {
    fn from(err: serde_json::Error) -> Self {
        QuickPoolError::SerializationError {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for QuickPoolError {
    fn from(err: toml::de::Error) -> Self {
        QuickPoolError::ConfigError {
            message: format!("TOML 解析失败: {}", err),
        }
    }
}

/// 快速构造常用错误的宏
#[macro_export]
macro_rules! quick_error {
    (config, $msg:expr) => {
        $crate::error::QuickPoolError::ConfigError {
            message: $msg.to_string(),
        }
    };
    (validation, $field:expr, $msg:expr) => {
        $crate::error::QuickPoolError::ValidationError {
            field: $field.to_string(),
            message: $msg.to_string(),
        }
    };
    (serialization, $msg:expr) => {
        $crate::error::QuickPoolError::SerializationError {
            message: $msg.to_string(),
        }
    };
    (query, $msg:expr) => {
        $crate::error::QuickPoolError::QueryError {
            message: $msg.to_string(),
            source: None,
        }
    };
    (connection, $msg:expr) => {
        $crate::error::QuickPoolError::ConnectionCreationFailed {
            message: $msg.to_string(),
            source: None,
        }
    };
    (health, $msg:expr) => {
        $crate::error::QuickPoolError::HealthCheckFailed {
            message: $msg.to_string(),
        }
    };
    (alias_not_found, $alias:expr) => {
        $crate::error::QuickPoolError::AliasNotFound {
            alias: $alias.to_string(),
        }
    };
    (unsupported_db, $db_type:expr) => {
        $crate::error::QuickPoolError::ConfigError {
            message: format!("不支持的数据库类型: {}", $db_type),
        }
    };
}
