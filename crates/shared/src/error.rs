//! 统一错误处理模块
//!
//! 定义基础设施层（数据库、缓存、配置）共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum TelemetryError {
    // ==================== 存储错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库未配置")]
    DatabaseNotConfigured,

    // ==================== 缓存错误 ====================
    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("缓存未配置")]
    CacheNotConfigured,

    // ==================== 配置错误 ====================
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    // ==================== 序列化错误 ====================
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, TelemetryError>;

impl TelemetryError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::DatabaseNotConfigured => "DATABASE_NOT_CONFIGURED",
            Self::Redis(_) => "REDIS_ERROR",
            Self::CacheNotConfigured => "CACHE_NOT_CONFIGURED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// 是否为可重试错误（连接类故障）
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Redis(_))
    }
}
