//! 规则引擎错误类型

use thiserror::Error;
use tonic::Status;

#[derive(Debug, Error)]
pub enum RuleError {
    // ==================== 校验错误 ====================
    #[error("规则校验失败: {path}: {message}")]
    Validation { path: String, message: String },

    #[error("规则缺少 ID")]
    MissingId,

    #[error("条件嵌套过深: 深度 {depth} 超过上限 {limit}")]
    ConditionTooDeep { depth: usize, limit: usize },

    // ==================== 存储错误 ====================
    #[error("规则数据损坏: {id}: {reason}")]
    CorruptRow { id: String, reason: String },

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("缓存错误: {0}")]
    Cache(String),

    #[error("规则存储不可用")]
    StoreUnavailable,

    // ==================== 序列化错误 ====================
    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;

impl RuleError {
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// 指标标签使用的简短原因
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::MissingId => "missing_id",
            Self::ConditionTooDeep { .. } => "condition_too_deep",
            Self::CorruptRow { .. } => "corrupt_row",
            Self::Database(_) => "database",
            Self::Cache(_) => "cache",
            Self::StoreUnavailable => "store_unavailable",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<telemetryx_shared::error::TelemetryError> for RuleError {
    fn from(err: telemetryx_shared::error::TelemetryError) -> Self {
        use telemetryx_shared::error::TelemetryError;

        match err {
            TelemetryError::Database(e) => Self::Database(e),
            TelemetryError::DatabaseNotConfigured => Self::StoreUnavailable,
            TelemetryError::Serialization(e) => Self::Serialization(e),
            other => Self::Cache(other.to_string()),
        }
    }
}

impl From<RuleError> for Status {
    fn from(err: RuleError) -> Self {
        match &err {
            RuleError::Validation { .. }
            | RuleError::MissingId
            | RuleError::ConditionTooDeep { .. } => Status::invalid_argument(err.to_string()),
            RuleError::Database(_) | RuleError::StoreUnavailable => {
                Status::unavailable(err.to_string())
            }
            RuleError::CorruptRow { .. } | RuleError::Cache(_) | RuleError::Serialization(_) => {
                Status::internal(err.to_string())
            }
        }
    }
}
