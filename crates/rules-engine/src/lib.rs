//! TelemetryX 规则引擎
//!
//! 提供事件规则评估能力，支持：
//! - JSON 条件 DSL（比较 + 嵌套 AND/OR）
//! - 按优先级评估规则，单条规则失败不影响其他规则
//! - PostgreSQL 存储 + Redis cache-aside 缓存
//! - gRPC 服务接口

pub mod context;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod grpc;
pub mod models;
pub mod operators;
pub mod repository;
pub mod validator;

pub use context::AppContext;
pub use engine::{MAX_CONDITION_DEPTH, RuleEvaluation, RuleOutcome, RulesEngine};
pub use error::{Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use grpc::{AnalyticsServiceImpl, RulesServiceImpl};
pub use models::{Action, Comparison, Condition, Event, Rule, RuleMatch};
pub use operators::{ActionType, Operator, Severity};
pub use repository::{KeyValueCache, PgRuleStore, RuleStore, RulesRepository};
pub use validator::RuleValidator;
