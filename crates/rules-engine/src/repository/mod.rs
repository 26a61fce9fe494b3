//! 规则仓储层
//!
//! `RulesRepository` 在关系型存储前面做 cache-aside 缓存，
//! 存储与缓存通过 trait 注入，便于替换和测试。

mod pg_store;
mod redis_cache;
mod rules_repo;
mod traits;

pub use pg_store::PgRuleStore;
pub use rules_repo::{ENABLED_RULES_KEY, RulesRepository, rule_key};
pub use traits::{KeyValueCache, RuleStore};

#[cfg(test)]
pub use traits::{MockKeyValueCache, MockRuleStore};
