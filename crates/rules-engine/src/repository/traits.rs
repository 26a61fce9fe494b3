//! 仓储 Trait 定义
//!
//! 规则仓储依赖的存储与缓存能力，服务层依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::models::Rule;

/// 规则持久化存储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// 查询全部启用规则，按优先级升序
    async fn fetch_enabled(&self) -> Result<Vec<Rule>>;
    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<Rule>>;
    /// 批量查询，结果顺序不保证，不存在的 ID 被忽略
    async fn fetch_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Rule>>;
    /// 插入规则，返回带有存储分配 ID 与时间戳的规则
    async fn insert(&self, rule: &Rule) -> Result<Rule>;
    /// 按 ID 更新全部可变字段，规则不存在时返回 None
    async fn update(&self, rule: &Rule) -> Result<Option<Rule>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// 字符串键值缓存
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}
