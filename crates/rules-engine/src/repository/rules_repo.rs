//! 规则仓储
//!
//! ## 缓存策略
//!
//! - `rules:enabled`：启用规则的 ID 列表（JSON 数组），TTL 60 秒
//! - `rules:id:{id}`：单条规则的 JSON，TTL 300 秒
//!
//! 读取启用规则时先取 ID 列表，再并发解析各条规则缓存，未命中的 ID 合并为一次批量查询。
//! 写操作成功后删除受影响的键。缓存故障只记录日志，读失败视为未命中，写失败忽略。

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use telemetryx_shared::observability::metrics::{self, CacheOutcome};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::traits::{KeyValueCache, RuleStore};
use crate::error::Result;
use crate::models::Rule;

/// 启用规则 ID 列表的缓存键
pub const ENABLED_RULES_KEY: &str = "rules:enabled";

const DEFAULT_LIST_TTL: Duration = Duration::from_secs(60);
const DEFAULT_RULE_TTL: Duration = Duration::from_secs(300);

/// 单条规则的缓存键
pub fn rule_key(id: &Uuid) -> String {
    format!("rules:id:{}", id)
}

/// 规则仓储
pub struct RulesRepository {
    store: Arc<dyn RuleStore>,
    cache: Option<Arc<dyn KeyValueCache>>,
    list_ttl: Duration,
    rule_ttl: Duration,
}

impl RulesRepository {
    pub fn new(store: Arc<dyn RuleStore>, cache: Option<Arc<dyn KeyValueCache>>) -> Self {
        Self {
            store,
            cache,
            list_ttl: DEFAULT_LIST_TTL,
            rule_ttl: DEFAULT_RULE_TTL,
        }
    }

    pub fn with_ttls(mut self, list_ttl: Duration, rule_ttl: Duration) -> Self {
        self.list_ttl = list_ttl;
        self.rule_ttl = rule_ttl;
        self
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    // ==================== 读操作 ====================

    /// 获取全部启用规则，按优先级升序
    #[instrument(skip(self))]
    pub async fn get_enabled_rules(&self) -> Result<Vec<Rule>> {
        let mut rules = match self.cached_enabled_ids().await {
            Some(ids) => self.resolve_cached_ids(&ids).await?,
            None => {
                let rules = self.store.fetch_enabled().await?;
                self.populate_enabled(&rules).await;
                rules
            }
        };

        rules.sort_by_key(|r| r.priority);
        Ok(rules)
    }

    /// 按 ID 获取规则
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Rule>> {
        if let Some(rule) = self.cached_rule(id).await {
            return Ok(Some(rule));
        }

        let rule = self.store.fetch_by_id(id).await?;
        if let Some(rule) = &rule {
            self.cache_rule(rule).await;
        }

        Ok(rule)
    }

    /// 列表缓存命中后解析每条规则，未命中的 ID 一次性从存储补齐
    ///
    /// 结果保持缓存列表中的 ID 顺序，与各条规则缓存是否命中无关。
    async fn resolve_cached_ids(&self, ids: &[Uuid]) -> Result<Vec<Rule>> {
        let lookups = join_all(ids.iter().map(|id| self.cached_rule(*id))).await;

        let missing: Vec<Uuid> = ids
            .iter()
            .zip(&lookups)
            .filter(|(_, cached)| cached.is_none())
            .map(|(id, _)| *id)
            .collect();

        let mut fetched: HashMap<Uuid, Rule> = HashMap::new();
        if !missing.is_empty() {
            debug!(missing = missing.len(), "Fetching uncached rules from store");
            let rules = self.store.fetch_by_ids(&missing).await?;
            join_all(rules.iter().map(|rule| self.cache_rule(rule))).await;
            fetched = rules
                .into_iter()
                .filter_map(|rule| rule.id.map(|id| (id, rule)))
                .collect();
        }

        // 已删除的 ID 在存储中查不到，直接丢弃
        Ok(ids
            .iter()
            .zip(lookups)
            .filter_map(|(id, cached)| cached.or_else(|| fetched.remove(id)))
            .collect())
    }

    // ==================== 写操作 ====================

    /// 创建规则，返回带有存储分配 ID 的规则
    #[instrument(skip(self, rule), fields(name = %rule.name))]
    pub async fn create(&self, rule: &Rule) -> Result<Rule> {
        let created = self.store.insert(rule).await?;
        self.invalidate(ENABLED_RULES_KEY).await;
        Ok(created)
    }

    /// 更新规则，规则没有 ID 或不存在时返回 None
    #[instrument(skip(self, rule), fields(rule_id = ?rule.id))]
    pub async fn update(&self, rule: &Rule) -> Result<Option<Rule>> {
        let Some(id) = rule.id else {
            return Ok(None);
        };

        let updated = self.store.update(rule).await?;
        if updated.is_some() {
            self.invalidate(&rule_key(&id)).await;
            self.invalidate(ENABLED_RULES_KEY).await;
        }

        Ok(updated)
    }

    /// 删除规则，返回是否确实删除
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            self.invalidate(&rule_key(&id)).await;
            self.invalidate(ENABLED_RULES_KEY).await;
        }

        Ok(deleted)
    }

    // ==================== 缓存辅助 ====================

    async fn cached_enabled_ids(&self) -> Option<Vec<Uuid>> {
        let raw = self.cache_get(ENABLED_RULES_KEY, "enabled_list").await?;

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => Some(
                ids.iter()
                    .filter_map(|s| match Uuid::parse_str(s) {
                        Ok(id) => Some(id),
                        Err(e) => {
                            warn!(id = %s, error = %e, "Ignoring invalid cached rule id");
                            None
                        }
                    })
                    .collect(),
            ),
            Err(e) => {
                warn!(key = ENABLED_RULES_KEY, error = %e, "Cached rule list is corrupt, treating as miss");
                None
            }
        }
    }

    async fn cached_rule(&self, id: Uuid) -> Option<Rule> {
        let key = rule_key(&id);
        let raw = self.cache_get(&key, "rule").await?;

        match serde_json::from_str::<Rule>(&raw) {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached rule is corrupt, treating as miss");
                None
            }
        }
    }

    async fn populate_enabled(&self, rules: &[Rule]) {
        if self.cache.is_none() {
            return;
        }

        let ids: Vec<String> = rules
            .iter()
            .filter_map(|r| r.id.map(|id| id.to_string()))
            .collect();

        match serde_json::to_string(&ids) {
            Ok(payload) => self.cache_set(ENABLED_RULES_KEY, &payload, self.list_ttl).await,
            Err(e) => warn!(error = %e, "Failed to serialize rule id list"),
        }

        join_all(rules.iter().map(|rule| self.cache_rule(rule))).await;
    }

    async fn cache_rule(&self, rule: &Rule) {
        let Some(id) = rule.id else {
            return;
        };
        if self.cache.is_none() {
            return;
        }

        match serde_json::to_string(rule) {
            Ok(payload) => self.cache_set(&rule_key(&id), &payload, self.rule_ttl).await,
            Err(e) => warn!(rule_id = %id, error = %e, "Failed to serialize rule for cache"),
        }
    }

    async fn cache_get(&self, key: &str, kind: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;

        match cache.get(key).await {
            Ok(Some(value)) => {
                metrics::record_cache_lookup(kind, CacheOutcome::Hit);
                Some(value)
            }
            Ok(None) => {
                metrics::record_cache_lookup(kind, CacheOutcome::Miss);
                None
            }
            Err(e) => {
                metrics::record_cache_lookup(kind, CacheOutcome::Error);
                warn!(key = %key, error = %e, "Cache get failed, falling back to database");
                None
            }
        }
    }

    async fn cache_set(&self, key: &str, value: &str, ttl: Duration) {
        let Some(cache) = &self.cache else {
            return;
        };

        if let Err(e) = cache.set(key, value, ttl).await {
            warn!(key = %key, error = %e, "Cache set failed");
        }
    }

    async fn invalidate(&self, key: &str) {
        let Some(cache) = &self.cache else {
            return;
        };

        if let Err(e) = cache.delete(key).await {
            warn!(key = %key, error = %e, "Cache delete failed");
        }
    }
}
