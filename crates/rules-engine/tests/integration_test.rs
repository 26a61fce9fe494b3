//! 规则服务集成测试
//!
//! 通过 gRPC 服务接口走完整流程：创建规则、评估事件、更新、删除，
//! 存储与缓存使用内存实现。

use async_trait::async_trait;
use chrono::Utc;
use rules_engine::{
    KeyValueCache, Result, Rule, RuleError, RuleStore, RulesRepository, RulesServiceImpl,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use telemetryx_proto::health_check_response::ServingStatus;
use telemetryx_proto::rules_service_server::RulesService;
use telemetryx_proto::{
    Action, CreateRuleRequest, DeleteRuleRequest, EvaluateRequest, Event, GetRuleRequest,
    HealthCheckRequest, ListEnabledRulesRequest, Severity, TestRuleRequest, UpdateRuleRequest,
};
use tonic::{Code, Request};
use uuid::Uuid;

// ==================== 内存实现 ====================

#[derive(Default)]
struct MemoryStore {
    rules: Mutex<Vec<Rule>>,
    fetch_enabled_calls: AtomicUsize,
}

impl MemoryStore {
    fn fetch_enabled_calls(&self) -> usize {
        self.fetch_enabled_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn fetch_enabled(&self) -> Result<Vec<Rule>> {
        self.fetch_enabled_calls.fetch_add(1, Ordering::SeqCst);
        let mut rules: Vec<Rule> = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.enabled)
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.priority);
        Ok(rules)
    }

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<Rule>> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == Some(id))
            .cloned())
    }

    async fn fetch_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Rule>> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.id.is_some_and(|id| ids.contains(&id)))
            .cloned()
            .collect())
    }

    async fn insert(&self, rule: &Rule) -> Result<Rule> {
        let mut stored = rule.clone();
        stored.id = Some(Uuid::new_v4());
        stored.created_at = Some(Utc::now());
        stored.updated_at = stored.created_at;
        self.rules.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, rule: &Rule) -> Result<Option<Rule>> {
        let mut rules = self.rules.lock().unwrap();
        let Some(existing) = rules.iter_mut().find(|r| r.id == rule.id) else {
            return Ok(None);
        };

        let created_at = existing.created_at;
        *existing = rule.clone();
        existing.created_at = created_at;
        existing.updated_at = Some(Utc::now());
        Ok(Some(existing.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut rules = self.rules.lock().unwrap();
        let before = rules.len();
        rules.retain(|r| r.id != Some(id));
        Ok(rules.len() != before)
    }
}

#[derive(Default)]
struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, _ttl: Duration) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// 总是失败的缓存，模拟 Redis 故障
struct BrokenCache;

#[async_trait]
impl KeyValueCache for BrokenCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(RuleError::Cache("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Err(RuleError::Cache("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err(RuleError::Cache("connection refused".to_string()))
    }
}

// ==================== 辅助函数 ====================

fn service_with(store: Arc<MemoryStore>, cache: Option<Arc<dyn KeyValueCache>>) -> RulesServiceImpl {
    let repository = RulesRepository::new(store, cache);
    RulesServiceImpl::new(Some(Arc::new(repository)))
}

fn proto_rule(name: &str, priority: u32, condition: serde_json::Value) -> telemetryx_proto::Rule {
    telemetryx_proto::Rule {
        name: name.to_string(),
        priority: Some(priority),
        severity: Severity::Warning as i32,
        condition_json: condition.to_string(),
        actions: vec![Action {
            action_type: "alert".to_string(),
            config: r##"{"channel": "#ops"}"##.to_string(),
        }],
        ..Default::default()
    }
}

fn event(event_type: &str, value: f64) -> Event {
    Event {
        id: format!("evt-{}", event_type),
        event_type: event_type.to_string(),
        timestamp: 1_700_000_000_000,
        source: "integration".to_string(),
        attributes: None,
        value,
    }
}

async fn create(service: &RulesServiceImpl, rule: telemetryx_proto::Rule) -> telemetryx_proto::Rule {
    service
        .create_rule(Request::new(CreateRuleRequest { rule: Some(rule) }))
        .await
        .unwrap()
        .into_inner()
        .rule
        .unwrap()
}

async fn evaluate(service: &RulesServiceImpl, event: Event) -> Vec<String> {
    service
        .evaluate_event(Request::new(EvaluateRequest { event: Some(event) }))
        .await
        .unwrap()
        .into_inner()
        .matches
        .into_iter()
        .map(|m| m.rule_name)
        .collect()
}

// ==================== 测试 ====================

#[tokio::test]
async fn test_rule_lifecycle() {
    let store = Arc::new(MemoryStore::default());
    let service = service_with(store.clone(), Some(Arc::new(MemoryCache::default())));

    let high_value = create(
        &service,
        proto_rule("high_value", 50, json!({"field": "value", "op": ">", "value": 100})),
    )
    .await;
    assert!(!high_value.id.is_empty());
    assert!(high_value.created_at.is_some());

    create(
        &service,
        proto_rule("errors", 10, json!({"field": "event_type", "op": "==", "value": "error"})),
    )
    .await;

    // 按优先级排列
    assert_eq!(evaluate(&service, event("error", 150.0)).await, vec!["errors", "high_value"]);
    assert_eq!(evaluate(&service, event("metric", 150.0)).await, vec!["high_value"]);

    // 禁用后不再命中
    let mut disabled = high_value.clone();
    disabled.enabled = Some(false);
    service
        .update_rule(Request::new(UpdateRuleRequest { rule: Some(disabled) }))
        .await
        .unwrap();
    assert!(evaluate(&service, event("metric", 150.0)).await.is_empty());

    // 删除
    let deleted = service
        .delete_rule(Request::new(DeleteRuleRequest {
            rule_id: high_value.id.clone(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(deleted.deleted);

    let missing = service
        .get_rule(Request::new(GetRuleRequest {
            rule_id: high_value.id,
        }))
        .await
        .unwrap_err();
    assert_eq!(missing.code(), Code::NotFound);
}

#[tokio::test]
async fn test_enabled_rules_are_served_from_cache() {
    let store = Arc::new(MemoryStore::default());
    let service = service_with(store.clone(), Some(Arc::new(MemoryCache::default())));

    create(
        &service,
        proto_rule("errors", 10, json!({"field": "event_type", "op": "==", "value": "error"})),
    )
    .await;

    evaluate(&service, event("error", 1.0)).await;
    evaluate(&service, event("error", 1.0)).await;
    evaluate(&service, event("error", 1.0)).await;
    assert_eq!(store.fetch_enabled_calls(), 1);

    // 写入使列表缓存失效
    create(
        &service,
        proto_rule("big", 20, json!({"field": "value", "op": ">=", "value": 10})),
    )
    .await;
    assert_eq!(evaluate(&service, event("error", 10.0)).await, vec!["errors", "big"]);
    assert_eq!(store.fetch_enabled_calls(), 2);
}

#[tokio::test]
async fn test_update_is_visible_immediately() {
    let store = Arc::new(MemoryStore::default());
    let service = service_with(store, Some(Arc::new(MemoryCache::default())));

    let mut rule = create(
        &service,
        proto_rule("threshold", 1, json!({"field": "value", "op": ">", "value": 100})),
    )
    .await;

    // 预热单条缓存
    service
        .get_rule(Request::new(GetRuleRequest {
            rule_id: rule.id.clone(),
        }))
        .await
        .unwrap();

    rule.condition_json = json!({"field": "value", "op": ">", "value": 10}).to_string();
    service
        .update_rule(Request::new(UpdateRuleRequest {
            rule: Some(rule.clone()),
        }))
        .await
        .unwrap();

    let fetched = service
        .get_rule(Request::new(GetRuleRequest {
            rule_id: rule.id.clone(),
        }))
        .await
        .unwrap()
        .into_inner()
        .rule
        .unwrap();
    assert_eq!(fetched.condition_json, rule.condition_json);
    assert_eq!(evaluate(&service, event("metric", 50.0)).await, vec!["threshold"]);
}

#[tokio::test]
async fn test_broken_cache_falls_back_to_store() {
    let store = Arc::new(MemoryStore::default());
    let service = service_with(store.clone(), Some(Arc::new(BrokenCache)));

    create(
        &service,
        proto_rule("errors", 1, json!({"field": "event_type", "op": "==", "value": "error"})),
    )
    .await;

    assert_eq!(evaluate(&service, event("error", 0.0)).await, vec!["errors"]);
    assert_eq!(evaluate(&service, event("error", 0.0)).await, vec!["errors"]);
    assert_eq!(store.fetch_enabled_calls(), 2);
}

#[tokio::test]
async fn test_invalid_rules_rejected() {
    let service = service_with(Arc::new(MemoryStore::default()), None);

    let cases = vec![
        proto_rule("", 1, json!({"field": "a", "op": "==", "value": 1})),
        proto_rule("empty", 1, json!({})),
        proto_rule("empty_group", 1, json!({"and": []})),
        proto_rule("bad_regex", 1, json!({"field": "a", "op": "regex", "value": "[x"})),
        proto_rule("bad_in", 1, json!({"field": "a", "op": "in", "value": "x"})),
        telemetryx_proto::Rule {
            name: "bad_json".to_string(),
            condition_json: "{oops".to_string(),
            ..Default::default()
        },
    ];

    for rule in cases {
        let name = rule.name.clone();
        let status = service
            .create_rule(Request::new(CreateRuleRequest { rule: Some(rule) }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument, "rule {:?}", name);
    }
}

#[tokio::test]
async fn test_update_unknown_rule_is_not_found() {
    let service = service_with(Arc::new(MemoryStore::default()), None);

    let mut rule = proto_rule("ghost", 1, json!({"field": "a", "op": "==", "value": 1}));
    rule.id = Uuid::new_v4().to_string();

    let status = service
        .update_rule(Request::new(UpdateRuleRequest { rule: Some(rule) }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn test_delete_unknown_rule_returns_false() {
    let service = service_with(Arc::new(MemoryStore::default()), None);

    let response = service
        .delete_rule(Request::new(DeleteRuleRequest {
            rule_id: Uuid::new_v4().to_string(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(!response.deleted);
}

#[tokio::test]
async fn test_list_enabled_rules() {
    let service = service_with(Arc::new(MemoryStore::default()), Some(Arc::new(MemoryCache::default())));

    create(&service, proto_rule("b", 20, json!({"field": "a", "op": "==", "value": 1}))).await;
    create(&service, proto_rule("a", 10, json!({"field": "a", "op": "==", "value": 1}))).await;
    let mut off = proto_rule("off", 5, json!({"field": "a", "op": "==", "value": 1}));
    off.enabled = Some(false);
    create(&service, off).await;

    let rules = service
        .list_enabled_rules(Request::new(ListEnabledRulesRequest {}))
        .await
        .unwrap()
        .into_inner()
        .rules;
    let names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[tokio::test]
async fn test_test_rule_does_not_persist() {
    let store = Arc::new(MemoryStore::default());
    let service = service_with(store.clone(), None);

    let response = service
        .test_rule(Request::new(TestRuleRequest {
            rule: Some(proto_rule(
                "dry_run",
                1,
                json!({"or": [
                    {"field": "event_type", "op": "==", "value": "error"},
                    {"field": "value", "op": ">", "value": 1000}
                ]}),
            )),
            event: Some(event("error", 1.0)),
        }))
        .await
        .unwrap()
        .into_inner();

    assert!(response.matched);
    let rule_match = response.r#match.unwrap();
    assert_eq!(rule_match.rule_name, "dry_run");
    assert_eq!(rule_match.severity, Severity::Warning as i32);
    assert!(response.skipped_reason.is_empty());
    assert!(store.rules.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_degraded_mode_without_store() {
    let service = RulesServiceImpl::new(None);

    assert!(evaluate(&service, event("error", 1.0)).await.is_empty());

    let status = service
        .create_rule(Request::new(CreateRuleRequest {
            rule: Some(proto_rule("x", 1, json!({"field": "a", "op": "==", "value": 1}))),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);

    let status = service
        .list_enabled_rules(Request::new(ListEnabledRulesRequest {}))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);

    let health = service
        .health_check(Request::new(HealthCheckRequest::default()))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(health.status, ServingStatus::Serving as i32);
}

#[tokio::test]
async fn test_evaluate_requires_event() {
    let service = RulesServiceImpl::new(None);
    let status = service
        .evaluate_event(Request::new(EvaluateRequest { event: None }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_invalid_rule_id_rejected() {
    let service = service_with(Arc::new(MemoryStore::default()), None);
    let status = service
        .get_rule(Request::new(GetRuleRequest {
            rule_id: "not-a-uuid".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}
