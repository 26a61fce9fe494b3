//! protobuf 与领域模型之间的转换

use chrono::{DateTime, Utc};
use prost_types::value::Kind;
use serde_json::{Map, Value, json};
use telemetryx_proto as proto;
use uuid::Uuid;

use crate::error::{Result, RuleError};
use crate::models::{Action, Condition, Rule, RuleMatch};
use crate::operators::{ActionType, Severity};

// ==================== 事件 ====================

/// 将 RPC 事件展开为规则可寻址的 JSON 对象
///
/// 顶层字段直接暴露（如 `event_type`），属性位于 `attributes` 下（如 `attributes.user_id`）。
pub fn event_to_value(event: &proto::Event) -> Value {
    let attributes = event
        .attributes
        .as_ref()
        .map(struct_to_value)
        .unwrap_or_else(|| Value::Object(Map::new()));

    json!({
        "id": event.id,
        "event_type": event.event_type,
        "timestamp": event.timestamp,
        "source": event.source,
        "value": event.value,
        "attributes": attributes,
    })
}

/// 转换 protobuf Struct 到 JSON 对象
pub fn struct_to_value(proto: &prost_types::Struct) -> Value {
    let map: Map<String, Value> = proto
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), proto_value_to_json(v)))
        .collect();
    Value::Object(map)
}

/// 转换 protobuf Value 到 serde_json Value
pub fn proto_value_to_json(proto: &prost_types::Value) -> Value {
    match &proto.kind {
        Some(Kind::NullValue(_)) | None => Value::Null,
        Some(Kind::NumberValue(n)) => json!(*n),
        Some(Kind::StringValue(s)) => json!(s),
        Some(Kind::BoolValue(b)) => json!(*b),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.iter().map(proto_value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => struct_to_value(s),
    }
}

// ==================== 规则 ====================

/// 解析规则 ID，空字符串视为未设置
pub fn parse_rule_id(raw: &str, path: &str) -> Result<Option<Uuid>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    Uuid::parse_str(raw.trim())
        .map(Some)
        .map_err(|e| RuleError::validation(path, format!("无效的规则 ID: {}", e)))
}

pub fn rule_from_proto(proto: &proto::Rule) -> Result<Rule> {
    let condition: Condition = if proto.condition_json.trim().is_empty() {
        Condition::Empty
    } else {
        serde_json::from_str(&proto.condition_json).map_err(|e| {
            RuleError::validation("condition_json", format!("条件 JSON 无法解析: {}", e))
        })?
    };

    let actions = proto
        .actions
        .iter()
        .enumerate()
        .map(|(i, a)| action_from_proto(a, &format!("actions[{}]", i)))
        .collect::<Result<Vec<_>>>()?;

    Ok(Rule {
        id: parse_rule_id(&proto.id, "id")?,
        name: proto.name.clone(),
        description: proto.description.clone(),
        enabled: proto.enabled.unwrap_or(true),
        priority: proto.priority.unwrap_or(crate::models::DEFAULT_PRIORITY),
        severity: severity_from_proto(proto.severity)?,
        condition,
        actions,
        created_at: proto.created_at.as_ref().and_then(timestamp_from_proto),
        updated_at: proto.updated_at.as_ref().and_then(timestamp_from_proto),
    })
}

pub fn rule_to_proto(rule: &Rule) -> proto::Rule {
    proto::Rule {
        id: rule.id.map(|id| id.to_string()).unwrap_or_default(),
        name: rule.name.clone(),
        description: rule.description.clone(),
        enabled: Some(rule.enabled),
        priority: Some(rule.priority),
        severity: severity_to_proto(rule.severity),
        // Condition 序列化不会失败
        condition_json: serde_json::to_string(&rule.condition).unwrap_or_default(),
        actions: rule.actions.iter().map(action_to_proto).collect(),
        created_at: rule.created_at.map(timestamp_to_proto),
        updated_at: rule.updated_at.map(timestamp_to_proto),
    }
}

pub fn rule_match_to_proto(m: &RuleMatch) -> proto::RuleMatch {
    proto::RuleMatch {
        rule_id: m.rule_id.to_string(),
        rule_name: m.rule_name.clone(),
        severity: severity_to_proto(m.severity),
        actions: m.actions.iter().map(action_to_proto).collect(),
    }
}

fn action_from_proto(proto: &proto::Action, path: &str) -> Result<Action> {
    let action_type: ActionType = proto
        .action_type
        .parse()
        .map_err(|e: String| RuleError::validation(format!("{}.action_type", path), e))?;

    let config = if proto.config.trim().is_empty() {
        Map::new()
    } else {
        match serde_json::from_str::<Value>(&proto.config) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(RuleError::validation(
                    format!("{}.config", path),
                    "动作配置必须是 JSON 对象",
                ));
            }
            Err(e) => {
                return Err(RuleError::validation(
                    format!("{}.config", path),
                    format!("动作配置无法解析: {}", e),
                ));
            }
        }
    };

    Ok(Action {
        action_type,
        config,
    })
}

fn action_to_proto(action: &Action) -> proto::Action {
    proto::Action {
        action_type: action.action_type.to_string(),
        config: Value::Object(action.config.clone()).to_string(),
    }
}

fn severity_from_proto(value: i32) -> Result<Severity> {
    match proto::Severity::try_from(value) {
        Ok(proto::Severity::Info) => Ok(Severity::Info),
        Ok(proto::Severity::Warning) => Ok(Severity::Warning),
        Ok(proto::Severity::Error) => Ok(Severity::Error),
        Ok(proto::Severity::Critical) => Ok(Severity::Critical),
        Err(_) => Err(RuleError::validation(
            "severity",
            format!("未知的告警级别: {}", value),
        )),
    }
}

fn severity_to_proto(severity: Severity) -> i32 {
    match severity {
        Severity::Info => proto::Severity::Info as i32,
        Severity::Warning => proto::Severity::Warning as i32,
        Severity::Error => proto::Severity::Error as i32,
        Severity::Critical => proto::Severity::Critical as i32,
    }
}

fn timestamp_to_proto(ts: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: ts.timestamp(),
        nanos: ts.timestamp_subsec_nanos() as i32,
    }
}

fn timestamp_from_proto(ts: &prost_types::Timestamp) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.seconds, u32::try_from(ts.nanos).ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::Operator;
    use prost_types::{Struct, Value as ProtoValue};
    use std::collections::BTreeMap;

    fn string_value(s: &str) -> ProtoValue {
        ProtoValue {
            kind: Some(Kind::StringValue(s.to_string())),
        }
    }

    #[test]
    fn test_event_flattening() {
        let mut user = BTreeMap::new();
        user.insert("tier".to_string(), string_value("gold"));

        let mut fields = BTreeMap::new();
        fields.insert("user_id".to_string(), string_value("u-1"));
        fields.insert(
            "user".to_string(),
            ProtoValue {
                kind: Some(Kind::StructValue(Struct { fields: user })),
            },
        );

        let event = proto::Event {
            id: "evt-1".to_string(),
            event_type: "error".to_string(),
            timestamp: 1_700_000_000_000,
            source: "api".to_string(),
            attributes: Some(Struct { fields }),
            value: 42.5,
        };

        let value = event_to_value(&event);
        assert_eq!(value["event_type"], json!("error"));
        assert_eq!(value["timestamp"], json!(1_700_000_000_000_i64));
        assert_eq!(value["value"], json!(42.5));
        assert_eq!(value["attributes"]["user_id"], json!("u-1"));
        assert_eq!(value["attributes"]["user"]["tier"], json!("gold"));
    }

    #[test]
    fn test_event_without_attributes() {
        let value = event_to_value(&proto::Event::default());
        assert_eq!(value["attributes"], json!({}));
    }

    #[test]
    fn test_rule_from_proto_defaults() {
        let proto_rule = proto::Rule {
            name: "errors".to_string(),
            condition_json: r#"{"field": "event_type", "op": "==", "value": "error"}"#.to_string(),
            ..Default::default()
        };

        let rule = rule_from_proto(&proto_rule).unwrap();
        assert_eq!(rule.id, None);
        assert!(rule.enabled);
        assert_eq!(rule.priority, 100);
        assert_eq!(rule.severity, Severity::Info);
        assert_eq!(
            rule.condition,
            Condition::comparison("event_type", Operator::Eq, "error")
        );
    }

    #[test]
    fn test_rule_roundtrip_through_proto() {
        let rule = Rule::new("cpu", Condition::comparison("value", Operator::Gt, 90))
            .with_id(Uuid::new_v4())
            .with_priority(7)
            .with_severity(Severity::Critical)
            .with_action(Action::new(ActionType::Webhook).with_config("url", "https://hooks.local"));

        let back = rule_from_proto(&rule_to_proto(&rule)).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn test_invalid_condition_json() {
        let proto_rule = proto::Rule {
            name: "bad".to_string(),
            condition_json: "{not json".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            rule_from_proto(&proto_rule),
            Err(RuleError::Validation { path, .. }) if path == "condition_json"
        ));
    }

    #[test]
    fn test_invalid_action_config() {
        let proto_rule = proto::Rule {
            name: "bad".to_string(),
            condition_json: "{}".to_string(),
            actions: vec![
                proto::Action {
                    action_type: "log".to_string(),
                    config: String::new(),
                },
                proto::Action {
                    action_type: "alert".to_string(),
                    config: "[1, 2]".to_string(),
                },
            ],
            ..Default::default()
        };
        assert!(matches!(
            rule_from_proto(&proto_rule),
            Err(RuleError::Validation { path, .. }) if path == "actions[1].config"
        ));
    }

    #[test]
    fn test_unknown_action_type() {
        let proto_rule = proto::Rule {
            name: "bad".to_string(),
            condition_json: "{}".to_string(),
            actions: vec![proto::Action {
                action_type: "email".to_string(),
                config: String::new(),
            }],
            ..Default::default()
        };
        assert!(rule_from_proto(&proto_rule).is_err());
    }

    #[test]
    fn test_parse_rule_id() {
        assert_eq!(parse_rule_id("", "rule_id").unwrap(), None);
        assert!(parse_rule_id("not-a-uuid", "rule_id").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_rule_id(&id.to_string(), "rule_id").unwrap(), Some(id));
    }
}
