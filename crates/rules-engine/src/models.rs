//! 规则引擎领域模型
//!
//! 条件树的 JSON 形态：
//! - 比较：`{"field": "value", "op": ">", "value": 100}`
//! - 逻辑组：`{"and": [...]}` 或 `{"or": [...]}`
//! - 空节点：`{}`
//!
//! 同一个对象同时带有多种形态时，按 `and`、`or`、比较的顺序取第一个。

use crate::operators::{ActionType, Operator, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// 事件载荷，规则通过点号路径访问其中的字段
pub type Event = Value;

/// 单个字段比较
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

/// 条件树节点
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "ConditionRepr", into = "ConditionRepr")]
pub enum Condition {
    Comparison(Comparison),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    /// 空节点，求值恒为 false
    #[default]
    Empty,
}

impl Condition {
    pub fn comparison(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self::Comparison(Comparison {
            field: field.into(),
            op,
            value: value.into(),
        })
    }

    pub fn and(children: Vec<Condition>) -> Self {
        Self::And(children)
    }

    pub fn or(children: Vec<Condition>) -> Self {
        Self::Or(children)
    }

    /// 树的深度，叶子节点为 1
    pub fn depth(&self) -> usize {
        match self {
            Self::And(children) | Self::Or(children) => {
                1 + children.iter().map(Condition::depth).max().unwrap_or(0)
            }
            Self::Comparison(_) | Self::Empty => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// 条件的线上表示
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConditionRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    op: Option<Operator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    and: Option<Vec<Condition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    or: Option<Vec<Condition>>,
}

impl From<ConditionRepr> for Condition {
    fn from(repr: ConditionRepr) -> Self {
        if let Some(children) = repr.and {
            return Self::And(children);
        }
        if let Some(children) = repr.or {
            return Self::Or(children);
        }
        match (repr.field, repr.op) {
            (Some(field), Some(op)) => Self::Comparison(Comparison {
                field,
                op,
                value: repr.value.unwrap_or(Value::Null),
            }),
            _ => Self::Empty,
        }
    }
}

impl From<Condition> for ConditionRepr {
    fn from(condition: Condition) -> Self {
        match condition {
            Condition::Comparison(c) => Self {
                field: Some(c.field),
                op: Some(c.op),
                value: Some(c.value),
                ..Default::default()
            },
            Condition::And(children) => Self {
                and: Some(children),
                ..Default::default()
            },
            Condition::Or(children) => Self {
                or: Some(children),
                ..Default::default()
            },
            Condition::Empty => Self::default(),
        }
    }
}

/// 规则命中后触发的动作，配置内容原样透传
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl Action {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            config: Map::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

pub const DEFAULT_PRIORITY: u32 = 100;

fn default_enabled() -> bool {
    true
}

fn default_priority() -> u32 {
    DEFAULT_PRIORITY
}

/// 规则定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// 持久化前为空，由存储分配
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 数值越小越先评估
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub severity: Severity,
    pub condition: Condition,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Rule {
    pub fn new(name: impl Into<String>, condition: Condition) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            enabled: true,
            priority: DEFAULT_PRIORITY,
            severity: Severity::default(),
            condition,
            actions: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// 规则命中结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleMatch {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub severity: Severity,
    pub actions: Vec<Action>,
}
