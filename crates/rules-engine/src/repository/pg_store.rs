//! PostgreSQL 规则存储
//!
//! 条件与动作以 JSONB 存储，在行映射时解码。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::traits::RuleStore;
use crate::error::{Result, RuleError};
use crate::models::{Action, Condition, Rule};
use crate::operators::Severity;

const RULE_COLUMNS: &str = "id, name, description, enabled, priority, severity, condition, actions, created_at, updated_at";

/// 规则表行
#[derive(Debug, Clone, sqlx::FromRow)]
struct RuleRow {
    id: Uuid,
    name: String,
    description: String,
    enabled: bool,
    priority: i32,
    severity: String,
    condition: Value,
    actions: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RuleRow {
    fn into_rule(self) -> Result<Rule> {
        let corrupt = |reason: String| RuleError::CorruptRow {
            id: self.id.to_string(),
            reason,
        };

        let priority = u32::try_from(self.priority)
            .map_err(|_| corrupt(format!("negative priority {}", self.priority)))?;
        let severity: Severity = self.severity.parse().map_err(corrupt)?;
        let condition: Condition = serde_json::from_value(self.condition.clone())
            .map_err(|e| corrupt(format!("condition: {}", e)))?;
        let actions: Vec<Action> = serde_json::from_value(self.actions.clone())
            .map_err(|e| corrupt(format!("actions: {}", e)))?;

        Ok(Rule {
            id: Some(self.id),
            name: self.name,
            description: self.description,
            enabled: self.enabled,
            priority,
            severity,
            condition,
            actions,
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        })
    }
}

/// 列表查询中跳过无法解码的行，单行损坏不影响其他规则
fn decode_rows(rows: Vec<RuleRow>) -> Vec<Rule> {
    rows.into_iter()
        .filter_map(|row| match row.into_rule() {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(error = %e, "Skipping corrupt rule row");
                None
            }
        })
        .collect()
}

fn priority_param(rule: &Rule) -> Result<i32> {
    i32::try_from(rule.priority)
        .map_err(|_| RuleError::validation("priority", format!("优先级超出范围: {}", rule.priority)))
}

/// 规则存储
pub struct PgRuleStore {
    pool: PgPool,
}

impl PgRuleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleStore for PgRuleStore {
    #[instrument(skip(self))]
    async fn fetch_enabled(&self) -> Result<Vec<Rule>> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {} FROM rules WHERE enabled = TRUE ORDER BY priority ASC, created_at ASC, id ASC",
            RULE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_rows(rows))
    }

    #[instrument(skip(self))]
    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<Rule>> {
        let row = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {} FROM rules WHERE id = $1",
            RULE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RuleRow::into_rule).transpose()
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn fetch_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Rule>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {} FROM rules WHERE id = ANY($1) ORDER BY priority ASC, created_at ASC, id ASC",
            RULE_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_rows(rows))
    }

    #[instrument(skip(self, rule), fields(name = %rule.name))]
    async fn insert(&self, rule: &Rule) -> Result<Rule> {
        let row = sqlx::query_as::<_, RuleRow>(&format!(
            r#"
            INSERT INTO rules (name, description, enabled, priority, severity, condition, actions)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            RULE_COLUMNS
        ))
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.enabled)
        .bind(priority_param(rule)?)
        .bind(rule.severity.as_str())
        .bind(Json(&rule.condition))
        .bind(Json(&rule.actions))
        .fetch_one(&self.pool)
        .await?;

        row.into_rule()
    }

    #[instrument(skip(self, rule), fields(rule_id = ?rule.id))]
    async fn update(&self, rule: &Rule) -> Result<Option<Rule>> {
        let Some(id) = rule.id else {
            return Ok(None);
        };

        let row = sqlx::query_as::<_, RuleRow>(&format!(
            r#"
            UPDATE rules
            SET name = $2, description = $3, enabled = $4, priority = $5,
                severity = $6, condition = $7, actions = $8, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            RULE_COLUMNS
        ))
        .bind(id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.enabled)
        .bind(priority_param(rule)?)
        .bind(rule.severity.as_str())
        .bind(Json(&rule.condition))
        .bind(Json(&rule.actions))
        .fetch_optional(&self.pool)
        .await?;

        row.map(RuleRow::into_rule).transpose()
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> Result<bool> {
        let deleted: Option<Uuid> = sqlx::query_scalar("DELETE FROM rules WHERE id = $1 RETURNING id")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(deleted.is_some())
    }
}
