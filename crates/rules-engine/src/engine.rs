//! 规则引擎
//!
//! 针对单个事件按优先级评估一组规则。单条规则出错时记录为跳过，
//! 不影响其余规则的评估。

use crate::error::RuleError;
use crate::evaluator::ConditionEvaluator;
use crate::models::{Event, Rule, RuleMatch};
use std::time::Instant;
use telemetryx_shared::observability::metrics;
use tracing::{debug, warn};
use uuid::Uuid;

/// 条件树允许的最大深度
pub const MAX_CONDITION_DEPTH: usize = 64;

/// 单条规则的评估结果
#[derive(Debug)]
pub enum RuleOutcome {
    Matched(RuleMatch),
    NotMatched,
    Skipped(RuleError),
}

impl RuleOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    pub fn into_match(self) -> Option<RuleMatch> {
        match self {
            Self::Matched(m) => Some(m),
            Self::NotMatched | Self::Skipped(_) => None,
        }
    }
}

/// 带规则标识的评估结果
#[derive(Debug)]
pub struct RuleEvaluation {
    pub rule_id: Option<Uuid>,
    pub rule_name: String,
    pub priority: u32,
    pub outcome: RuleOutcome,
}

/// 规则引擎
///
/// 无内部状态，可在任务之间共享。
#[derive(Debug, Clone)]
pub struct RulesEngine {
    max_depth: usize,
}

impl Default for RulesEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RulesEngine {
    pub fn new() -> Self {
        Self {
            max_depth: MAX_CONDITION_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// 评估事件，返回按优先级排列的命中结果
    pub fn evaluate(&self, event: &Event, rules: &[Rule]) -> Vec<RuleMatch> {
        let start = Instant::now();

        let evaluations = self.evaluate_detailed(event, rules);
        let evaluated = evaluations.len();
        let matches: Vec<RuleMatch> = evaluations
            .into_iter()
            .filter_map(|e| e.outcome.into_match())
            .collect();

        metrics::record_rule_evaluation(evaluated, matches.len(), start.elapsed().as_secs_f64());
        debug!(
            rules = evaluated,
            matches = matches.len(),
            "Event evaluated"
        );

        matches
    }

    /// 评估事件并返回每条启用规则的详细结果
    ///
    /// 禁用规则被过滤，其余规则按优先级稳定升序排列。
    pub fn evaluate_detailed(&self, event: &Event, rules: &[Rule]) -> Vec<RuleEvaluation> {
        let mut enabled: Vec<&Rule> = rules.iter().filter(|r| r.enabled).collect();
        enabled.sort_by_key(|r| r.priority);

        enabled
            .into_iter()
            .map(|rule| RuleEvaluation {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                priority: rule.priority,
                outcome: self.evaluate_rule(event, rule),
            })
            .collect()
    }

    /// 评估单条规则，禁用或未命中时返回 None
    pub fn evaluate_single(&self, event: &Event, rule: &Rule) -> Option<RuleMatch> {
        if !rule.enabled {
            return None;
        }
        self.evaluate_rule(event, rule).into_match()
    }

    /// 评估单条规则，不检查启用状态
    pub fn evaluate_rule(&self, event: &Event, rule: &Rule) -> RuleOutcome {
        match self.try_evaluate(event, rule) {
            Ok(Some(m)) => RuleOutcome::Matched(m),
            Ok(None) => RuleOutcome::NotMatched,
            Err(e) => {
                warn!(
                    rule_id = ?rule.id,
                    rule_name = %rule.name,
                    error = %e,
                    "Rule evaluation failed"
                );
                metrics::record_rule_skipped(e.reason());
                RuleOutcome::Skipped(e)
            }
        }
    }

    fn try_evaluate(&self, event: &Event, rule: &Rule) -> Result<Option<RuleMatch>, RuleError> {
        let depth = rule.condition.depth();
        if depth > self.max_depth {
            return Err(RuleError::ConditionTooDeep {
                depth,
                limit: self.max_depth,
            });
        }

        if !ConditionEvaluator::evaluate(&rule.condition, event) {
            return Ok(None);
        }

        let rule_id = rule.id.ok_or(RuleError::MissingId)?;

        Ok(Some(RuleMatch {
            rule_id,
            rule_name: rule.name.clone(),
            severity: rule.severity,
            actions: rule.actions.clone(),
        }))
    }
}
