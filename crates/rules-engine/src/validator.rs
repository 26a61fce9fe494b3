//! 规则校验器
//!
//! 写入路径上的结构校验，只用于规则管理接口。求值器本身对任何条件树都不会失败。

use crate::engine::MAX_CONDITION_DEPTH;
use crate::error::{Result, RuleError};
use crate::models::{Condition, Rule};
use crate::operators::Operator;
use regex::Regex;
use serde_json::Value;

/// 规则校验器
#[derive(Debug, Clone)]
pub struct RuleValidator {
    max_depth: usize,
}

impl Default for RuleValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleValidator {
    pub fn new() -> Self {
        Self {
            max_depth: MAX_CONDITION_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// 校验规则，返回第一个不合法节点的位置
    pub fn validate(&self, rule: &Rule) -> Result<()> {
        if rule.name.trim().is_empty() {
            return Err(RuleError::validation("name", "规则名称不能为空"));
        }

        let depth = rule.condition.depth();
        if depth > self.max_depth {
            return Err(RuleError::ConditionTooDeep {
                depth,
                limit: self.max_depth,
            });
        }

        self.validate_condition(&rule.condition, "condition")
    }

    fn validate_condition(&self, condition: &Condition, path: &str) -> Result<()> {
        match condition {
            Condition::Empty => Err(RuleError::validation(path, "条件不能为空")),
            Condition::And(children) => self.validate_group(children, &format!("{}.and", path)),
            Condition::Or(children) => self.validate_group(children, &format!("{}.or", path)),
            Condition::Comparison(cmp) => {
                if cmp.field.trim().is_empty() {
                    return Err(RuleError::validation(path, "比较字段不能为空"));
                }

                match (cmp.op, &cmp.value) {
                    (Operator::Regex, Value::String(pattern)) => Regex::new(pattern)
                        .map(|_| ())
                        .map_err(|e| RuleError::validation(path, format!("正则表达式无效: {}", e))),
                    (Operator::Regex, _) => {
                        Err(RuleError::validation(path, "regex 操作符需要字符串模式"))
                    }
                    (Operator::In, Value::Array(_)) => Ok(()),
                    (Operator::In, _) => Err(RuleError::validation(path, "in 操作符需要列表值")),
                    _ => Ok(()),
                }
            }
        }
    }

    fn validate_group(&self, children: &[Condition], path: &str) -> Result<()> {
        if children.is_empty() {
            return Err(RuleError::validation(path, "逻辑组至少需要一个子条件"));
        }

        for (i, child) in children.iter().enumerate() {
            self.validate_condition(child, &format!("{}[{}]", path, i))?;
        }

        Ok(())
    }
}
