//! 条件评估器
//!
//! 对单个事件求值条件树。求值是全函数：类型不匹配、字段缺失、非法正则
//! 都只会让对应比较返回 false，不会产生错误。

use crate::models::{Comparison, Condition};
use crate::operators::Operator;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件树
    ///
    /// AND 组要求全部子节点为真（空组为真），OR 组要求至少一个子节点为真（空组为假），
    /// 空节点恒为假。两种逻辑组都按顺序短路求值。
    pub fn evaluate(condition: &Condition, event: &Value) -> bool {
        match condition {
            Condition::And(children) => children.iter().all(|c| Self::evaluate(c, event)),
            Condition::Or(children) => children.iter().any(|c| Self::evaluate(c, event)),
            Condition::Comparison(cmp) => Self::evaluate_comparison(cmp, event),
            Condition::Empty => false,
        }
    }

    fn evaluate_comparison(cmp: &Comparison, event: &Value) -> bool {
        match resolve_field(event, &cmp.field) {
            Some(field_value) => Self::compare(field_value, cmp.op, &cmp.value),
            None => false,
        }
    }

    /// 用操作符比较事件字段值与期望值
    pub fn compare(field: &Value, op: Operator, expected: &Value) -> bool {
        match op {
            Operator::Eq => values_equal(field, expected),
            Operator::Ne => !values_equal(field, expected),
            Operator::Gt => ordering(field, expected).is_some_and(Ordering::is_gt),
            Operator::Ge => ordering(field, expected).is_some_and(Ordering::is_ge),
            Operator::Lt => ordering(field, expected).is_some_and(Ordering::is_lt),
            Operator::Le => ordering(field, expected).is_some_and(Ordering::is_le),
            Operator::Contains => string_op(field, expected, |s, v| s.contains(v)),
            Operator::StartsWith => string_op(field, expected, |s, v| s.starts_with(v)),
            Operator::EndsWith => string_op(field, expected, |s, v| s.ends_with(v)),
            Operator::Regex => regex_search(field, expected),
            Operator::In => match expected {
                Value::Array(items) => items.iter().any(|item| values_equal(field, item)),
                _ => false,
            },
        }
    }
}

/// 按点号路径解析字段
///
/// 中间节点不是对象、路径段不存在、或最终值为 null 时都视为字段缺失。
pub fn resolve_field<'a>(event: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = event;

    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            _ => return None,
        };
        if current.is_null() {
            return None;
        }
    }

    Some(current)
}

/// 类型敏感的相等比较，数值按数值比较（100 == 100.0）
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            numeric_ordering(x, y).is_some_and(Ordering::is_eq)
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// 同类型值之间的自然顺序，不可比较时返回 None
///
/// 列表按元素逐个比较：跳过相等的前缀，由第一对不相等的元素决定顺序，
/// 前缀全部相等时较短的列表更小。
pub fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numeric_ordering(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Array(xs), Value::Array(ys)) => {
            for (x, y) in xs.iter().zip(ys) {
                if !values_equal(x, y) {
                    return ordering(x, y);
                }
            }
            Some(xs.len().cmp(&ys.len()))
        }
        _ => None,
    }
}

fn numeric_ordering(x: &serde_json::Number, y: &serde_json::Number) -> Option<Ordering> {
    // 整数之间精确比较，避免大整数转换为 f64 丢失精度
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return Some(a.cmp(&b));
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return Some(a.cmp(&b));
    }
    x.as_f64()?.partial_cmp(&y.as_f64()?)
}

fn string_op<F>(field: &Value, expected: &Value, op: F) -> bool
where
    F: Fn(&str, &str) -> bool,
{
    match (field, expected) {
        (Value::String(s), Value::String(v)) => op(s, v),
        _ => false,
    }
}

fn regex_search(field: &Value, pattern: &Value) -> bool {
    match (field, pattern) {
        (Value::String(s), Value::String(p)) => Regex::new(p).is_ok_and(|re| re.is_match(s)),
        _ => false,
    }
}
