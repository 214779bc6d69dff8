//! 条件评估器
//!
//! 负责单个比较子句：切分操作数文本、字面量类型推断以及比较语义。
//! 所有异常情况（字段缺失、子句格式错误、类型不一致）都评估为 false。

use crate::models::{DataContext, Value};
use crate::operators::ComparisonOperator;
use std::cmp::Ordering;
use tracing::debug;

/// 按空格切分操作数文本
///
/// 单引号内的空格不切分，引号本身被去掉，空片段被丢弃。
pub fn split_operand(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in text.chars() {
        match ch {
            '\'' => in_quotes = !in_quotes,
            ' ' if !in_quotes => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

/// 字面量类型推断：先整数，再浮点数，否则按字符串处理
pub fn coerce_literal(literal: &str) -> Value {
    if let Ok(i) = literal.parse::<i64>() {
        return Value::Int(i);
    }

    if let Ok(f) = literal.parse::<f64>() {
        return Value::Float(f);
    }

    Value::Str(literal.to_string())
}

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估一条操作数子句，例如 `temperature > 30`
    pub fn evaluate_operand(text: &str, context: &DataContext) -> bool {
        let parts = split_operand(text);
        let [field, op, literal] = parts.as_slice() else {
            debug!(operand = %text, parts = parts.len(), "操作数格式错误，按不满足处理");
            return false;
        };

        let Some(operator) = ComparisonOperator::from_symbol(op) else {
            debug!(operand = %text, operator = %op, "未知的比较操作符");
            return false;
        };

        Self::evaluate(context.get_field(field), operator, &coerce_literal(literal))
    }

    /// 评估比较
    ///
    /// # Arguments
    /// * `field_value` - 从上下文中获取的字段值
    /// * `operator` - 比较操作符
    /// * `expected_value` - 强制转换后的字面量
    pub fn evaluate(
        field_value: Option<&Value>,
        operator: ComparisonOperator,
        expected_value: &Value,
    ) -> bool {
        // 字段不存在时一律返回 false
        let Some(field_value) = field_value else {
            return false;
        };

        let wanted = match operator {
            ComparisonOperator::Eq => return field_value == expected_value,
            ComparisonOperator::Gt => Ordering::Greater,
            ComparisonOperator::Lt => Ordering::Less,
        };

        if field_value.type_name() != expected_value.type_name() {
            debug!(
                operator = %operator,
                field_type = field_value.type_name(),
                literal_type = expected_value.type_name(),
                "比较两侧类型不一致，按不满足处理"
            );
            return false;
        }

        Self::compare(field_value, expected_value) == Some(wanted)
    }

    /// 数值比较，只在同类数值之间进行（整数对整数、浮点对浮点）
    fn compare(field: &Value, expected: &Value) -> Option<Ordering> {
        match (field, expected) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}
