//! 规则执行器
//!
//! 对语法树做递归求值。逻辑节点使用短路求值，由于求值没有副作用，
//! 结果与完整求值一致。

use crate::evaluator::ConditionEvaluator;
use crate::models::{DataContext, Node};
use crate::operators::LogicalOperator;

/// 评估语法树，空树（没有规则）视为不满足
pub fn evaluate(root: Option<&Node>, context: &DataContext) -> bool {
    match root {
        Some(node) => evaluate_node(node, context),
        None => false,
    }
}

/// 递归评估规则节点
pub fn evaluate_node(node: &Node, context: &DataContext) -> bool {
    match node {
        Node::Operand { text } => ConditionEvaluator::evaluate_operand(text, context),
        Node::Operator { op, left, right } => match op {
            LogicalOperator::And => evaluate_node(left, context) && evaluate_node(right, context),
            LogicalOperator::Or => evaluate_node(left, context) || evaluate_node(right, context),
        },
    }
}
