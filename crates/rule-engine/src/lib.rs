//! 规则引擎
//!
//! 提供文本规则的解析、存储、组合与评估能力：
//! - 规则表达式解析为二叉语法树
//! - 语法树序列化存储，按 id 取回
//! - 多条规则按 AND 组合
//! - 针对一组字段数据评估
//! - HTTP 服务接口

pub mod combiner;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod http;
pub mod models;
pub mod operators;
pub mod parser;
pub mod store;

pub use combiner::combine;
pub use engine::{MAX_RULE_IDS, RuleEngine};
pub use error::{Result, RuleError, SyntaxError};
pub use evaluator::ConditionEvaluator;
pub use executor::evaluate;
pub use http::{AppState, router};
pub use models::{DataContext, MAX_TREE_DEPTH, Node, Rule, Value};
pub use operators::{ComparisonOperator, LogicalOperator};
pub use parser::parse;
pub use store::{InMemoryRuleStore, RuleRepository, StoredRule};
