//! 规则引擎领域模型

use crate::error::{Result, RuleError};
use crate::evaluator::split_operand;
use crate::operators::LogicalOperator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// 语法树节点
///
/// 二叉树，根到叶独占所有权。`Operand` 保存一条完整的比较子句原文，
/// 例如 `temperature > 30`，评估时才会重新切分。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Operator {
        op: LogicalOperator,
        left: Box<Node>,
        right: Box<Node>,
    },
    Operand {
        text: String,
    },
}

impl Node {
    pub fn operand(text: impl Into<String>) -> Self {
        Self::Operand { text: text.into() }
    }

    pub fn operator(op: LogicalOperator, left: Node, right: Node) -> Self {
        Self::Operator {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Node, right: Node) -> Self {
        Self::operator(LogicalOperator::And, left, right)
    }

    pub fn or(left: Node, right: Node) -> Self {
        Self::operator(LogicalOperator::Or, left, right)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Operand { .. })
    }

    /// 树高度，单个叶子为 1
    pub fn depth(&self) -> usize {
        match self {
            Self::Operand { .. } => 1,
            Self::Operator { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    /// 按中序返回所有比较子句
    pub fn operands(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_operands(&mut out);
        out
    }

    fn collect_operands<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Operand { text } => out.push(text),
            Self::Operator { left, right, .. } => {
                left.collect_operands(out);
                right.collect_operands(out);
            }
        }
    }

    /// 提取规则中引用的所有字段名
    pub fn fields(&self) -> BTreeSet<String> {
        self.operands()
            .into_iter()
            .filter_map(|text| split_operand(text).into_iter().next())
            .collect()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operand { text } => f.write_str(text),
            Self::Operator { op, left, right } => write!(f, "({} {} {})", left, op, right),
        }
    }
}

/// 单条规则语法树的最大高度
pub const MAX_TREE_DEPTH: usize = 100;

/// 将语法树编码为存储载荷
pub fn serialize(node: &Node) -> Result<Vec<u8>> {
    serde_json::to_vec(node).map_err(|e| RuleError::Format(e.to_string()))
}

/// 从存储载荷解码语法树
///
/// 超过 serde_json 默认递归上限的载荷按格式错误处理，
/// 解析器产出的树不会超过 [`MAX_TREE_DEPTH`]。
pub fn deserialize(bytes: &[u8]) -> Result<Node> {
    serde_json::from_slice(bytes).map_err(|e| RuleError::Format(e.to_string()))
}

/// 动态类型的标量值
///
/// 数据上下文中的字段值和比较子句中强制转换后的字面量都用它表示。
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    /// 类型名称，用于诊断日志
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Bool(_) => "bool",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl TryFrom<&serde_json::Value> for Value {
    type Error = RuleError;

    fn try_from(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Bool(b) => Ok(Self::Bool(*b)),
            serde_json::Value::String(s) => Ok(Self::Str(s.clone())),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(RuleError::Validation(format!("无法表示的数值: {}", n)))
                }
            }
            other => Err(RuleError::Validation(format!(
                "字段值必须是数字、字符串或布尔值，实际为: {}",
                other
            ))),
        }
    }
}

/// 评估上下文 - 字段名到值的映射
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataContext {
    fields: HashMap<String, Value>,
}

impl DataContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式添加字段
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// 从 JSON 对象创建，非标量字段值会被拒绝
    pub fn from_json_map(map: &serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let mut fields = HashMap::with_capacity(map.len());
        for (key, value) in map {
            let value = Value::try_from(value).map_err(|e| match e {
                RuleError::Validation(msg) => RuleError::Validation(format!("{}: {}", key, msg)),
                other => other,
            })?;
            fields.insert(key.clone(), value);
        }
        Ok(Self { fields })
    }

    /// 从 JSON 字符串创建
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| RuleError::Validation(e.to_string()))?;
        match value {
            serde_json::Value::Object(map) => Self::from_json_map(&map),
            other => Err(RuleError::Validation(format!(
                "数据上下文必须是 JSON 对象，实际为: {}",
                other
            ))),
        }
    }

    /// 获取字段值，不存在时返回 None
    pub fn get_field(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for DataContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ctx = Self::new();
        for (k, v) in iter {
            ctx.insert(k, v);
        }
        ctx
    }
}

/// 规则定义
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    /// 创建时提交的表达式原文
    pub expression: String,
    pub ast: Node,
    pub created_at: DateTime<Utc>,
}
