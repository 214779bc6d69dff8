//! 规则引擎错误类型

use thiserror::Error;

/// 规则表达式语法错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("不支持的表达式: {construct} (位置 {offset})")]
    Unsupported { construct: String, offset: usize },

    #[error("表达式格式错误: {message} (位置 {offset})")]
    Malformed { message: String, offset: usize },
}

impl SyntaxError {
    pub(crate) fn unsupported(construct: impl Into<String>, offset: usize) -> Self {
        Self::Unsupported {
            construct: construct.into(),
            offset,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>, offset: usize) -> Self {
        Self::Malformed {
            message: message.into(),
            offset,
        }
    }

    /// 出错位置（字节偏移）
    pub fn offset(&self) -> usize {
        match self {
            Self::Unsupported { offset, .. } | Self::Malformed { offset, .. } => *offset,
        }
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则语法错误: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("规则数据损坏: {0}")]
    Format(String),

    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("规则存储失败: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, RuleError>;
