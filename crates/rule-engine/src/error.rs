//! 规则引擎错误类型

use crate::ast::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则语法错误: {message} (位置 {position}, 附近 '{fragment}')")]
    Syntax {
        message: String,
        fragment: String,
        position: usize,
    },

    #[error("规则集合为空，无法组合")]
    EmptyRuleSet,

    #[error("字段不存在: {0}")]
    MissingField(String),

    #[error("未注册的函数: {0}")]
    UnknownFunction(String),

    #[error("类型不匹配: 操作符 {comparator} 不支持 {left} 与 {right} 比较")]
    TypeMismatch {
        comparator: String,
        left: String,
        right: String,
    },

    #[error("无效的操作数: 操作符 {comparator} 不接受 {value_type} 类型的值")]
    InvalidValue {
        comparator: String,
        value_type: String,
    },

    #[error("节点 {0} 已被其他节点持有")]
    AlreadyOwned(NodeId),

    #[error("无效的节点操作: {0}")]
    InvalidNode(String),

    #[error("规则树结构不完整: {0}")]
    MalformedTree(String),

    #[error("不允许的属性: {0}")]
    UnknownAttribute(String),

    #[error("无效的数据记录: {0}")]
    InvalidRecord(String),

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RuleError {
    pub(crate) fn syntax(
        message: impl Into<String>,
        fragment: impl Into<String>,
        position: usize,
    ) -> Self {
        Self::Syntax {
            message: message.into(),
            fragment: fragment.into(),
            position,
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
