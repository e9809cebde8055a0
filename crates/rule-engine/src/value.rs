//! 规则字面量与数据记录
//!
//! 规则中的字面量和被评估记录中的字段值共用同一个带标签的值类型，
//! 只支持数值、字符串、布尔三种标量。

use crate::error::{Result, RuleError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 标量值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    String(String),
}

impl Value {
    /// 获取值的类型名称
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
        }
    }

    /// 尝试将值转换为 f64，数字字符串同样可以转换
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    /// NaN 与无穷大无法写成规则文本中的字面量
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Number(n) => n.is_finite(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// 以规则文本中的字面量形式输出，字符串使用单引号
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => {
                f.write_str("'")?;
                for c in s.chars() {
                    if c == '\'' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                f.write_str("'")
            }
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = RuleError;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Bool(b) => Ok(Self::Bool(b)),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Self::Number)
                .ok_or_else(|| RuleError::InvalidRecord(format!("无法表示的数值: {}", n))),
            serde_json::Value::String(s) => Ok(Self::String(s)),
            other => Err(RuleError::InvalidRecord(format!(
                "仅支持数值、字符串和布尔值，实际为 {}",
                other
            ))),
        }
    }
}

/// 数据记录 - 字段名到标量值的映射
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: HashMap<String, Value>,
}

impl Record {
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

    /// 获取字段值
    pub fn get_field(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 从 JSON 对象文本创建
    pub fn from_json(json: &str) -> Result<Self> {
        let data: serde_json::Value = serde_json::from_str(json)?;
        Self::try_from(data)
    }
}

impl TryFrom<serde_json::Value> for Record {
    type Error = RuleError;

    fn try_from(data: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = data else {
            return Err(RuleError::InvalidRecord("记录必须是 JSON 对象".to_string()));
        };

        let mut record = Record::new();
        for (field, value) in map {
            let value = Value::try_from(value).map_err(|e| match e {
                RuleError::InvalidRecord(msg) => {
                    RuleError::InvalidRecord(format!("字段 '{}': {}", field, msg))
                }
                other => other,
            })?;
            record.fields.insert(field, value);
        }
        Ok(record)
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}
