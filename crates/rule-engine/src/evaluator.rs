//! 条件评估器
//!
//! 实现比较操作符的评估逻辑。类型规则：
//! - 数值与数值按数值比较
//! - 字符串与字符串支持 `==`/`!=`，大小比较仅在两侧均可转换为数值时进行
//! - 数值与字符串比较时，字符串必须能转换为数值
//! - 布尔值仅支持 `==`/`!=`
//!
//! 其余组合一律返回 `TypeMismatch`，不做猜测。

use crate::error::{Result, RuleError};
use crate::operators::Comparator;
use crate::value::Value;

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件
    ///
    /// # Arguments
    /// * `field_value` - 从记录中获取的字段值
    /// * `comparator` - 比较操作符
    /// * `expected_value` - 规则中定义的字面量
    pub fn evaluate(
        field_value: &Value,
        comparator: Comparator,
        expected_value: &Value,
    ) -> Result<bool> {
        match (field_value, expected_value) {
            (Value::Number(a), Value::Number(b)) => {
                Ok(Self::compare_numbers(*a, *b, comparator))
            }
            (Value::String(a), Value::String(b)) if !comparator.is_ordering() => {
                Ok(Self::apply_equality(a == b, comparator))
            }
            (Value::Bool(a), Value::Bool(b)) if !comparator.is_ordering() => {
                Ok(Self::apply_equality(a == b, comparator))
            }
            (Value::Bool(_), _) | (_, Value::Bool(_)) => {
                Err(Self::mismatch(field_value, comparator, expected_value))
            }
            // 剩余情况至少一侧是字符串，只有两侧都能转换为数值时才比较
            _ => match (field_value.as_f64(), expected_value.as_f64()) {
                (Some(a), Some(b)) => Ok(Self::compare_numbers(a, b, comparator)),
                _ => Err(Self::mismatch(field_value, comparator, expected_value)),
            },
        }
    }

    /// 操作符是否接受该字面量
    ///
    /// 大小比较只接受有限数值或数字字符串，相等比较接受任意有限值。
    pub fn accepts(comparator: Comparator, value: &Value) -> bool {
        value.is_finite()
            && (!comparator.is_ordering() || value.as_f64().is_some_and(f64::is_finite))
    }

    fn compare_numbers(a: f64, b: f64, comparator: Comparator) -> bool {
        match comparator {
            Comparator::Eq => Self::approx_eq(a, b),
            Comparator::Neq => !Self::approx_eq(a, b),
            Comparator::Gt => a > b,
            Comparator::Gte => a >= b,
            Comparator::Lt => a < b,
            Comparator::Lte => a <= b,
        }
    }

    /// 按相对误差比较，容差随数值大小缩放
    ///
    /// 0.1 + 0.2 与 0.3 相等，1e-17 与 2e-17 不相等。
    fn approx_eq(a: f64, b: f64) -> bool {
        a == b || (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs())
    }

    fn apply_equality(equal: bool, comparator: Comparator) -> bool {
        match comparator {
            Comparator::Neq => !equal,
            _ => equal,
        }
    }

    fn mismatch(left: &Value, comparator: Comparator, right: &Value) -> RuleError {
        RuleError::TypeMismatch {
            comparator: comparator.to_string(),
            left: left.type_name().to_string(),
            right: right.type_name().to_string(),
        }
    }
}
