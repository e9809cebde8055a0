//! 用户自定义函数注册表
//!
//! 规则中的 `name(arg)` 条件在评估时通过注册表解析为谓词函数。
//! 注册表通过 `Arc` 显式传递给执行器，而不是使用隐式的全局变量。
//!
//! 线程安全：内部使用 `DashMap`，并发注册与查询都是内存安全的。
//! 但评估结果依赖注册时序，调用方应在开始评估前完成注册。
//! 谓词必须是纯函数，短路求值才有确定的语义。

use crate::error::{Result, RuleError};
use crate::value::Value;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// 谓词函数签名
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// 函数注册表
#[derive(Default)]
pub struct FunctionRegistry {
    functions: DashMap<String, Predicate>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册函数，同名函数直接覆盖
    pub fn register<F>(&self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        let replaced = self
            .functions
            .insert(name.clone(), Arc::new(predicate))
            .is_some();
        debug!(function = %name, replaced, "Function registered");
    }

    /// 解析函数
    pub fn resolve(&self, name: &str) -> Result<Predicate> {
        self.functions
            .get(name)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| RuleError::UnknownFunction(name.to_string()))
    }

    /// 解析并调用函数
    pub fn call(&self, name: &str, argument: &Value) -> Result<bool> {
        let predicate = self.resolve(name)?;
        Ok(predicate(argument))
    }

    /// 检查函数是否存在
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// 已注册的函数名（排序后）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.iter().map(|f| f.key().clone()).collect();
        names.sort();
        names
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}
