//! 资格规则引擎
//!
//! 将形如 `age > 30 AND department = 'Sales'` 的规则文本解析为规则树，支持：
//! - 规则解析和规范文本输出
//! - 规则组合与就地修改
//! - 自定义函数注册
//! - 针对数据记录的求值和评估追踪

pub mod ast;
pub mod cli;
pub mod combiner;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod lexer;
pub mod models;
pub mod mutator;
pub mod operators;
pub mod parser;
pub mod registry;
pub mod store;
pub mod value;

pub use ast::{Argument, Ast, Node, NodeId, Operand, OperatorNode, Side};
pub use combiner::{combine, combine_trees, combine_with};
pub use compiler::{CompiledRule, RuleCompiler};
pub use engine::RuleEngine;
pub use error::{Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use executor::RuleExecutor;
pub use models::{EvaluationResult, RuleMetadata, StoredRule};
pub use operators::{Comparator, LogicalOperator};
pub use parser::{RuleParser, parse};
pub use registry::{FunctionRegistry, Predicate};
pub use store::{RuleRepository, RuleStore};
pub use value::{Record, Value};
