//! CLI 命令定义
//!
//! 使用 clap derive 宏定义命令行接口结构，`CommandRunner` 执行子命令并返回输出文本。

use crate::combiner::combine_trees;
use crate::compiler::required_fields;
use crate::engine::RuleEngine;
use crate::operators::LogicalOperator;
use crate::registry::FunctionRegistry;
use crate::store::RuleStore;
use crate::value::Record;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eligibility_shared::config::EngineConfig;
use std::sync::Arc;

/// 资格规则引擎命令行工具
#[derive(Parser, Debug)]
#[command(name = "rule-engine")]
#[command(version, about = "资格规则检查与评估工具")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 启用短路求值（覆盖配置）
    #[arg(long, global = true)]
    pub short_circuit: bool,

    /// 输出评估追踪（覆盖配置）
    #[arg(long, global = true)]
    pub trace: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 检查规则语法，输出规范文本和使用的字段
    Check {
        /// 规则文本
        rule: String,
    },

    /// 组合规则并对记录求值，输出 JSON 格式的评估结果
    Eval {
        /// 规则文本，可重复指定
        #[arg(short, long = "rule", required = true)]
        rules: Vec<String>,

        /// 组合多条规则的逻辑操作符 (and, or)
        #[arg(long, default_value = "and")]
        op: LogicalOperator,

        /// JSON 对象格式的数据记录
        #[arg(long)]
        record: String,
    },

    /// 输出规则树的 JSON 表示
    Ast {
        /// 规则文本
        rule: String,
    },
}

/// 注册命令行内置函数
pub fn register_builtins(registry: &FunctionRegistry) {
    registry.register("is_experienced", |v| {
        v.as_f64().map(|years| years > 5.0).unwrap_or(false)
    });
    registry.register("is_even", |v| {
        v.as_f64()
            .map(|n| n.fract() == 0.0 && n % 2.0 == 0.0)
            .unwrap_or(false)
    });
}

/// 命令执行器
pub struct CommandRunner {
    engine: RuleEngine<RuleStore>,
}

impl CommandRunner {
    pub fn new(config: EngineConfig) -> Self {
        let registry = Arc::new(FunctionRegistry::new());
        register_builtins(&registry);

        Self {
            engine: RuleEngine::with_registry(RuleStore::new(), registry, config),
        }
    }

    pub fn run(&self, command: &Commands) -> Result<String> {
        match command {
            Commands::Check { rule } => self.run_check(rule),
            Commands::Eval { rules, op, record } => self.run_eval(rules, *op, record),
            Commands::Ast { rule } => self.run_ast(rule),
        }
    }

    pub fn run_check(&self, rule: &str) -> Result<String> {
        let ast = self.engine.parse_rule(rule)?;

        let mut fields: Vec<String> = required_fields(&ast).into_iter().collect();
        fields.sort();

        Ok(format!("{}\nfields: {}", ast, fields.join(", ")))
    }

    pub fn run_eval(&self, rules: &[String], op: LogicalOperator, record: &str) -> Result<String> {
        let trees = rules
            .iter()
            .map(|rule| self.engine.parse_rule(rule))
            .collect::<crate::Result<Vec<_>>>()?;
        let ast = combine_trees(trees, op)?;

        let json: serde_json::Value =
            serde_json::from_str(record).context("记录不是合法的 JSON")?;
        let record = Record::try_from(json)?;

        let result = self.engine.evaluate(&ast, &record)?;
        Ok(serde_json::to_string_pretty(&result)?)
    }

    pub fn run_ast(&self, rule: &str) -> Result<String> {
        let ast = self.engine.parse_rule(rule)?;
        Ok(serde_json::to_string_pretty(&ast)?)
    }
}
