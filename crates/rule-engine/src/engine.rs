//! 规则引擎门面
//!
//! 组合规则仓储、函数注册表和规则编译器：规则以文本形式存储，
//! 读取时重新解析，修改后的规则树以规范文本写回。

use crate::ast::Ast;
use crate::combiner::combine_with;
use crate::compiler::RuleCompiler;
use crate::error::Result;
use crate::executor::RuleExecutor;
use crate::models::{EvaluationResult, RuleMetadata, StoredRule};
use crate::operators::LogicalOperator;
use crate::parser::RuleParser;
use crate::registry::FunctionRegistry;
use crate::store::RuleRepository;
use crate::value::{Record, Value};
use eligibility_shared::config::EngineConfig;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// 规则引擎
pub struct RuleEngine<R: RuleRepository> {
    repository: R,
    registry: Arc<FunctionRegistry>,
    compiler: Mutex<RuleCompiler>,
    executor: RuleExecutor,
    config: EngineConfig,
}

impl<R: RuleRepository> RuleEngine<R> {
    pub fn new(repository: R, config: EngineConfig) -> Self {
        Self::with_registry(repository, Arc::new(FunctionRegistry::new()), config)
    }

    /// 使用共享的函数注册表创建引擎
    pub fn with_registry(
        repository: R,
        registry: Arc<FunctionRegistry>,
        config: EngineConfig,
    ) -> Self {
        let compiler = RuleCompiler::new()
            .with_parser(RuleParser::new().with_max_depth(config.max_nesting_depth))
            .with_catalog(config.allowed_fields.iter().cloned());

        let mut executor = RuleExecutor::new(registry.clone());
        if config.trace_enabled {
            executor = executor.with_trace();
        }
        if config.short_circuit {
            executor = executor.with_short_circuit();
        }

        Self {
            repository,
            registry,
            compiler: Mutex::new(compiler),
            executor,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// 注册自定义函数
    pub fn register_function<F>(&self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.registry.register(name, predicate);
    }

    /// 解析规则文本并检查属性白名单，不写入仓储
    pub fn parse_rule(&self, text: &str) -> Result<Ast> {
        Ok(self.compiler.lock().compile(text)?.ast)
    }

    /// 创建规则，返回新规则 ID
    ///
    /// 存储的是原始文本，解析只用于确认规则合法。
    #[instrument(skip(self, text))]
    pub fn create_rule(&self, name: &str, text: &str) -> Result<String> {
        let compiled = self.compiler.lock().compile(text)?;

        let rule_id = Uuid::new_v4().to_string();
        self.repository
            .save_rule(&rule_id, text, RuleMetadata::new(name))?;

        info!(
            rule_id = %rule_id,
            fields = compiled.required_fields.len(),
            "规则已创建"
        );
        Ok(rule_id)
    }

    /// 读取规则原始文本
    pub fn load_rule_text(&self, rule_id: &str) -> Result<String> {
        self.repository.load_rule_text(rule_id)
    }

    /// 读取并解析规则
    ///
    /// 只检查语法，不检查属性白名单。
    /// 白名单变化不影响已保存规则的读取。
    pub fn load_rule(&self, rule_id: &str) -> Result<Ast> {
        let text = self.load_rule_text(rule_id)?;
        self.compiler.lock().parser().parse(&text)
    }

    /// 保存修改后的规则树，写入规范文本并递增版本
    ///
    /// 规范文本必须能重新解析为同一棵树，否则不写入仓储。
    #[instrument(skip(self, ast))]
    pub fn update_rule(&self, rule_id: &str, ast: &Ast) -> Result<()> {
        let existing = self.repository.get_rule(rule_id)?;

        ast.validate()?;
        let text = {
            let compiler = self.compiler.lock();
            compiler.validate_fields(ast)?;
            compiler.canonical_text(ast)?
        };

        self.save_version(existing, &text)
    }

    /// 以新的规则文本替换规则
    #[instrument(skip(self, text))]
    pub fn replace_rule_text(&self, rule_id: &str, text: &str) -> Result<()> {
        let existing = self.repository.get_rule(rule_id)?;
        self.compiler.lock().compile(text)?;

        self.save_version(existing, text)
    }

    fn save_version(&self, existing: StoredRule, text: &str) -> Result<()> {
        let metadata = existing.metadata.next_version();
        let version = metadata.version;

        self.repository.save_rule(&existing.id, text, metadata)?;

        info!(version, "规则已更新");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete_rule(&self, rule_id: &str) -> Result<()> {
        self.repository.delete_rule(rule_id)
    }

    pub fn list_rules(&self) -> Result<Vec<String>> {
        self.repository.list_rule_ids()
    }

    /// 对记录评估规则树
    pub fn evaluate(&self, ast: &Ast, record: &Record) -> Result<EvaluationResult> {
        self.executor.execute(ast, record)
    }

    /// 对记录评估已保存的规则
    #[instrument(skip(self, record))]
    pub fn evaluate_rule(&self, rule_id: &str, record: &Record) -> Result<EvaluationResult> {
        let ast = self.load_rule(rule_id)?;

        let mut result = EvaluationResult::for_rule(rule_id);
        self.executor.execute_into(&ast, record, &mut result)?;

        debug!(matched = result.matched, "规则评估完成");
        Ok(result)
    }

    /// 将多条已保存规则组合为一棵规则树
    #[instrument(skip(self))]
    pub fn combine_rules<S>(&self, rule_ids: &[S], operator: LogicalOperator) -> Result<Ast>
    where
        S: AsRef<str> + std::fmt::Debug,
    {
        let texts = rule_ids
            .iter()
            .map(|id| self.load_rule_text(id.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let parser = self.compiler.lock().parser().clone();
        combine_with(&parser, &texts, operator)
    }
}
