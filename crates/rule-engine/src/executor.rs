//! 规则执行器
//!
//! 使用显式栈遍历规则树并针对数据记录求值，返回匹配结果和评估追踪信息。
//! 遍历不依赖调用栈，任意深度的左折叠规则链都能完成求值。
//!
//! 默认采用严格求值：逻辑节点总是先评估左子树再评估右子树，两侧都会被评估，
//! 因此任一侧的数据错误（缺失字段、类型不匹配、未注册函数）都会被报告。
//! 通过 [`RuleExecutor::with_short_circuit`] 可以启用短路求值，顺序仍为先左后右。

use crate::ast::{Argument, Ast, Node, NodeId, Operand, OperatorNode, Side};
use crate::error::{Result, RuleError};
use crate::evaluator::ConditionEvaluator;
use crate::models::EvaluationResult;
use crate::operators::LogicalOperator;
use crate::registry::FunctionRegistry;
use crate::value::Record;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// 规则执行器
#[derive(Debug, Clone)]
pub struct RuleExecutor {
    registry: Arc<FunctionRegistry>,
    /// 是否记录详细评估追踪
    trace_enabled: bool,
    /// 是否启用短路求值
    short_circuit: bool,
}

/// 遍历中待处理的步骤
///
/// `len` 为所属逻辑节点路径在路径缓冲区中的长度。
enum Step {
    Visit {
        id: NodeId,
        side: Option<Side>,
        parent_len: usize,
    },
    LeftDone { id: NodeId, len: usize },
    RightDone { id: NodeId, len: usize },
}

impl RuleExecutor {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self {
            registry,
            trace_enabled: false,
            short_circuit: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 启用短路求值
    pub fn with_short_circuit(mut self) -> Self {
        self.short_circuit = true;
        self
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// 评估规则，只返回是否匹配
    ///
    /// 不构造节点路径，也不收集匹配条件。
    pub fn evaluate(&self, ast: &Ast, record: &Record) -> Result<bool> {
        self.walk(ast, record, None)
    }

    /// 执行规则评估，返回包含匹配条件和追踪信息的结果
    pub fn execute(&self, ast: &Ast, record: &Record) -> Result<EvaluationResult> {
        let mut result = EvaluationResult::new();
        self.execute_into(ast, record, &mut result)?;
        Ok(result)
    }

    /// 执行规则评估并写入已有的结果（用于携带规则 ID 等信息）
    pub fn execute_into(
        &self,
        ast: &Ast,
        record: &Record,
        result: &mut EvaluationResult,
    ) -> Result<()> {
        let start = Instant::now();

        let matched = self.walk(ast, record, Some(result))?;

        result.matched = matched;
        result.evaluation_time_ms = start.elapsed().as_millis() as i64;

        trace!(
            matched,
            conditions = result.matched_conditions.len(),
            "Rule evaluated"
        );
        Ok(())
    }

    /// 后序遍历规则树
    ///
    /// `sink` 为 `None` 时只计算布尔结果，路径缓冲区保持为空。
    fn walk(
        &self,
        ast: &Ast,
        record: &Record,
        mut sink: Option<&mut EvaluationResult>,
    ) -> Result<bool> {
        let tracking = sink.is_some();
        let mut path = String::new();
        let mut values: Vec<bool> = Vec::new();
        let mut steps = vec![Step::Visit {
            id: ast.root(),
            side: None,
            parent_len: 0,
        }];

        while let Some(step) = steps.pop() {
            match step {
                Step::Visit {
                    id,
                    side,
                    parent_len,
                } => {
                    if tracking {
                        path.truncate(parent_len);
                        match side {
                            None => path.push_str("root"),
                            Some(Side::Left) => path.push_str(".left"),
                            Some(Side::Right) => path.push_str(".right"),
                        }
                    }

                    match ast.node(id)? {
                        Node::Operand(operand) => {
                            let matched = self.evaluate_operand(operand, record)?;
                            if let Some(result) = sink.as_deref_mut() {
                                self.record_operand(result, &path, operand, matched);
                            }
                            values.push(matched);
                        }
                        Node::Operator(op) => {
                            let left = Self::child(op, id, Side::Left)?;
                            Self::child(op, id, Side::Right)?;

                            self.push_trace(&mut sink, || {
                                format!("{}: 开始评估 {} 节点", path, op.operator())
                            });

                            let len = path.len();
                            steps.push(Step::LeftDone { id, len });
                            steps.push(Step::Visit {
                                id: left,
                                side: Some(Side::Left),
                                parent_len: len,
                            });
                        }
                    }
                }
                Step::LeftDone { id, len } => {
                    let op = Self::operator(ast, id)?;
                    let left_matched = Self::pop(&mut values, id)?;
                    path.truncate(len);

                    if self.short_circuit {
                        let decided = match (op.operator(), left_matched) {
                            (LogicalOperator::And, false) => Some(false),
                            (LogicalOperator::Or, true) => Some(true),
                            _ => None,
                        };
                        if let Some(matched) = decided {
                            self.push_trace(&mut sink, || {
                                format!("{}: {} 短路 - 跳过右子树", path, op.operator())
                            });
                            values.push(matched);
                            continue;
                        }
                    }

                    values.push(left_matched);
                    steps.push(Step::RightDone { id, len });
                    steps.push(Step::Visit {
                        id: Self::child(op, id, Side::Right)?,
                        side: Some(Side::Right),
                        parent_len: len,
                    });
                }
                Step::RightDone { id, len } => {
                    let op = Self::operator(ast, id)?;
                    let right_matched = Self::pop(&mut values, id)?;
                    let left_matched = Self::pop(&mut values, id)?;
                    path.truncate(len);

                    let matched = match op.operator() {
                        LogicalOperator::And => left_matched && right_matched,
                        LogicalOperator::Or => left_matched || right_matched,
                    };

                    self.push_trace(&mut sink, || {
                        format!("{}: {} => {}", path, op.operator(), outcome(matched))
                    });
                    values.push(matched);
                }
            }
        }

        Self::pop(&mut values, ast.root())
    }

    /// 评估叶子节点
    fn evaluate_operand(&self, operand: &Operand, record: &Record) -> Result<bool> {
        match operand {
            Operand::Comparison {
                field,
                comparator,
                value,
            } => {
                let field_value = record
                    .get_field(field)
                    .ok_or_else(|| RuleError::MissingField(field.clone()))?;
                ConditionEvaluator::evaluate(field_value, *comparator, value)
            }
            Operand::Function { name, argument } => {
                let predicate = self.registry.resolve(name)?;
                let argument = match argument {
                    Argument::Literal(value) => value,
                    Argument::Field(field) => record
                        .get_field(field)
                        .ok_or_else(|| RuleError::MissingField(field.clone()))?,
                };
                Ok(predicate(argument))
            }
        }
    }

    fn record_operand(
        &self,
        result: &mut EvaluationResult,
        path: &str,
        operand: &Operand,
        matched: bool,
    ) {
        if self.trace_enabled {
            result
                .evaluation_trace
                .push(format!("{}: {} => {}", path, operand, outcome(matched)));
        }

        if matched {
            result.matched_conditions.push(format!("{}: {}", path, operand));
        }
    }

    fn push_trace(
        &self,
        sink: &mut Option<&mut EvaluationResult>,
        line: impl FnOnce() -> String,
    ) {
        if !self.trace_enabled {
            return;
        }
        if let Some(result) = sink.as_deref_mut() {
            result.evaluation_trace.push(line());
        }
    }

    fn operator(ast: &Ast, id: NodeId) -> Result<&OperatorNode> {
        ast.node(id)?
            .as_operator()
            .ok_or_else(|| RuleError::InvalidNode(format!("节点 {} 不是逻辑节点", id)))
    }

    fn child(op: &OperatorNode, id: NodeId, side: Side) -> Result<NodeId> {
        op.child(side)
            .ok_or_else(|| RuleError::MalformedTree(format!("逻辑节点 {} 缺少子节点", id)))
    }

    fn pop(values: &mut Vec<bool>, id: NodeId) -> Result<bool> {
        values
            .pop()
            .ok_or_else(|| RuleError::MalformedTree(format!("节点 {} 的求值结果缺失", id)))
    }
}

fn outcome(matched: bool) -> &'static str {
    if matched {
        "MATCHED"
    } else {
        "NOT_MATCHED"
    }
}
