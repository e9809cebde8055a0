//! 规则组合
//!
//! 将多条规则分别解析后，按给定逻辑操作符从左到右折叠为一棵树：
//! `[r1, r2, r3]` 组合为 `((r1 op r2) op r3)`。

use crate::ast::Ast;
use crate::error::{Result, RuleError};
use crate::operators::LogicalOperator;
use crate::parser::RuleParser;

/// 使用默认解析器组合规则
pub fn combine<S: AsRef<str>>(rules: &[S], operator: LogicalOperator) -> Result<Ast> {
    combine_with(&RuleParser::new(), rules, operator)
}

/// 使用指定解析器组合规则，任一规则解析失败则整体失败
pub fn combine_with<S: AsRef<str>>(
    parser: &RuleParser,
    rules: &[S],
    operator: LogicalOperator,
) -> Result<Ast> {
    let trees = rules
        .iter()
        .map(|rule| parser.parse(rule.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    combine_trees(trees, operator)
}

/// 组合已解析的规则树；单棵树原样返回，不添加逻辑节点
pub fn combine_trees(
    trees: impl IntoIterator<Item = Ast>,
    operator: LogicalOperator,
) -> Result<Ast> {
    trees
        .into_iter()
        .reduce(|acc, tree| acc.join(operator, tree))
        .ok_or(RuleError::EmptyRuleSet)
}
