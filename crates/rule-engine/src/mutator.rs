//! 规则树原地修改
//!
//! 所有操作都通过 [`NodeId`] 定位节点并原地修改，节点身份保持不变。
//! 挂接子树时强制单一所有者：只能挂接游离节点（由 [`Ast::graft`] 或
//! [`Ast::insert_operand`] 创建，或之前被替换下来的节点）。

use crate::ast::{Argument, Ast, Node, NodeId, Operand, Side};
use crate::error::{Result, RuleError};
use crate::evaluator::ConditionEvaluator;
use crate::operators::{Comparator, LogicalOperator};
use crate::value::Value;

impl Ast {
    /// 修改逻辑节点的操作符
    pub fn set_operator(&mut self, node: NodeId, operator: LogicalOperator) -> Result<()> {
        match self.node_mut(node)? {
            Node::Operator(op) => {
                op.operator = operator;
                Ok(())
            }
            Node::Operand(_) => Err(RuleError::InvalidNode(format!(
                "节点 {} 不是逻辑节点，无法修改逻辑操作符",
                node
            ))),
        }
    }

    /// 修改叶子节点的字面量
    ///
    /// 大小比较只接受数值或数字字符串；函数节点的参数被替换为该字面量。
    /// NaN 与无穷大无法写回规则文本，一律拒绝。
    pub fn set_operand_value(&mut self, node: NodeId, value: impl Into<Value>) -> Result<()> {
        let value = value.into();

        match self.node_mut(node)? {
            Node::Operand(Operand::Comparison {
                comparator,
                value: current,
                ..
            }) => {
                if !ConditionEvaluator::accepts(*comparator, &value) {
                    return Err(RuleError::InvalidValue {
                        comparator: comparator.to_string(),
                        value_type: value_type(&value),
                    });
                }
                *current = value;
                Ok(())
            }
            Node::Operand(Operand::Function { name, argument }) => {
                if !value.is_finite() {
                    return Err(RuleError::InvalidValue {
                        comparator: format!("{}()", name),
                        value_type: value_type(&value),
                    });
                }
                *argument = Argument::Literal(value);
                Ok(())
            }
            Node::Operator(_) => Err(RuleError::InvalidNode(format!(
                "节点 {} 不是叶子节点，无法修改字面量",
                node
            ))),
        }
    }

    /// 修改比较节点的操作符，现有字面量必须被新操作符接受
    pub fn set_comparator(&mut self, node: NodeId, comparator: Comparator) -> Result<()> {
        match self.node_mut(node)? {
            Node::Operand(Operand::Comparison {
                comparator: current,
                value,
                ..
            }) => {
                if !ConditionEvaluator::accepts(comparator, value) {
                    return Err(RuleError::InvalidValue {
                        comparator: comparator.to_string(),
                        value_type: value_type(value),
                    });
                }
                *current = comparator;
                Ok(())
            }
            _ => Err(RuleError::InvalidNode(format!(
                "节点 {} 不是比较节点，无法修改比较操作符",
                node
            ))),
        }
    }

    /// 将游离子树挂接到逻辑节点的一侧，返回被替换下来的原子节点（变为游离）
    pub fn attach(
        &mut self,
        node: NodeId,
        side: Side,
        subtree: NodeId,
    ) -> Result<Option<NodeId>> {
        self.check_attachable(node, subtree)?;
        self.set_child(node, side, Some(subtree))
    }

    /// 原子地替换逻辑节点的子树，返回原子节点（变为游离）
    ///
    /// 先完成全部检查再修改，失败时规则树保持不变。
    pub fn replace(&mut self, node: NodeId, side: Side, subtree: NodeId) -> Result<NodeId> {
        self.child_of(node, side)?;
        self.check_attachable(node, subtree)?;

        let previous = self.set_child(node, side, Some(subtree))?;
        previous.ok_or_else(|| {
            RuleError::InvalidNode(format!("节点 {} 没有{}子节点", node, side))
        })
    }

    /// 摘下子节点，父节点会处于不完整状态，调用方必须立即补上
    pub(crate) fn detach(&mut self, node: NodeId, side: Side) -> Result<NodeId> {
        let child = self.child_of(node, side)?;
        self.set_child(node, side, None)?;
        Ok(child)
    }

    fn child_of(&self, node: NodeId, side: Side) -> Result<NodeId> {
        let op = self.node(node)?.as_operator().ok_or_else(|| {
            RuleError::InvalidNode(format!("节点 {} 不是逻辑节点", node))
        })?;
        op.child(side).ok_or_else(|| {
            RuleError::InvalidNode(format!("节点 {} 没有 {} 子节点", node, side))
        })
    }

    fn check_attachable(&self, node: NodeId, subtree: NodeId) -> Result<()> {
        if self.node(node)?.as_operator().is_none() {
            return Err(RuleError::InvalidNode(format!(
                "节点 {} 不是逻辑节点，无法挂接子树",
                node
            )));
        }
        self.node(subtree)?;

        // 已有父节点或是根节点：已被持有
        if !self.is_detached(subtree) {
            return Err(RuleError::AlreadyOwned(subtree));
        }
        // 目标节点位于该游离子树内部，挂接会形成环
        if self.is_ancestor(subtree, node) {
            return Err(RuleError::AlreadyOwned(subtree));
        }
        Ok(())
    }
}

fn value_type(value: &Value) -> String {
    if value.is_finite() {
        value.type_name().to_string()
    } else {
        "non-finite number".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn sample() -> Ast {
        parse("age > 30 AND department == 'Sales'").unwrap()
    }

    fn children(ast: &Ast) -> (NodeId, NodeId) {
        let op = ast.root_node().as_operator().unwrap();
        (op.left().unwrap(), op.right().unwrap())
    }

    #[test]
    fn test_set_operator() {
        let mut ast = sample();
        let root = ast.root();
        ast.set_operator(root, LogicalOperator::Or).unwrap();

        assert_eq!(ast.root(), root);
        assert_eq!(ast.to_string(), "age > 30 OR department == 'Sales'");
    }

    #[test]
    fn test_set_operator_on_operand_fails() {
        let mut ast = sample();
        let (left, _) = children(&ast);
        assert!(matches!(
            ast.set_operator(left, LogicalOperator::Or),
            Err(RuleError::InvalidNode(_))
        ));
    }

    #[test]
    fn test_set_operand_value() {
        let mut ast = sample();
        let (left, right) = children(&ast);

        ast.set_operand_value(left, 40).unwrap();
        assert_eq!(ast.to_string(), "age > 40 AND department == 'Sales'");

        // 兄弟节点不受影响
        assert_eq!(
            ast.node(right).unwrap().as_operand(),
            Some(&Operand::comparison("department", Comparator::Eq, "Sales"))
        );
    }

    #[test]
    fn test_set_operand_value_type_checked() {
        let mut ast = sample();
        let (left, right) = children(&ast);

        let err = ast.set_operand_value(left, "thirty").unwrap_err();
        assert!(matches!(
            err,
            RuleError::InvalidValue { ref comparator, ref value_type }
                if comparator == ">" && value_type == "string"
        ));
        assert!(matches!(
            ast.set_operand_value(left, true),
            Err(RuleError::InvalidValue { .. })
        ));
        // 原值保持不变
        assert_eq!(ast.to_string(), "age > 30 AND department == 'Sales'");

        ast.set_operand_value(left, "45").unwrap();
        ast.set_operand_value(right, true).unwrap();
        assert_eq!(ast.to_string(), "age > '45' AND department == true");
    }

    #[test]
    fn test_set_operand_value_rejects_non_finite() {
        let mut ast = sample();
        let (left, right) = children(&ast);

        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                ast.set_operand_value(left, value),
                Err(RuleError::InvalidValue { ref value_type, .. })
                    if value_type == "non-finite number"
            ));
            assert!(ast.set_operand_value(right, value).is_err());
        }
        // 数字字符串形式的无穷大同样不能用于大小比较
        assert!(ast.set_operand_value(left, "inf").is_err());
        assert_eq!(ast.to_string(), "age > 30 AND department == 'Sales'");

        let mut ast = parse("is_even(score)").unwrap();
        let root = ast.root();
        assert!(matches!(
            ast.set_operand_value(root, f64::NAN),
            Err(RuleError::InvalidValue { ref comparator, .. })
                if comparator == "is_even()"
        ));
        assert_eq!(ast.to_string(), "is_even(score)");
    }

    #[test]
    fn test_set_operand_value_on_operator_fails() {
        let mut ast = sample();
        let root = ast.root();
        assert!(matches!(
            ast.set_operand_value(root, 1),
            Err(RuleError::InvalidNode(_))
        ));
    }

    #[test]
    fn test_set_function_argument() {
        let mut ast = parse("is_even(score)").unwrap();
        let root = ast.root();
        ast.set_operand_value(root, 4).unwrap();
        assert_eq!(ast.to_string(), "is_even(4)");
    }

    #[test]
    fn test_set_comparator() {
        let mut ast = sample();
        let (left, right) = children(&ast);

        ast.set_comparator(left, Comparator::Lte).unwrap();
        assert_eq!(ast.to_string(), "age <= 30 AND department == 'Sales'");

        assert!(matches!(
            ast.set_comparator(right, Comparator::Gt),
            Err(RuleError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_attach_fresh_subtree() {
        let mut ast = sample();
        let root = ast.root();
        let fresh = ast.graft(parse("salary > 50000").unwrap());

        let previous = ast.attach(root, Side::Right, fresh).unwrap().unwrap();

        assert_eq!(ast.to_string(), "age > 30 AND salary > 50000");
        assert_eq!(ast.parent(fresh).unwrap(), Some(root));
        assert!(ast.is_detached(previous));
        assert!(ast.validate().is_ok());
    }

    #[test]
    fn test_attach_already_owned_fails() {
        let mut ast = sample();
        let root = ast.root();
        let (left, _) = children(&ast);

        // 左子节点已被根节点持有
        let err = ast.attach(root, Side::Right, left).unwrap_err();
        assert!(matches!(err, RuleError::AlreadyOwned(id) if id == left));

        // 根节点不能挂接到自身
        assert!(matches!(
            ast.attach(root, Side::Left, root),
            Err(RuleError::AlreadyOwned(_))
        ));

        // 同一个游离子树不能挂接两次
        let fresh = ast.insert_operand(Operand::comparison("salary", Comparator::Gt, 50000));
        ast.attach(root, Side::Right, fresh).unwrap();
        let err = ast.attach(root, Side::Left, fresh).unwrap_err();
        assert!(matches!(err, RuleError::AlreadyOwned(id) if id == fresh));

        assert_eq!(ast.to_string(), "age > 30 AND salary > 50000");
    }

    #[test]
    fn test_attach_rejects_cycles() {
        let mut ast = sample();
        let fragment = ast.graft(parse("a == 1 OR b == 2").unwrap());
        let inner_left = ast
            .node(fragment)
            .unwrap()
            .as_operator()
            .unwrap()
            .left()
            .unwrap();
        let replaced = ast.detach(fragment, Side::Left).unwrap();
        assert_eq!(replaced, inner_left);

        // 把游离子树挂到它自己身上会形成环
        let err = ast.attach(fragment, Side::Left, fragment).unwrap_err();
        assert!(matches!(err, RuleError::AlreadyOwned(_)));

        // 摘下来的节点可以重新挂回
        ast.attach(fragment, Side::Left, inner_left).unwrap();
        let root = ast.root();
        ast.replace(root, Side::Left, fragment).unwrap();
        assert_eq!(ast.to_string(), "a == 1 OR b == 2 AND department == 'Sales'");
    }

    #[test]
    fn test_attach_to_operand_fails() {
        let mut ast = sample();
        let (left, _) = children(&ast);
        let fresh = ast.insert_operand(Operand::comparison("x", Comparator::Eq, 1));
        assert!(matches!(
            ast.attach(left, Side::Left, fresh),
            Err(RuleError::InvalidNode(_))
        ));
        assert!(ast.is_detached(fresh));
    }

    #[test]
    fn test_replace_returns_previous_child() {
        let mut ast = sample();
        let root = ast.root();
        let (left, _) = children(&ast);

        let fresh = ast.graft(parse("age >= 18 OR is_manager == true").unwrap());
        let previous = ast.replace(root, Side::Left, fresh).unwrap();

        assert_eq!(previous, left);
        assert!(ast.is_detached(left));
        assert_eq!(
            ast.to_string(),
            "age >= 18 OR is_manager == true AND department == 'Sales'"
        );
        assert!(ast.validate().is_ok());

        // 换下来的节点可以挂接到别处
        let spare = ast.graft(parse("x == 1 AND y == 2").unwrap());
        ast.replace(spare, Side::Right, left).unwrap();
        assert_eq!(ast.parent(left).unwrap(), Some(spare));
    }

    #[test]
    fn test_replace_failure_leaves_tree_unchanged() {
        let mut ast = sample();
        let root = ast.root();
        let (left, _) = children(&ast);
        let before = ast.clone();

        assert!(ast.replace(root, Side::Right, left).is_err());
        assert_eq!(ast, before);
        assert!(ast.validate().is_ok());
    }

    #[test]
    fn test_detach_leaves_parent_incomplete() {
        let mut ast = sample();
        let root = ast.root();
        let detached = ast.detach(root, Side::Right).unwrap();

        assert!(ast.is_detached(detached));
        assert!(matches!(ast.validate(), Err(RuleError::MalformedTree(_))));
        assert!(matches!(
            ast.detach(root, Side::Right),
            Err(RuleError::InvalidNode(_))
        ));

        ast.attach(root, Side::Right, detached).unwrap();
        assert!(ast.validate().is_ok());
        assert_eq!(ast, sample());
    }
}
