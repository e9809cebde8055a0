//! 规则抽象语法树
//!
//! 规则树以 arena 方式存储：所有节点归 [`Ast`] 所有，通过 [`NodeId`] 寻址，
//! 每个节点记录自己的父节点。一个节点最多只有一个父节点，根节点没有父节点；
//! 既不是根也没有父节点的节点处于"游离"状态，可以被挂接一次。
//!
//! 逻辑节点总是二叉的。结构完整性由 [`Ast::validate`] 检查。
//!
//! 无括号的规则链会折叠成与条件数量同深的左倾树，因此遍历、比较和格式化
//! 都使用显式栈。嵌套形式的序列化表示是递归的，深度受 [`MAX_SERIALIZE_DEPTH`] 限制。

use crate::error::{Result, RuleError};
use crate::operators::{Comparator, LogicalOperator};
use crate::value::Value;
use serde::de::Deserializer;
use serde::ser::{Error as _, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 序列化与反序列化允许的最大树深度
pub const MAX_SERIALIZE_DEPTH: usize = 128;

/// 节点在 arena 中的索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 子节点位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// 函数参数：字面量，或在评估时从记录中读取的字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Argument {
    Literal(Value),
    Field(String),
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{}", value),
            Self::Field(field) => f.write_str(field),
        }
    }
}

/// 叶子节点
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `field comparator value`
    Comparison {
        field: String,
        comparator: Comparator,
        value: Value,
    },
    /// `function(argument)`，调用注册表中的用户函数
    Function { name: String, argument: Argument },
}

impl Operand {
    pub fn comparison(
        field: impl Into<String>,
        comparator: Comparator,
        value: impl Into<Value>,
    ) -> Self {
        Self::Comparison {
            field: field.into(),
            comparator,
            value: value.into(),
        }
    }

    pub fn function(name: impl Into<String>, argument: Argument) -> Self {
        Self::Function {
            name: name.into(),
            argument,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comparison {
                field,
                comparator,
                value,
            } => write!(f, "{} {} {}", field, comparator, value),
            Self::Function { name, argument } => write!(f, "{}({})", name, argument),
        }
    }
}

/// 逻辑节点
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorNode {
    pub(crate) operator: LogicalOperator,
    pub(crate) left: Option<NodeId>,
    pub(crate) right: Option<NodeId>,
}

impl OperatorNode {
    pub fn operator(&self) -> LogicalOperator {
        self.operator
    }

    pub fn left(&self) -> Option<NodeId> {
        self.left
    }

    pub fn right(&self) -> Option<NodeId> {
        self.right
    }

    pub fn child(&self, side: Side) -> Option<NodeId> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    fn child_mut(&mut self, side: Side) -> &mut Option<NodeId> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

/// 规则树节点
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Operator(OperatorNode),
    Operand(Operand),
}

impl Node {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Operator(_) => "operator",
            Self::Operand(_) => "operand",
        }
    }

    pub fn as_operator(&self) -> Option<&OperatorNode> {
        match self {
            Self::Operator(op) => Some(op),
            Self::Operand(_) => None,
        }
    }

    pub fn as_operand(&self) -> Option<&Operand> {
        match self {
            Self::Operand(operand) => Some(operand),
            Self::Operator(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    node: Node,
    parent: Option<NodeId>,
}

/// 规则树
#[derive(Debug, Clone)]
pub struct Ast {
    slots: Vec<Slot>,
    root: NodeId,
}

impl Ast {
    /// 创建只包含一个叶子节点的树
    pub fn operand(operand: Operand) -> Self {
        Self {
            slots: vec![Slot {
                node: Node::Operand(operand),
                parent: None,
            }],
            root: NodeId(0),
        }
    }

    /// 以 `self` 为左子树、`right` 为右子树构造新的根节点
    ///
    /// 左子树的节点 id 保持不变。
    pub fn join(mut self, operator: LogicalOperator, right: Ast) -> Self {
        let left = self.root;
        let right = self.graft(right);
        let root = self.push(
            Node::Operator(OperatorNode {
                operator,
                left: Some(left),
                right: Some(right),
            }),
            None,
        );
        self.slots[left.0].parent = Some(root);
        self.slots[right.0].parent = Some(root);
        self.root = root;
        self
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// 获取节点
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.slots
            .get(id.0)
            .map(|slot| &slot.node)
            .ok_or_else(|| RuleError::InvalidNode(format!("节点 {} 不存在", id)))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.slots
            .get_mut(id.0)
            .map(|slot| &mut slot.node)
            .ok_or_else(|| RuleError::InvalidNode(format!("节点 {} 不存在", id)))
    }

    pub fn root_node(&self) -> &Node {
        &self.slots[self.root.0].node
    }

    /// 获取父节点
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        self.slots
            .get(id.0)
            .map(|slot| slot.parent)
            .ok_or_else(|| RuleError::InvalidNode(format!("节点 {} 不存在", id)))
    }

    /// 节点是否游离（无父节点且不是根）
    pub fn is_detached(&self, id: NodeId) -> bool {
        id != self.root && self.slots.get(id.0).is_some_and(|slot| slot.parent.is_none())
    }

    /// `ancestor` 是否为 `id` 本身或其祖先
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.slots.get(node.0).and_then(|slot| slot.parent);
        }
        false
    }

    /// 将另一棵树移入当前 arena，返回其根节点 id（处于游离状态）
    pub fn graft(&mut self, other: Ast) -> NodeId {
        let offset = self.slots.len();
        let shift = |id: NodeId| NodeId(id.0 + offset);

        for slot in other.slots {
            let node = match slot.node {
                Node::Operator(op) => Node::Operator(OperatorNode {
                    operator: op.operator,
                    left: op.left.map(shift),
                    right: op.right.map(shift),
                }),
                operand => operand,
            };
            self.slots.push(Slot {
                node,
                parent: slot.parent.map(shift),
            });
        }

        shift(other.root)
    }

    /// 插入一个游离的叶子节点
    pub fn insert_operand(&mut self, operand: Operand) -> NodeId {
        self.push(Node::Operand(operand), None)
    }

    fn push(&mut self, node: Node, parent: Option<NodeId>) -> NodeId {
        self.slots.push(Slot { node, parent });
        NodeId(self.slots.len() - 1)
    }

    /// 设置子节点并维护父指针，返回原子节点（已变为游离）
    ///
    /// 调用方负责所有权检查。
    pub(crate) fn set_child(
        &mut self,
        parent: NodeId,
        side: Side,
        child: Option<NodeId>,
    ) -> Result<Option<NodeId>> {
        let Node::Operator(op) = self.node_mut(parent)? else {
            return Err(RuleError::InvalidNode(format!("节点 {} 不是逻辑节点", parent)));
        };
        let previous = std::mem::replace(op.child_mut(side), child);

        if let Some(old) = previous {
            self.slots[old.0].parent = None;
        }
        if let Some(new) = child {
            self.slots[new.0].parent = Some(parent);
        }
        Ok(previous)
    }

    /// 从根开始先序遍历可达节点
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            order.push(id);
            if let Node::Operator(op) = &self.slots[id.0].node {
                // 右先入栈，保证左子树先被访问
                stack.extend(op.right);
                stack.extend(op.left);
            }
        }

        order
    }

    /// 可达的叶子节点
    pub fn operands(&self) -> impl Iterator<Item = &Operand> + '_ {
        self.preorder()
            .into_iter()
            .filter_map(move |id| self.slots[id.0].node.as_operand())
    }

    /// 可达节点数量
    pub fn node_count(&self) -> usize {
        self.preorder().len()
    }

    /// 树的深度（单节点为 1）
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self.root, 1)];

        while let Some((id, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Node::Operator(op) = &self.slots[id.0].node {
                stack.extend(op.left.map(|l| (l, depth + 1)));
                stack.extend(op.right.map(|r| (r, depth + 1)));
            }
        }

        deepest
    }

    /// 检查结构完整性：每个可达的逻辑节点都有左右两个子节点
    pub fn validate(&self) -> Result<()> {
        for id in self.preorder() {
            if let Node::Operator(op) = &self.slots[id.0].node {
                for side in [Side::Left, Side::Right] {
                    if op.child(side).is_none() {
                        return Err(RuleError::MalformedTree(format!(
                            "逻辑节点 {} 缺少{}子节点",
                            id,
                            if side == Side::Left { "左" } else { "右" }
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn to_repr(&self, id: NodeId) -> Result<NodeRepr> {
        let repr = match self.node(id)? {
            Node::Operand(Operand::Comparison {
                field,
                comparator,
                value,
            }) => NodeRepr::Comparison {
                field: field.clone(),
                comparator: *comparator,
                value: value.clone(),
            },
            Node::Operand(Operand::Function { name, argument }) => NodeRepr::Function {
                name: name.clone(),
                argument: argument.clone(),
            },
            Node::Operator(op) => {
                let (Some(left), Some(right)) = (op.left, op.right) else {
                    return Err(RuleError::MalformedTree(format!(
                        "逻辑节点 {} 缺少子节点",
                        id
                    )));
                };
                NodeRepr::Operator {
                    operator: op.operator,
                    left: Box::new(self.to_repr(left)?),
                    right: Box::new(self.to_repr(right)?),
                }
            }
        };
        Ok(repr)
    }

    fn from_repr(repr: NodeRepr) -> Self {
        match repr {
            NodeRepr::Comparison {
                field,
                comparator,
                value,
            } => Self::operand(Operand::Comparison {
                field,
                comparator,
                value,
            }),
            NodeRepr::Function { name, argument } => {
                Self::operand(Operand::Function { name, argument })
            }
            NodeRepr::Operator {
                operator,
                left,
                right,
            } => Self::from_repr(*left).join(operator, Self::from_repr(*right)),
        }
    }

    fn fmt_node(&self, id: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pieces = vec![Piece::Node(id)];

        while let Some(piece) = pieces.pop() {
            match piece {
                Piece::Text(text) => f.write_str(text)?,
                Piece::Operator(operator) => write!(f, " {} ", operator)?,
                Piece::Node(id) => match &self.slots[id.0].node {
                    Node::Operand(operand) => write!(f, "{}", operand)?,
                    Node::Operator(op) => {
                        // 逆序入栈
                        match op.right {
                            // 左结合折叠，右侧的逻辑子树需要括号才能还原结构
                            Some(right) if self.slots[right.0].node.as_operator().is_some() => {
                                pieces.push(Piece::Text(")"));
                                pieces.push(Piece::Node(right));
                                pieces.push(Piece::Text("("));
                            }
                            Some(right) => pieces.push(Piece::Node(right)),
                            None => pieces.push(Piece::Text("<missing>")),
                        }
                        pieces.push(Piece::Operator(op.operator));
                        pieces.push(op.left.map_or(Piece::Text("<missing>"), Piece::Node));
                    }
                },
            }
        }

        Ok(())
    }
}

/// 规范文本的输出片段
enum Piece {
    Node(NodeId),
    Operator(LogicalOperator),
    Text(&'static str),
}

/// 输出可被重新解析的规范规则文本
impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(self.root, f)
    }
}

/// 结构相等：忽略 arena 布局与节点 id
///
/// 缺少子节点的树与任何树都不相等。
impl PartialEq for Ast {
    fn eq(&self, other: &Self) -> bool {
        let mut pairs = vec![(Some(self.root), Some(other.root))];

        while let Some(pair) = pairs.pop() {
            let (Some(a), Some(b)) = pair else {
                return false;
            };
            match (&self.slots[a.0].node, &other.slots[b.0].node) {
                (Node::Operand(x), Node::Operand(y)) if x == y => {}
                (Node::Operator(x), Node::Operator(y)) if x.operator == y.operator => {
                    pairs.push((x.right, y.right));
                    pairs.push((x.left, y.left));
                }
                _ => return false,
            }
        }

        true
    }
}

impl Serialize for Ast {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let depth = self.depth();
        if depth > MAX_SERIALIZE_DEPTH {
            return Err(S::Error::custom(format!(
                "规则树深度 {} 超过序列化上限 {}",
                depth, MAX_SERIALIZE_DEPTH
            )));
        }

        self.to_repr(self.root)
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Ast {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        NodeRepr::deserialize(deserializer).map(Self::from_repr)
    }
}

/// 嵌套形式的序列化表示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum NodeRepr {
    Operator {
        operator: LogicalOperator,
        left: Box<NodeRepr>,
        right: Box<NodeRepr>,
    },
    Comparison {
        field: String,
        comparator: Comparator,
        value: Value,
    },
    Function {
        name: String,
        argument: Argument,
    },
}
