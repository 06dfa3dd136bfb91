//! Intermediate representation for compiled contract expressions
//!
//! The IR is a closed sum type: the compiler, the normalizer and the
//! evaluator each match on it exhaustively, so a new node kind is a
//! compile-time-checked change in all three.
//!
//! Every node carries an identity assigned by an [`IdGenerator`] that starts
//! from 1 for each independent compilation, and an optional source location.
//! Neither participates in structural equality.

use crate::ast::{QuantifierKind, SourceLocation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

/// Node identifier within one compiled expression tree
///
/// Uses NonZeroU32 so that `Option<IrNodeId>` stays pointer-sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrNodeId(pub NonZeroU32);

impl IrNodeId {
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(IrNodeId)
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for IrNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ir{}", self.0)
    }
}

/// Hands out node ids for one compilation.
///
/// A generator is created (or reset) at the entry of every top-level
/// compilation so that structurally identical inputs produce identical ids.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    next: u32,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn reset(&mut self) {
        self.next = 1;
    }

    pub fn next_id(&mut self) -> IrNodeId {
        let id = IrNodeId::new(self.next).unwrap_or(IrNodeId(NonZeroU32::MIN));
        self.next = self.next.saturating_add(1);
        id
    }

    /// Number of ids handed out since the last reset
    pub fn issued(&self) -> u32 {
        self.next - 1
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum IrLiteral {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
    Regex { pattern: String, flags: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }

    /// The operator that gives the same answer with operands swapped
    pub fn mirrored(&self) -> Self {
        match self {
            ComparisonOp::Lt => ComparisonOp::Gt,
            ComparisonOp::Le => ComparisonOp::Ge,
            ComparisonOp::Gt => ComparisonOp::Lt,
            ComparisonOp::Ge => ComparisonOp::Le,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithmeticOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
            ArithmeticOp::Mod => "%",
        }
    }
}

/// A compiled expression node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrNode {
    pub id: IrNodeId,
    pub kind: IrKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl PartialEq for IrNode {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum IrKind {
    Literal {
        value: IrLiteral,
    },
    Variable {
        name: String,
    },
    PropertyAccess {
        object: Box<IrNode>,
        property: String,
    },
    InputValue {
        property: String,
    },
    ResultValue {
        property: Option<String>,
    },
    Old {
        inner: Box<IrNode>,
    },
    LogicalAnd {
        operands: Vec<IrNode>,
    },
    LogicalOr {
        operands: Vec<IrNode>,
    },
    Not {
        operand: Box<IrNode>,
    },
    Equality {
        left: Box<IrNode>,
        right: Box<IrNode>,
        negated: bool,
    },
    Comparison {
        op: ComparisonOp,
        left: Box<IrNode>,
        right: Box<IrNode>,
    },
    Arithmetic {
        op: ArithmeticOp,
        left: Box<IrNode>,
        right: Box<IrNode>,
    },
    Negate {
        operand: Box<IrNode>,
    },
    Exists {
        target: Box<IrNode>,
        expected: bool,
    },
    InSet {
        value: Box<IrNode>,
        set: Box<IrNode>,
        negated: bool,
    },
    StringIncludes {
        string: Box<IrNode>,
        needle: Box<IrNode>,
    },
    StringStartsWith {
        string: Box<IrNode>,
        prefix: Box<IrNode>,
    },
    StringEndsWith {
        string: Box<IrNode>,
        suffix: Box<IrNode>,
    },
    StringMatches {
        string: Box<IrNode>,
        pattern: Box<IrNode>,
    },
    StringLength {
        string: Box<IrNode>,
    },
    ArrayIncludes {
        array: Box<IrNode>,
        element: Box<IrNode>,
    },
    ArrayEvery {
        array: Box<IrNode>,
        param: String,
        predicate: Box<IrNode>,
    },
    ArraySome {
        array: Box<IrNode>,
        param: String,
        predicate: Box<IrNode>,
    },
    ArrayFilter {
        array: Box<IrNode>,
        param: String,
        predicate: Box<IrNode>,
    },
    ArrayMap {
        array: Box<IrNode>,
        param: String,
        mapper: Box<IrNode>,
    },
    ArrayLength {
        array: Box<IrNode>,
    },
    Quantifier {
        kind: QuantifierKind,
        collection: Box<IrNode>,
        bound_var: String,
        predicate: Box<IrNode>,
    },
    Conditional {
        condition: Box<IrNode>,
        then_branch: Box<IrNode>,
        else_branch: Box<IrNode>,
    },
    Call {
        name: String,
        args: Vec<IrNode>,
    },
    EntityExists {
        entity: String,
        key: Option<Box<IrNode>>,
    },
    EntityLookup {
        entity: String,
        key: Option<Box<IrNode>>,
    },
    EntityCount {
        entity: String,
        key: Option<Box<IrNode>>,
    },
    Index {
        object: Box<IrNode>,
        index: Box<IrNode>,
    },
    List {
        elements: Vec<IrNode>,
    },
    Map {
        entries: Vec<(String, IrNode)>,
    },
}

impl IrNode {
    pub fn new(id: IrNodeId, kind: IrKind) -> Self {
        Self {
            id,
            kind,
            location: None,
        }
    }

    pub fn with_location(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, IrKind::Literal { .. })
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(
            self.kind,
            IrKind::Literal {
                value: IrLiteral::Null
            }
        )
    }

    pub fn as_bool_literal(&self) -> Option<bool> {
        match self.kind {
            IrKind::Literal {
                value: IrLiteral::Boolean(b),
            } => Some(b),
            _ => None,
        }
    }

    /// Whether this subtree references the post-execution `result`
    pub fn references_result(&self) -> bool {
        let mut found = false;
        self.walk(&mut |node| {
            if matches!(node.kind, IrKind::ResultValue { .. }) {
                found = true;
            }
        });
        found
    }

    /// Number of nodes in this subtree
    pub fn size(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    /// Visit every node in pre-order
    pub fn walk<F: FnMut(&IrNode)>(&self, f: &mut F) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Visit every node mutably in pre-order
    pub fn walk_mut<F: FnMut(&mut IrNode)>(&mut self, f: &mut F) {
        f(self);
        for child in self.children_mut() {
            child.walk_mut(f);
        }
    }

    /// Direct children in evaluation order
    pub fn children(&self) -> Vec<&IrNode> {
        use IrKind::*;
        match &self.kind {
            Literal { .. } | Variable { .. } | InputValue { .. } | ResultValue { .. } => vec![],
            PropertyAccess { object, .. } => vec![&**object],
            Old { inner } => vec![&**inner],
            LogicalAnd { operands } | LogicalOr { operands } => operands.iter().collect(),
            Not { operand } | Negate { operand } => vec![&**operand],
            Equality { left, right, .. }
            | Comparison { left, right, .. }
            | Arithmetic { left, right, .. } => vec![&**left, &**right],
            Exists { target, .. } => vec![&**target],
            InSet { value, set, .. } => vec![&**value, &**set],
            StringIncludes { string, needle: other }
            | StringStartsWith { string, prefix: other }
            | StringEndsWith { string, suffix: other }
            | StringMatches { string, pattern: other } => vec![&**string, &**other],
            StringLength { string } => vec![&**string],
            ArrayIncludes { array, element } => vec![&**array, &**element],
            ArrayEvery { array, predicate, .. }
            | ArraySome { array, predicate, .. }
            | ArrayFilter { array, predicate, .. }
            | ArrayMap {
                array,
                mapper: predicate,
                ..
            } => vec![&**array, &**predicate],
            ArrayLength { array } => vec![&**array],
            Quantifier {
                collection,
                predicate,
                ..
            } => vec![&**collection, &**predicate],
            Conditional {
                condition,
                then_branch,
                else_branch,
            } => vec![&**condition, &**then_branch, &**else_branch],
            Call { args, .. } => args.iter().collect(),
            EntityExists { key, .. } | EntityLookup { key, .. } | EntityCount { key, .. } => {
                key.iter().map(|k| k.as_ref()).collect()
            }
            Index { object, index } => vec![&**object, &**index],
            List { elements } => elements.iter().collect(),
            Map { entries } => entries.iter().map(|(_, v)| v).collect(),
        }
    }

    fn children_mut(&mut self) -> Vec<&mut IrNode> {
        use IrKind::*;
        match &mut self.kind {
            Literal { .. } | Variable { .. } | InputValue { .. } | ResultValue { .. } => vec![],
            PropertyAccess { object, .. } => vec![&mut **object],
            Old { inner } => vec![&mut **inner],
            LogicalAnd { operands } | LogicalOr { operands } => operands.iter_mut().collect(),
            Not { operand } | Negate { operand } => vec![&mut **operand],
            Equality { left, right, .. }
            | Comparison { left, right, .. }
            | Arithmetic { left, right, .. } => vec![&mut **left, &mut **right],
            Exists { target, .. } => vec![&mut **target],
            InSet { value, set, .. } => vec![&mut **value, &mut **set],
            StringIncludes { string, needle: other }
            | StringStartsWith { string, prefix: other }
            | StringEndsWith { string, suffix: other }
            | StringMatches { string, pattern: other } => vec![&mut **string, &mut **other],
            StringLength { string } => vec![&mut **string],
            ArrayIncludes { array, element } => vec![&mut **array, &mut **element],
            ArrayEvery { array, predicate, .. }
            | ArraySome { array, predicate, .. }
            | ArrayFilter { array, predicate, .. }
            | ArrayMap {
                array,
                mapper: predicate,
                ..
            } => vec![&mut **array, &mut **predicate],
            ArrayLength { array } => vec![&mut **array],
            Quantifier {
                collection,
                predicate,
                ..
            } => vec![&mut **collection, &mut **predicate],
            Conditional {
                condition,
                then_branch,
                else_branch,
            } => vec![&mut **condition, &mut **then_branch, &mut **else_branch],
            Call { args, .. } => args.iter_mut().collect(),
            EntityExists { key, .. } | EntityLookup { key, .. } | EntityCount { key, .. } => {
                key.iter_mut().map(|k| k.as_mut()).collect()
            }
            Index { object, index } => vec![&mut **object, &mut **index],
            List { elements } => elements.iter_mut().collect(),
            Map { entries } => entries.iter_mut().map(|(_, v)| v).collect(),
        }
    }

    /// Reassign ids in pre-order starting from a fresh generator
    pub fn renumber(&mut self) {
        let mut ids = IdGenerator::new();
        self.walk_mut(&mut |node| node.id = ids.next_id());
    }
}

/// Constructors that draw ids from a generator.
///
/// The compiler and normalizer build every node through these so that id
/// assignment order is a function of tree shape alone.
pub struct IrBuilder<'a> {
    ids: &'a mut IdGenerator,
}

impl<'a> IrBuilder<'a> {
    pub fn new(ids: &'a mut IdGenerator) -> Self {
        Self { ids }
    }

    pub fn node(&mut self, kind: IrKind) -> IrNode {
        IrNode::new(self.ids.next_id(), kind)
    }

    pub fn literal(&mut self, value: IrLiteral) -> IrNode {
        self.node(IrKind::Literal { value })
    }

    pub fn boolean(&mut self, value: bool) -> IrNode {
        self.literal(IrLiteral::Boolean(value))
    }

    pub fn variable(&mut self, name: impl Into<String>) -> IrNode {
        self.node(IrKind::Variable { name: name.into() })
    }

    pub fn and(&mut self, operands: Vec<IrNode>) -> IrNode {
        self.node(IrKind::LogicalAnd { operands })
    }

    pub fn or(&mut self, operands: Vec<IrNode>) -> IrNode {
        self.node(IrKind::LogicalOr { operands })
    }

    pub fn not(&mut self, operand: IrNode) -> IrNode {
        self.node(IrKind::Not {
            operand: Box::new(operand),
        })
    }

    pub fn exists(&mut self, target: IrNode, expected: bool) -> IrNode {
        self.node(IrKind::Exists {
            target: Box::new(target),
            expected,
        })
    }

    pub fn equality(&mut self, left: IrNode, right: IrNode, negated: bool) -> IrNode {
        self.node(IrKind::Equality {
            left: Box::new(left),
            right: Box::new(right),
            negated,
        })
    }

    pub fn comparison(&mut self, op: ComparisonOp, left: IrNode, right: IrNode) -> IrNode {
        self.node(IrKind::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn arithmetic(&mut self, op: ArithmeticOp, left: IrNode, right: IrNode) -> IrNode {
        self.node(IrKind::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn in_set(&mut self, value: IrNode, set: IrNode, negated: bool) -> IrNode {
        self.node(IrKind::InSet {
            value: Box::new(value),
            set: Box::new(set),
            negated,
        })
    }

    pub fn call(&mut self, name: impl Into<String>, args: Vec<IrNode>) -> IrNode {
        self.node(IrKind::Call {
            name: name.into(),
            args,
        })
    }
}

#[cfg(test)]
#[path = "ir_tests.rs"]
mod tests;
