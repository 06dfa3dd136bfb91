//! Surface syntax tree produced by the contract-language parser
//!
//! The parser itself lives outside this workspace. These types are the
//! contract between it and the compiler: every expression node carries its
//! kind and an optional source location, and declarations group expressions
//! into behaviors and scenarios.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            file: None,
            line,
            column,
            end_line: line,
            end_column: column,
        }
    }

    pub fn with_end(mut self, end_line: u32, end_column: u32) -> Self {
        self.end_line = end_line;
        self.end_column = end_column;
        self
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// Binary operators of the surface language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    And,
    Or,
    Implies,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    In,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Implies => "implies",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::In => "in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Quantifier keywords: `all`, `any`, `none`, `count`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantifierKind {
    All,
    Any,
    None,
    Count,
}

impl QuantifierKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            QuantifierKind::All => "all",
            QuantifierKind::Any => "any",
            QuantifierKind::None => "none",
            QuantifierKind::Count => "count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl DurationUnit {
    pub fn to_millis(&self, value: i64) -> Option<i64> {
        let factor = match self {
            DurationUnit::Milliseconds => 1,
            DurationUnit::Seconds => 1_000,
            DurationUnit::Minutes => 60_000,
            DurationUnit::Hours => 3_600_000,
            DurationUnit::Days => 86_400_000,
        };
        value.checked_mul(factor)
    }
}

/// A surface expression node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprKind {
    Identifier {
        name: String,
    },
    StringLiteral {
        value: String,
    },
    IntegerLiteral {
        value: i64,
    },
    FloatLiteral {
        value: f64,
    },
    BooleanLiteral {
        value: bool,
    },
    NullLiteral,
    RegexLiteral {
        pattern: String,
        flags: String,
    },
    DurationLiteral {
        value: i64,
        unit: DurationUnit,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Quantifier {
        quantifier: QuantifierKind,
        variable: String,
        collection: Box<Expr>,
        predicate: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Old {
        expression: Box<Expr>,
    },
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    List {
        elements: Vec<Expr>,
    },
    Map {
        entries: Vec<(String, Expr)>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
}

impl ExprKind {
    /// Short kind name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Identifier { .. } => "identifier",
            ExprKind::StringLiteral { .. } => "string literal",
            ExprKind::IntegerLiteral { .. } => "integer literal",
            ExprKind::FloatLiteral { .. } => "float literal",
            ExprKind::BooleanLiteral { .. } => "boolean literal",
            ExprKind::NullLiteral => "null literal",
            ExprKind::RegexLiteral { .. } => "regex literal",
            ExprKind::DurationLiteral { .. } => "duration literal",
            ExprKind::Binary { .. } => "binary expression",
            ExprKind::Unary { .. } => "unary expression",
            ExprKind::Member { .. } => "member expression",
            ExprKind::Call { .. } => "call expression",
            ExprKind::Index { .. } => "index expression",
            ExprKind::Quantifier { .. } => "quantifier",
            ExprKind::Conditional { .. } => "conditional",
            ExprKind::Old { .. } => "old expression",
            ExprKind::Lambda { .. } => "lambda",
            ExprKind::List { .. } => "list literal",
            ExprKind::Map { .. } => "map literal",
            ExprKind::Assign { .. } => "assignment",
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Identifier { name: name.into() })
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ExprKind::StringLiteral {
            value: value.into(),
        })
    }

    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::IntegerLiteral { value })
    }

    pub fn float(value: f64) -> Self {
        Self::new(ExprKind::FloatLiteral { value })
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ExprKind::BooleanLiteral { value })
    }

    pub fn null() -> Self {
        Self::new(ExprKind::NullLiteral)
    }

    pub fn regex(pattern: impl Into<String>, flags: impl Into<String>) -> Self {
        Self::new(ExprKind::RegexLiteral {
            pattern: pattern.into(),
            flags: flags.into(),
        })
    }

    pub fn duration(value: i64, unit: DurationUnit) -> Self {
        Self::new(ExprKind::DurationLiteral { value, unit })
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::new(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::And, left, right)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Or, left, right)
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Eq, left, right)
    }

    pub fn not(operand: Expr) -> Self {
        Self::new(ExprKind::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        })
    }

    pub fn neg(operand: Expr) -> Self {
        Self::new(ExprKind::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(operand),
        })
    }

    pub fn member(object: Expr, property: impl Into<String>) -> Self {
        Self::new(ExprKind::Member {
            object: Box::new(object),
            property: property.into(),
        })
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call {
            callee: Box::new(callee),
            args,
        })
    }

    /// `receiver.method(args...)`
    pub fn method(receiver: Expr, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::call(Self::member(receiver, method), args)
    }

    pub fn index(object: Expr, index: Expr) -> Self {
        Self::new(ExprKind::Index {
            object: Box::new(object),
            index: Box::new(index),
        })
    }

    pub fn quantifier(
        quantifier: QuantifierKind,
        variable: impl Into<String>,
        collection: Expr,
        predicate: Expr,
    ) -> Self {
        Self::new(ExprKind::Quantifier {
            quantifier,
            variable: variable.into(),
            collection: Box::new(collection),
            predicate: Box::new(predicate),
        })
    }

    pub fn conditional(condition: Expr, then_branch: Expr, else_branch: Expr) -> Self {
        Self::new(ExprKind::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    pub fn old(expression: Expr) -> Self {
        Self::new(ExprKind::Old {
            expression: Box::new(expression),
        })
    }

    pub fn lambda(param: impl Into<String>, body: Expr) -> Self {
        Self::new(ExprKind::Lambda {
            params: vec![param.into()],
            body: Box::new(body),
        })
    }

    pub fn list(elements: Vec<Expr>) -> Self {
        Self::new(ExprKind::List { elements })
    }

    pub fn map<K: Into<String>>(entries: Vec<(K, Expr)>) -> Self {
        Self::new(ExprKind::Map {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        })
    }
}

// ===== Declarations =====

/// Primitive and composite type names used in input declarations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRef {
    String,
    Int,
    Decimal,
    Boolean,
    Uuid,
    Timestamp,
    List(Box<TypeRef>),
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
    #[serde(default)]
    pub optional: bool,
}

impl FieldDecl {
    pub fn required(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub invariants: Vec<Expr>,
}

/// Which execution outcome a postcondition block describes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostconditionGuard {
    Success,
    Error(String),
    Any,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostconditionBlock {
    pub guard: PostconditionGuard,
    pub predicates: Vec<Expr>,
}

/// `within <duration>` bound on a behavior's execution time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalDecl {
    pub within: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Ambient effects a behavior may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Network,
    FileSystem,
    Database,
    Clock,
    Random,
    Environment,
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectKind::Network => "network",
            EffectKind::FileSystem => "filesystem",
            EffectKind::Database => "database",
            EffectKind::Clock => "clock",
            EffectKind::Random => "random",
            EffectKind::Environment => "environment",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorDecl {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<FieldDecl>,
    #[serde(default)]
    pub preconditions: Vec<Expr>,
    #[serde(default)]
    pub postconditions: Vec<PostconditionBlock>,
    #[serde(default)]
    pub invariants: Vec<Expr>,
    #[serde(default)]
    pub temporal: Vec<TemporalDecl>,
    #[serde(default)]
    pub effects: Vec<EffectKind>,
}

impl BehaviorDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            preconditions: Vec::new(),
            postconditions: Vec::new(),
            invariants: Vec::new(),
            temporal: Vec::new(),
            effects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScenarioStepDecl {
    /// Invoke a behavior, optionally binding its return value to a name
    Invoke {
        behavior: String,
        args: Vec<(String, Expr)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bind: Option<String>,
        #[serde(default)]
        expect_failure: bool,
    },
    /// Check a raw assertion against the current state and bindings
    Assert { condition: Expr },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDecl {
    pub name: String,
    pub steps: Vec<ScenarioStepDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    #[serde(default)]
    pub entities: Vec<EntityDecl>,
    #[serde(default)]
    pub behaviors: Vec<BehaviorDecl>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioDecl>,
}

impl Domain {
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.name.as_str())
    }

    pub fn behavior(&self, name: &str) -> Option<&BehaviorDecl> {
        self.behaviors.iter().find(|b| b.name == name)
    }
}
