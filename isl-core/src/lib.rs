//! Core types shared by the contract compiler and the verification runtime
//!
//! This crate holds the surface syntax tree handed over by the parser, the
//! intermediate representation produced by the compiler, and the runtime
//! value model that evaluation operates on.

pub mod ast;
pub mod ir;
pub mod value;

pub use ast::{
    BehaviorDecl, BinaryOp, Domain, DurationUnit, EffectKind, EntityDecl, Expr, ExprKind,
    FieldDecl, PostconditionBlock, PostconditionGuard, QuantifierKind, ScenarioDecl,
    ScenarioStepDecl, SourceLocation, TemporalDecl, TypeRef, UnaryOp,
};
pub use ir::{
    ArithmeticOp, ComparisonOp, IdGenerator, IrBuilder, IrKind, IrLiteral, IrNode, IrNodeId,
};
pub use value::{Value, ValueError, ValueMap, ValueResult};
