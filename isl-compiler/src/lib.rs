//! Contract compiler
//!
//! Lowers contract-language expressions into canonical IR:
//!
//! - [`compile`] maps one surface expression to IR under a
//!   [`CompilationContext`]
//! - [`normalize`] rewrites IR into its canonical form
//! - [`render`] and [`contract_hash`] give the canonical text and its hash
//! - [`Compiler`] ties these together with a cache and compiles whole domains

pub mod compiler;
pub mod context;
pub mod domain;
pub mod error;
pub mod hash;
pub mod normalize;
pub mod render;

pub use compiler::compile;
pub use context::CompilationContext;
pub use domain::{
    CompiledBehavior, CompiledCondition, CompiledDomain, CompiledEntityInvariant, CompiledPostconditionBlock,
    CompiledScenario, CompiledStep, CompiledTemporal, Compiler,
};
pub use error::{CompilerError, Result};
pub use hash::{contract_hash, CacheStats, CompileCache};
pub use normalize::normalize;
pub use render::render;
