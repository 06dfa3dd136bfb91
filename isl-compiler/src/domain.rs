//! Domain compilation
//!
//! Turns a parsed [`Domain`] into per-behavior compiled contracts and
//! compiled scenarios. Every condition is compiled, normalized, rendered and
//! hashed once here so the runtime only ever sees canonical IR.

use crate::compiler::compile;
use crate::context::CompilationContext;
use crate::error::{CompilerError, Result};
use crate::hash::{contract_hash, CacheStats, CompileCache};
use crate::normalize::normalize;
use crate::render::render;
use isl_core::ast::{
    BehaviorDecl, Domain, EffectKind, Expr, FieldDecl, PostconditionGuard, ScenarioDecl,
    ScenarioStepDecl, SourceLocation,
};
use isl_core::ir::{IrKind, IrLiteral, IrNode};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// One compiled contract expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledCondition {
    /// Human-readable label, e.g. the rendered expression
    pub description: String,
    /// Normalized IR
    pub ir: IrNode,
    /// Canonical rendering of `ir`
    pub expression: String,
    /// Hex SHA-256 of `expression`
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl CompiledCondition {
    pub fn new(ir: IrNode, location: Option<SourceLocation>) -> Self {
        let expression = render(&ir);
        Self {
            description: expression.clone(),
            hash: contract_hash(&ir),
            expression,
            ir,
            location,
        }
    }

    pub fn references_result(&self) -> bool {
        self.ir.references_result()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPostconditionBlock {
    pub guard: PostconditionGuard,
    pub conditions: Vec<CompiledCondition>,
}

/// `within` bound in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTemporal {
    pub within_ms: i64,
    pub description: String,
}

/// An entity invariant, checked against every record of `entity`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledEntityInvariant {
    pub entity: String,
    pub condition: CompiledCondition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledBehavior {
    pub name: String,
    pub inputs: Vec<FieldDecl>,
    pub preconditions: Vec<CompiledCondition>,
    pub postconditions: Vec<CompiledPostconditionBlock>,
    pub invariants: Vec<CompiledCondition>,
    /// Invariants of every entity in the domain
    pub entity_invariants: Vec<CompiledEntityInvariant>,
    pub temporal: Vec<CompiledTemporal>,
    pub effects: BTreeSet<EffectKind>,
}

impl CompiledBehavior {
    /// Number of conditions of every kind
    pub fn condition_count(&self) -> usize {
        self.preconditions.len()
            + self
                .postconditions
                .iter()
                .map(|b| b.conditions.len())
                .sum::<usize>()
            + self.invariants.len()
            + self.entity_invariants.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum CompiledStep {
    Invoke {
        behavior: String,
        args: Vec<(String, IrNode)>,
        bind: Option<String>,
        expect_failure: bool,
    },
    Assert {
        condition: CompiledCondition,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledScenario {
    pub name: String,
    pub steps: Vec<CompiledStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledDomain {
    pub name: String,
    pub entities: Vec<String>,
    pub behaviors: Vec<CompiledBehavior>,
    pub scenarios: Vec<CompiledScenario>,
}

impl CompiledDomain {
    pub fn behavior(&self, name: &str) -> Option<&CompiledBehavior> {
        self.behaviors.iter().find(|b| b.name == name)
    }
}

/// Compiles expressions through a shared cache.
///
/// `Compiler` is `Sync`; [`Compiler::compile_domain`] uses it from rayon
/// worker threads.
#[derive(Default)]
pub struct Compiler {
    cache: CompileCache,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            cache: CompileCache::new(capacity),
        }
    }

    /// Compile and normalize one expression.
    pub fn compile_expr(&self, expr: &Expr, ctx: &CompilationContext) -> Result<IrNode> {
        self.cache
            .get_or_try_insert(expr, ctx, || compile(expr, ctx).map(normalize))
    }

    pub fn compile_condition(
        &self,
        expr: &Expr,
        ctx: &CompilationContext,
    ) -> Result<CompiledCondition> {
        let ir = self.compile_expr(expr, ctx)?;
        Ok(CompiledCondition::new(ir, expr.location.clone()))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn compile_all(
        &self,
        exprs: &[Expr],
        ctx: &CompilationContext,
    ) -> Result<Vec<CompiledCondition>> {
        exprs
            .iter()
            .map(|e| self.compile_condition(e, ctx))
            .collect()
    }

    pub fn compile_behavior(
        &self,
        behavior: &BehaviorDecl,
        entity_invariants: &[CompiledEntityInvariant],
        ctx: &CompilationContext,
    ) -> Result<CompiledBehavior> {
        debug!(behavior = %behavior.name, "compiling behavior");
        let post = ctx.for_postcondition();

        let preconditions = self.compile_all(&behavior.preconditions, ctx)?;
        let postconditions = behavior
            .postconditions
            .iter()
            .map(|block| {
                Ok(CompiledPostconditionBlock {
                    guard: block.guard.clone(),
                    conditions: self.compile_all(&block.predicates, &post)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let invariants = self.compile_all(&behavior.invariants, ctx)?;

        let temporal = behavior
            .temporal
            .iter()
            .map(|t| {
                let ir = self.compile_expr(&t.within, ctx)?;
                let within_ms = match ir.kind {
                    IrKind::Literal {
                        value: IrLiteral::Integer(ms),
                    } if ms >= 0 => ms,
                    _ => {
                        return Err(CompilerError::InvalidTemporalBound {
                            node: Box::new(t.within.clone()),
                        })
                    }
                };
                Ok(CompiledTemporal {
                    within_ms,
                    description: t
                        .description
                        .clone()
                        .unwrap_or_else(|| format!("completes within {}ms", within_ms)),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CompiledBehavior {
            name: behavior.name.clone(),
            inputs: behavior.inputs.clone(),
            preconditions,
            postconditions,
            invariants,
            entity_invariants: entity_invariants.to_vec(),
            temporal,
            effects: behavior.effects.iter().copied().collect(),
        })
    }

    pub fn compile_scenario(
        &self,
        domain: &Domain,
        scenario: &ScenarioDecl,
        ctx: &CompilationContext,
    ) -> Result<CompiledScenario> {
        debug!(scenario = %scenario.name, "compiling scenario");
        // Names bound by earlier steps are in scope for later ones.
        let mut scope = ctx.clone();
        let mut steps = Vec::with_capacity(scenario.steps.len());
        for step in &scenario.steps {
            match step {
                ScenarioStepDecl::Invoke {
                    behavior,
                    args,
                    bind,
                    expect_failure,
                } => {
                    if domain.behavior(behavior).is_none() {
                        return Err(CompilerError::UnknownBehavior {
                            scenario: scenario.name.clone(),
                            behavior: behavior.clone(),
                        });
                    }
                    let args = args
                        .iter()
                        .map(|(name, expr)| Ok((name.clone(), self.compile_expr(expr, &scope)?)))
                        .collect::<Result<Vec<_>>>()?;
                    steps.push(CompiledStep::Invoke {
                        behavior: behavior.clone(),
                        args,
                        bind: bind.clone(),
                        expect_failure: *expect_failure,
                    });
                    if let Some(name) = bind {
                        scope = scope.with_variable(name.clone());
                    }
                }
                ScenarioStepDecl::Assert { condition } => {
                    steps.push(CompiledStep::Assert {
                        condition: self.compile_condition(condition, &scope)?,
                    });
                }
            }
        }
        Ok(CompiledScenario {
            name: scenario.name.clone(),
            steps,
        })
    }

    /// Compile every behavior and scenario of a domain.
    ///
    /// Behaviors compile in parallel; the output keeps declaration order and
    /// the first error in declaration order is the one returned.
    pub fn compile_domain(&self, domain: &Domain) -> Result<CompiledDomain> {
        let ctx = CompilationContext::new(domain.entity_names());
        let entity_invariants = domain
            .entities
            .iter()
            .flat_map(|entity| {
                let scope = ctx.with_variables(entity.fields.iter().map(|f| f.name.clone()));
                entity.invariants.iter().map(move |inv| {
                    Ok(CompiledEntityInvariant {
                        entity: entity.name.clone(),
                        condition: self.compile_condition(inv, &scope)?,
                    })
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let behaviors = domain
            .behaviors
            .par_iter()
            .map(|b| self.compile_behavior(b, &entity_invariants, &ctx))
            .collect::<Vec<_>>()
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let scenarios = domain
            .scenarios
            .iter()
            .map(|s| self.compile_scenario(domain, s, &ctx))
            .collect::<Result<Vec<_>>>()?;

        info!(
            domain = %domain.name,
            behaviors = behaviors.len(),
            scenarios = scenarios.len(),
            "compiled domain"
        );
        Ok(CompiledDomain {
            name: domain.name.clone(),
            entities: domain.entity_names().map(str::to_string).collect(),
            behaviors,
            scenarios,
        })
    }
}

#[cfg(test)]
#[path = "domain/domain_tests.rs"]
mod tests;
