//! Top-level verification pipeline
//!
//! Compile the domain, verify every fixture against its own fresh store,
//! run scenarios one after another, then score and gate the result.
//! Compilation, binding and sandbox failures abort; everything else ends up
//! in the report.

use crate::bindings::{load_fixtures, BindingSource, FixtureSet, StateSeed};
use crate::config::VerifyOptions;
use crate::errors::{BindingError, Result, SandboxError};
use crate::gate::VerifyResult;
use crate::orchestrator::{BehaviorResult, BehaviorRunner};
use crate::report::{self, VerificationReport};
use crate::sandbox::{Loader, Sandbox, TargetRef};
use crate::scenario::{ScenarioRunner, TargetTable};
use futures::future::join_all;
use isl_compiler::{CompiledDomain, Compiler};
use isl_core::ast::Domain;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Read a domain AST serialized as JSON
pub fn load_domain(path: &Path) -> std::result::Result<Domain, BindingError> {
    let text = std::fs::read_to_string(path).map_err(|e| BindingError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| BindingError::Malformed(e.to_string()))
}

pub struct Verifier {
    options: VerifyOptions,
    sandbox: Sandbox,
    compiler: Compiler,
    targets: TargetTable,
}

impl Verifier {
    pub fn new(options: VerifyOptions, loader: Arc<dyn Loader>) -> Self {
        Self {
            options,
            sandbox: Sandbox::new(loader),
            compiler: Compiler::new(),
            targets: TargetTable::new(),
        }
    }

    /// Bind a behavior to an explicit target instead of `impl_path::<behavior>`
    pub fn with_target(mut self, behavior: impl Into<String>, target: TargetRef) -> Self {
        self.targets.insert(behavior.into(), target);
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.sandbox = self.sandbox.with_env(env);
        self
    }

    pub fn options(&self) -> &VerifyOptions {
        &self.options
    }

    /// Target for `behavior`: an explicit binding, else the export named
    /// after the behavior in `impl_path`.
    pub fn target_for(&self, behavior: &str) -> Result<TargetRef> {
        if let Some(target) = self.targets.get(behavior) {
            return Ok(target.clone());
        }
        if self.options.impl_path.is_empty() {
            return Err(BindingError::NoTarget(behavior.to_string()).into());
        }
        let mut target = TargetRef::new(self.options.impl_path.clone(), behavior)
            .with_timeout(Duration::from_millis(self.options.timeout_ms));
        if let Some(root) = &self.options.project_root {
            target = target.with_project_root(root.clone());
        }
        Ok(target)
    }

    /// Verify the domain at `spec_path` with fixtures from `source`
    pub async fn verify_files(&self, source: BindingSource) -> Result<(VerificationReport, VerifyResult)> {
        let domain = load_domain(&self.options.spec_path)?;
        let fixtures = load_fixtures(source)?;
        self.verify(&domain, &fixtures).await
    }

    pub async fn verify(
        &self,
        domain: &Domain,
        fixtures: &FixtureSet,
    ) -> Result<(VerificationReport, VerifyResult)> {
        let start = Instant::now();
        info!(domain = %domain.name, fixtures = fixtures.fixtures.len(), "verifying domain");
        let compiled = self.compiler.compile_domain(domain)?;
        let runner = BehaviorRunner::new(self.sandbox.clone()).with_entities(compiled.entities.clone());

        let behaviors = self.run_fixtures(&compiled, &runner, fixtures).await?;

        let targets: TargetTable = compiled
            .behaviors
            .iter()
            .filter_map(|b| self.target_for(&b.name).ok().map(|t| (b.name.clone(), t)))
            .collect();
        let scenario_runner = ScenarioRunner::new(&runner, &compiled, &targets);
        let mut scenarios = Vec::with_capacity(compiled.scenarios.len());
        for scenario in &compiled.scenarios {
            scenarios.push(scenario_runner.run(scenario, &StateSeed::default()).await?);
        }

        let report = VerificationReport::new(
            compiled.name.clone(),
            behaviors,
            scenarios,
            start.elapsed().as_millis() as u64,
        );
        let result = VerifyResult::from_report_with_thresholds(&report, &self.options.thresholds);
        info!(verdict = %result.verdict, score = result.score, "verification finished");
        Ok((report, result))
    }

    async fn run_fixtures(
        &self,
        compiled: &CompiledDomain,
        runner: &BehaviorRunner,
        fixtures: &FixtureSet,
    ) -> Result<Vec<BehaviorResult>> {
        let mut jobs = Vec::with_capacity(fixtures.fixtures.len());
        for fixture in &fixtures.fixtures {
            let behavior = compiled
                .behavior(&fixture.behavior)
                .ok_or_else(|| BindingError::UnknownBehavior(fixture.behavior.clone()))?;
            jobs.push((behavior.clone(), self.target_for(&behavior.name)?, fixture.clone()));
        }
        for behavior in &compiled.behaviors {
            if fixtures.for_behavior(&behavior.name).next().is_none() {
                warn!(behavior = %behavior.name, "no fixtures, behavior not verified");
            }
        }

        if !self.options.parallel {
            let mut results = Vec::with_capacity(jobs.len());
            for (behavior, target, fixture) in &jobs {
                results.push(runner.verify_behavior(behavior, target, fixture).await?);
            }
            return Ok(results);
        }

        let handles: Vec<_> = jobs
            .into_iter()
            .map(|(behavior, target, fixture)| {
                let runner = runner.clone();
                tokio::spawn(async move { runner.verify_behavior(&behavior, &target, &fixture).await })
            })
            .collect();
        let mut results = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            results.push(joined.map_err(|e| SandboxError::Worker(e.to_string()))??);
        }
        Ok(results)
    }

    /// Render a report in the configured format
    pub fn render(&self, report: &VerificationReport) -> String {
        report::render(report, self.options.report_format, self.options.color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::VerificationError;
    use crate::sandbox::ModuleRegistry;

    fn verifier(options: VerifyOptions) -> Verifier {
        Verifier::new(options, Arc::new(ModuleRegistry::new()))
    }

    #[test]
    fn test_default_target_comes_from_impl_path() {
        let mut options = VerifyOptions::new("bank.json", "./bank");
        options.timeout_ms = 250;
        options.project_root = Some("/work".into());
        let target = verifier(options).target_for("Withdraw").unwrap();
        assert_eq!(target.display_name(), "./bank::Withdraw");
        assert_eq!(target.timeout, Duration::from_millis(250));
        assert_eq!(target.resolved_module(), "/work/./bank");
    }

    #[test]
    fn test_explicit_target_wins() {
        let v = verifier(VerifyOptions::new("bank.json", "./bank"))
            .with_target("Withdraw", TargetRef::new("ledger", "take"));
        assert_eq!(v.target_for("Withdraw").unwrap().display_name(), "ledger::take");
    }

    #[test]
    fn test_no_impl_path_means_no_target() {
        let err = verifier(VerifyOptions::default()).target_for("Withdraw").unwrap_err();
        assert!(matches!(
            err,
            VerificationError::Binding(BindingError::NoTarget(_))
        ));
    }

    #[test]
    fn test_load_domain_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(load_domain(&missing), Err(BindingError::Io { .. })));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(load_domain(&bad), Err(BindingError::Malformed(_))));
    }
}
