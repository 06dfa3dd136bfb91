//! Sandboxed execution of implementations under test
//!
//! A target is a named export of a module, resolved through an injected
//! [`Loader`]. Execution runs on a detached worker thread under a
//! wall-clock timeout. The target only reaches the outside world through its
//! [`SandboxHandle`]: state goes through the shared [`StateStore`], and
//! clock, environment and other ambient access is recorded as observed
//! effects.
//!
//! The worker cannot be killed. When the call ends the handle's store view
//! is revoked, so later writes are dropped, and on timeout the cancel flag
//! is set. Writes the target made in time stay in the store. The runtime
//! never waits for a stalled worker on shutdown.

use crate::errors::{SandboxError, TimeoutError};
use crate::state::{SideEffect, StateStore, WriteFence};
use chrono::{DateTime, Utc};
use isl_core::ast::EffectKind;
use isl_core::value::{Value, ValueMap};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Error raised by a target implementation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetError {
    pub code: String,
    pub message: String,
}

impl TargetError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The value `result` is bound to in `error(...)` postcondition blocks
    pub fn to_value(&self) -> Value {
        Value::record([
            ("code", Value::string(&self.code)),
            ("message", Value::string(&self.message)),
        ])
    }
}

impl std::fmt::Display for TargetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for TargetError {}

/// A callable implementation under test
pub type TargetFn =
    Arc<dyn Fn(&ValueMap, &SandboxHandle) -> Result<Value, TargetError> + Send + Sync>;

/// Wrap a closure as a [`TargetFn`]
pub fn target_fn<F>(f: F) -> TargetFn
where
    F: Fn(&ValueMap, &SandboxHandle) -> Result<Value, TargetError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Reference to the function under test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub module: String,
    pub export: String,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_root: Option<PathBuf>,
}

impl TargetRef {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

    pub fn new(module: impl Into<String>, export: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            export: export.into(),
            timeout: Self::DEFAULT_TIMEOUT,
            project_root: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    /// Module key with relative paths resolved against the project root
    pub fn resolved_module(&self) -> String {
        match &self.project_root {
            Some(root) if self.module.starts_with("./") || self.module.starts_with("../") => {
                root.join(Path::new(&self.module)).display().to_string()
            }
            _ => self.module.clone(),
        }
    }

    /// `module::export`, used in diagnostics
    pub fn display_name(&self) -> String {
        format!("{}::{}", self.module, self.export)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Resolves target references into callables
pub trait Loader: Send + Sync {
    fn load(&self, target: &TargetRef) -> Result<TargetFn, SandboxError>;
}

/// In-process loader backed by registered functions
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RwLock<FxHashMap<String, FxHashMap<String, TargetFn>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, module: impl Into<String>, export: impl Into<String>, f: TargetFn) {
        self.modules
            .write()
            .entry(module.into())
            .or_default()
            .insert(export.into(), f);
    }

    pub fn with(self, module: impl Into<String>, export: impl Into<String>, f: TargetFn) -> Self {
        self.register(module, export, f);
        self
    }
}

impl Loader for ModuleRegistry {
    fn load(&self, target: &TargetRef) -> Result<TargetFn, SandboxError> {
        let module = target.resolved_module();
        let modules = self.modules.read();
        let exports = modules
            .get(&module)
            .ok_or_else(|| SandboxError::ModuleNotFound(module.clone()))?;
        exports
            .get(&target.export)
            .cloned()
            .ok_or_else(|| SandboxError::ExportNotFound {
                module,
                export: target.export.clone(),
            })
    }
}

/// The target's only view of the world
#[derive(Clone)]
pub struct SandboxHandle {
    store: StateStore,
    env: Arc<BTreeMap<String, String>>,
    effects: Arc<Mutex<BTreeSet<EffectKind>>>,
    cancelled: Arc<AtomicBool>,
}

impl SandboxHandle {
    fn new(store: &StateStore, env: Arc<BTreeMap<String, String>>) -> (Self, WriteFence) {
        let (view, fence) = store.fenced();
        let handle = Self {
            store: view,
            env,
            effects: Arc::default(),
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        (handle, fence)
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Report an ambient effect performed outside the handle
    pub fn record_effect(&self, effect: EffectKind) {
        self.effects.lock().insert(effect);
    }

    /// Read a variable of the isolated environment
    pub fn env_var(&self, name: &str) -> Option<String> {
        self.record_effect(EffectKind::Environment);
        self.env.get(name).cloned()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.record_effect(EffectKind::Clock);
        Utc::now()
    }

    /// Set once the caller has given up waiting. Long-running targets should
    /// poll this and return; their store writes are dropped from then on.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn observed(&self) -> BTreeSet<EffectKind> {
        self.effects.lock().clone()
    }
}

/// How an execution ended abnormally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionFailure {
    Thrown(TargetError),
    Panicked { message: String },
    TimedOut(TimeoutError),
}

impl ExecutionFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionFailure::TimedOut(_))
    }
}

impl std::fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionFailure::Thrown(e) => write!(f, "{}", e),
            ExecutionFailure::Panicked { message } => write!(f, "panicked: {}", message),
            ExecutionFailure::TimedOut(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub return_value: Option<Value>,
    pub error: Option<ExecutionFailure>,
    pub observed_effects: BTreeSet<EffectKind>,
    pub side_effects: Vec<SideEffect>,
    pub duration: Duration,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs targets in isolation
#[derive(Clone)]
pub struct Sandbox {
    loader: Arc<dyn Loader>,
    env: Arc<BTreeMap<String, String>>,
}

impl Sandbox {
    pub fn new(loader: Arc<dyn Loader>) -> Self {
        Self {
            loader,
            env: Arc::default(),
        }
    }

    /// Environment visible to targets through [`SandboxHandle::env_var`].
    /// The process environment is never exposed.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// Execute `target` with `args` against `store`.
    ///
    /// Target errors, panics and timeouts are reported in the outcome. Only
    /// failures of the sandbox itself are returned as `Err`.
    pub async fn execute(
        &self,
        target: &TargetRef,
        args: ValueMap,
        store: &StateStore,
    ) -> Result<ExecutionOutcome, SandboxError> {
        tokio::runtime::Handle::try_current().map_err(|_| SandboxError::RuntimeUnavailable)?;
        let f = self.loader.load(target)?;
        let (handle, fence) = SandboxHandle::new(store, self.env.clone());
        let worker_handle = handle.clone();
        let (tx, rx) = oneshot::channel();

        debug!(target = %target.display_name(), timeout_ms = target.timeout.as_millis() as u64, "executing target");
        let start = Instant::now();
        std::thread::Builder::new()
            .name(format!("isl-target-{}", target.export))
            .spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| f(&args, &worker_handle)));
                // The receiver is gone after a timeout
                let _ = tx.send(outcome);
            })
            .map_err(|e| SandboxError::Worker(e.to_string()))?;
        let result = tokio::time::timeout(target.timeout, rx).await;
        let duration = start.elapsed();
        fence.revoke();

        let (return_value, error) = match result {
            Err(_) => {
                handle.cancelled.store(true, Ordering::Relaxed);
                let timeout_ms = target.timeout.as_millis() as u64;
                warn!(target = %target.display_name(), timeout_ms, "target timed out");
                let err = TimeoutError {
                    target: target.display_name(),
                    timeout_ms,
                };
                (None, Some(ExecutionFailure::TimedOut(err)))
            }
            Ok(Err(recv_error)) => return Err(SandboxError::Worker(recv_error.to_string())),
            Ok(Ok(Err(payload))) => {
                let message = panic_message(payload);
                warn!(target = %target.display_name(), %message, "target panicked");
                (None, Some(ExecutionFailure::Panicked { message }))
            }
            Ok(Ok(Ok(Err(thrown)))) => {
                debug!(target = %target.display_name(), code = %thrown.code, "target returned an error");
                (None, Some(ExecutionFailure::Thrown(thrown)))
            }
            Ok(Ok(Ok(Ok(value)))) => (Some(value), None),
        };

        Ok(ExecutionOutcome {
            return_value,
            error,
            observed_effects: handle.observed(),
            side_effects: store.take_effects(),
            duration,
        })
    }
}

#[cfg(test)]
#[path = "sandbox/sandbox_tests.rs"]
mod tests;
