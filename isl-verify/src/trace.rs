//! Execution traces
//!
//! A [`TraceRecorder`] collects the ordered events of one behavior run. Every
//! value is redacted before it is stored, so traces can be written into
//! reports as-is.

use isl_core::value::{Value, ValueMap};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

const REDACTED: &str = "[REDACTED]";

/// Key fragments whose values never appear in traces
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "secret",
    "token",
    "ssn",
    "social_security",
    "credit_card",
    "creditcard",
    "card_number",
    "api_key",
    "apikey",
    "private_key",
];

fn is_sensitive(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|k| key.contains(k))
}

fn mask_email(email: &str) -> Option<String> {
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || !domain.contains('.') {
        return None;
    }
    let first: String = local.chars().take(1).collect();
    Some(format!("{}***@{}", first, domain))
}

/// Redact sensitive record fields and mask email addresses, recursively
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Map(fields) => Value::Map(
            fields
                .iter()
                .map(|(k, v)| {
                    let v = if is_sensitive(k) {
                        Value::string(REDACTED)
                    } else {
                        redact(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::List(items) => Value::List(items.iter().map(redact).collect()),
        Value::String(s) => mask_email(s).map(Value::String).unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventKind {
    Call,
    Return,
    StateChange,
    Check,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    /// Milliseconds since the run started
    pub offset_ms: u64,
    pub label: String,
    #[serde(default, skip_serializing_if = "Value::is_nil")]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub id: String,
    pub behavior: String,
    pub events: Vec<TraceEvent>,
}

impl ExecutionTrace {
    pub fn events_of(&self, kind: TraceEventKind) -> impl Iterator<Item = &TraceEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }
}

pub struct TraceRecorder {
    behavior: String,
    start: Instant,
    events: Vec<TraceEvent>,
}

impl TraceRecorder {
    pub fn new(behavior: impl Into<String>) -> Self {
        Self {
            behavior: behavior.into(),
            start: Instant::now(),
            events: Vec::new(),
        }
    }

    fn push(&mut self, kind: TraceEventKind, label: impl Into<String>, data: Value) {
        self.events.push(TraceEvent {
            kind,
            offset_ms: self.start.elapsed().as_millis() as u64,
            label: label.into(),
            data: redact(&data),
        });
    }

    pub fn call(&mut self, target: &str, args: &ValueMap) {
        self.push(TraceEventKind::Call, target, Value::Map(args.clone()));
    }

    pub fn ret(&mut self, target: &str, value: &Value, duration_ms: u64) {
        let data = Value::record([
            ("value", value.clone()),
            ("duration_ms", Value::Integer(duration_ms as i64)),
        ]);
        self.push(TraceEventKind::Return, target, data);
    }

    pub fn state_change(&mut self, path: &str, before: Option<&Value>, after: Option<&Value>) {
        let data = Value::record([
            ("before", before.cloned().unwrap_or(Value::Nil)),
            ("after", after.cloned().unwrap_or(Value::Nil)),
        ]);
        self.push(TraceEventKind::StateChange, path, data);
    }

    pub fn check(&mut self, category: &str, expression: &str, passed: bool) {
        let data = Value::record([
            ("category", Value::string(category)),
            ("passed", Value::Boolean(passed)),
        ]);
        self.push(TraceEventKind::Check, expression, data);
    }

    pub fn error(&mut self, message: &str, code: Option<&str>) {
        let data = code
            .map(|c| Value::record([("code", Value::string(c))]))
            .unwrap_or(Value::Nil);
        self.push(TraceEventKind::Error, message, data);
    }

    pub fn finish(self) -> ExecutionTrace {
        ExecutionTrace {
            id: format!("trace_{}", Uuid::new_v4()),
            behavior: self.behavior,
            events: self.events,
        }
    }
}
