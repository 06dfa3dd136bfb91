//! Bindings loader
//!
//! Resolves the concrete inputs, expected outputs and starting state of a
//! verification run. Fixtures come from literal data, a JSON or TOML file,
//! or a piped JSON document. A document is either a list of fixtures or an
//! object with a `fixtures` list.

use crate::errors::BindingError;
use crate::state::{CapturedState, EntityTable};
use chrono::DateTime;
use isl_compiler::CompiledBehavior;
use isl_core::ast::TypeRef;
use isl_core::value::{Value, ValueMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// State an implementation starts from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSeed {
    #[serde(default)]
    pub fields: ValueMap,
    #[serde(default)]
    pub entities: BTreeMap<String, EntityTable>,
}

impl StateSeed {
    pub fn to_state(&self) -> CapturedState {
        CapturedState {
            fields: self.fields.clone(),
            entities: self.entities.clone(),
            side_effects: Vec::new(),
        }
    }
}

/// One invocation of a behavior with its data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorFixture {
    pub behavior: String,
    #[serde(default)]
    pub input: ValueMap,
    /// Expected return value, checked in addition to the postconditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(default)]
    pub state: StateSeed,
}

impl BehaviorFixture {
    pub fn new(behavior: impl Into<String>) -> Self {
        Self {
            behavior: behavior.into(),
            input: ValueMap::new(),
            expected: None,
            state: StateSeed::default(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: Value) -> Self {
        self.input.insert(name.into(), value);
        self
    }

    pub fn with_expected(mut self, value: Value) -> Self {
        self.expected = Some(value);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.state.fields.insert(name.into(), value);
        self
    }

    pub fn with_record(mut self, entity: &str, id: impl Into<String>, record: Value) -> Self {
        self.state
            .entities
            .entry(entity.to_string())
            .or_default()
            .insert(id.into(), record);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureSet {
    #[serde(default)]
    pub fixtures: Vec<BehaviorFixture>,
}

impl FixtureSet {
    pub fn new(fixtures: Vec<BehaviorFixture>) -> Self {
        Self { fixtures }
    }

    pub fn for_behavior<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a BehaviorFixture> {
        self.fixtures.iter().filter(move |f| f.behavior == name)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FixtureDocument {
    List(Vec<BehaviorFixture>),
    Set(FixtureSet),
}

impl From<FixtureDocument> for FixtureSet {
    fn from(doc: FixtureDocument) -> Self {
        match doc {
            FixtureDocument::List(fixtures) => FixtureSet { fixtures },
            FixtureDocument::Set(set) => set,
        }
    }
}

/// Where fixture data comes from
#[derive(Debug, Clone)]
pub enum BindingSource {
    Literal(FixtureSet),
    File(PathBuf),
    /// A JSON document, e.g. read from stdin
    Piped(String),
}

fn parse_json(text: &str) -> Result<FixtureSet, BindingError> {
    serde_json::from_str::<FixtureDocument>(text)
        .map(FixtureSet::from)
        .map_err(|e| BindingError::Malformed(e.to_string()))
}

fn parse_toml(text: &str) -> Result<FixtureSet, BindingError> {
    toml::from_str::<FixtureSet>(text).map_err(|e| BindingError::Malformed(e.to_string()))
}

fn load_file(path: &Path) -> Result<FixtureSet, BindingError> {
    let text = std::fs::read_to_string(path).map_err(|e| BindingError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => parse_toml(&text),
        _ => parse_json(&text),
    }
}

pub fn load_fixtures(source: BindingSource) -> Result<FixtureSet, BindingError> {
    let set = match source {
        BindingSource::Literal(set) => set,
        BindingSource::File(path) => load_file(&path)?,
        BindingSource::Piped(text) => parse_json(&text)?,
    };
    debug!(fixtures = set.fixtures.len(), "loaded fixtures");
    Ok(set)
}

fn type_name(ty: &TypeRef) -> String {
    match ty {
        TypeRef::String => "String".into(),
        TypeRef::Int => "Int".into(),
        TypeRef::Decimal => "Decimal".into(),
        TypeRef::Boolean => "Boolean".into(),
        TypeRef::Uuid => "UUID".into(),
        TypeRef::Timestamp => "Timestamp".into(),
        TypeRef::List(inner) => format!("List<{}>", type_name(inner)),
        TypeRef::Named(name) => name.clone(),
    }
}

/// Does `value` fit `ty`? UUIDs and timestamps may be given as strings in
/// their canonical text form. Named types are not checked.
fn conforms(value: &Value, ty: &TypeRef) -> bool {
    match (ty, value) {
        (TypeRef::String, Value::String(_)) => true,
        (TypeRef::Int, Value::Integer(_)) => true,
        (TypeRef::Decimal, v) => v.is_number(),
        (TypeRef::Boolean, Value::Boolean(_)) => true,
        (TypeRef::Uuid, Value::Uuid(_)) => true,
        (TypeRef::Uuid, Value::String(s)) => Uuid::parse_str(s).is_ok(),
        (TypeRef::Timestamp, Value::Timestamp(_)) => true,
        (TypeRef::Timestamp, Value::String(s)) => DateTime::parse_from_rfc3339(s).is_ok(),
        (TypeRef::List(inner), Value::List(items)) => items.iter().all(|i| conforms(i, inner)),
        (TypeRef::Named(_), _) => true,
        _ => false,
    }
}

/// Check `input` against the behavior's declared inputs
pub fn validate_inputs(behavior: &CompiledBehavior, input: &ValueMap) -> Result<(), BindingError> {
    for field in &behavior.inputs {
        match input.get(&field.name) {
            None | Some(Value::Nil) if field.optional => {}
            None | Some(Value::Nil) => {
                return Err(BindingError::MissingInput {
                    behavior: behavior.name.clone(),
                    field: field.name.clone(),
                })
            }
            Some(value) if !conforms(value, &field.ty) => {
                return Err(BindingError::InputType {
                    behavior: behavior.name.clone(),
                    field: field.name.clone(),
                    expected: type_name(&field.ty),
                    actual: value.type_name(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "bindings/bindings_tests.rs"]
mod tests;
