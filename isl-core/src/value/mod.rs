//! Runtime value representation
//!
//! Values are what contract expressions evaluate to and what implementations
//! under test receive and return. The primitive kinds of the contract language
//! (string, number, boolean, UUID, timestamp) are distinct variants; no
//! operation coerces one into another. Integers and floats are both numbers
//! and compare numerically.

pub mod error;

pub use error::{ValueError, ValueResult};

use chrono::{DateTime, Utc};
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Field map used for records, entities and input bindings
pub type ValueMap = BTreeMap<String, Value>;

/// Runtime value types
#[derive(Clone)]
pub enum Value {
    /// Absent / null value
    Nil,

    /// Boolean value
    Boolean(bool),

    /// Integer value
    Integer(i64),

    /// Floating point value
    Float(f64),

    /// String value
    String(String),

    /// UUID value
    Uuid(Uuid),

    /// Timestamp value (UTC)
    Timestamp(DateTime<Utc>),

    /// Ordered list of values
    List(Vec<Value>),

    /// Record with named fields
    Map(ValueMap),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Build a record from `(field, value)` pairs
    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// A value exists unless it is absent or null. Empty strings, zero and
    /// `false` all exist.
    pub fn is_present(&self) -> bool {
        !self.is_nil()
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    pub fn as_boolean(&self) -> ValueResult<bool> {
        match self {
            Value::Boolean(b) => Ok(*b),
            _ => Err(ValueError::TypeError {
                expected: "boolean",
                actual: self.type_name(),
            }),
        }
    }

    pub fn as_integer(&self) -> ValueResult<i64> {
        match self {
            Value::Integer(n) => Ok(*n),
            _ => Err(ValueError::TypeError {
                expected: "integer",
                actual: self.type_name(),
            }),
        }
    }

    pub fn as_number(&self) -> ValueResult<f64> {
        match self {
            Value::Integer(n) => Ok(*n as f64),
            Value::Float(f) => Ok(*f),
            _ => Err(ValueError::TypeError {
                expected: "number",
                actual: self.type_name(),
            }),
        }
    }

    pub fn as_str(&self) -> ValueResult<&str> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(ValueError::TypeError {
                expected: "string",
                actual: self.type_name(),
            }),
        }
    }

    pub fn as_list(&self) -> ValueResult<&[Value]> {
        match self {
            Value::List(items) => Ok(items),
            _ => Err(ValueError::TypeError {
                expected: "list",
                actual: self.type_name(),
            }),
        }
    }

    pub fn as_map(&self) -> ValueResult<&ValueMap> {
        match self {
            Value::Map(map) => Ok(map),
            _ => Err(ValueError::TypeError {
                expected: "map",
                actual: self.type_name(),
            }),
        }
    }

    /// Get type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Uuid(_) => "uuid",
            Value::Timestamp(_) => "timestamp",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Read a named property.
    ///
    /// Records yield the field (or `Nil` when absent); strings and lists
    /// expose `length`. Anything else is absent.
    pub fn property(&self, name: &str) -> Value {
        match (self, name) {
            (Value::Map(fields), _) => fields.get(name).cloned().unwrap_or(Value::Nil),
            (Value::String(s), "length") => Value::Integer(s.chars().count() as i64),
            (Value::List(items), "length") => Value::Integer(items.len() as i64),
            _ => Value::Nil,
        }
    }

    /// Index into a list (integer index, negative counts from the end) or a
    /// record (string key).
    pub fn index(&self, index: &Value) -> ValueResult<Value> {
        match (self, index) {
            (Value::List(items), Value::Integer(i)) => {
                let len = items.len() as i64;
                let resolved = if *i < 0 { len + *i } else { *i };
                if resolved < 0 || resolved >= len {
                    return Err(ValueError::IndexOutOfBounds {
                        index: *i,
                        length: items.len(),
                    });
                }
                Ok(items[resolved as usize].clone())
            }
            (Value::Map(fields), Value::String(key)) => {
                Ok(fields.get(key).cloned().unwrap_or(Value::Nil))
            }
            (Value::Nil, _) => Ok(Value::Nil),
            _ => Err(ValueError::IncompatibleOperands {
                op: "[]",
                left: self.type_name(),
                right: index.type_name(),
            }),
        }
    }

    /// Ordering comparison. Numbers compare numerically, strings
    /// lexicographically and timestamps chronologically.
    pub fn compare(&self, other: &Value) -> ValueResult<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Ok(a.cmp(b)),
            (Value::Integer(a), Value::Float(b)) => int_float_cmp(*a, *b).ok_or(NAN_OPERANDS),
            (Value::Float(a), Value::Integer(b)) => int_float_cmp(*b, *a)
                .map(Ordering::reverse)
                .ok_or(NAN_OPERANDS),
            (a, b) if a.is_number() && b.is_number() => {
                let (x, y) = (a.as_number()?, b.as_number()?);
                x.partial_cmp(&y).ok_or(NAN_OPERANDS)
            }
            _ => Err(ValueError::IncompatibleOperands {
                op: "compare",
                left: self.type_name(),
                right: other.type_name(),
            }),
        }
    }

    /// Convert a JSON document into a value.
    ///
    /// Plain JSON strings stay strings. UUIDs and timestamps must be tagged
    /// explicitly as `{"$uuid": "..."}` / `{"$timestamp": "<rfc3339>"}`.
    pub fn from_json(json: &serde_json::Value) -> ValueResult<Self> {
        use serde_json::Value as Json;

        Ok(match json {
            Json::Null => Value::Nil,
            Json::Bool(b) => Value::Boolean(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().ok_or_else(|| {
                    ValueError::Conversion(format!("number {} out of range", n))
                })?),
            },
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::List(
                items
                    .iter()
                    .map(Value::from_json)
                    .collect::<ValueResult<Vec<_>>>()?,
            ),
            Json::Object(fields) => {
                if fields.len() == 1 {
                    if let Some(Json::String(raw)) = fields.get("$uuid") {
                        let id = Uuid::parse_str(raw)
                            .map_err(|e| ValueError::Conversion(format!("invalid uuid: {}", e)))?;
                        return Ok(Value::Uuid(id));
                    }
                    if let Some(Json::String(raw)) = fields.get("$timestamp") {
                        let ts = DateTime::parse_from_rfc3339(raw).map_err(|e| {
                            ValueError::Conversion(format!("invalid timestamp: {}", e))
                        })?;
                        return Ok(Value::Timestamp(ts.with_timezone(&Utc)));
                    }
                }
                let mut map = ValueMap::new();
                for (key, value) in fields {
                    map.insert(key.clone(), Value::from_json(value)?);
                }
                Value::Map(map)
            }
        })
    }

    /// Convert into a JSON document, tagging UUIDs and timestamps so that
    /// `from_json(to_json(v))` yields `v` again.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Nil => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Integer(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Uuid(id) => serde_json::json!({ "$uuid": id.to_string() }),
            Value::Timestamp(ts) => serde_json::json!({ "$timestamp": ts.to_rfc3339() }),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

const NAN_OPERANDS: ValueError = ValueError::IncompatibleOperands {
    op: "compare",
    left: "NaN",
    right: "NaN",
};

/// Exact ordering of an integer against a float. `None` for NaN.
fn int_float_cmp(a: i64, b: f64) -> Option<Ordering> {
    // 2^63, the first float above i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if b.is_nan() {
        return None;
    }
    if b >= LIMIT {
        return Some(Ordering::Less);
    }
    if b < -LIMIT {
        return Some(Ordering::Greater);
    }
    let whole = b.trunc();
    Some(a.cmp(&(whole as i64)).then_with(|| {
        let frac = b - whole;
        if frac > 0.0 {
            Ordering::Less
        } else if frac < 0.0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }))
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => (a - b).abs() < f64::EPSILON,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                int_float_cmp(*a, *b) == Some(Ordering::Equal)
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Boolean(b) => write!(f, "Boolean({})", b),
            Value::Integer(n) => write!(f, "Integer({})", n),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Uuid(id) => write!(f, "Uuid({})", id),
            Value::Timestamp(ts) => write!(f, "Timestamp({})", ts.to_rfc3339()),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(map) => f.debug_map().entries(map).finish(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Uuid(id) => write!(f, "uuid({})", id),
            Value::Timestamp(ts) => write!(f, "timestamp({})", ts.to_rfc3339()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(fields) => {
                write!(f, "{{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Nil => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Uuid(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$uuid", &id.to_string())?;
                map.end()
            }
            Value::Timestamp(ts) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$timestamp", &ts.to_rfc3339())?;
                map.end()
            }
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Value::from_json(&json).map_err(serde::de::Error::custom)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Uuid> for Value {
    fn from(id: Uuid) -> Self {
        Value::Uuid(id)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

#[cfg(test)]
#[path = "../value_tests.rs"]
mod tests;
