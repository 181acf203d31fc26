//! JSON value types
//!
//! Templates, binding data and resolved output all share one value model.
//! Numbers are always double precision; there is no integer subtype.

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::error::{Error, Result};

/// Largest magnitude at which every integer is exactly representable as f64
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A JSON value that may contain unresolved placeholders and tags
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (double precision)
    Number(f64),
    /// String value (may contain placeholders like ${x.y})
    String(String),
    /// Ordered sequence of values
    Array(Vec<Value>),
    /// Mapping of string keys to values
    Object(IndexMap<String, Value>),
}

/// Outcome of resolving one element
///
/// `Omit` tells the enclosing container to drop the producing entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// A concrete value
    Value(Value),
    /// Produce nothing
    Omit,
}

impl Resolved {
    /// Check if this is the omit marker
    pub fn is_omit(&self) -> bool {
        matches!(self, Resolved::Omit)
    }

    /// Get the value, if any
    pub fn into_value(self) -> Option<Value> {
        match self {
            Resolved::Value(v) => Some(v),
            Resolved::Omit => None,
        }
    }

    /// Borrow the value, if any
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Resolved::Value(v) => Some(v),
            Resolved::Omit => None,
        }
    }

    /// Type name for error messages (`omit` for the marker)
    pub fn type_name(&self) -> &'static str {
        match self {
            Resolved::Value(v) => v.type_name(),
            Resolved::Omit => "omit",
        }
    }
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        Resolved::Value(value)
    }
}

impl Value {
    /// Parse JSON text
    pub fn from_json_str(text: &str) -> Result<Value> {
        serde_json::from_str(text).map_err(|e| Error::parse(format!("Invalid JSON: {}", e)))
    }

    /// Parse YAML text
    pub fn from_yaml_str(text: &str) -> Result<Value> {
        serde_yaml::from_str(text).map_err(|e| Error::parse(format!("Invalid YAML: {}", e)))
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is a boolean
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Check if this value is a number
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    /// Check if this value is a string
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Check if this value is an array
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Check if this value is an object
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Get as boolean if this is a Bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as f64 if this is a Number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as str if this is a String
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as slice if this is an Array
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as map if this is an Object
    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Compact JSON text
    pub fn to_json_text(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::internal(format!("Failed to serialize value: {}", e)))
    }

    /// Indented JSON text (two spaces)
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::internal(format!("Failed to serialize value: {}", e)))
    }

    /// Text used when a value is spliced into a larger string.
    ///
    /// Strings are inserted as-is; everything else as compact JSON.
    pub fn to_splice_text(&self) -> Result<String> {
        match self {
            Value::String(s) => Ok(s.clone()),
            other => other.to_json_text(),
        }
    }
}

/// Number as an exact integer, when it is one
pub(crate) fn integral(n: f64) -> Option<i64> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
        Some(n as i64)
    } else {
        None
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => match integral(*n) {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_f64(*n),
            },
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            other => {
                let text = serde_json::to_string(other).map_err(|_| fmt::Error)?;
                write!(f, "{}", text)
            }
        }
    }
}

// Convenient From implementations
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Number(i as f64)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Number(i as f64)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Number(i as f64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Number(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(m: IndexMap<String, Value>) -> Self {
        Value::Object(m)
    }
}
