//! Field value types and their flat string encoding.
//!
//! The store holds strings only. Every field declares a [`ValueType`] that
//! turns a stored string back into a typed [`Value`] on read; writes go
//! through [`encode`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Read coercion applied to stored strings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Str,
    Int,
    Float,
    Bool,
}

impl ValueType {
    /// Coerce a stored string. Returns `None` when the string is not a valid
    /// representation of this type.
    pub fn coerce(self, raw: &str) -> Option<Value> {
        match self {
            ValueType::Str => Some(Value::String(raw.to_string())),
            ValueType::Int => raw.trim().parse::<i64>().ok().map(Value::from),
            ValueType::Float => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            ValueType::Bool => match raw.trim() {
                "1" | "true" | "True" | "TRUE" => Some(Value::Bool(true)),
                "0" | "false" | "False" | "FALSE" | "" => Some(Value::Bool(false)),
                _ => None,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Str => "str",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Flatten a value to its stored string form.
///
/// Only scalars have a flat form; the error carries the reason for anything
/// else.
pub fn encode(value: &Value) -> Result<String, &'static str> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        Value::Null => Err("null has no stored form; clean the field instead"),
        Value::Array(_) => Err("arrays belong in list fields"),
        Value::Object(_) => Err("objects belong in hash fields"),
    }
}
