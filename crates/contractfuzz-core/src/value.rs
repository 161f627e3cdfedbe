//! Parsed request/response data

use std::fmt;

use indexmap::IndexMap;
use serde_json::Number;

/// JSON-like data flowing through matching and generation.
///
/// Object equality ignores key order; array equality does not.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Self::Number(n.into())
    }

    /// Floats that are not finite have no JSON representation and become `Null`.
    pub fn float(n: f64) -> Self {
        Number::from_f64(n).map_or(Self::Null, Self::Number)
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        !matches!(self, Self::Array(_) | Self::Object(_))
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Object(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Name of the value's type as shown in mismatch messages.
    #[must_use]
    pub const fn displayable_type(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "json array",
            Self::Object(_) => "json object",
        }
    }

    /// Value as shown in mismatch messages: strings are quoted, containers are compact JSON.
    pub fn displayable_value(&self) -> String {
        match self {
            Self::String(s) => format!("\"{s}\""),
            other => other.to_json().to_string(),
        }
    }

    /// `"abc" (string)`
    pub fn error_snippet(&self) -> String {
        format!("{} ({})", self.displayable_value(), self.displayable_type())
    }

    /// Raw literal, as it would be written into a query string or header.
    pub fn to_string_literal(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_json().to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Walk a dotted path (`data.id`) through nested objects.
    pub fn select(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |current, segment| current.as_object()?.get(segment))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(entries) => {
                Self::Object(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::integer(n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(_) | Self::Array(_) => {
                let pretty = serde_json::to_string_pretty(&self.to_json()).map_err(|_| fmt::Error)?;
                f.write_str(&pretty)
            }
            other => f.write_str(&other.to_string_literal()),
        }
    }
}
