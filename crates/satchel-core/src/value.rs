use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A value that can be stored in a session.
///
/// Only these variants are storable. The enum is externally tagged when
/// serialized, so the concrete type of every value survives a round trip
/// through the durable backend (an `Int(5)` never comes back as a `Float`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Map(HashMap<String, SessionValue>),
}

impl SessionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SessionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SessionValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SessionValue::Float(n) => Some(*n),
            SessionValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SessionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SessionValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, SessionValue>> {
        match self {
            SessionValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Short type name, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            SessionValue::Str(_) => "string",
            SessionValue::Int(_) => "integer",
            SessionValue::Float(_) => "float",
            SessionValue::Bool(_) => "boolean",
            SessionValue::Bytes(_) => "bytes",
            SessionValue::Map(_) => "map",
        }
    }

    /// Parse a command-line literal: bool, then integer, then finite float, else string.
    ///
    /// `NaN` and `inf` stay strings; they cannot be persisted as floats.
    pub fn parse_literal(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            return SessionValue::Bool(b);
        }
        if let Ok(n) = raw.parse::<i64>() {
            return SessionValue::Int(n);
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return SessionValue::Float(f);
            }
        }
        SessionValue::Str(raw.to_string())
    }

    /// First non-finite float in this value, with its key path.
    fn find_non_finite(&self, path: &str) -> Option<(String, f64)> {
        match self {
            SessionValue::Float(f) if !f.is_finite() => Some((path.to_string(), *f)),
            SessionValue::Map(m) => m
                .iter()
                .find_map(|(k, v)| v.find_non_finite(&format!("{}.{}", path, k))),
            _ => None,
        }
    }

    /// Plain JSON view without type tags (for display only; not reversible).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SessionValue::Str(s) => serde_json::json!(s),
            SessionValue::Int(n) => serde_json::json!(n),
            SessionValue::Float(f) => serde_json::json!(f),
            SessionValue::Bool(b) => serde_json::json!(b),
            SessionValue::Bytes(b) => serde_json::json!(b),
            SessionValue::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<&str> for SessionValue {
    fn from(s: &str) -> Self {
        SessionValue::Str(s.to_string())
    }
}

impl From<String> for SessionValue {
    fn from(s: String) -> Self {
        SessionValue::Str(s)
    }
}

impl From<i64> for SessionValue {
    fn from(n: i64) -> Self {
        SessionValue::Int(n)
    }
}

impl From<i32> for SessionValue {
    fn from(n: i32) -> Self {
        SessionValue::Int(n as i64)
    }
}

impl From<f64> for SessionValue {
    fn from(n: f64) -> Self {
        SessionValue::Float(n)
    }
}

impl From<bool> for SessionValue {
    fn from(b: bool) -> Self {
        SessionValue::Bool(b)
    }
}

impl From<Vec<u8>> for SessionValue {
    fn from(b: Vec<u8>) -> Self {
        SessionValue::Bytes(b)
    }
}

impl From<HashMap<String, SessionValue>> for SessionValue {
    fn from(m: HashMap<String, SessionValue>) -> Self {
        SessionValue::Map(m)
    }
}

/// Encode a whole session map into the persisted blob.
///
/// Non-finite floats are rejected: JSON has no representation for them and
/// they would come back as `null`, making the whole record undecodable.
pub fn encode_map(data: &HashMap<String, SessionValue>) -> serde_json::Result<Vec<u8>> {
    if let Some((path, f)) = data.iter().find_map(|(k, v)| v.find_non_finite(k)) {
        return Err(serde::ser::Error::custom(format!(
            "cannot store non-finite float {} at '{}'",
            f, path
        )));
    }
    serde_json::to_vec(data)
}

/// Decode a persisted blob back into a session map.
pub fn decode_map(bytes: &[u8]) -> serde_json::Result<HashMap<String, SessionValue>> {
    serde_json::from_slice(bytes)
}
