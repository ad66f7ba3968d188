//! Runtime values produced by resolving chunks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::TypeTag;

/// Opaque reference to a resource instance owned by a [`Runtime`](crate::runtime::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub name: String,
    pub id: String,
}

impl ResourceHandle {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} id = {}", self.name, self.id)
        }
    }
}

/// Payload of a [`RawData`]. Every consumer matches on this exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Value>),
    Mapping(BTreeMap<String, Value>),
    Resource(ResourceHandle),
    Error(String),
}

impl Value {
    /// Truthiness used by predicates and the `!`, `&&`, `||` operators.
    ///
    /// A sequence is truthy only if every element is.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Error(_) => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Sequence(items) => items.iter().all(Value::is_truthy),
            Value::Mapping(_) | Value::Resource(_) => true,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceHandle> {
        match self {
            Value::Resource(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Mapping(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Resource(handle) => serde_json::json!({
                "resource": handle.name,
                "id": handle.id,
            }),
            Value::Error(msg) => serde_json::json!({ "error": msg }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Mapping(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Resource(handle) => write!(f, "{handle}"),
            Value::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// A typed runtime value, possibly carrying an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawData {
    #[serde(rename = "type")]
    pub typ: TypeTag,
    pub value: Value,
}

impl RawData {
    pub fn new(typ: TypeTag, value: Value) -> Self {
        Self { typ, value }
    }

    pub fn nil() -> Self {
        Self::new(TypeTag::Nil, Value::Null)
    }

    pub fn bool(v: bool) -> Self {
        Self::new(TypeTag::Bool, Value::Bool(v))
    }

    pub fn int(v: i64) -> Self {
        Self::new(TypeTag::Int, Value::Int(v))
    }

    pub fn float(v: f64) -> Self {
        Self::new(TypeTag::Float, Value::Float(v))
    }

    pub fn string(v: impl Into<String>) -> Self {
        Self::new(TypeTag::String, Value::String(v.into()))
    }

    pub fn resource(handle: ResourceHandle) -> Self {
        Self::new(TypeTag::resource(handle.name.clone()), Value::Resource(handle))
    }

    /// Error-bearing data that still advertises the type it was meant to have.
    pub fn error(typ: TypeTag, msg: impl Into<String>) -> Self {
        Self::new(typ, Value::Error(msg.into()))
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.value {
            Value::Error(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.value, Value::Error(_))
    }

    pub fn is_truthy(&self) -> bool {
        self.value.is_truthy()
    }
}

impl fmt::Display for RawData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
