//! Type tags shared by the schema, the compiler and the executor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a field, chunk result or primitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    Nil,
    Bool,
    Int,
    Float,
    String,
    Array(Box<TypeTag>),
    Map(Box<TypeTag>, Box<TypeTag>),
    Resource(String),
    /// A nested block whose entrypoint yields the boxed type.
    Function(Box<TypeTag>),
}

impl TypeTag {
    pub fn array(child: TypeTag) -> Self {
        Self::Array(Box::new(child))
    }

    pub fn map(key: TypeTag, value: TypeTag) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    pub fn resource(name: impl Into<String>) -> Self {
        Self::Resource(name.into())
    }

    /// Element type of an array, value type of a map.
    pub fn child(&self) -> Option<&TypeTag> {
        match self {
            Self::Array(child) | Self::Map(_, child) | Self::Function(child) => Some(child),
            _ => None,
        }
    }

    /// Resource name when this tag denotes a resource.
    pub fn resource_name(&self) -> Option<&str> {
        match self {
            Self::Resource(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource(_))
    }

    /// Human-readable label used in compiler messages.
    pub fn label(&self) -> String {
        match self {
            Self::Nil => "null".to_string(),
            Self::Bool => "bool".to_string(),
            Self::Int => "int".to_string(),
            Self::Float => "float".to_string(),
            Self::String => "string".to_string(),
            Self::Array(child) => format!("[]{}", child.label()),
            Self::Map(key, value) => format!("map[{}]{}", key.label(), value.label()),
            Self::Resource(name) => name.clone(),
            Self::Function(result) => format!("function => {}", result.label()),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
