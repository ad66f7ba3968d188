//! Resource schema — the catalog of resource definitions the compiler resolves against.
//!
//! A schema is loaded once (usually from JSON) and never mutated afterwards.
//! Resources that declare a `list_type` are collection-like; they always
//! expose a `list` field of type `[]list_type`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::SchemaError;
use crate::types::TypeTag;

/// Name of the field holding the elements of a collection resource.
pub const LIST_FIELD: &str = "list";

/// Maximum number of suggestions attached to an unknown-identifier error.
const MAX_SUGGESTIONS: usize = 5;

/// A typed field of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub typ: TypeTag,
    /// Copied onto derived resources such as `where` results.
    #[serde(default)]
    pub mandatory: bool,
}

/// A schema-declared resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDef {
    /// Filled from the map key when loading a schema.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
    /// Element type for collection-like resources.
    #[serde(default)]
    pub list_type: Option<TypeTag>,
}

impl ResourceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
            list_type: None,
        }
    }

    /// Add an optional field.
    pub fn field(mut self, name: &str, typ: TypeTag) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldDef {
                typ,
                mandatory: false,
            },
        );
        self
    }

    /// Add a mandatory field.
    pub fn mandatory_field(mut self, name: &str, typ: TypeTag) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldDef {
                typ,
                mandatory: true,
            },
        );
        self
    }

    /// Mark this resource as a collection of `element`.
    pub fn list_of(mut self, element: TypeTag) -> Self {
        self.list_type = Some(element);
        self.ensure_list_field();
        self
    }

    pub fn is_list(&self) -> bool {
        self.list_type.is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Names of mandatory fields, excluding the list field.
    pub fn mandatory_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(name, def)| def.mandatory && name.as_str() != LIST_FIELD)
            .map(|(name, _)| name.as_str())
    }

    fn ensure_list_field(&mut self) {
        if let Some(element) = &self.list_type {
            self.fields
                .entry(LIST_FIELD.to_string())
                .or_insert_with(|| FieldDef {
                    typ: TypeTag::array(element.clone()),
                    mandatory: false,
                });
        }
    }
}

/// Name-keyed catalog of resource definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource definition, replacing any previous one of the same name.
    pub fn add(&mut self, mut resource: ResourceDef) -> &mut Self {
        resource.ensure_list_field();
        self.resources.insert(resource.name.clone(), resource);
        self
    }

    pub fn with(mut self, resource: ResourceDef) -> Self {
        self.add(resource);
        self
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceDef> {
        self.resources.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Parse a schema from JSON and normalize it.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.normalized()
    }

    /// Read a schema from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    fn normalized(mut self) -> Result<Self, SchemaError> {
        for (name, resource) in self.resources.iter_mut() {
            if !resource.name.is_empty() && resource.name != *name {
                return Err(SchemaError::Invalid(format!(
                    "resource key '{name}' does not match its name '{}'",
                    resource.name
                )));
            }
            resource.name = name.clone();
            resource.ensure_list_field();
            if let (Some(element), Some(list)) =
                (&resource.list_type, resource.fields.get(LIST_FIELD))
            {
                if list.typ != TypeTag::array(element.clone()) {
                    return Err(SchemaError::Invalid(format!(
                        "resource '{name}' declares list type {element} but its list field is {}",
                        list.typ
                    )));
                }
            }
        }
        tracing::debug!("Loaded schema with {} resources", self.resources.len());
        Ok(self)
    }
}

/// Rank `candidates` by Levenshtein distance to `target`, closest first.
///
/// Ties are broken alphabetically; candidates further away than the
/// target's own length (at least 3) are dropped.
pub fn suggest<'a>(candidates: impl IntoIterator<Item = &'a str>, target: &str) -> Vec<String> {
    let limit = target.chars().count().max(3);
    let mut ranked: Vec<(usize, &str)> = candidates
        .into_iter()
        .map(|c| (strsim::levenshtein(target, c), c))
        .filter(|(distance, _)| *distance <= limit)
        .collect();
    ranked.sort();
    ranked
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, c)| c.to_string())
        .collect()
}
