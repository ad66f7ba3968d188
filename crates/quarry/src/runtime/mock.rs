//! Recorded runtime: serves resource data loaded from JSON.
//!
//! Fixture layout:
//!
//! ```json
//! { "resources": {
//!     "os": { "name": "arch" },
//!     "packages": { "list": [ { "id": "bash", "name": "bash", "installed": true } ] }
//! } }
//! ```
//!
//! A resource entry is either one object or an array of objects. An
//! object's optional `id` key names the instance; a lone top-level object
//! defaults to the empty id, array entries and nested objects to a content
//! hash. Nested objects under
//! resource-typed fields become instances of their own. Resources created
//! during evaluation are recorded alongside and show up in [`MockRuntime::export`].

use dashmap::DashMap;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{RuntimeError, RuntimeResult, SchemaError};
use crate::runtime::{ResourceArgs, Runtime};
use crate::schema::{ResourceDef, Schema};
use crate::types::TypeTag;
use crate::value::{RawData, ResourceHandle, Value};

const ID_KEY: &str = "id";

type Fields = BTreeMap<String, RawData>;

/// In-memory [`Runtime`] backed by recorded data.
pub struct MockRuntime {
    schema: Schema,
    instances: DashMap<(String, String), Fields>,
}

impl MockRuntime {
    /// An empty runtime over `schema`.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            instances: DashMap::new(),
        }
    }

    /// Load recorded data from a JSON document.
    pub fn from_json(schema: Schema, json: &str) -> Result<Self, SchemaError> {
        let doc: Json = serde_json::from_str(json)?;
        let runtime = Self::new(schema);
        runtime
            .load(&doc)
            .map_err(|e| SchemaError::Invalid(e.to_string()))?;
        Ok(runtime)
    }

    /// Load recorded data from a JSON file.
    pub fn from_file(schema: Schema, path: &Path) -> Result<Self, SchemaError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(schema, &data)
    }

    /// Merge a fixture document into this runtime.
    pub fn load(&self, doc: &Json) -> RuntimeResult<()> {
        let Some(resources) = doc.get("resources").and_then(Json::as_object) else {
            return Err(RuntimeError::InvalidData {
                name: "fixture".to_string(),
                reason: "missing 'resources' object".to_string(),
            });
        };

        for (name, entry) in resources {
            match entry {
                Json::Object(obj) => {
                    self.load_instance(name, obj, Some(""))?;
                }
                Json::Array(items) => {
                    for item in items {
                        let obj = item.as_object().ok_or_else(|| invalid(name, "expected an object"))?;
                        self.load_instance(name, obj, None)?;
                    }
                }
                _ => return Err(invalid(name, "expected an object or an array of objects")),
            }
        }
        tracing::debug!("Loaded {} recorded resource instances", self.instances.len());
        Ok(())
    }

    /// Number of recorded instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Dump all instances in fixture layout; resource-typed values are
    /// written as the id of the referenced instance.
    pub fn export(&self) -> Json {
        let mut grouped: BTreeMap<String, BTreeMap<String, Json>> = BTreeMap::new();
        for entry in self.instances.iter() {
            let (name, id) = entry.key();
            let mut obj = Map::new();
            obj.insert(ID_KEY.to_string(), Json::String(id.clone()));
            for (field, data) in entry.value() {
                obj.insert(field.clone(), export_value(&data.value));
            }
            grouped
                .entry(name.clone())
                .or_default()
                .insert(id.clone(), Json::Object(obj));
        }

        let resources: Map<String, Json> = grouped
            .into_iter()
            .map(|(name, by_id)| (name, Json::Array(by_id.into_values().collect())))
            .collect();
        serde_json::json!({ "resources": resources })
    }

    fn definition(&self, name: &str) -> RuntimeResult<&ResourceDef> {
        self.schema
            .resource(name)
            .ok_or_else(|| RuntimeError::UnknownResource(name.to_string()))
    }

    fn load_instance(
        &self,
        name: &str,
        obj: &Map<String, Json>,
        default_id: Option<&str>,
    ) -> RuntimeResult<ResourceHandle> {
        let def = self.definition(name)?;
        let id = match obj.get(ID_KEY).and_then(Json::as_str) {
            Some(id) => id.to_string(),
            None => match default_id {
                Some(id) => id.to_string(),
                None => content_id(obj),
            },
        };

        let mut fields = Fields::new();
        for (key, json) in obj {
            let Some(field) = def.fields.get(key) else {
                if key == ID_KEY {
                    continue;
                }
                return Err(RuntimeError::UnknownField {
                    resource: name.to_string(),
                    field: key.clone(),
                });
            };
            let value = self.convert(&field.typ, json, name)?;
            fields.insert(key.clone(), RawData::new(field.typ.clone(), value));
        }

        self.instances.insert((name.to_string(), id.clone()), fields);
        Ok(ResourceHandle::new(name, id))
    }

    /// Convert fixture JSON into a typed value.
    fn convert(&self, typ: &TypeTag, json: &Json, context: &str) -> RuntimeResult<Value> {
        let mismatch = || invalid(context, &format!("expected {typ}, got {json}"));
        if json.is_null() {
            return Ok(Value::Null);
        }

        match typ {
            TypeTag::Nil => Ok(Value::Null),
            TypeTag::Bool => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
            TypeTag::Int => json.as_i64().map(Value::Int).ok_or_else(mismatch),
            TypeTag::Float => json.as_f64().map(Value::Float).ok_or_else(mismatch),
            TypeTag::String => json
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(mismatch),
            TypeTag::Array(child) => {
                let items = json.as_array().ok_or_else(mismatch)?;
                items
                    .iter()
                    .map(|item| self.convert(child, item, context))
                    .collect::<RuntimeResult<Vec<_>>>()
                    .map(Value::Sequence)
            }
            TypeTag::Map(_, child) => {
                let obj = json.as_object().ok_or_else(mismatch)?;
                let mut entries = BTreeMap::new();
                for (key, value) in obj {
                    entries.insert(key.clone(), self.convert(child, value, context)?);
                }
                Ok(Value::Mapping(entries))
            }
            TypeTag::Resource(name) => match json {
                Json::String(id) => Ok(Value::Resource(ResourceHandle::new(name.clone(), id.clone()))),
                Json::Object(obj) => self.load_instance(name, obj, None).map(Value::Resource),
                _ => Err(mismatch()),
            },
            TypeTag::Function(_) => Err(invalid(context, "functions cannot be recorded")),
        }
    }

    fn store(&self, name: &str, id: String, args: ResourceArgs) -> RuntimeResult<ResourceHandle> {
        let def = self.definition(name)?;
        let mut fields = self
            .instances
            .get(&(name.to_string(), id.clone()))
            .map(|existing| existing.value().clone())
            .unwrap_or_default();

        for (key, data) in args {
            if !def.fields.contains_key(&key) {
                return Err(RuntimeError::UnknownField {
                    resource: name.to_string(),
                    field: key,
                });
            }
            fields.insert(key, data);
        }
        self.instances.insert((name.to_string(), id.clone()), fields);
        Ok(ResourceHandle::new(name, id))
    }
}

impl Runtime for MockRuntime {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn create_resource(&self, name: &str, args: ResourceArgs) -> RuntimeResult<ResourceHandle> {
        let id = args
            .iter()
            .map(|(key, data)| format!("{key}={}", data.value))
            .collect::<Vec<_>>()
            .join(",");
        let key = (name.to_string(), id.clone());
        if args.is_empty() && !self.instances.contains_key(&key) {
            self.definition(name)?;
            return Err(RuntimeError::MissingInstance {
                name: name.to_string(),
                id,
            });
        }
        self.store(name, id, args)
    }

    fn create_resource_with_id(
        &self,
        name: &str,
        id: &str,
        args: ResourceArgs,
    ) -> RuntimeResult<ResourceHandle> {
        let def = self.definition(name)?;
        let mut fields = Fields::new();
        for (key, data) in args {
            if !def.fields.contains_key(&key) {
                return Err(RuntimeError::UnknownField {
                    resource: name.to_string(),
                    field: key,
                });
            }
            fields.insert(key, data);
        }
        // Explicit ids replace the whole instance in one step.
        self.instances.insert((name.to_string(), id.to_string()), fields);
        Ok(ResourceHandle::new(name, id))
    }

    fn field(&self, handle: &ResourceHandle, name: &str) -> RuntimeResult<RawData> {
        let def = self.definition(&handle.name)?;
        if !def.fields.contains_key(name) {
            return Err(RuntimeError::UnknownField {
                resource: handle.name.clone(),
                field: name.to_string(),
            });
        }
        let instance = self
            .instances
            .get(&(handle.name.clone(), handle.id.clone()))
            .ok_or_else(|| RuntimeError::MissingInstance {
                name: handle.name.clone(),
                id: handle.id.clone(),
            })?;
        instance
            .value()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::MissingField {
                resource: handle.name.clone(),
                field: name.to_string(),
            })
    }
}

fn invalid(name: &str, reason: &str) -> RuntimeError {
    RuntimeError::InvalidData {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Stable id for an unnamed nested object.
fn content_id(obj: &Map<String, Json>) -> String {
    let bytes = serde_json::to_vec(obj).unwrap_or_default();
    blake3::hash(&bytes).to_hex().as_str()[..16].to_string()
}

fn export_value(value: &Value) -> Json {
    match value {
        Value::Resource(handle) => Json::String(handle.id.clone()),
        Value::Sequence(items) => Json::Array(items.iter().map(export_value).collect()),
        Value::Mapping(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), export_value(v)))
                .collect(),
        ),
        other => other.to_json(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{ "resources": {
        "os": { "name": "arch" },
        "packages": { "kind": "pacman", "list": [
            { "id": "bash", "name": "bash", "installed": true },
            { "name": "vim", "installed": false }
        ] }
    } }"#;

    fn schema() -> Schema {
        Schema::new()
            .with(ResourceDef::new("os").field("name", TypeTag::String))
            .with(
                ResourceDef::new("packages")
                    .mandatory_field("kind", TypeTag::String)
                    .list_of(TypeTag::resource("package")),
            )
            .with(
                ResourceDef::new("package")
                    .field("name", TypeTag::String)
                    .field("installed", TypeTag::Bool),
            )
            .with(ResourceDef::new("file").field("path", TypeTag::String))
    }

    #[test]
    fn test_load_and_read_fields() {
        let runtime = MockRuntime::from_json(schema(), FIXTURE).unwrap();
        let os = runtime.create_resource("os", vec![]).unwrap();
        assert_eq!(os, ResourceHandle::new("os", ""));
        assert_eq!(runtime.field(&os, "name").unwrap(), RawData::string("arch"));

        let packages = runtime.create_resource("packages", vec![]).unwrap();
        let list = runtime.field(&packages, "list").unwrap();
        let items = list.value.as_sequence().unwrap();
        assert_eq!(items.len(), 2);
        let bash = items[0].as_resource().unwrap();
        assert_eq!(bash.id, "bash");
        assert_eq!(runtime.field(bash, "installed").unwrap(), RawData::bool(true));
    }

    #[test]
    fn test_unknown_and_missing() {
        let runtime = MockRuntime::from_json(schema(), FIXTURE).unwrap();
        let os = runtime.create_resource("os", vec![]).unwrap();
        assert!(matches!(
            runtime.field(&os, "kernel"),
            Err(RuntimeError::UnknownField { .. })
        ));
        assert!(matches!(
            runtime.create_resource("nope", vec![]),
            Err(RuntimeError::UnknownResource(_))
        ));
        assert!(matches!(
            runtime.create_resource("file", vec![]),
            Err(RuntimeError::MissingInstance { .. })
        ));
    }

    #[test]
    fn test_create_with_args_records_instance() {
        let runtime = MockRuntime::new(schema());
        let args = vec![("path".to_string(), RawData::string("/etc/hosts"))];
        let file = runtime.create_resource("file", args.clone()).unwrap();
        assert_eq!(file.id, "path=\"/etc/hosts\"");
        assert_eq!(runtime.field(&file, "path").unwrap(), RawData::string("/etc/hosts"));
        assert_eq!(runtime.create_resource("file", args).unwrap(), file);
        assert_eq!(runtime.len(), 1);
    }

    #[test]
    fn test_create_with_id_replaces() {
        let runtime = MockRuntime::new(schema());
        let first = vec![("name".to_string(), RawData::string("a"))];
        runtime.create_resource_with_id("os", "x", first).unwrap();
        let handle = runtime.create_resource_with_id("os", "x", vec![]).unwrap();
        assert!(matches!(
            runtime.field(&handle, "name"),
            Err(RuntimeError::MissingField { .. })
        ));
    }

    #[test]
    fn test_create_with_id_never_hides_instance() {
        let runtime = std::sync::Arc::new(MockRuntime::new(schema()));
        let name = || vec![("name".to_string(), RawData::string("a"))];
        let handle = runtime.create_resource_with_id("os", "x", name()).unwrap();

        let writer = {
            let runtime = runtime.clone();
            std::thread::spawn(move || {
                for _ in 0..20_000 {
                    runtime.create_resource_with_id("os", "x", name()).unwrap();
                }
            })
        };
        let failures = (0..20_000)
            .filter(|_| runtime.field(&handle, "name").is_err())
            .count();
        writer.join().unwrap();
        assert_eq!(failures, 0);
    }

    #[test]
    fn test_create_with_id_rejects_unknown_field() {
        let runtime = MockRuntime::new(schema());
        let args = vec![("nope".to_string(), RawData::int(1))];
        assert!(matches!(
            runtime.create_resource_with_id("os", "x", args),
            Err(RuntimeError::UnknownField { .. })
        ));
        assert!(runtime.is_empty());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let json = r#"{ "resources": { "os": { "name": 3 } } }"#;
        assert!(MockRuntime::from_json(schema(), json).is_err());
    }

    #[test]
    fn test_export_reloads() {
        let runtime = MockRuntime::from_json(schema(), FIXTURE).unwrap();
        let exported = runtime.export();
        let again = MockRuntime::new(schema());
        again.load(&exported).unwrap();
        assert_eq!(again.len(), runtime.len());

        let packages = again.create_resource("packages", vec![]).unwrap();
        let list = again.field(&packages, "list").unwrap();
        let bash = list.value.as_sequence().unwrap()[0].as_resource().unwrap().clone();
        assert_eq!(again.field(&bash, "name").unwrap(), RawData::string("bash"));
    }
}
