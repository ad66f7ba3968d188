//! Handler lookup by call id and receiver type.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ExecError, ExecResult};
use crate::program::{Function, Primitive, Ref};
use crate::types::TypeTag;
use crate::value::RawData;

use super::{builtins, resource, Executor, Resolved};

/// What a handler did with a chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The chunk resolved to this data.
    Done(RawData),
    /// The chunk cannot proceed until `Ref` resolves.
    Wait(Ref),
    /// Asynchronous work was started; it will store the result itself.
    Scheduled,
}

/// A bound call as seen by its handler.
pub struct Call<'a> {
    pub chunk_ref: Ref,
    pub id: &'a str,
    pub function: &'a Function,
    /// The resolved receiver.
    pub bound: RawData,
}

impl Call<'_> {
    /// Declared result type.
    pub fn typ(&self) -> &TypeTag {
        &self.function.typ
    }

    pub fn arg(&self, index: usize) -> ExecResult<&Primitive> {
        self.function.args.get(index).ok_or_else(|| ExecError::Shape {
            chunk: self.chunk_ref,
            expected: "an argument",
            actual: format!("{} arguments", self.function.args.len()),
        })
    }

    /// Resolve argument `index`.
    pub fn resolve_arg(&self, exec: &Arc<Executor>, index: usize) -> ExecResult<Resolved> {
        exec.resolve_primitive(self.arg(index)?)
    }

    /// Error data carrying this call's declared type.
    pub fn error(&self, msg: impl Into<String>) -> Step {
        Step::Done(RawData::error(self.typ().clone(), msg))
    }
}

/// A chunk handler.
pub type Handler = Arc<dyn Fn(&Arc<Executor>, &Call<'_>) -> ExecResult<Step> + Send + Sync>;

/// Coarse receiver type used to pick between handlers sharing an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    Any,
    Nil,
    Bool,
    Int,
    Float,
    String,
    Array,
    Map,
    Resource,
    Function,
}

impl TypeFamily {
    pub fn of(typ: &TypeTag) -> Self {
        match typ {
            TypeTag::Nil => TypeFamily::Nil,
            TypeTag::Bool => TypeFamily::Bool,
            TypeTag::Int => TypeFamily::Int,
            TypeTag::Float => TypeFamily::Float,
            TypeTag::String => TypeFamily::String,
            TypeTag::Array(_) => TypeFamily::Array,
            TypeTag::Map(..) => TypeFamily::Map,
            TypeTag::Resource(_) => TypeFamily::Resource,
            TypeTag::Function(_) => TypeFamily::Function,
        }
    }
}

/// Immutable-after-construction table of chunk handlers.
///
/// Built once and shared by every executor of a query, including the
/// executors of nested predicate blocks.
pub struct HandlerRegistry {
    handlers: HashMap<(String, TypeFamily), Handler>,
    field: Handler,
}

impl HandlerRegistry {
    /// A registry with only the default resource field handler.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
            field: Arc::new(resource::field),
        }
    }

    /// A registry with every built-in handler.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        resource::register(&mut registry);
        builtins::register(&mut registry);
        registry
    }

    /// Register `handler` for calls named `id` on receivers of `family`.
    pub fn register<F>(&mut self, id: &str, family: TypeFamily, handler: F) -> &mut Self
    where
        F: Fn(&Arc<Executor>, &Call<'_>) -> ExecResult<Step> + Send + Sync + 'static,
    {
        self.handlers
            .insert((id.to_string(), family), Arc::new(handler));
        self
    }

    /// Find the handler for `id` called on a receiver of type `bound`.
    ///
    /// Exact family matches win over [`TypeFamily::Any`]; unmatched calls
    /// on resources are field reads.
    pub fn lookup(&self, id: &str, bound: &TypeTag) -> Option<Handler> {
        let family = TypeFamily::of(bound);
        let key = (id.to_string(), family);
        if let Some(handler) = self.handlers.get(&key) {
            return Some(handler.clone());
        }
        if let Some(handler) = self.handlers.get(&(key.0, TypeFamily::Any)) {
            return Some(handler.clone());
        }
        (family == TypeFamily::Resource).then(|| self.field.clone())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .handlers
            .keys()
            .map(|(id, family)| format!("{id}:{family:?}"))
            .collect();
        keys.sort();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_family_before_any() {
        let registry = HandlerRegistry::builtin();
        assert!(registry.lookup("length", &TypeTag::String).is_some());
        assert!(registry.lookup("length", &TypeTag::resource("packages")).is_some());
        assert!(registry.lookup("==", &TypeTag::Int).is_some());
        assert!(registry.lookup("reverse", &TypeTag::String).is_none());
    }

    #[test]
    fn test_resources_fall_back_to_field_reads() {
        let registry = HandlerRegistry::empty();
        assert!(registry.is_empty());
        assert!(registry.lookup("name", &TypeTag::resource("os")).is_some());
        assert!(registry.lookup("name", &TypeTag::String).is_none());
    }

    #[test]
    fn test_register_overrides() {
        let mut registry = HandlerRegistry::empty();
        registry.register("upcase", TypeFamily::String, |_, call| {
            Ok(Step::Done(RawData::string(format!("{}!", call.bound))))
        });
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup("upcase", &TypeTag::String).is_some());
        assert!(registry.lookup("upcase", &TypeTag::Int).is_none());
    }
}
