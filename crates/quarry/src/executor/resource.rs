//! Handlers for resource instantiation, field reads and the collection built-ins.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::error::{ExecError, ExecResult};
use crate::program::{Chunk, Function, Primitive, Program, Ref};
use crate::runtime::ResourceArgs;
use crate::schema::LIST_FIELD;
use crate::types::TypeTag;
use crate::value::{RawData, ResourceHandle, Value};

use super::registry::{Call, HandlerRegistry, Step, TypeFamily};
use super::{ready, Executor, Resolved};

pub(super) fn register(registry: &mut HandlerRegistry) {
    registry
        .register("where", TypeFamily::Resource, where_)
        .register("length", TypeFamily::Resource, length);
}

/// Instantiate the resource named by `chunk`, resolving named init arguments first.
pub fn create(exec: &Arc<Executor>, chunk: &Chunk, function: Option<&Function>) -> ExecResult<Step> {
    let typ = TypeTag::resource(chunk.id.clone());
    let mut args: ResourceArgs = Vec::new();

    if let Some(function) = function {
        for pair in function.args.chunks(2) {
            let [key, value] = pair else {
                return Err(ExecError::Shape {
                    chunk: 0,
                    expected: "key/value argument pairs",
                    actual: format!("{} arguments", function.args.len()),
                });
            };
            let key = match exec.resolve_primitive(key)? {
                Resolved::Ready(data) => match data.value {
                    Value::String(key) => key,
                    other => {
                        return Err(ExecError::Shape {
                            chunk: 0,
                            expected: "a string argument name",
                            actual: other.to_string(),
                        })
                    }
                },
                Resolved::Pending(dep) => return Ok(Step::Wait(dep)),
            };
            let value = ready!(exec.resolve_primitive(value)?);
            if let Some(msg) = value.error_message() {
                return Ok(Step::Done(RawData::error(typ, msg)));
            }
            args.push((key, value));
        }
    }

    match exec.runtime().create_resource(&chunk.id, args) {
        Ok(handle) => Ok(Step::Done(RawData::resource(handle))),
        Err(e) => {
            tracing::warn!("Failed to create resource {}: {e}", chunk.id);
            Ok(Step::Done(RawData::error(typ, e.to_string())))
        }
    }
}

fn bound_handle<'a>(call: &'a Call<'_>) -> ExecResult<&'a ResourceHandle> {
    call.bound.value.as_resource().ok_or_else(|| ExecError::Shape {
        chunk: call.chunk_ref,
        expected: "a resource",
        actual: call.bound.value.to_string(),
    })
}

fn sequence<'a>(call: &Call<'_>, data: &'a RawData) -> ExecResult<&'a [Value]> {
    data.value.as_sequence().ok_or_else(|| ExecError::Shape {
        chunk: call.chunk_ref,
        expected: "a list",
        actual: data.value.to_string(),
    })
}

/// Default handler for calls on resources: read the field named by the call.
pub fn field(exec: &Arc<Executor>, call: &Call<'_>) -> ExecResult<Step> {
    let handle = bound_handle(call)?;
    match exec.runtime().field(handle, call.id) {
        Ok(data) => Ok(Step::Done(data)),
        Err(e) => {
            tracing::warn!("Failed to read {}.{}: {e}", handle.name, call.id);
            Ok(call.error(e.to_string()))
        }
    }
}

fn length(exec: &Arc<Executor>, call: &Call<'_>) -> ExecResult<Step> {
    let list = ready!(call.resolve_arg(exec, 0)?);
    if let Some(msg) = list.error_message() {
        return Ok(call.error(msg));
    }
    let len = sequence(call, &list)?.len();
    Ok(Step::Done(RawData::int(len as i64)))
}

/// Filter the bound collection resource by a predicate block.
///
/// Every element is evaluated through the environment's block runner; the
/// chunk stays scheduled until the last evaluation reports back.
fn where_(exec: &Arc<Executor>, call: &Call<'_>) -> ExecResult<Step> {
    let handle = bound_handle(call)?.clone();
    let list = ready!(call.resolve_arg(exec, 0)?);
    if let Some(msg) = list.error_message() {
        return Ok(call.error(msg));
    }
    let elements = sequence(call, &list)?.to_vec();

    let function = call.arg(1)?;
    let index = function.as_function().ok_or_else(|| ExecError::Shape {
        chunk: call.chunk_ref,
        expected: "a predicate block",
        actual: function.to_string(),
    })?;
    let predicate = exec
        .program()
        .function(index)
        .ok_or(ExecError::UnknownProgram(index))?;
    let predicate = Arc::new(predicate.clone());

    let element_type = list.typ.child().cloned().unwrap_or(TypeTag::Nil);
    let checksum = predicate.checksum();
    let id = if handle.id.is_empty() {
        checksum
    } else {
        format!("{}/{checksum}", handle.id)
    };

    tracing::debug!(
        "Filtering {} elements of {} with block {index}",
        elements.len(),
        handle.name
    );

    let filter = Arc::new(Filter {
        exec: exec.clone(),
        chunk_ref: call.chunk_ref,
        typ: call.typ().clone(),
        source: handle,
        id,
        list_type: list.typ.clone(),
        slots: (0..elements.len()).map(|_| OnceLock::new()).collect(),
        elements,
        settled: AtomicUsize::new(0),
    });

    if filter.elements.is_empty() {
        filter.finalize();
        return Ok(Step::Scheduled);
    }

    for (i, element) in filter.elements.iter().enumerate() {
        let input = RawData::new(element_type.clone(), element.clone());
        let collector = filter.clone();
        exec.env().blocks.run_block(
            exec.env().clone(),
            input,
            predicate.clone(),
            Box::new(move |result| collector.complete(i, result)),
        );
    }
    Ok(Step::Scheduled)
}

/// Fan-in state of one `where` evaluation.
struct Filter {
    exec: Arc<Executor>,
    chunk_ref: Ref,
    typ: TypeTag,
    source: ResourceHandle,
    id: String,
    list_type: TypeTag,
    elements: Vec<Value>,
    /// Predicate outcome per element, written once.
    slots: Vec<OnceLock<bool>>,
    settled: AtomicUsize,
}

impl Filter {
    fn complete(&self, index: usize, result: RawData) {
        let Some(slot) = self.slots.get(index) else {
            tracing::error!("Filter completion for out-of-range element {index}");
            return;
        };
        if slot.set(result.is_truthy()).is_err() {
            tracing::debug!("Ignoring duplicate completion for element {index}");
            return;
        }
        let settled = self.settled.fetch_add(1, Ordering::SeqCst) + 1;
        if settled == self.slots.len() {
            self.finalize();
        }
    }

    fn finalize(&self) {
        let kept: Vec<Value> = self
            .elements
            .iter()
            .zip(&self.slots)
            .filter(|(_, keep)| keep.get().copied().unwrap_or(false))
            .map(|(element, _)| element.clone())
            .collect();

        let runtime = self.exec.runtime();
        let mut args: ResourceArgs = vec![(
            LIST_FIELD.to_string(),
            RawData::new(self.list_type.clone(), Value::Sequence(kept)),
        )];
        if let Some(def) = runtime.schema().resource(&self.source.name) {
            for name in def.mandatory_fields() {
                match runtime.field(&self.source, name) {
                    Ok(data) => args.push((name.to_string(), data)),
                    Err(e) => tracing::warn!("Cannot copy {name} onto filtered {}: {e}", self.source.name),
                }
            }
        }

        let data = match runtime.create_resource_with_id(&self.source.name, &self.id, args) {
            Ok(handle) => RawData::resource(handle),
            Err(e) => {
                let err = ExecError::FilterResource(e);
                tracing::warn!("{err}");
                RawData::error(self.typ.clone(), err.to_string())
            }
        };
        self.exec.store(self.chunk_ref, data);
    }
}

/// Program checksum of the block a `where` chunk filters with.
pub fn predicate_checksum(program: &Program, where_chunk: &Chunk) -> Option<String> {
    let function = where_chunk.function()?;
    let index = function.args.get(1).and_then(Primitive::as_function)?;
    program.function(index).map(Program::checksum)
}
