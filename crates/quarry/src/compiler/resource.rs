//! Field access, resource instantiation and the collection built-ins.

use crate::ast::Arg;
use crate::error::{CompileError, CompileResult};
use crate::program::{Chunk, Primitive, Ref};
use crate::schema::{suggest, ResourceDef, LIST_FIELD};
use crate::types::TypeTag;

use super::{peephole, Compiler};

const WHERE: &str = "where";
const LENGTH: &str = "length";

impl<'s> Compiler<'s> {
    pub(super) fn compile_resource_call(
        &mut self,
        bound_type: &TypeTag,
        bound_ref: Ref,
        name: &str,
        args: Option<&[Arg]>,
    ) -> CompileResult<(Ref, TypeTag)> {
        match name {
            WHERE => self.compile_where(bound_type, bound_ref, args),
            LENGTH => self.compile_length(bound_type, bound_ref, args),
            _ => self.compile_field(bound_type, bound_ref, name, args),
        }
    }

    /// Resolve `name` on a resource: either a fused dot-qualified resource
    /// or a schema field.
    pub fn compile_field(
        &mut self,
        bound_type: &TypeTag,
        bound_ref: Ref,
        name: &str,
        args: Option<&[Arg]>,
    ) -> CompileResult<(Ref, TypeTag)> {
        let schema = self.schema;
        let resource_name = bound_type.resource_name().unwrap_or_default();
        let resource = schema
            .resource(resource_name)
            .ok_or_else(|| CompileError::MissingResourceForField {
                resource: resource_name.to_string(),
                field: name.to_string(),
            })?;

        if let Some(fused) = peephole::fuse_resource_chain(&mut self.code, schema, bound_ref, name) {
            return self.add_resource(&fused, args);
        }

        let field = resource
            .fields
            .get(name)
            .ok_or_else(|| CompileError::FieldNotFound {
                resource: resource.name.clone(),
                field: name.to_string(),
                suggestions: suggest(resource.field_names(), name),
            })?;

        if args.is_some_and(|a| !a.is_empty()) {
            return Err(CompileError::UnexpectedArguments {
                call: name.to_string(),
            });
        }

        let r = self.emit_field(bound_ref, name, field.typ.clone());
        Ok((r, field.typ.clone()))
    }

    /// Reference a global resource, optionally initialized with named arguments.
    pub(super) fn add_resource(&mut self, name: &str, args: Option<&[Arg]>) -> CompileResult<(Ref, TypeTag)> {
        let typ = TypeTag::resource(name);
        let args = args.unwrap_or_default();
        if args.is_empty() {
            return Ok((self.code.add_chunk(Chunk::resource(name)), typ));
        }

        let schema = self.schema;
        let resource = schema
            .resource(name)
            .ok_or_else(|| CompileError::UnknownResource {
                name: name.to_string(),
                suggestions: suggest(schema.resources.keys().map(String::as_str), name),
            })?;

        let mut primitives = Vec::with_capacity(args.len() * 2);
        for arg in args {
            let key = arg.name.as_deref().ok_or_else(|| CompileError::UnnamedInitArgument {
                resource: name.to_string(),
            })?;
            let field = resource
                .fields
                .get(key)
                .ok_or_else(|| CompileError::UnknownInitArgument {
                    resource: name.to_string(),
                    arg: key.to_string(),
                    suggestions: suggest(resource.field_names(), key),
                })?;
            let value = self.compile_operand(&arg.value)?;
            if value.typ() != &field.typ {
                return Err(CompileError::InitArgumentType {
                    resource: name.to_string(),
                    arg: key.to_string(),
                    expected: field.typ.label(),
                    actual: value.typ().label(),
                });
            }
            primitives.push(Primitive::literal(crate::value::RawData::string(key)));
            primitives.push(value);
        }

        let chunk = Chunk::call(name, typ.clone(), None, primitives);
        Ok((self.code.add_chunk(chunk), typ))
    }

    fn compile_where(
        &mut self,
        bound_type: &TypeTag,
        bound_ref: Ref,
        args: Option<&[Arg]>,
    ) -> CompileResult<(Ref, TypeTag)> {
        let resource = self.list_resource(bound_type, WHERE)?;
        let element = resource.list_type.clone().unwrap_or(TypeTag::Nil);

        let args = args.unwrap_or_default();
        let arg = match args {
            [] => {
                return Err(CompileError::MissingFilterArgument {
                    call: WHERE.to_string(),
                })
            }
            [arg] => arg,
            _ => {
                return Err(CompileError::TooManyArguments {
                    call: WHERE.to_string(),
                })
            }
        };
        if arg.name.is_some() {
            return Err(CompileError::NamedParameter {
                call: WHERE.to_string(),
            });
        }

        let (function, function_type) = self.compile_block(&arg.value, element.clone())?;
        if function == 0 {
            return Err(CompileError::MissingBlock {
                call: WHERE.to_string(),
            });
        }

        let list_type = TypeTag::array(element);
        let list_ref = self.emit_field(bound_ref, LIST_FIELD, list_type.clone());
        let chunk = Chunk::call(
            WHERE,
            bound_type.clone(),
            Some(bound_ref),
            vec![
                Primitive::reference(list_ref, list_type),
                Primitive::function(function, function_type),
            ],
        );
        Ok((self.code.add_chunk(chunk), bound_type.clone()))
    }

    fn compile_length(
        &mut self,
        bound_type: &TypeTag,
        bound_ref: Ref,
        args: Option<&[Arg]>,
    ) -> CompileResult<(Ref, TypeTag)> {
        let resource = self.list_resource(bound_type, LENGTH)?;
        if args.is_some_and(|a| !a.is_empty()) {
            return Err(CompileError::UnexpectedArguments {
                call: LENGTH.to_string(),
            });
        }

        let list_type = TypeTag::array(resource.list_type.clone().unwrap_or(TypeTag::Nil));
        let list_ref = self.emit_field(bound_ref, LIST_FIELD, list_type.clone());
        let chunk = Chunk::call(
            LENGTH,
            TypeTag::Int,
            Some(bound_ref),
            vec![Primitive::reference(list_ref, list_type)],
        );
        Ok((self.code.add_chunk(chunk), TypeTag::Int))
    }

    /// The schema definition of a collection resource.
    fn list_resource(&self, bound_type: &TypeTag, call: &str) -> CompileResult<&'s ResourceDef> {
        let name = bound_type.resource_name().unwrap_or_default();
        let resource = self.schema.resource(name).ok_or_else(|| CompileError::UnknownResource {
            name: name.to_string(),
            suggestions: Vec::new(),
        })?;
        if !resource.is_list() {
            return Err(CompileError::NotAListType {
                call: call.to_string(),
                resource: name.to_string(),
            });
        }
        Ok(resource)
    }

    /// Emit a plain field read; never fused.
    fn emit_field(&mut self, bound_ref: Ref, name: &str, typ: TypeTag) -> Ref {
        self.code.add_chunk(Chunk::call(name, typ, Some(bound_ref), vec![]))
    }
}
