//! Lowers expression trees into flat [`Program`]s.
//!
//! Every top-level expression becomes an entrypoint. Predicate blocks passed
//! to `where` are compiled by a child compiler into nested programs whose
//! ref 0 denotes the element being tested.

pub mod builtins;
pub mod peephole;
mod resource;
pub mod signature;

pub use signature::FunctionSignature;

use crate::ast::{Arg, BinOp, Expr, Literal};
use crate::error::{CompileError, CompileResult};
use crate::program::{Chunk, Primitive, Program, Ref, INPUT_REF};
use crate::schema::{suggest, Schema};
use crate::types::TypeTag;
use crate::value::RawData;

/// Compile `exprs` against `schema`; each expression becomes an entrypoint.
pub fn compile(schema: &Schema, exprs: &[Expr]) -> CompileResult<Program> {
    let mut compiler = Compiler::new(schema);
    for expr in exprs {
        compiler.compile_entrypoint(expr)?;
    }
    tracing::debug!(
        "Compiled {} expressions into {} chunks",
        exprs.len(),
        compiler.code.len()
    );
    Ok(compiler.code)
}

/// The value a nested block is evaluated against.
#[derive(Debug, Clone)]
struct BlockInput {
    typ: TypeTag,
    param: Option<String>,
}

/// Compiler state for one program.
pub struct Compiler<'s> {
    schema: &'s Schema,
    code: Program,
    input: Option<BlockInput>,
}

impl<'s> Compiler<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            code: Program::new(),
            input: None,
        }
    }

    fn for_block(schema: &'s Schema, typ: TypeTag, param: Option<String>) -> Self {
        Self {
            schema,
            code: Program::new(),
            input: Some(BlockInput { typ, param }),
        }
    }

    /// The program built so far.
    pub fn program(&self) -> &Program {
        &self.code
    }

    pub fn into_program(self) -> Program {
        self.code
    }

    /// Compile `expr` and mark its result as an entrypoint.
    pub fn compile_entrypoint(&mut self, expr: &Expr) -> CompileResult<TypeTag> {
        let (r, typ) = self.compile_expr(expr)?;
        self.code.entrypoints.push(r);
        Ok(typ)
    }

    /// Compile a predicate block evaluated against values of `input_type`.
    ///
    /// Returns the 1-based index of the nested program together with its
    /// function type, or index 0 when the block is empty.
    pub fn compile_block(&mut self, body: &Expr, input_type: TypeTag) -> CompileResult<(usize, TypeTag)> {
        let (param, exprs) = block_parts(body);
        if exprs.is_empty() {
            return Ok((0, TypeTag::Function(Box::new(TypeTag::Nil))));
        }

        let mut child = Compiler::for_block(self.schema, input_type, param);
        let mut result = TypeTag::Bool;
        for expr in &exprs {
            result = child.compile_entrypoint(expr)?;
        }
        if exprs.len() > 1 {
            result = TypeTag::Bool;
        }

        let index = self.code.add_function(child.code);
        Ok((index, TypeTag::Function(Box::new(result))))
    }

    fn compile_expr(&mut self, expr: &Expr) -> CompileResult<(Ref, TypeTag)> {
        match expr {
            Expr::Literal(lit) => {
                let data = literal_data(lit);
                let typ = data.typ.clone();
                Ok((self.code.add_chunk(Chunk::value(Primitive::literal(data))), typ))
            }
            Expr::Ident { name, args } => self.compile_ident(name, args.as_deref()),
            Expr::Member { target, name, args } => {
                let (bound_ref, bound_type) = self.compile_expr(target)?;
                self.compile_call_on(&bound_type, bound_ref, name, args.as_deref())
            }
            Expr::Binary { op, lhs, rhs } => self.compile_binary(*op, lhs, rhs),
            Expr::Not(inner) => {
                let (r, _) = self.compile_expr(inner)?;
                let chunk = Chunk::call(builtins::NOT, TypeTag::Bool, Some(r), vec![]);
                Ok((self.code.add_chunk(chunk), TypeTag::Bool))
            }
            Expr::Lambda { .. } => Err(CompileError::Unsupported(
                "a function block can only be passed as an argument".to_string(),
            )),
            Expr::Block(_) => Err(CompileError::Unsupported(
                "a block can only be passed as an argument".to_string(),
            )),
        }
    }

    /// Compile `expr` as an operand: literals are inlined, anything else
    /// becomes a reference to its chunk.
    fn compile_operand(&mut self, expr: &Expr) -> CompileResult<Primitive> {
        if let Expr::Literal(lit) = expr {
            return Ok(Primitive::literal(literal_data(lit)));
        }
        let (r, typ) = self.compile_expr(expr)?;
        Ok(Primitive::reference(r, typ))
    }

    fn compile_ident(&mut self, name: &str, args: Option<&[Arg]>) -> CompileResult<(Ref, TypeTag)> {
        if let Some(input) = self.input.clone() {
            if input.param.as_deref() == Some(name) {
                if args.is_some() {
                    return Err(CompileError::UnexpectedArguments {
                        call: name.to_string(),
                    });
                }
                return Ok((INPUT_REF, input.typ));
            }

            let has_field = input
                .typ
                .resource_name()
                .and_then(|r| self.schema.resource(r))
                .is_some_and(|def| def.fields.contains_key(name));
            if has_field {
                return self.compile_call_on(&input.typ, INPUT_REF, name, args);
            }
        }

        if self.schema.contains(name) {
            return self.add_resource(name, args);
        }

        let mut candidates: Vec<&str> = self.schema.resources.keys().map(String::as_str).collect();
        if let Some(def) = self
            .input
            .as_ref()
            .and_then(|input| input.typ.resource_name())
            .and_then(|r| self.schema.resource(r))
        {
            candidates.extend(def.field_names());
        }
        Err(CompileError::UnknownResource {
            name: name.to_string(),
            suggestions: suggest(candidates, name),
        })
    }

    /// Compile `name(args)` called on a value of `bound_type` held in `bound_ref`.
    fn compile_call_on(
        &mut self,
        bound_type: &TypeTag,
        bound_ref: Ref,
        name: &str,
        args: Option<&[Arg]>,
    ) -> CompileResult<(Ref, TypeTag)> {
        if bound_type.is_resource() {
            return self.compile_resource_call(bound_type, bound_ref, name, args);
        }

        let builtin = builtins::method(bound_type, name).ok_or_else(|| CompileError::UnknownFunction {
            call: name.to_string(),
            typ: bound_type.label(),
        })?;

        let mut primitives = Vec::new();
        for arg in args.unwrap_or_default() {
            if arg.name.is_some() {
                return Err(CompileError::NamedParameter {
                    call: name.to_string(),
                });
            }
            primitives.push(self.compile_operand(&arg.value)?);
        }
        builtin
            .signature
            .validate(&primitives)
            .map_err(|source| CompileError::Signature {
                call: name.to_string(),
                typ: bound_type.label(),
                source,
            })?;

        let chunk = Chunk::call(name, builtin.result.clone(), Some(bound_ref), primitives);
        Ok((self.code.add_chunk(chunk), builtin.result))
    }

    fn compile_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> CompileResult<(Ref, TypeTag)> {
        let (lhs_ref, lhs_type) = self.compile_expr(lhs)?;
        let operator = builtins::operator(op, &lhs_type).ok_or_else(|| CompileError::UnknownFunction {
            call: op.symbol().to_string(),
            typ: lhs_type.label(),
        })?;

        let rhs = self.compile_operand(rhs)?;
        let args = vec![rhs];
        operator
            .signature
            .validate(&args)
            .map_err(|source| CompileError::Signature {
                call: op.symbol().to_string(),
                typ: lhs_type.label(),
                source,
            })?;

        let chunk = Chunk::call(op.symbol(), operator.result.clone(), Some(lhs_ref), args);
        Ok((self.code.add_chunk(chunk), operator.result))
    }
}

/// Split a block argument into its optional parameter name and body expressions.
fn block_parts(expr: &Expr) -> (Option<String>, Vec<&Expr>) {
    match expr {
        Expr::Lambda { param, body } => {
            let (_, exprs) = block_parts(body);
            (Some(param.clone()), exprs)
        }
        Expr::Block(exprs) => (None, exprs.iter().collect()),
        other => (None, vec![other]),
    }
}

fn literal_data(lit: &Literal) -> RawData {
    match lit {
        Literal::Null => RawData::nil(),
        Literal::Bool(b) => RawData::bool(*b),
        Literal::Int(i) => RawData::int(*i),
        Literal::Float(f) => RawData::float(*f),
        Literal::String(s) => RawData::string(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ChunkKind;
    use crate::schema::ResourceDef;

    fn schema() -> Schema {
        Schema::new()
            .with(
                ResourceDef::new("packages")
                    .mandatory_field("kind", TypeTag::String)
                    .list_of(TypeTag::resource("package")),
            )
            .with(
                ResourceDef::new("package")
                    .field("name", TypeTag::String)
                    .field("version", TypeTag::String)
                    .field("installed", TypeTag::Bool)
                    .field("size", TypeTag::Int),
            )
            .with(
                ResourceDef::new("os")
                    .field("name", TypeTag::String)
                    .field("tags", TypeTag::array(TypeTag::String)),
            )
    }

    #[test]
    fn test_literal_entrypoint() {
        let code = compile(&schema(), &[Expr::bool(true)]).unwrap();
        assert_eq!(code.len(), 1);
        assert_eq!(code.entrypoints, vec![1]);
        assert!(matches!(code.chunks[0].kind, ChunkKind::Value(_)));
    }

    #[test]
    fn test_field_access() {
        let code = compile(&schema(), &[Expr::path("os.name")]).unwrap();
        assert_eq!(code.len(), 2);
        assert!(code.chunks[0].is_bare_resource());
        let f = code.chunks[1].function().unwrap();
        assert_eq!(f.binding, Some(1));
        assert_eq!(f.typ, TypeTag::String);
        assert!(f.args.is_empty());
        assert_eq!(code.entrypoints, vec![2]);
    }

    #[test]
    fn test_unknown_resource_suggests() {
        let err = compile(&schema(), &[Expr::ident("packags")]).unwrap_err();
        assert!(matches!(err, CompileError::UnknownResource { .. }));
        assert_eq!(
            &err.suggestions()[..2],
            &["package".to_string(), "packages".to_string()]
        );
    }

    #[test]
    fn test_unknown_field_suggests_by_distance() {
        let err = compile(&schema(), &[Expr::path("os.nme")]).unwrap_err();
        match err {
            CompileError::FieldNotFound {
                resource,
                field,
                suggestions,
            } => {
                assert_eq!(resource, "os");
                assert_eq!(field, "nme");
                assert_eq!(suggestions[0], "name");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_field_with_arguments_rejected() {
        let expr = Expr::ident("os").call("name", vec![Arg::unnamed(Expr::int(1))]);
        let err = compile(&schema(), &[expr]).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnexpectedArguments {
                call: "name".into()
            }
        );
    }

    #[test]
    fn test_string_builtin_validated() {
        let ok = Expr::path("os.name").call("contains", vec![Arg::unnamed(Expr::string("ux"))]);
        let code = compile(&schema(), &[ok]).unwrap();
        let f = code.chunks[2].function().unwrap();
        assert_eq!(code.chunks[2].id, "contains");
        assert_eq!(f.typ, TypeTag::Bool);
        assert_eq!(f.binding, Some(2));

        let bad = Expr::path("os.name").call("contains", vec![Arg::unnamed(Expr::int(3))]);
        let err = compile(&schema(), &[bad]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot call 'contains' on string: incorrect argument 0: expected string got int"
        );
    }

    #[test]
    fn test_unknown_builtin() {
        let expr = Expr::path("os.name").call("reverse", vec![]);
        let err = compile(&schema(), &[expr]).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownFunction {
                call: "reverse".into(),
                typ: "string".into()
            }
        );
    }

    #[test]
    fn test_binary_inlines_literal_rhs() {
        let expr = Expr::path("os.name").binary(BinOp::Eq, Expr::string("arch"));
        let code = compile(&schema(), &[expr]).unwrap();
        assert_eq!(code.len(), 3);
        let f = code.chunks[2].function().unwrap();
        assert_eq!(code.chunks[2].id, "==");
        assert_eq!(f.args, vec![Primitive::literal(RawData::string("arch"))]);
    }

    #[test]
    fn test_binary_type_mismatch() {
        let expr = Expr::path("os.name").binary(BinOp::Eq, Expr::int(1));
        assert!(matches!(
            compile(&schema(), &[expr]),
            Err(CompileError::Signature { .. })
        ));
    }

    #[test]
    fn test_lambda_param_and_bare_fields_resolve_to_input() {
        let body = Expr::Block(vec![
            Expr::ident("p").field("installed"),
            Expr::ident("name").binary(BinOp::Neq, Expr::string("")),
        ]);
        let expr = Expr::ident("packages").call("where", vec![Arg::unnamed(Expr::lambda("p", body))]);
        let code = compile(&schema(), &[expr]).unwrap();

        let block = code.function(1).unwrap();
        assert_eq!(block.entrypoints.len(), 2);
        let installed = block.chunks[0].function().unwrap();
        assert_eq!(installed.binding, Some(INPUT_REF));
        let name = block.chunks[1].function().unwrap();
        assert_eq!(name.binding, Some(INPUT_REF));
    }

    #[test]
    fn test_top_level_lambda_unsupported() {
        let expr = Expr::lambda("x", Expr::bool(true));
        assert!(matches!(
            compile(&schema(), &[expr]),
            Err(CompileError::Unsupported(_))
        ));
    }
}
