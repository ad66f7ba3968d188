//! Quarry — compile resource queries against a typed schema and evaluate them as a dataflow program.

pub mod ast;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod program;
pub mod runtime;
pub mod schema;
pub mod types;
pub mod value;

pub use ast::{Arg, BinOp, Expr, Literal};
pub use compiler::{compile, FunctionSignature};
pub use error::*;
pub use executor::{
    evaluate, BlockRunner, Environment, Executor, HandlerRegistry, InlineBlockRunner, Resolved,
    Step, TokioBlockRunner,
};
pub use program::{Chunk, ChunkKind, Function, Primitive, Program, Ref, INPUT_REF};
pub use runtime::{MockRuntime, Runtime};
pub use schema::{FieldDef, ResourceDef, Schema};
pub use types::TypeTag;
pub use value::{RawData, ResourceHandle, Value};
