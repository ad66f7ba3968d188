//! Compiled programs: flat, position-addressable chunk sequences.
//!
//! Chunks are addressed by their 1-based position ("ref"). Arguments and
//! bindings only ever point at earlier chunks or at nested programs, so a
//! program forms a DAG. Ref 0 is reserved for the input of a nested block.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::TypeTag;
use crate::value::{RawData, Value};

/// 1-based chunk position.
pub type Ref = u32;

/// Binding that denotes the input value of a nested block.
pub const INPUT_REF: Ref = 0;

/// A compiled operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Literal {
        #[serde(rename = "type")]
        typ: TypeTag,
        value: Value,
    },
    /// The future result of another chunk.
    Ref {
        #[serde(rename = "type")]
        typ: TypeTag,
        chunk: Ref,
    },
    /// A nested program, 1-based index into [`Program::functions`].
    Function {
        #[serde(rename = "type")]
        typ: TypeTag,
        program: usize,
    },
}

impl Primitive {
    pub fn literal(data: RawData) -> Self {
        Primitive::Literal {
            typ: data.typ,
            value: data.value,
        }
    }

    pub fn reference(chunk: Ref, typ: TypeTag) -> Self {
        Primitive::Ref { typ, chunk }
    }

    pub fn function(program: usize, typ: TypeTag) -> Self {
        Primitive::Function { typ, program }
    }

    pub fn typ(&self) -> &TypeTag {
        match self {
            Primitive::Literal { typ, .. }
            | Primitive::Ref { typ, .. }
            | Primitive::Function { typ, .. } => typ,
        }
    }

    pub fn chunk_ref(&self) -> Option<Ref> {
        match self {
            Primitive::Ref { chunk, .. } => Some(*chunk),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<usize> {
        match self {
            Primitive::Function { program, .. } => Some(*program),
            _ => None,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Literal { value, .. } => write!(f, "{value}"),
            Primitive::Ref { chunk, .. } => write!(f, "<{chunk}>"),
            Primitive::Function { program, .. } => write!(f, "fn#{program}"),
        }
    }
}

/// A call with a declared result type, an optional receiver and arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    #[serde(rename = "type")]
    pub typ: TypeTag,
    /// Receiver chunk; `None` for unbound resource construction.
    #[serde(default)]
    pub binding: Option<Ref>,
    #[serde(default)]
    pub args: Vec<Primitive>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Value(Primitive),
    /// `None` instantiates the resource named by the chunk id without arguments.
    Call(Option<Function>),
}

/// One compiled operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub kind: ChunkKind,
}

impl Chunk {
    pub fn value(primitive: Primitive) -> Self {
        Self {
            id: String::new(),
            kind: ChunkKind::Value(primitive),
        }
    }

    /// Argument-less reference to a resource.
    pub fn resource(name: &str) -> Self {
        Self {
            id: name.to_string(),
            kind: ChunkKind::Call(None),
        }
    }

    pub fn call(id: &str, typ: TypeTag, binding: Option<Ref>, args: Vec<Primitive>) -> Self {
        Self {
            id: id.to_string(),
            kind: ChunkKind::Call(Some(Function { typ, binding, args })),
        }
    }

    pub fn function(&self) -> Option<&Function> {
        match &self.kind {
            ChunkKind::Call(Some(function)) => Some(function),
            _ => None,
        }
    }

    /// True for `Call(None)`: a resource reference nothing has been called on yet.
    pub fn is_bare_resource(&self) -> bool {
        matches!(self.kind, ChunkKind::Call(None))
    }

    pub fn result_type(&self) -> TypeTag {
        match &self.kind {
            ChunkKind::Value(primitive) => primitive.typ().clone(),
            ChunkKind::Call(None) => TypeTag::resource(self.id.clone()),
            ChunkKind::Call(Some(function)) => function.typ.clone(),
        }
    }
}

/// The compiler's output: chunks, nested programs and the refs whose values are results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub functions: Vec<Program>,
    #[serde(default)]
    pub entrypoints: Vec<Ref>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk(&self, r: Ref) -> Option<&Chunk> {
        if r == INPUT_REF {
            return None;
        }
        self.chunks.get(r as usize - 1)
    }

    pub fn function(&self, index: usize) -> Option<&Program> {
        if index == 0 {
            return None;
        }
        self.functions.get(index - 1)
    }

    /// Ref of the most recently emitted chunk, 0 when empty.
    pub fn chunk_index(&self) -> Ref {
        self.chunks.len() as Ref
    }

    pub fn last_chunk(&self) -> Option<&Chunk> {
        self.chunks.last()
    }

    pub fn add_chunk(&mut self, chunk: Chunk) -> Ref {
        self.chunks.push(chunk);
        self.chunk_index()
    }

    pub fn remove_last_chunk(&mut self) -> Option<Chunk> {
        self.chunks.pop()
    }

    /// Append a nested program and return its 1-based index.
    pub fn add_function(&mut self, program: Program) -> usize {
        self.functions.push(program);
        self.functions.len()
    }

    pub fn is_entrypoint(&self, r: Ref) -> bool {
        self.entrypoints.contains(&r)
    }

    /// Content identity: base64 of the BLAKE3 hash over the JSON encoding.
    pub fn checksum(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let hash = blake3::hash(&bytes);
        base64::engine::general_purpose::STANDARD.encode(hash.as_bytes())
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        for (i, chunk) in self.chunks.iter().enumerate() {
            let r = i + 1;
            let marker = if self.is_entrypoint(r as Ref) { "*" } else { " " };
            match &chunk.kind {
                ChunkKind::Value(primitive) => {
                    writeln!(f, "{pad}{marker}{r}: {primitive}")?;
                }
                ChunkKind::Call(None) => {
                    writeln!(f, "{pad}{marker}{r}: {}", chunk.id)?;
                }
                ChunkKind::Call(Some(function)) => {
                    let args: Vec<String> = function.args.iter().map(|a| a.to_string()).collect();
                    let binding = match function.binding {
                        Some(INPUT_REF) => " <- input".to_string(),
                        Some(b) => format!(" <- {b}"),
                        None => String::new(),
                    };
                    writeln!(
                        f,
                        "{pad}{marker}{r}: {}({}){binding} : {}",
                        chunk.id,
                        args.join(", "),
                        function.typ
                    )?;
                }
            }
        }
        for (i, function) in self.functions.iter().enumerate() {
            writeln!(f, "{pad}fn#{}:", i + 1)?;
            function.fmt_indented(f, indent + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
