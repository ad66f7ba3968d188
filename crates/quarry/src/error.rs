//! Error types for schema loading, compilation, runtimes and execution.

use crate::program::Ref;

/// Formats a suggestion list as a message suffix.
fn suggestion_hint(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", suggestions.join(", "))
    }
}

/// Errors that can occur while loading a resource schema.
#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid schema: {0}")]
    Invalid(String),
}

/// Argument mismatch reported by a function signature.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("no arguments given (expected {expected})")]
    NoArguments { expected: String },

    #[error("not enough arguments (expected {expected}, got {given})")]
    NotEnough { expected: String, given: usize },

    #[error("too many arguments (expected {expected}, got {given})")]
    TooMany { expected: String, given: usize },

    #[error("incorrect argument {position}: expected {expected} got {actual}")]
    IncorrectArgument {
        position: usize,
        expected: String,
        actual: String,
    },
}

/// Errors that abort compilation of an expression.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("cannot find resource '{name}'{}", suggestion_hint(.suggestions))]
    UnknownResource {
        name: String,
        suggestions: Vec<String>,
    },

    #[error("cannot find resource '{resource}' when compiling field '{field}'")]
    MissingResourceForField { resource: String, field: String },

    #[error("cannot find field '{field}' in resource {resource}{}", suggestion_hint(.suggestions))]
    FieldNotFound {
        resource: String,
        field: String,
        suggestions: Vec<String>,
    },

    #[error("failed to compile {call}: resource '{resource}' is not a list type")]
    NotAListType { call: String, resource: String },

    #[error("missing filter argument for calling '{call}'")]
    MissingFilterArgument { call: String },

    #[error("too many arguments when calling '{call}', only 1 is supported")]
    TooManyArguments { call: String },

    #[error("called '{call}' function with a named parameter, which is not supported")]
    NamedParameter { call: String },

    #[error("called '{call}' clause without a function block")]
    MissingBlock { call: String },

    #[error("function {call} does not take arguments")]
    UnexpectedArguments { call: String },

    #[error("cannot find function '{call}' for type {typ}")]
    UnknownFunction { call: String, typ: String },

    #[error("cannot call '{call}' on {typ}: {source}")]
    Signature {
        call: String,
        typ: String,
        #[source]
        source: SignatureError,
    },

    #[error("resource '{resource}' requires named arguments")]
    UnnamedInitArgument { resource: String },

    #[error("resource '{resource}' has no init argument '{arg}'{}", suggestion_hint(.suggestions))]
    UnknownInitArgument {
        resource: String,
        arg: String,
        suggestions: Vec<String>,
    },

    #[error("init argument '{arg}' of resource '{resource}': expected {expected} got {actual}")]
    InitArgumentType {
        resource: String,
        arg: String,
        expected: String,
        actual: String,
    },

    #[error("unsupported expression: {0}")]
    Unsupported(String),
}

impl CompileError {
    /// Suggested identifiers attached to this error, ranked best first.
    pub fn suggestions(&self) -> &[String] {
        match self {
            CompileError::UnknownResource { suggestions, .. }
            | CompileError::FieldNotFound { suggestions, .. }
            | CompileError::UnknownInitArgument { suggestions, .. } => suggestions,
            _ => &[],
        }
    }
}

/// Errors reported by a resource runtime.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("cannot find resource '{0}'")]
    UnknownResource(String),

    #[error("resource '{resource}' has no field '{field}'")]
    UnknownField { resource: String, field: String },

    #[error("no instance of resource '{name}' with id '{id}'")]
    MissingInstance { name: String, id: String },

    #[error("field '{field}' of resource '{resource}' is not set")]
    MissingField { resource: String, field: String },

    #[error("invalid data for '{name}': {reason}")]
    InvalidData { name: String, reason: String },
}

/// Errors raised while executing a compiled program.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    #[error("internal error: chunk {chunk} expected {expected}, got {actual}")]
    Shape {
        chunk: Ref,
        expected: &'static str,
        actual: String,
    },

    #[error("internal error: chunk {0} does not exist")]
    UnknownChunk(Ref),

    #[error("internal error: nested program {0} does not exist")]
    UnknownProgram(usize),

    #[error("internal error: chunk {0} was already resolved")]
    AlreadyResolved(Ref),

    #[error("internal error: chunk {0} has no block input")]
    MissingInput(Ref),

    #[error("cannot find handler for '{call}' on {typ}")]
    UnknownFunction { call: String, typ: String },

    #[error("failed to create filter result resource: {0}")]
    FilterResource(RuntimeError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("evaluation finished without producing all results")]
    Incomplete,
}

pub type CompileResult<T> = Result<T, CompileError>;
pub type ExecResult<T> = Result<T, ExecError>;
pub type RuntimeResult<T> = Result<T, RuntimeError>;
