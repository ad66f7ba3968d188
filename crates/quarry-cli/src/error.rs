//! Errors surfaced by CLI commands.

use quarry::{CompileError, ExecError, SchemaError};

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("Invalid query: {0}")]
    Query(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Evaluation requires a running tokio runtime")]
    NoRuntime,
}

pub type CliResult<T> = Result<T, CliError>;
