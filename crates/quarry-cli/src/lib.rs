//! Quarry CLI — compile and evaluate resource queries from the command line.

pub mod commands;
pub mod config;
pub mod error;

pub use commands::{compile_query, list_resources, load_query, load_schema, run_query, RunReport};
pub use config::{resolve_fixture_path, resolve_schema_path};
pub use error::{CliError, CliResult};
