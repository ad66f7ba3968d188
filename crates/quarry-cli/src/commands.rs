//! Implementations of the `quarry` subcommands.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use quarry::{
    compile, evaluate, Environment, Expr, HandlerRegistry, MockRuntime, Program, RawData, Schema,
    TokioBlockRunner,
};

use crate::error::{CliError, CliResult};

/// Load and normalize a schema file.
pub fn load_schema(path: &str) -> CliResult<Schema> {
    tracing::debug!("Loading schema from {path}");
    Ok(Schema::from_file(Path::new(path))?)
}

/// Read query expressions from a JSON file, or stdin when `path` is `-`.
///
/// The document is either one expression or an array of expressions.
pub fn load_query(path: &str) -> CliResult<Vec<Expr>> {
    let data = if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    parse_query(&data)
}

pub fn parse_query(data: &str) -> CliResult<Vec<Expr>> {
    let doc: serde_json::Value = serde_json::from_str(data)?;
    if doc.is_array() {
        Ok(serde_json::from_value(doc)?)
    } else {
        Ok(vec![serde_json::from_value(doc)?])
    }
}

/// Compile `exprs` against `schema`.
pub fn compile_query(schema: &Schema, exprs: &[Expr]) -> CliResult<Program> {
    let program = compile(schema, exprs)?;
    tracing::info!(
        "Compiled {} expressions into {} chunks",
        exprs.len(),
        program.len()
    );
    Ok(program)
}

/// One evaluated expression.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub index: usize,
    #[serde(rename = "type")]
    pub typ: String,
    pub value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    fn new(index: usize, data: &RawData) -> Self {
        Self {
            index,
            typ: data.typ.label(),
            value: if data.is_error() {
                serde_json::Value::Null
            } else {
                data.value.to_json()
            },
            error: data.error_message().map(str::to_string),
        }
    }
}

/// Outcome of a `run` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub results: Vec<QueryResult>,
    /// Recorded data after evaluation, including filtered resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording: Option<serde_json::Value>,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_some()).count()
    }
}

/// Compile and evaluate `exprs` against recorded data.
pub async fn run_query(
    schema: Schema,
    fixture: Option<&str>,
    exprs: &[Expr],
    record: bool,
) -> CliResult<RunReport> {
    let program = compile_query(&schema, exprs)?;

    let runtime = match fixture {
        Some(path) if Path::new(path).exists() => {
            tracing::debug!("Loading recorded data from {path}");
            MockRuntime::from_file(schema, Path::new(path))?
        }
        Some(path) => {
            tracing::warn!("No recorded data at {path}, starting empty");
            MockRuntime::new(schema)
        }
        None => MockRuntime::new(schema),
    };
    let runtime = Arc::new(runtime);

    let blocks = TokioBlockRunner::current().ok_or(CliError::NoRuntime)?;
    let env = Environment::new(
        runtime.clone(),
        Arc::new(HandlerRegistry::builtin()),
        Arc::new(blocks),
    );
    let values = evaluate(env, Arc::new(program)).await?;

    let results: Vec<QueryResult> = values
        .iter()
        .enumerate()
        .map(|(index, data)| QueryResult::new(index, data))
        .collect();
    for result in &results {
        if let Some(err) = &result.error {
            tracing::warn!("Expression {} failed: {err}", result.index);
        }
    }

    Ok(RunReport {
        results,
        recording: record.then(|| runtime.export()),
    })
}

/// Summary of the resources a schema declares.
pub fn list_resources(schema: &Schema) -> serde_json::Value {
    let resources: Vec<serde_json::Value> = schema
        .resources
        .values()
        .map(|def| {
            serde_json::json!({
                "name": def.name,
                "list_type": def.list_type.as_ref().map(|t| t.label()),
                "fields": def
                    .fields
                    .iter()
                    .map(|(name, field)| (name.clone(), serde_json::Value::String(field.typ.label())))
                    .collect::<serde_json::Map<_, _>>(),
            })
        })
        .collect();
    serde_json::json!({ "count": resources.len(), "resources": resources })
}
