//! CLI flow tests: schema and query files on disk through compile and run.

use std::io::Write;

use quarry_cli::commands::{self, parse_query};
use quarry_cli::CliError;

// ─────────────────────── helpers ───────────────────────

const SCHEMA: &str = r#"{ "resources": {
    "os": { "fields": { "name": { "type": "string" } } },
    "packages": { "list_type": { "resource": "package" } },
    "package": { "fields": {
        "name": { "type": "string" },
        "installed": { "type": "bool" }
    } }
} }"#;

const FIXTURE: &str = r#"{ "resources": {
    "os": { "name": "arch" },
    "packages": { "list": [
        { "id": "bash", "name": "bash", "installed": true },
        { "id": "vim", "name": "vim", "installed": false },
        { "id": "git", "name": "git", "installed": true }
    ] }
} }"#;

/// `packages.where(p => p.installed).length`
const INSTALLED_COUNT: &str = r#"{ "member": {
    "target": { "member": {
        "target": { "ident": { "name": "packages" } },
        "name": "where",
        "args": [ { "value": { "lambda": {
            "param": "p",
            "body": { "member": { "target": { "ident": { "name": "p" } }, "name": "installed" } }
        } } } ]
    } },
    "name": "length"
} }"#;

fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> String {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path.to_str().unwrap().to_string()
}

// ─────────────────────── compile ───────────────────────

#[test]
fn compile_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let schema_path = write_file(&dir, "schema.json", SCHEMA);
    let query_path = write_file(&dir, "query.json", INSTALLED_COUNT);

    let schema = commands::load_schema(&schema_path).unwrap();
    let exprs = commands::load_query(&query_path).unwrap();
    let program = commands::compile_query(&schema, &exprs).unwrap();
    assert_eq!(program.entrypoints.len(), 1);
    assert_eq!(program.functions.len(), 1);
}

#[test]
fn compile_reports_unknown_resource() {
    let dir = tempfile::tempdir().unwrap();
    let schema = commands::load_schema(&write_file(&dir, "schema.json", SCHEMA)).unwrap();
    let exprs = parse_query(r#"{ "ident": { "name": "packags" } }"#).unwrap();
    let err = commands::compile_query(&schema, &exprs).unwrap_err();
    assert!(matches!(err, CliError::Compile(_)));
    assert!(err.to_string().contains("packags"));
}

#[test]
fn missing_schema_file_is_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.json");
    let err = commands::load_schema(path.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, CliError::Schema(_)));
}

#[test]
fn resources_listing_counts_schema() {
    let schema = quarry::Schema::from_json(SCHEMA).unwrap();
    let info = commands::list_resources(&schema);
    assert_eq!(info["count"], 3);
    assert_eq!(info["resources"][0]["name"], "os");
}

// ─────────────────────── run ───────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_against_fixture() {
    let dir = tempfile::tempdir().unwrap();
    let fixture_path = write_file(&dir, "fixture.json", FIXTURE);
    let schema = quarry::Schema::from_json(SCHEMA).unwrap();
    let exprs = parse_query(&format!(
        r#"[ {INSTALLED_COUNT}, {{ "member": {{ "target": {{ "ident": {{ "name": "os" }} }}, "name": "name" }} }} ]"#
    ))
    .unwrap();

    let report = commands::run_query(schema, Some(&fixture_path), &exprs, false)
        .await
        .unwrap();
    assert_eq!(report.failed(), 0);
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[0].value, 2);
    assert_eq!(report.results[0].typ, "int");
    assert_eq!(report.results[1].value, "arch");
    assert!(report.recording.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_records_filtered_resources() {
    let dir = tempfile::tempdir().unwrap();
    let fixture_path = write_file(&dir, "fixture.json", FIXTURE);
    let schema = quarry::Schema::from_json(SCHEMA).unwrap();
    let exprs = parse_query(INSTALLED_COUNT).unwrap();

    let report = commands::run_query(schema, Some(&fixture_path), &exprs, true)
        .await
        .unwrap();
    let recording = report.recording.unwrap();
    let packages = recording["resources"]["packages"].as_array().unwrap();
    assert_eq!(packages.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_without_fixture_reports_error_data() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    let schema = quarry::Schema::from_json(SCHEMA).unwrap();
    let exprs = parse_query(r#"{ "member": { "target": { "ident": { "name": "os" } }, "name": "name" } }"#)
        .unwrap();

    let report = commands::run_query(schema, missing.to_str(), &exprs, false)
        .await
        .unwrap();
    assert_eq!(report.failed(), 1);
    assert_eq!(report.results[0].value, serde_json::Value::Null);
    assert_eq!(
        report.results[0].error.as_deref(),
        Some("no instance of resource 'os' with id ''")
    );
}
