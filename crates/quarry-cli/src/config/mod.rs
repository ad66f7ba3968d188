//! Configuration loading and resolution.

use std::path::PathBuf;

/// Environment variable naming the schema file.
pub const SCHEMA_ENV: &str = "QUARRY_SCHEMA";

/// Environment variable naming the recorded fixture file.
pub const FIXTURE_ENV: &str = "QUARRY_FIXTURE";

const CONFIG_DIR: &str = ".quarry";

/// Resolve the schema file path.
pub fn resolve_schema_path(explicit: Option<&str>) -> String {
    resolve_path(explicit, SCHEMA_ENV, "schema.json")
}

/// Resolve the recorded fixture path.
pub fn resolve_fixture_path(explicit: Option<&str>) -> String {
    resolve_path(explicit, FIXTURE_ENV, "fixture.json")
}

/// Explicit path, then the environment, then `./.quarry/<file>`, then `$HOME/.quarry/<file>`.
fn resolve_path(explicit: Option<&str>, env_var: &str, file_name: &str) -> String {
    if let Some(path) = explicit {
        return path.to_string();
    }

    if let Ok(env_path) = std::env::var(env_var) {
        return env_path;
    }

    let cwd_path = PathBuf::from(CONFIG_DIR).join(file_name);
    if cwd_path.exists() {
        return cwd_path.display().to_string();
    }

    resolve_default_path(file_name)
}

fn resolve_default_path(file_name: &str) -> String {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    format!("{home}/{CONFIG_DIR}/{file_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        assert_eq!(resolve_schema_path(Some("/tmp/s.json")), "/tmp/s.json");
        assert_eq!(resolve_fixture_path(Some("f.json")), "f.json");
    }

    #[test]
    fn test_default_lives_in_config_dir() {
        assert!(resolve_default_path("schema.json").ends_with("/.quarry/schema.json"));
    }
}
