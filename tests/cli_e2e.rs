//! End-to-end CLI tests for the consearch binary.
//!
//! None of these reach a real provider: they either stop before resolution or
//! pick an input type no registered resolver accepts.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary with an isolated config location and no `CONSEARCH_*` leakage.
fn consearch(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("consearch").unwrap();
    cmd.env("HOME", home.path())
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("RUST_LOG")
        .env_remove("CONSEARCH_ISBNDB_API_KEY")
        .env_remove("CONSEARCH_GOOGLE_BOOKS_API_KEY")
        .env_remove("CONSEARCH_CROSSREF_EMAIL")
        .env_remove("CONSEARCH_SEMANTIC_SCHOLAR_API_KEY")
        .env_remove("CONSEARCH_DEFAULT_RATE_LIMIT_RPS")
        .env_remove("CONSEARCH_TOTAL_TIMEOUT_SECS");
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    consearch(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Resolve book and paper identifiers"));
}

#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    consearch(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("consearch"));
}

#[test]
fn test_binary_missing_query_is_usage_error() {
    let home = TempDir::new().unwrap();
    consearch(&home)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("QUERY"));
}

#[test]
fn test_binary_invalid_timeout_is_usage_error() {
    let home = TempDir::new().unwrap();
    consearch(&home)
        .args(["--timeout", "0", "Dune"])
        .assert()
        .code(2);
}

#[test]
fn test_binary_detect_only_prints_candidates() {
    let home = TempDir::new().unwrap();
    consearch(&home)
        .args(["--detect-only", "978-0-13-409341-3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"input_type\": \"isbn_13\""))
        .stdout(predicate::str::contains("\"normalized_value\": \"9780134093413\""))
        .stdout(predicate::str::contains("\"domain\": \"book\""))
        .stdout(predicate::str::contains("\"input_type\": \"title\""));
}

#[test]
fn test_binary_detect_only_joins_query_words() {
    let home = TempDir::new().unwrap();
    consearch(&home)
        .args(["--detect-only", "doi:", "10.1038/nature12373"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"input_type\": \"doi\""));
}

#[test]
fn test_binary_detect_only_blank_query_exits_not_found() {
    let home = TempDir::new().unwrap();
    consearch(&home)
        .args(["--detect-only", "   "])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_binary_unsupported_input_type_exits_not_found() {
    let home = TempDir::new().unwrap();
    consearch(&home)
        .args(["--kind", "book", "--type", "pmid", "12345678"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"input_type\": \"pmid\""))
        .stdout(predicate::str::contains("\"best_match\": null"));
}

#[test]
fn test_binary_missing_config_file_is_config_error() {
    let home = TempDir::new().unwrap();
    let missing = home.path().join("nope.toml");
    consearch(&home)
        .arg("--config")
        .arg(&missing)
        .args(["--kind", "book", "--type", "pmid", "12345678"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn test_binary_invalid_config_key_is_config_error() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("config.toml");
    fs::write(&config, "colour = \"blue\"\n").unwrap();
    consearch(&home)
        .arg("--config")
        .arg(&config)
        .args(["--kind", "book", "--type", "pmid", "12345678"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown configuration key"));
}

#[test]
fn test_binary_reads_default_config_location() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".config").join("consearch");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), "total_timeout_secs = 0\n").unwrap();
    consearch(&home)
        .args(["--kind", "book", "--type", "pmid", "12345678"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("total_timeout_secs"));
}

#[test]
fn test_binary_invalid_env_override_is_config_error() {
    let home = TempDir::new().unwrap();
    consearch(&home)
        .env("CONSEARCH_TOTAL_TIMEOUT_SECS", "soon")
        .args(["--kind", "book", "--type", "pmid", "12345678"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("CONSEARCH_TOTAL_TIMEOUT_SECS"));
}
