//! End-to-end CLI tests for the arxiv-crawler binary.
//!
//! None of these reach the network: they cover argument handling, config
//! loading and the commands that only read the local store.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary with an isolated config home and database.
fn crawler(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("arxiv-crawler").unwrap();
    cmd.env("XDG_CONFIG_HOME", home.path())
        .env("ARXIV_DATABASE_PATH", home.path().join("papers.db"))
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    crawler(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Crawl arXiv metadata"))
        .stdout(predicate::str::contains("search-local"));
}

#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    crawler(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("arxiv-crawler"));
}

#[test]
fn test_binary_requires_subcommand() {
    let home = TempDir::new().unwrap();
    crawler(&home)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    let home = TempDir::new().unwrap();
    crawler(&home)
        .args(["stats", "--invalid-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

// ==================== Config Tests ====================

#[test]
fn test_config_show_defaults_without_file() {
    let home = TempDir::new().unwrap();
    crawler(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not found (using defaults)"))
        .stdout(predicate::str::contains("[download]"))
        .stdout(predicate::str::contains("max_concurrent_downloads = 5"));
}

#[test]
fn test_config_show_reads_default_location() {
    let home = TempDir::new().unwrap();
    let config_dir = home.path().join("arxiv-crawler");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        "[download]\nmax_concurrent_downloads = 9\n",
    )
    .unwrap();

    crawler(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config_file = loaded"))
        .stdout(predicate::str::contains("max_concurrent_downloads = 9"));
}

#[test]
fn test_env_override_beats_config_file() {
    let home = TempDir::new().unwrap();
    let config_path = home.path().join("custom.toml");
    std::fs::write(&config_path, "[download]\nmax_concurrent_downloads = 9\n").unwrap();

    crawler(&home)
        .env("ARXIV_DOWNLOAD_THREADS", "3")
        .args(["config", "show", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("max_concurrent_downloads = 3"));
}

#[test]
fn test_invalid_config_value_is_reported() {
    let home = TempDir::new().unwrap();
    let config_path = home.path().join("bad.toml");
    std::fs::write(&config_path, "[download]\nmax_concurrent_downloads = 0\n").unwrap();

    crawler(&home)
        .arg("--config")
        .arg(&config_path)
        .arg("stats")
        .assert()
        .failure()
        .stderr(predicate::str::contains("download.max_concurrent_downloads"));
}

#[test]
fn test_missing_explicit_config_is_error() {
    let home = TempDir::new().unwrap();
    crawler(&home)
        .args(["stats", "--config"])
        .arg(home.path().join("nope.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

// ==================== Local Store Tests ====================

#[test]
fn test_stats_on_empty_store() {
    let home = TempDir::new().unwrap();
    crawler(&home)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("total_papers = 0"))
        .stdout(predicate::str::contains("downloaded = 0"));
    assert!(home.path().join("papers.db").exists());
}

#[test]
fn test_stats_json_output() {
    let home = TempDir::new().unwrap();
    let db = home.path().join("elsewhere").join("store.db");
    crawler(&home)
        .args(["stats", "--json", "--database"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 0"));
    assert!(db.exists());
}

#[test]
fn test_search_local_on_empty_store() {
    let home = TempDir::new().unwrap();
    crawler(&home)
        .args(["search-local", "transformers", "--fields", "title,abstract"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No matching papers"));
}

#[test]
fn test_search_local_rejects_unknown_field() {
    let home = TempDir::new().unwrap();
    crawler(&home)
        .args(["search-local", "x", "--fields", "venue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown search field"));
}

#[test]
fn test_search_without_criteria_fails_fast() {
    let home = TempDir::new().unwrap();
    crawler(&home)
        .args(["search", "--no-download"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("search criterion"));
}

// ==================== Category Tests ====================

#[test]
fn test_categories_filters_by_prefix() {
    let home = TempDir::new().unwrap();
    crawler(&home)
        .args(["categories", "cs."])
        .assert()
        .success()
        .stdout(predicate::str::contains("cs.LG"))
        .stdout(predicate::str::contains("Machine Learning"))
        .stdout(predicate::str::contains("stat.ML").not());
}

#[test]
fn test_categories_json_output() {
    let home = TempDir::new().unwrap();
    crawler(&home)
        .args(["categories", "stat.", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"stat.ML\": \"Machine Learning\""));
}

#[test]
fn test_categories_unknown_prefix() {
    let home = TempDir::new().unwrap();
    crawler(&home)
        .args(["categories", "astro-ph"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No known categories match."));
}
