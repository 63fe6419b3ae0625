use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use chrono::{TimeZone, Utc};
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use metasync_core::project::{init_at, settings_path_at};
use metasync_core::{ProjectSettings, TypeCatalog};
use metasync_remote::FileProperties;
use metasync_sync::local_index::{self, LocalIndex};

fn metasync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("metasync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("METASYNC_ACCESS_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

fn init_project(workspace: &TempDir) -> PathBuf {
    let root = workspace.path().join("acme");
    fs::create_dir_all(&root).expect("create project dir");
    init_at(
        &root,
        ProjectSettings::new("acme", "https://acme.my.salesforce.com"),
    )
    .expect("init project");
    root
}

#[test]
fn init_writes_settings_and_source_root() {
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");
    let root = workspace.path().join("fresh");

    metasync_cmd(home.path())
        .arg("init")
        .arg(&root)
        .args(["--name", "fresh", "--instance-url", "https://fresh.my.salesforce.com"])
        .args(["--api-version", "59.0"])
        .assert()
        .success()
        .stdout(contains("Initialized project 'fresh'"));

    let settings = fs::read_to_string(settings_path_at(&root)).expect("settings");
    assert!(settings.contains("https://fresh.my.salesforce.com"));
    assert!(settings.contains("59.0"));
    assert!(root.join("src").is_dir());

    metasync_cmd(home.path())
        .arg("init")
        .arg(&root)
        .args(["--name", "other", "--instance-url", "https://other.example"])
        .assert()
        .success()
        .stdout(contains("already a project"));
    let unchanged = fs::read_to_string(settings_path_at(&root)).expect("settings");
    assert_eq!(settings, unchanged);
}

#[test]
fn org_connections_round_trip_through_the_cli() {
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");
    let root = init_project(&workspace);

    metasync_cmd(home.path())
        .arg("--project")
        .arg(&root)
        .args(["org", "add", "staging"])
        .args(["--instance-url", "https://staging.example"])
        .args(["--access-token", "secret-token"])
        .assert()
        .success()
        .stdout(contains("Added 'staging'"));

    metasync_cmd(home.path())
        .arg("--project")
        .arg(&root)
        .args(["org", "add", "staging", "--instance-url", "https://dup.example"])
        .assert()
        .failure()
        .stderr(contains("staging"));

    let listed = metasync_cmd(home.path())
        .arg("--project")
        .arg(&root)
        .args(["org", "list", "--json"])
        .assert()
        .success()
        .stdout(contains("https://staging.example"))
        .stdout(contains("access token"))
        .stdout(contains("secret-token").not());
    let stdout = String::from_utf8(listed.get_output().stdout.clone()).expect("stdout utf8");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("json");
    assert_eq!(parsed.as_array().map(Vec::len), Some(1));

    metasync_cmd(home.path())
        .arg("--project")
        .arg(&root)
        .args(["org", "update", "staging", "--name", "uat"])
        .assert()
        .success()
        .stdout(contains("Updated 'uat'"));

    metasync_cmd(home.path())
        .arg("--project")
        .arg(&root)
        .args(["org", "list"])
        .assert()
        .success()
        .stdout(contains("uat"))
        .stdout(contains("secret-token").not());

    metasync_cmd(home.path())
        .arg("--project")
        .arg(&root)
        .args(["org", "remove", "uat"])
        .assert()
        .success()
        .stdout(contains("Removed 'uat'"));

    metasync_cmd(home.path())
        .arg("--project")
        .arg(&root)
        .args(["org", "remove", "uat"])
        .assert()
        .failure()
        .stderr(contains("uat"));
}

#[test]
fn index_of_a_fresh_project_is_empty() {
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");
    let root = init_project(&workspace);

    metasync_cmd(home.path())
        .arg("--project")
        .arg(&root)
        .arg("index")
        .assert()
        .success()
        .stdout(contains("Local index is empty"));

    let assert = metasync_cmd(home.path())
        .arg("--project")
        .arg(&root)
        .args(["index", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("json");
    assert_eq!(parsed["entries"], serde_json::json!({}));
}

#[test]
fn index_lists_stored_entries() {
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");
    let root = init_project(&workspace);

    let mut index = LocalIndex::new();
    let update = index.upsert_file_properties(
        &TypeCatalog::builtin(),
        &[FileProperties {
            full_name: "Invoice".to_owned(),
            file_name: "classes/Invoice.cls".to_owned(),
            type_name: "ApexClass".to_owned(),
            id: Some("01p000000000001".into()),
            last_modified_date: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            last_modified_by_id: None,
            last_modified_by_name: None,
            created_date: None,
            manageable_state: None,
        }],
    );
    assert_eq!(update.upserted, 1);
    local_index::save_at(&root.join(".metasync").join("local_store.json"), &index)
        .expect("save index");

    metasync_cmd(home.path())
        .arg("--project")
        .arg(&root)
        .arg("index")
        .assert()
        .success()
        .stdout(contains("Invoice.cls"))
        .stdout(contains("01p000000000001"))
        .stdout(contains("2024-01-02T03:04:05Z"))
        .stdout(contains("1 entry"));
}

#[test]
fn commands_outside_a_project_fail_with_a_hint() {
    let home = TempDir::new().expect("home");
    let outside = TempDir::new().expect("outside");

    metasync_cmd(home.path())
        .current_dir(outside.path())
        .arg("index")
        .assert()
        .failure()
        .stderr(contains("metasync init"));
}

#[test]
fn deploy_without_an_access_token_fails_before_any_request() {
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");
    let root = init_project(&workspace);

    metasync_cmd(home.path())
        .arg("--project")
        .arg(&root)
        .args(["deploy", "--target", "staging"])
        .assert()
        .failure()
        .stderr(contains("no access token"));
}

#[test]
fn unknown_test_level_is_rejected_by_the_parser() {
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");
    let root = init_project(&workspace);

    metasync_cmd(home.path())
        .arg("--project")
        .arg(&root)
        .args(["deploy", "--target", "staging", "--test-level", "sometimes"])
        .assert()
        .failure()
        .stderr(contains("unknown test level"));
}
