use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};

fn binary_command() -> Command {
    Command::cargo_bin("cmdbind").expect("cmdbind binary should build")
}

fn write_catalog(dir: &Path) -> PathBuf {
    let catalog = json!({
        "enums": [{ "name": "Level", "constants": ["LOW", "HIGH"] }],
        "globals": [
            { "kind": "bean", "name": "color", "type": "Color", "members": [
                { "kind": "option", "name": "red", "type": "int", "default": "255" },
                { "kind": "option", "name": "green", "type": "int", "default": "165" },
                { "kind": "option", "name": "blue", "type": "int", "default": "0" }
            ]}
        ],
        "commands": [
            { "name": "deploy", "description": "Deploy an environment", "parameters": [
                { "kind": "plain", "name": "env" },
                { "kind": "option", "name": "level", "type": "enum:Level", "default": "low" },
                { "kind": "option", "name": "mode", "default": "${sys.mode:-prod}" }
            ]},
            { "name": "greet", "target": "join", "parameters": [
                { "kind": "plain", "name": "who", "default": "${who:-world}" }
            ]},
            { "name": "words", "target": "echo", "parameters": [
                { "kind": "plain", "name": "a" },
                { "kind": "plain", "name": "b" }
            ]},
            { "name": "count", "target": "join", "parameters": [
                { "kind": "internal", "name": "pipeline.stage" },
                { "kind": "internal", "name": "pipeline.input" }
            ]},
            { "name": "skip", "interceptors": ["dry-run"] },
            { "name": "audited", "interceptors": ["audit"] },
            { "name": "boom", "target": "fail" }
        ]
    });
    let path = dir.join("catalog.json");
    fs::write(&path, format!("{catalog}\n")).expect("write catalog");
    path
}

fn setup() -> (TempDir, PathBuf) {
    let dir = tempdir().expect("tempdir");
    let path = write_catalog(dir.path());
    (dir, path)
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn tokenize_prints_stages() {
    let output = binary_command()
        .args(["tokenize", r#"a "b c" | d\ e"#])
        .output()
        .expect("run tokenize");
    assert!(output.status.success());
    assert_eq!(stdout_json(&output), json!([["a", "b c"], ["d e"]]));
}

#[test]
fn tokenize_rejects_unmatched_quote() {
    binary_command()
        .args(["tokenize", "a 'b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unmatched quote"));
}

#[test]
fn run_binds_globals_and_parameters() {
    let (_dir, catalog) = setup();
    let output = binary_command()
        .arg("run")
        .arg("--catalog")
        .arg(&catalog)
        .args(["--", "--red=12", "deploy", "--level=high", "staging"])
        .output()
        .expect("run deploy");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let outcome = stdout_json(&output);
    assert_eq!(outcome["command"], "deploy");
    assert_eq!(outcome["globals"][0]["red"], 12);
    assert_eq!(outcome["globals"][0]["green"], 165);
    assert_eq!(outcome["result"], json!(["staging", "HIGH", "prod"]));
}

#[test]
fn run_applies_property_layers() {
    let (_dir, catalog) = setup();

    let output = binary_command()
        .arg("run")
        .arg("-c")
        .arg(&catalog)
        .args(["-P", "mode=base", "--", "deploy", "qa"])
        .output()
        .expect("run with base property");
    assert_eq!(stdout_json(&output)["result"][2], "base");

    let output = binary_command()
        .arg("run")
        .arg("-c")
        .arg(&catalog)
        .args(["-P", "mode=base", "--", "-Dmode=override", "deploy", "qa"])
        .output()
        .expect("run with override");
    assert_eq!(stdout_json(&output)["result"][2], "override");
}

#[test]
fn run_uses_default_context() {
    let (_dir, catalog) = setup();
    let output = binary_command()
        .arg("run")
        .arg("-c")
        .arg(&catalog)
        .args(["--default", "who=ada", "--", "greet"])
        .output()
        .expect("run greet");
    assert_eq!(stdout_json(&output)["result"], "ada");
}

#[test]
fn run_reports_binding_errors() {
    let (_dir, catalog) = setup();

    binary_command()
        .arg("run")
        .arg("-c")
        .arg(&catalog)
        .args(["--", "deploy"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing argument 'env'"));

    binary_command()
        .arg("run")
        .arg("-c")
        .arg(&catalog)
        .args(["--", "deploy", "prod", "--level=medium"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a constant of Level"));

    binary_command()
        .arg("run")
        .arg("-c")
        .arg(&catalog)
        .args(["--", "deploi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("did you mean 'deploy'"));
}

#[test]
fn run_interceptors() {
    let (_dir, catalog) = setup();

    let output = binary_command()
        .arg("run")
        .arg("-c")
        .arg(&catalog)
        .args(["--", "skip"])
        .output()
        .expect("run skip");
    assert_eq!(stdout_json(&output)["result"], "dry-run: skip");

    binary_command()
        .arg("run")
        .arg("-c")
        .arg(&catalog)
        .args(["--", "audited"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unresolved interceptor 'audit'"));
}

#[test]
fn run_wraps_target_failure() {
    let (_dir, catalog) = setup();
    binary_command()
        .arg("run")
        .arg("-c")
        .arg(&catalog)
        .args(["--", "boom"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Command 'boom' failed"))
        .stderr(predicate::str::contains("command failed"));
}

#[test]
fn exec_runs_pipeline() {
    let (_dir, catalog) = setup();
    let output = binary_command()
        .arg("exec")
        .arg("-c")
        .arg(&catalog)
        .arg("words 'x y' z | count")
        .output()
        .expect("exec pipeline");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let outcomes = stdout_json(&output);
    assert_eq!(outcomes[0]["result"], json!(["x y", "z"]));
    assert_eq!(outcomes[1]["result"], "1 [x y, z]");
}

#[test]
fn list_describes_catalog() {
    let (_dir, catalog) = setup();
    let output = binary_command()
        .arg("list")
        .arg("-c")
        .arg(&catalog)
        .output()
        .expect("list");
    let listing = stdout_json(&output);
    assert_eq!(listing["commands"][0]["name"], "deploy");
    assert_eq!(listing["commands"][0]["parameters"][0]["required"], true);
    assert_eq!(listing["commands"][0]["parameters"][1]["type"], "enum:Level");
    assert_eq!(listing["globals"][0]["members"][0]["name"], "red");
}

#[test]
fn check_warns_about_late_interceptors() {
    let (_dir, catalog) = setup();
    let output = binary_command()
        .arg("check")
        .arg("-c")
        .arg(&catalog)
        .output()
        .expect("check");
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["commands"], 7);
    let warnings = report["warnings"].as_array().expect("warnings array");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].as_str().unwrap_or_default().contains("audit"));
}

#[test]
fn check_rejects_duplicate_options() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bad.json");
    let catalog = json!({
        "commands": [{ "name": "dup", "parameters": [
            { "kind": "option", "name": "x" },
            { "kind": "option", "name": "x", "type": "int" }
        ]}]
    });
    fs::write(&path, catalog.to_string()).expect("write catalog");

    binary_command()
        .arg("check")
        .arg("-c")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Duplicate option name '--x'"));
}

#[test]
fn missing_catalog_is_config_error() {
    binary_command()
        .args(["list", "-c", "/nonexistent/catalog.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Catalog file not found"));
}
