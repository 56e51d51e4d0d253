use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

const SARIF: &str = r#"{
  "version": "2.1.0",
  "runs": [{
    "tool": { "driver": { "name": "pylint" } },
    "results": [{
      "ruleId": "W0611",
      "level": "error",
      "message": { "text": "unused import os" },
      "locations": [{
        "physicalLocation": {
          "artifactLocation": { "uri": "src/app.py" },
          "region": { "startLine": 3 }
        }
      }]
    }]
  }]
}"#;

#[allow(deprecated)]
fn codecity(scratch: &Path) -> Command {
    let mut cmd = Command::cargo_bin("codecity").expect("binary");
    cmd.env("TEMP_DIR", scratch)
        .env("CACHE_DIR", scratch.join("cache"))
        .env("CACHE_ENABLED", "0")
        .env_remove("RUST_LOG");
    cmd
}

fn setup_repo() -> TempDir {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::create_dir_all(root.join("reports")).unwrap();
    fs::write(root.join("src/app.py"), "import os\n\n\nprint('hi')\n").unwrap();
    fs::write(root.join("reports/pylint.sarif"), SARIF).unwrap();
    temp
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("valid json on stdout")
}

#[test]
fn run_without_adapters_reports_degraded_and_exits_zero() {
    let repo = setup_repo();
    let scratch = tempdir().unwrap();
    let output = codecity(scratch.path())
        .arg("run")
        .arg(repo.path())
        .arg("--seed")
        .arg("1")
        .output()
        .unwrap();

    assert!(output.status.success());
    let doc = stdout_json(&output);
    assert_eq!(doc["schema_version"], "1.0");
    assert_eq!(doc["summary"]["status"], "degraded");
    assert_eq!(doc["adapters"].as_array().unwrap().len(), 0);
    assert_eq!(doc["run"]["started_at_unix_ms"], 0);
}

#[test]
fn run_imports_sarif_from_repository_config() {
    let repo = setup_repo();
    fs::write(
        repo.path().join("codecity.toml"),
        r#"
        [[adapter]]
        id = "pylint"
        type = "sarif"
        [adapter.options]
        reports = ["reports/pylint.sarif"]
        "#,
    )
    .unwrap();
    let scratch = tempdir().unwrap();
    let output = codecity(scratch.path())
        .arg("run")
        .arg(repo.path())
        .output()
        .unwrap();

    assert!(output.status.success());
    let doc = stdout_json(&output);
    assert_eq!(doc["summary"]["status"], "clean");
    let findings = doc["adapters"][0]["findings"].as_array().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0]["severity"], "high");
    assert_eq!(findings[0]["location"]["file"], "src/app.py");
    assert!(String::from_utf8_lossy(&output.stderr).contains("pylint"));
}

#[test]
fn output_flag_writes_the_document_to_a_file() {
    let repo = setup_repo();
    let scratch = tempdir().unwrap();
    let target = scratch.path().join("out/run.json");
    codecity(scratch.path())
        .arg("run")
        .arg(repo.path())
        .arg("--output")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let doc: Value = serde_json::from_str(&fs::read_to_string(&target).unwrap()).unwrap();
    assert!(doc["aggregate"]["projection"].is_object());
}

#[test]
fn unknown_adapter_type_exits_with_config_code() {
    let repo = setup_repo();
    let scratch = tempdir().unwrap();
    let config = scratch.path().join("bad.toml");
    fs::write(&config, "[[adapter]]\nid = \"mystery\"\n").unwrap();

    codecity(scratch.path())
        .arg("run")
        .arg(repo.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown adapter type"));
}

#[test]
fn unknown_config_key_exits_with_config_code() {
    let repo = setup_repo();
    let scratch = tempdir().unwrap();
    let config = scratch.path().join("bad.toml");
    fs::write(&config, "paralellism = 3\n").unwrap();

    codecity(scratch.path())
        .arg("run")
        .arg(repo.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2);
}

#[test]
fn state_show_and_clear_follow_runs() {
    let repo = setup_repo();
    let scratch = tempdir().unwrap();

    let before = codecity(scratch.path())
        .args(["state", "show"])
        .arg(repo.path())
        .output()
        .unwrap();
    assert!(before.status.success());
    assert_eq!(stdout_json(&before), Value::Null);

    codecity(scratch.path())
        .arg("run")
        .arg(repo.path())
        .assert()
        .success();

    let after = codecity(scratch.path())
        .args(["state", "show"])
        .arg(repo.path())
        .output()
        .unwrap();
    assert_eq!(stdout_json(&after)["total_runs"], 1);

    let cleared = codecity(scratch.path())
        .args(["state", "clear"])
        .arg(repo.path())
        .output()
        .unwrap();
    assert_eq!(stdout_json(&cleared)["cleared"], true);
}

#[test]
fn adapters_list_names_the_builtins() {
    let scratch = tempdir().unwrap();
    let output = codecity(scratch.path())
        .args(["adapters", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let ids: Vec<String> = stdout_json(&output)
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap().to_string())
        .collect();
    for id in ["command", "git-history", "sarif", "verification-report"] {
        assert!(ids.contains(&id.to_string()), "missing {id}");
    }
}

#[test]
fn schema_describes_the_run_document() {
    let scratch = tempdir().unwrap();
    codecity(scratch.path())
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"aggregate\""));
}

#[test]
fn cache_stats_reports_an_empty_disk_tier() {
    let scratch = tempdir().unwrap();
    let output = codecity(scratch.path())
        .args(["cache", "stats"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["disk"]["entries"], 0);
}
