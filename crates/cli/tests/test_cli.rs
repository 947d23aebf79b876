use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn impactscan() -> Command {
    let mut cmd = Command::cargo_bin("impactscan").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("AZURE_OPENAI_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env_remove("IMPACTSCAN_AZURE_OPENAI_API_KEY")
        .env_remove("IMPACTSCAN_OPENAI_API_KEY");
    cmd
}

#[test]
fn test_check_config_accepts_valid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("impactscan.toml");
    fs::write(
        &path,
        r#"
target_dir = "."

[analysis]
perspectives = ["security", "performance"]
triage_threshold = 0.4

[openai]
enabled = true
model_small = "gpt-4o-mini"
model_large = "gpt-4o"
"#,
    )
    .unwrap();

    impactscan()
        .current_dir(dir.path())
        .args(["check-config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration OK"))
        .stdout(predicate::str::contains("security, performance"))
        .stdout(predicate::str::contains("API key is not set"));
}

#[test]
fn test_check_config_reports_invalid_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("impactscan.toml");
    fs::write(&path, "target_dir = \".\"\n\n[analysis]\nparallelism = 0\n").unwrap();

    impactscan()
        .current_dir(dir.path())
        .args(["check-config", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("analysis.parallelism"));
}

#[test]
fn test_run_fails_on_missing_config() {
    let dir = tempfile::tempdir().unwrap();

    impactscan()
        .current_dir(dir.path())
        .args(["run", "--config", "absent.toml", "--instruction", "improve caching layer"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.toml"));
}

#[test]
fn test_run_without_provider_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("impactscan.toml");
    fs::write(&path, "target_dir = \".\"\n").unwrap();

    impactscan()
        .current_dir(dir.path())
        .args(["run", "--config"])
        .arg(&path)
        .args(["--instruction", "improve caching layer"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to set up the pipeline"));
}
