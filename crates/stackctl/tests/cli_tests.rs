//! Integration tests for the stackctl binary

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const STACK: &str = r#"
version: "1.0"
project: acme
environments:
  staging:
    platform: mock
    services:
      frontend:
        dependencies: [backend]
        logs: ["GET / 200"]
      backend:
        dependencies: [database]
        running: true
      database:
        type: database
        running: true
        fail_on: [stop]
"#;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("stack.yaml"), STACK)?;
        Ok(Self { dir })
    }

    fn cmd(&self) -> Result<Command> {
        let mut cmd = Command::cargo_bin("stackctl")?;
        cmd.current_dir(self.dir.path())
            .env_remove("STACKCTL_CONFIG")
            .env_remove("STACKCTL_ENV")
            .env_remove("RUST_LOG")
            .arg("--state-dir")
            .arg(self.dir.path().join("state"));
        Ok(cmd)
    }
}

#[test]
fn test_help_lists_verbs() -> Result<()> {
    let mut cmd = Command::cargo_bin("stackctl")?;
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("watch"));
    Ok(())
}

#[test]
fn test_validate_prints_start_order() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut cmd = fixture.cmd()?;
    cmd.arg("validate");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("✓ Configuration valid"))
        .stdout(predicate::str::is_match(r"(?s)database.*backend.*frontend")?);
    Ok(())
}

#[test]
fn test_start_all_services() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut cmd = fixture.cmd()?;
    cmd.args(["--env", "staging", "start"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("✓ frontend"))
        .stdout(predicate::str::contains("already-running"))
        .stdout(predicate::str::contains("3 service(s): 3 succeeded, 0 failed"));
    Ok(())
}

#[test]
fn test_environment_from_env_var() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut cmd = fixture.cmd()?;
    cmd.env("STACKCTL_ENV", "staging").args(["start", "frontend"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1 service(s): 1 succeeded"));
    Ok(())
}

#[test]
fn test_stop_halts_on_failure_with_exit_code() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut cmd = fixture.cmd()?;
    cmd.args(["-e", "staging", "stop"]);
    cmd.assert()
        .code(1)
        .stdout(predicate::str::is_match(r"(?s)frontend.*backend.*database")?)
        .stdout(predicate::str::contains("✗ database"))
        .stdout(predicate::str::contains("3 service(s): 2 succeeded, 1 failed"));
    Ok(())
}

#[test]
fn test_dry_run_json() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut cmd = fixture.cmd()?;
    cmd.args(["-e", "staging", "-o", "json", "--dry-run", "stop"]);
    let output = cmd.assert().success().get_output().stdout.clone();

    let value: serde_json::Value = serde_json::from_slice(&output)?;
    assert_eq!(value["command"], "stop");
    assert_eq!(value["executionContext"]["dryRun"], true);
    let results = value["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["entity"], "frontend");
    for result in results {
        assert_eq!(result["status"], "dry-run");
        assert!(result["metadata"]["intendedEffect"].is_string());
    }
    Ok(())
}

#[test]
fn test_check_with_logs_as_table() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut cmd = fixture.cmd()?;
    cmd.args(["-e", "staging", "-o", "table", "check", "backend"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("SERVICE"))
        .stdout(predicate::str::contains("backend"));
    Ok(())
}

#[test]
fn test_exec_runs_in_one_service() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut cmd = fixture.cmd()?;
    cmd.args(["-e", "staging", "exec", "backend", "--", "echo", "hello"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("executed"))
        .stdout(predicate::str::contains("| echo hello"));
    Ok(())
}

#[test]
fn test_exec_requires_a_command() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut cmd = fixture.cmd()?;
    cmd.args(["-e", "staging", "exec", "backend"]);
    cmd.assert().failure();
    Ok(())
}

#[test]
fn test_watch_stops_after_iterations() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut cmd = fixture.cmd()?;
    cmd.args(["-e", "staging", "watch", "frontend", "--interval", "0", "--iterations", "2"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("GET / 200"))
        .stdout(predicate::str::contains("watch staging").count(2));
    Ok(())
}

#[test]
fn test_watch_rejects_zero_iterations() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut cmd = fixture.cmd()?;
    cmd.args(["-e", "staging", "watch", "--iterations", "0"]);
    cmd.assert()
        .code(2)
        .stderr(predicate::str::contains("--iterations"))
        .stdout(predicate::str::contains("watch staging").not());
    Ok(())
}

#[test]
fn test_unknown_service_is_a_configuration_error() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut cmd = fixture.cmd()?;
    cmd.args(["-e", "staging", "start", "cache"]);
    cmd.assert()
        .code(2)
        .stderr(predicate::str::contains("unknown service 'cache'"));
    Ok(())
}

#[test]
fn test_missing_environment() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut cmd = fixture.cmd()?;
    cmd.arg("start");
    cmd.assert()
        .code(2)
        .stderr(predicate::str::contains("No environment given"));
    Ok(())
}

#[test]
fn test_missing_config_file() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut cmd = fixture.cmd()?;
    cmd.args(["-c", "absent.yaml", "-e", "staging", "start"]);
    cmd.assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to load configuration"));
    Ok(())
}
