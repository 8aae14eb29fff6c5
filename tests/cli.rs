use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const SESSION: &str = concat!(
    r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"cli-test","version":"0.0.1"}}}"#,
    "\n",
    r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
    "\n",
    r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
    "\n",
    r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hi"}}}"#,
    "\n",
);

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        format!(
            "[server]\nname = \"CLI test server\"\ndata_dir = '{}'\n\n[logging]\nlevel = \"DEBUG\"\n",
            dir.path().join("data").display()
        ),
    )
    .unwrap();
    path
}

#[test]
fn test_help_lists_options() {
    Command::cargo_bin("mcp-scaffold")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--log-level"));
}

#[test]
fn test_stdio_session_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    Command::cargo_bin("mcp-scaffold")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .write_stdin(SESSION)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""id":1"#))
        .stdout(predicate::str::contains("CLI test server"))
        .stdout(predicate::str::contains("kwargs_list"))
        .stdout(predicate::str::contains("Echo: hi"));

    assert!(dir.path().join("data").join("unified_logs.db").exists());
}

#[test]
fn test_stdout_carries_only_protocol_frames() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let output = Command::cargo_bin("mcp-scaffold")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .write_stdin(SESSION)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let frames: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|frame| frame["jsonrpc"] == "2.0"));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();

    Command::cargo_bin("mcp-scaffold")
        .unwrap()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}
