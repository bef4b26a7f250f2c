//! Integration tests for the `ironwall` binary.
//!
//! Runs the compiled binary against the shared ruleset fixture and
//! temporary config/ruleset files.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;

/// IPv4/TCP packet (20-byte header) with the given destination port.
fn tcp_packet_hex(dport: u16) -> String {
    let mut raw = vec![0u8; 28];
    raw[0] = 0x45;
    raw[9] = 6;
    raw[22..24].copy_from_slice(&dport.to_be_bytes());
    raw.iter().map(|b| format!("{b:02x}")).collect()
}

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../rulesets/filter.toml")
}

fn ironwall(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ironwall"))
        .args(["--config", "/nonexistent/ironwall.toml", "--log-level", "error"])
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("should run ironwall binary")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn test_eval_ssh_is_accepted() {
    let fixture = fixture();
    let packet = tcp_packet_hex(22);
    let output = ironwall(&[
        "--output",
        "json",
        "eval",
        "--ruleset",
        fixture.to_str().unwrap(),
        "--packet",
        &packet,
    ]);

    assert!(output.status.success(), "eval should succeed: {output:?}");
    let json = stdout_json(&output);
    assert_eq!(json["disposition"], "accept");
    assert_eq!(json["chain"], "input");
}

#[test]
fn test_eval_with_trace_reports_events() {
    let fixture = fixture();
    let packet = tcp_packet_hex(443);
    let output = ironwall(&[
        "--output",
        "json",
        "eval",
        "-r",
        fixture.to_str().unwrap(),
        "-p",
        &packet,
        "--trace",
    ]);

    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["disposition"], "drop");

    let trace = json["trace"].as_array().expect("trace should be an array");
    let last = trace.last().expect("trace should not be empty");
    assert_eq!(last["kind"], "policy");
    assert!(last["rulenum"].is_null());
}

#[test]
fn test_eval_rejects_bad_hex() {
    let fixture = fixture();
    let output = ironwall(&["eval", "-r", fixture.to_str().unwrap(), "-p", "zz"]);
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn test_eval_rejects_non_base_chain() {
    let fixture = fixture();
    let packet = tcp_packet_hex(22);
    let output = ironwall(&[
        "eval",
        "-r",
        fixture.to_str().unwrap(),
        "--chain",
        "tcp_in",
        "-p",
        &packet,
    ]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_check_fixture_is_valid() {
    let fixture = fixture();
    let output = ironwall(&["--output", "json", "check", "-r", fixture.to_str().unwrap()]);

    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["valid"], true);
    assert_eq!(json["total_rules"], 6);
    assert_eq!(json["chains"].as_array().unwrap().len(), 3);
}

#[test]
fn test_check_rejects_jump_loop() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("loop.toml");
    fs::write(
        &path,
        r#"
[table]
name = "filter"

[[chain]]
name = "input"
policy = "accept"

[[chain.rule]]
expr = [{ type = "verdict", verdict = "jump", target = "a" }]

[[chain]]
name = "a"

[[chain.rule]]
expr = [{ type = "verdict", verdict = "jump", target = "b" }]

[[chain]]
name = "b"

[[chain.rule]]
expr = [{ type = "verdict", verdict = "goto", target = "a" }]
"#,
    )
    .expect("should write ruleset");

    let output = ironwall(&["--output", "json", "check", "-r", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(3));
    let json = stdout_json(&output);
    assert_eq!(json["valid"], false);
}

#[test]
fn test_config_validate_valid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("ironwall.toml");
    fs::write(&config_path, "[engine]\nmax_steps = 128\n").expect("should write config");

    let output = Command::new(env!("CARGO_BIN_EXE_ironwall"))
        .args(["-c", config_path.to_str().unwrap(), "config", "validate"])
        .output()
        .expect("should run ironwall binary");
    assert!(output.status.success());
}

#[test]
fn test_config_validate_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("ironwall.toml");
    fs::write(&config_path, "[engine]\nmax_steps = 0\n").expect("should write config");

    let output = Command::new(env!("CARGO_BIN_EXE_ironwall"))
        .args(["-c", config_path.to_str().unwrap(), "config", "validate"])
        .output()
        .expect("should run ironwall binary");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_config_show_missing_file_fails() {
    let output = ironwall(&["config", "show"]);
    assert_eq!(output.status.code(), Some(2));
}
