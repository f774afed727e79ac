// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn configs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../configs")
}

fn write_temp_file(prefix: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("raptor-tests");
    let _ = std::fs::create_dir_all(&dir);

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = dir.join(format!("{}-{}-{}.yaml", prefix, std::process::id(), nonce));
    std::fs::write(&path, contents).expect("Failed to write temp file");
    path
}

fn raptor(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_raptor"))
        .args(args)
        .output()
        .expect("Failed to execute raptor")
}

#[test]
fn test_run_gpio_script_passes() {
    let script = configs_dir().join("scripts/gpio_pin3.yaml");
    let output = raptor(&["run", "--script", script.to_str().unwrap()]);
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_run_uart_script_json_report() {
    let script = configs_dir().join("scripts/uart_loopback.yaml");
    let output = raptor(&["run", "--script", script.to_str().unwrap(), "--json"]);
    assert_eq!(output.status.code(), Some(0));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("Failed to parse report JSON");
    assert_eq!(json["uart_tx"], "Hi");
    assert_eq!(json["steps_executed"], 8);
    assert_eq!(json["reads"][0]["value"], 1);
    assert!(json["failures"].as_array().unwrap().is_empty());
}

#[test]
fn test_failed_expectation_exit_code() {
    let board = configs_dir().join("boards/raptor.yaml");
    let script = write_temp_file(
        "failing",
        r#"
schema_version: "1.0"
steps:
  - expect: { address: 0x80000004, value: 0x0 }
"#,
    );
    let output = raptor(&[
        "run",
        "--board",
        board.to_str().unwrap(),
        "--script",
        script.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_invalid_board_is_config_error() {
    let board = write_temp_file(
        "bad-board",
        r#"
schema_version: "1.0"
name: "bad"
peripherals:
  - id: "uart0"
    type: "uart"
    base_address: 0x1000
    uart:
      fifo_depth: 0
"#,
    );
    let output = raptor(&["inspect", "--board", board.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));

    let script = configs_dir().join("scripts/gpio_pin3.yaml");
    let output = raptor(&[
        "run",
        "--board",
        board.to_str().unwrap(),
        "--script",
        script.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_script_without_board_is_config_error() {
    let script = write_temp_file(
        "no-board",
        r#"
schema_version: "1.0"
steps:
  - reset
"#,
    );
    let output = raptor(&["run", "--script", script.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_unmapped_access_is_runtime_error() {
    let board = configs_dir().join("boards/raptor.yaml");
    let script = write_temp_file(
        "unmapped",
        r#"
schema_version: "1.0"
steps:
  - read: { address: 0x00000000 }
"#,
    );
    let output = raptor(&[
        "run",
        "--board",
        board.to_str().unwrap(),
        "--script",
        script.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_snapshot_written() {
    let script = configs_dir().join("scripts/uart_loopback.yaml");
    let snapshot = std::env::temp_dir().join(format!("raptor-snapshot-{}.json", std::process::id()));
    let output = raptor(&[
        "run",
        "--script",
        script.to_str().unwrap(),
        "--snapshot",
        snapshot.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(0));

    let content = std::fs::read_to_string(&snapshot).expect("snapshot not written");
    let json: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(json["peripherals"]["spi0"]["transfer"], "idle");
    assert_eq!(json["peripherals"]["uart0"]["faults"]["underflows"], 1);
    std::fs::remove_file(&snapshot).ok();
}

#[test]
fn test_inspect_json_memory_map() {
    let board = configs_dir().join("boards/raptor.yaml");
    let output = raptor(&["inspect", "--board", board.to_str().unwrap(), "--json"]);
    assert_eq!(output.status.code(), Some(0));

    let map: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = map
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["gpio0", "spi0", "uart0", "uart1"]);
    assert_eq!(map[2]["size"], 0x10_0000);
    assert_eq!(map[2]["irq"], 1);
    assert_eq!(map[2]["type"], "uart");
}
