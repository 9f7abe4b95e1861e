//! CLI integration tests
//!
//! These tests run the compiled binary and check:
//! - Call-id administration through `outdial id`
//! - Call-id uniqueness across concurrently running processes
//! - Number normalization output
//! - Exit codes on bad input

use std::env;
use std::fs;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Binary command with no OUTDIAL_* settings inherited from the test environment
fn outdial() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_outdial"));
    for (key, _) in env::vars() {
        if key.starts_with("OUTDIAL_") {
            cmd.env_remove(key);
        }
    }
    cmd.env_remove("RUST_LOG");
    cmd
}

fn run(cmd: &mut Command) -> Output {
    cmd.output().expect("Failed to execute outdial")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[test]
fn test_cli_help() {
    let output = run(outdial().arg("--help"));

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("outdial"));
    assert!(text.contains("run"));
    assert!(text.contains("id"));
}

#[test]
fn test_cli_version() {
    let output = run(outdial().arg("--version"));

    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_id_next_and_peek() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("data/call_id_track");

    let peek = run(outdial().args(["id", "peek", "--store"]).arg(&store));
    assert!(peek.status.success());
    assert_eq!(stdout(&peek), "0");

    for expected in 1..=3 {
        let next = run(outdial().args(["id", "next", "--store"]).arg(&store));
        assert!(next.status.success());
        assert_eq!(stdout(&next), expected.to_string());
    }

    assert_eq!(fs::read_to_string(&store).unwrap(), "3\n");
}

#[test]
fn test_id_reset() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("call_id_track");

    let reset = run(outdial().args(["id", "reset", "99", "--store"]).arg(&store));
    assert!(reset.status.success());

    let next = run(outdial().args(["id", "next", "--store"]).arg(&store));
    assert_eq!(stdout(&next), "100");
}

#[test]
fn test_id_reset_negative_fails() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("call_id_track");
    fs::write(&store, "5\n").unwrap();

    let reset = run(outdial().args(["id", "reset", "-1", "--store"]).arg(&store));

    assert_eq!(reset.status.code(), Some(1));
    assert_eq!(fs::read_to_string(&store).unwrap(), "5\n");
}

#[test]
fn test_corrupted_store_fails() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("call_id_track");
    fs::write(&store, "abc\n").unwrap();

    let next = run(outdial().args(["id", "next", "--store"]).arg(&store));

    assert_eq!(next.status.code(), Some(1));
    assert!(stdout(&next).is_empty());
    let stderr = String::from_utf8_lossy(&next.stderr);
    assert!(stderr.contains("Corrupted call-id store"));
    assert_eq!(fs::read_to_string(&store).unwrap(), "abc\n");
}

#[test]
fn test_store_from_environment() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("env_store");

    let next = run(outdial().args(["id", "next"]).env("OUTDIAL_STORE_PATH", &store));

    assert!(next.status.success());
    assert_eq!(stdout(&next), "1");
    assert!(store.exists());
}

#[test]
fn test_concurrent_processes_get_distinct_ids() {
    const PROCESSES: u64 = 16;

    let dir = TempDir::new().unwrap();
    let store = dir.path().join("call_id_track");

    let children: Vec<_> = (0..PROCESSES)
        .map(|_| {
            outdial()
                .args(["--quiet", "id", "next", "--store"])
                .arg(&store)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .expect("Failed to spawn outdial")
        })
        .collect();

    let mut ids: Vec<u64> = children
        .into_iter()
        .map(|child| {
            let output = child.wait_with_output().unwrap();
            assert!(
                output.status.success(),
                "stderr: {}",
                String::from_utf8_lossy(&output.stderr)
            );
            stdout(&output).parse().unwrap()
        })
        .collect();
    ids.sort_unstable();

    assert_eq!(ids, (1..=PROCESSES).collect::<Vec<_>>());
    assert_eq!(
        fs::read_to_string(&store).unwrap(),
        format!("{}\n", PROCESSES)
    );
}

#[test]
fn test_normalize_output() {
    let output = run(outdial().args(["normalize", "+972 54-684-4668"]));
    assert!(output.status.success());
    assert_eq!(stdout(&output), "0546844668");

    let output = run(outdial().args(["normalize", "546844668"]));
    assert_eq!(stdout(&output), "0546844668");
}

#[test]
fn test_normalize_rejects_short_number() {
    let output = run(outdial().args(["normalize", "1234"]));

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_run_without_source_fails() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("call_id_track");

    let output = run(outdial()
        .args(["run", "0546844668", "--store"])
        .arg(&store)
        .arg("--answers-dir")
        .arg(dir.path().join("answers")));

    assert_eq!(output.status.code(), Some(1));
    assert!(!store.exists());
}

#[test]
fn test_run_with_empty_work_list_reports_nothing() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("call_id_track");
    let numbers = dir.path().join("numbers.txt");
    fs::write(&numbers, "# nothing to call yet\n").unwrap();

    let output = run(outdial()
        .args(["run", "-s", "0534540615", "-f", "json", "--numbers-file"])
        .arg(&numbers)
        .arg("--store")
        .arg(&store)
        .arg("--answers-dir")
        .arg(dir.path().join("answers")));

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["dispatched"], serde_json::json!([]));
    assert_eq!(report["peak_active"], 0);
    assert!(!store.exists());
}

#[test]
fn test_run_zero_concurrency_fails() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("call_id_track");

    let output = run(outdial()
        .args(["run", "0546844668", "-s", "0534540615", "-c", "0", "--store"])
        .arg(&store)
        .arg("--answers-dir")
        .arg(dir.path().join("answers")));

    assert_eq!(output.status.code(), Some(1));
    assert!(!store.exists());
}

#[test]
fn test_config_json_hides_password() {
    let output = run(outdial()
        .args(["config", "--format", "json"])
        .env("OUTDIAL_SOURCE_NUMBER", "0534540615")
        .env("OUTDIAL_SUDO_PASSWORD", "hunter2"));

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(!text.contains("hunter2"));

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["source_number"], "0534540615");
    assert_eq!(value["max_concurrent"], "10");
}
