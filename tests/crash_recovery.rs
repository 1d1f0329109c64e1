//! Crash Recovery Tests
//!
//! Each test runs the aeroqueue binary with `AEROQUEUE_CRASH_POINT` set, lets
//! it abort at the named point, then reopens the store in-process and checks
//! what survived:
//! - Compaction crashes leave either the old file or the complete new file
//! - Append crashes leave whole frames only
//!
//! Real filesystem, real process abort.

use aeroqueue::config::{QueueConfig, SyncMode};
use aeroqueue::crash_point::{points, CRASH_POINT_ENV};
use aeroqueue::store::RecordStore;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn write_config(temp_dir: &TempDir) -> PathBuf {
    let config_path = temp_dir.path().join("aeroqueue.json");
    let config = QueueConfig::new(temp_dir.path().join("data"));
    config.save(&config_path).unwrap();
    config_path
}

fn run(config_path: &Path, args: &[&str], crash_point: Option<&str>, stdin: &str) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_aeroqueue"));
    command
        .args(args)
        .arg("--config")
        .arg(config_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env_remove(CRASH_POINT_ENV);
    if let Some(point) = crash_point {
        command.env(CRASH_POINT_ENV, point);
    }

    let mut child = command.spawn().expect("Failed to spawn aeroqueue");
    {
        let mut input = child.stdin.take().unwrap();
        // The child may abort before reading everything
        let _ = input.write_all(stdin.as_bytes());
    }
    child.wait_with_output().unwrap()
}

fn setup(temp_dir: &TempDir, records: &[&str]) -> PathBuf {
    let config_path = write_config(temp_dir);
    assert!(run(&config_path, &["init"], None, "").status.success());

    let input: String = records.iter().map(|r| format!("{}\n", r)).collect();
    assert!(run(&config_path, &["put"], None, &input).status.success());
    config_path
}

fn reopen(temp_dir: &TempDir) -> RecordStore {
    let config = QueueConfig::new(temp_dir.path().join("data")).with_sync_mode(SyncMode::None);
    RecordStore::open(&config).unwrap()
}

fn remaining(store: &RecordStore) -> Vec<String> {
    store
        .iterator()
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn compaction_file(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("data/records/records.log.compact")
}

// =============================================================================
// Compaction Crashes
// =============================================================================

/// Crash after the temp file is written but before the rename: the old file
/// is authoritative, the temp file is discarded on open.
#[test]
fn test_crash_before_rename_keeps_old_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = setup(&temp_dir, &["a", "b", "c"]);

    let output = run(
        &config_path,
        &["drain", "--batch", "2"],
        Some(points::COMPACTION_BEFORE_RENAME),
        "",
    );
    assert!(!output.status.success());
    assert!(compaction_file(&temp_dir).exists());

    let store = reopen(&temp_dir);
    assert!(!compaction_file(&temp_dir).exists());
    assert_eq!(remaining(&store), vec!["a", "b", "c"]);
}

/// Crash right after the rename: the compaction is committed.
#[test]
fn test_crash_after_rename_keeps_new_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = setup(&temp_dir, &["a", "b", "c"]);

    let output = run(
        &config_path,
        &["drain", "--batch", "2"],
        Some(points::COMPACTION_AFTER_RENAME),
        "",
    );
    assert!(!output.status.success());

    let store = reopen(&temp_dir);
    assert_eq!(remaining(&store), vec!["c"]);
}

/// Crash before any compaction work: nothing is lost.
#[test]
fn test_crash_at_compaction_start_loses_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = setup(&temp_dir, &["a", "b"]);

    let output = run(
        &config_path,
        &["drain"],
        Some(points::COMPACTION_START),
        "",
    );
    assert!(!output.status.success());

    // The batch was printed before the crash; the records are still stored
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(r#""records":["a","b"]"#));

    let store = reopen(&temp_dir);
    assert_eq!(remaining(&store), vec!["a", "b"]);
}

// =============================================================================
// Append Crashes
// =============================================================================

/// Crash before the first byte of a frame is written.
#[test]
fn test_crash_before_write_keeps_prior_records() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = setup(&temp_dir, &["kept"]);

    let output = run(
        &config_path,
        &["put"],
        Some(points::APPEND_BEFORE_WRITE),
        "lost\n",
    );
    assert!(!output.status.success());

    let store = reopen(&temp_dir);
    assert_eq!(remaining(&store), vec!["kept"]);
}

/// Crash after the frame is written and synced: the record is durable.
#[test]
fn test_crash_after_sync_keeps_record() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = setup(&temp_dir, &["kept"]);

    let output = run(
        &config_path,
        &["put"],
        Some(points::APPEND_AFTER_SYNC),
        "synced\nnever\n",
    );
    assert!(!output.status.success());

    let store = reopen(&temp_dir);
    assert_eq!(remaining(&store), vec!["kept", "synced"]);
    assert_eq!(
        fs::read(store.records_path()).unwrap(),
        b"kept\nsynced\n".to_vec()
    );
}

// =============================================================================
// CLI Output
// =============================================================================

/// With the default log level, stdout carries only JSON responses.
#[test]
fn test_default_config_stdout_is_responses_only() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = setup(&temp_dir, &["a", "b", "c"]);

    let output = run(&config_path, &["drain", "--batch", "2"], None, "");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|line| line["status"] == "ok"));
}
