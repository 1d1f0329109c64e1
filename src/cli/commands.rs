//! CLI command implementations
//!
//! Each command loads the config, applies its log level, opens the store
//! and writes JSON responses to stdout. Commands take their input and
//! output streams as parameters so they can run against buffers in tests.

use std::io::{self, BufRead, Write};
use std::path::Path;

use serde_json::{json, Value};

use crate::config::QueueConfig;
use crate::store::{DropReason, PutOutcome, RecordStore};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_records, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cmd {
        Command::Init { config } => init(&config, &mut out),
        Command::Put { config } => put(&config, io::stdin().lock(), &mut out),
        Command::Drain {
            config,
            limit,
            batch,
        } => drain(&config, limit, batch, &mut out),
        Command::Stats { config } => stats(&config, &mut out),
    }
}

/// Initialize a new data directory
///
/// Creates `<data_dir>/records/records.log`. Fails if it already exists.
pub fn init<W: Write>(config_path: &Path, out: &mut W) -> CliResult<()> {
    let config = load_config(config_path)?;

    if is_initialized(&config) {
        return Err(CliError::already_initialized());
    }

    let store = RecordStore::open(&config)?;

    write_response(
        out,
        json!({
            "initialized": true,
            "records_path": store.records_path().display().to_string(),
            "max_storage_size": store.max_storage_size(),
        }),
    )
}

/// Append every line of `input` as one record
///
/// Dropped records are counted, not treated as failures.
pub fn put<R: BufRead, W: Write>(config_path: &Path, input: R, out: &mut W) -> CliResult<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;

    let mut written = 0u64;
    let mut dropped_full = 0u64;
    let mut dropped_too_large = 0u64;

    for record in read_records(input) {
        match store.put(&record?)? {
            PutOutcome::Written { .. } => written += 1,
            PutOutcome::Dropped(DropReason::StoreFull) => dropped_full += 1,
            PutOutcome::Dropped(DropReason::RecordTooLarge) => dropped_too_large += 1,
        }
    }

    write_response(
        out,
        json!({
            "written": written,
            "dropped_full": dropped_full,
            "dropped_too_large": dropped_too_large,
            "size": store.size(),
        }),
    )
}

/// Consume records in write order
///
/// Every `batch` records are written out as one response and only then
/// removed from the store, so a record is never deleted before it was
/// printed. A final response reports the totals.
pub fn drain<W: Write>(
    config_path: &Path,
    limit: Option<u64>,
    batch: u64,
    out: &mut W,
) -> CliResult<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let mut iter = store.iterator()?;

    let mut pending: Vec<String> = Vec::new();
    let mut drained = 0u64;
    let mut removed_bytes = 0u64;

    while limit.map_or(true, |limit| drained < limit) {
        let Some(record) = iter.try_next()? else {
            break;
        };
        pending.push(record);
        drained += 1;

        if pending.len() as u64 >= batch {
            write_response(out, json!({ "records": pending }))?;
            pending.clear();
            removed_bytes += iter.remove_read_records()?;
        }
    }

    if !pending.is_empty() {
        write_response(out, json!({ "records": pending }))?;
        removed_bytes += iter.remove_read_records()?;
    }

    write_response(
        out,
        json!({
            "drained": drained,
            "removed_bytes": removed_bytes,
            "remaining_bytes": store.size(),
        }),
    )
}

/// Report size, record count and counters
pub fn stats<W: Write>(config_path: &Path, out: &mut W) -> CliResult<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;

    let metrics: Value = serde_json::from_str(&store.metrics_json())?;
    write_response(
        out,
        json!({
            "size": store.size(),
            "max_storage_size": store.max_storage_size(),
            "record_count": store.record_count()?,
            "records_dropped": store.metrics().records_dropped(),
            "metrics": metrics,
        }),
    )
}

fn load_config(path: &Path) -> CliResult<QueueConfig> {
    let config = QueueConfig::load(path)?;
    config.apply_logging()?;
    Ok(config)
}

fn is_initialized(config: &QueueConfig) -> bool {
    config
        .data_path()
        .join(RecordStore::records_file())
        .is_file()
}

fn open_store(config: &QueueConfig) -> CliResult<RecordStore> {
    if !is_initialized(config) {
        return Err(CliError::not_initialized());
    }
    Ok(RecordStore::open(config)?)
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_config(temp_dir: &TempDir, max: u64) -> PathBuf {
        let config_path = temp_dir.path().join("aeroqueue.json");
        let data_dir = temp_dir.path().join("data");

        let config = json!({
            "data_dir": data_dir.to_string_lossy(),
            "max_storage_size_bytes": max,
            "sync_mode": "none",
            "log_level": "warn"
        });

        fs::write(&config_path, config.to_string()).unwrap();
        config_path
    }

    fn responses(out: Vec<u8>) -> Vec<Value> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_init_creates_record_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir, 1024);

        let mut out = Vec::new();
        init(&config_path, &mut out).unwrap();

        assert!(temp_dir.path().join("data/records/records.log").is_file());
        assert_eq!(responses(out)[0]["data"]["initialized"], true);
    }

    #[test]
    fn test_init_twice_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir, 1024);

        init(&config_path, &mut Vec::new()).unwrap();
        let err = init(&config_path, &mut Vec::new()).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::AlreadyInitialized);
    }

    #[test]
    fn test_put_requires_init() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir, 1024);

        let err = put(&config_path, Cursor::new("a\n"), &mut Vec::new()).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::NotInitialized);
    }

    #[test]
    fn test_missing_config_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = stats(&temp_dir.path().join("absent.json"), &mut Vec::new()).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_put_counts_drops() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir, 10);
        init(&config_path, &mut Vec::new()).unwrap();

        // "abcd" and "efg" take 9 of 10 bytes; "xy" no longer fits and the
        // last record never could
        let input = Cursor::new("abcd\nefg\nxy\n0123456789\n");
        let mut out = Vec::new();
        put(&config_path, input, &mut out).unwrap();

        let data = &responses(out)[0]["data"];
        assert_eq!(data["written"], 2);
        assert_eq!(data["dropped_full"], 1);
        assert_eq!(data["dropped_too_large"], 1);
        assert_eq!(data["size"], 9);
    }

    #[test]
    fn test_drain_in_batches() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir, 1024);
        init(&config_path, &mut Vec::new()).unwrap();
        put(&config_path, Cursor::new("1\n2\n3\n4\n5\n"), &mut Vec::new()).unwrap();

        let mut out = Vec::new();
        drain(&config_path, None, 2, &mut out).unwrap();

        let responses = responses(out);
        assert_eq!(responses.len(), 4);
        assert_eq!(responses[0]["data"]["records"], json!(["1", "2"]));
        assert_eq!(responses[1]["data"]["records"], json!(["3", "4"]));
        assert_eq!(responses[2]["data"]["records"], json!(["5"]));
        assert_eq!(responses[3]["data"]["drained"], 5);
        assert_eq!(responses[3]["data"]["removed_bytes"], 10);
        assert_eq!(responses[3]["data"]["remaining_bytes"], 0);
    }

    #[test]
    fn test_drain_limit_leaves_rest() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir, 1024);
        init(&config_path, &mut Vec::new()).unwrap();
        put(&config_path, Cursor::new("a\nb\nc\n"), &mut Vec::new()).unwrap();

        drain(&config_path, Some(2), 100, &mut Vec::new()).unwrap();

        let mut out = Vec::new();
        stats(&config_path, &mut out).unwrap();
        let data = &responses(out)[0]["data"];
        assert_eq!(data["record_count"], 1);
        assert_eq!(data["size"], 2);
        assert_eq!(data["max_storage_size"], 1024);
        assert_eq!(data["records_dropped"], 0);

        let mut out = Vec::new();
        drain(&config_path, None, 100, &mut out).unwrap();
        assert_eq!(responses(out)[0]["data"]["records"], json!(["c"]));
    }
}
