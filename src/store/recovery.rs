//! Open-time recovery of the record file
//!
//! Runs once, before the store accepts appends:
//! 1. Remove a leftover compaction file. The rename that publishes a
//!    compaction is atomic, so an unrenamed temp file is never authoritative.
//! 2. Create the record file if missing.
//! 3. Truncate a torn trailing frame (bytes after the last `\n`), left by a
//!    crash in the middle of an append.
//! 4. Report the resulting length, which seeds the store's size counter.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use super::errors::{StoreError, StoreResult};
use super::frame::FRAME_TERMINATOR;
use crate::crash_point::{maybe_crash, points};
use crate::file_manager::FileManager;
use crate::observability::{log_event_with_fields, Event, Severity};

const SCAN_CHUNK: u64 = 8 * 1024;

/// What recovery found and repaired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Length of the record file after repair
    pub size: u64,
    /// Bytes of a torn trailing frame that were truncated
    pub torn_bytes: u64,
    /// Whether a leftover compaction file was deleted
    pub stale_compaction_removed: bool,
}

/// Brings the record file at `records_file` into a consistent state.
pub fn recover(
    file_manager: &FileManager,
    records_file: &Path,
    compaction_file: &Path,
) -> StoreResult<RecoveryReport> {
    let stale_compaction_removed = file_manager.delete_file(compaction_file).map_err(|e| {
        StoreError::io_error(
            format!(
                "Failed to remove leftover compaction file: {}",
                compaction_file.display()
            ),
            e,
        )
    })?;
    if stale_compaction_removed {
        let path = compaction_file.display().to_string();
        log_event_with_fields(
            Event::StaleCompactionRemoved,
            Severity::Warn,
            &[("path", path.as_str())],
        );
    }

    file_manager.create_file(records_file).map_err(|e| {
        StoreError::io_error(
            format!("Failed to create record file: {}", records_file.display()),
            e,
        )
    })?;

    let file = file_manager
        .new_output_stream(records_file, true)
        .map_err(|e| {
            StoreError::io_error(
                format!("Failed to open record file: {}", records_file.display()),
                e,
            )
        })?;
    let len = file
        .metadata()
        .map_err(|e| StoreError::io_error("Failed to read record file metadata", e))?
        .len();

    let mut reader = file_manager
        .new_input_stream(records_file)
        .map_err(|e| StoreError::io_error("Failed to open record file for scan", e))?;
    let boundary = last_frame_end(&mut reader, len)
        .map_err(|e| StoreError::io_error("Failed to scan record file tail", e))?;

    let torn_bytes = len - boundary;
    if torn_bytes > 0 {
        maybe_crash(points::RECOVERY_BEFORE_TRUNCATE);
        file.set_len(boundary)
            .and_then(|_| file.sync_all())
            .map_err(|e| StoreError::io_error("Failed to truncate torn trailing frame", e))?;

        let torn = torn_bytes.to_string();
        let size = boundary.to_string();
        log_event_with_fields(
            Event::RecoveredTornTail,
            Severity::Warn,
            &[("torn_bytes", torn.as_str()), ("size", size.as_str())],
        );
    }

    Ok(RecoveryReport {
        size: boundary,
        torn_bytes,
        stale_compaction_removed,
    })
}

/// Offset just past the last frame terminator in the first `len` bytes,
/// or 0 if there is none.
pub(crate) fn last_frame_end(file: &mut File, len: u64) -> io::Result<u64> {
    let mut end = len;
    let mut buf = vec![0u8; SCAN_CHUNK as usize];

    while end > 0 {
        let start = end.saturating_sub(SCAN_CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;

        if let Some(pos) = chunk.iter().rposition(|&b| b == FRAME_TERMINATOR) {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }

    Ok(0)
}
