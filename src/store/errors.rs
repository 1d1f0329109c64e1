//! Record store error types
//!
//! Error codes:
//! - AERO_QUEUE_IO_ERROR (ERROR) - opening or measuring the store
//! - AERO_QUEUE_WRITE_FAILED (ERROR) - append failed, file rolled back
//! - AERO_QUEUE_READ_FAILED (ERROR) - iterator could not read
//! - AERO_QUEUE_COMPACTION_FAILED (ERROR) - old file kept intact
//! - AERO_QUEUE_INVALID_RECORD (ERROR) - payload cannot be framed
//! - AERO_QUEUE_STALE_ITERATOR (ERROR) - file compacted by another iterator
//! - AERO_QUEUE_CORRUPTION (FATAL) - unreadable frame inside a snapshot
//!
//! A full store is not an error: `put` reports it as a dropped outcome.

use std::fmt;
use std::io;

/// Severity levels for store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, process continues
    Error,
    /// Stored data cannot be trusted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Store error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// Filesystem failure opening, measuring or recovering the store
    AeroQueueIoError,
    /// Append failed
    AeroQueueWriteFailed,
    /// Read through an iterator failed
    AeroQueueReadFailed,
    /// Rewriting the record file failed
    AeroQueueCompactionFailed,
    /// Payload contains a line terminator
    AeroQueueInvalidRecord,
    /// Iterator outlived a compaction it did not perform
    AeroQueueStaleIterator,
    /// Frame inside a snapshot is torn or not UTF-8
    AeroQueueCorruption,
}

impl StoreErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StoreErrorCode::AeroQueueIoError => "AERO_QUEUE_IO_ERROR",
            StoreErrorCode::AeroQueueWriteFailed => "AERO_QUEUE_WRITE_FAILED",
            StoreErrorCode::AeroQueueReadFailed => "AERO_QUEUE_READ_FAILED",
            StoreErrorCode::AeroQueueCompactionFailed => "AERO_QUEUE_COMPACTION_FAILED",
            StoreErrorCode::AeroQueueInvalidRecord => "AERO_QUEUE_INVALID_RECORD",
            StoreErrorCode::AeroQueueStaleIterator => "AERO_QUEUE_STALE_ITERATOR",
            StoreErrorCode::AeroQueueCorruption => "AERO_QUEUE_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StoreErrorCode::AeroQueueCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// True for errors caused by the caller rather than the environment
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            StoreErrorCode::AeroQueueInvalidRecord | StoreErrorCode::AeroQueueStaleIterator
        )
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Store error with code, message, optional context and I/O source
#[derive(Debug)]
pub struct StoreError {
    code: StoreErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl StoreError {
    fn with_source(code: StoreErrorCode, message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    fn without_source(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Filesystem failure while opening or recovering the store
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self::with_source(StoreErrorCode::AeroQueueIoError, message, source)
    }

    /// Append failed
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::with_source(StoreErrorCode::AeroQueueWriteFailed, message, source)
    }

    /// Iterator read failed
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::with_source(StoreErrorCode::AeroQueueReadFailed, message, source)
    }

    /// Compaction failed; the previous record file is still in place
    pub fn compaction_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::with_source(StoreErrorCode::AeroQueueCompactionFailed, message, source)
    }

    /// Payload cannot be framed as one line
    pub fn invalid_record(reason: impl Into<String>) -> Self {
        Self::without_source(StoreErrorCode::AeroQueueInvalidRecord, reason)
    }

    /// Iterator used after another iterator compacted the file
    pub fn stale_iterator(iterator_epoch: u64, store_epoch: u64) -> Self {
        Self {
            code: StoreErrorCode::AeroQueueStaleIterator,
            message: "record file was compacted by another iterator".to_string(),
            details: Some(format!(
                "iterator_epoch: {}, store_epoch: {}",
                iterator_epoch, store_epoch
            )),
            source: None,
        }
    }

    /// Unreadable frame at a byte offset of the current record file
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: StoreErrorCode::AeroQueueCorruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> StoreErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether stored data can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreErrorCode::AeroQueueIoError.code(), "AERO_QUEUE_IO_ERROR");
        assert_eq!(StoreErrorCode::AeroQueueWriteFailed.code(), "AERO_QUEUE_WRITE_FAILED");
        assert_eq!(StoreErrorCode::AeroQueueReadFailed.code(), "AERO_QUEUE_READ_FAILED");
        assert_eq!(
            StoreErrorCode::AeroQueueCompactionFailed.code(),
            "AERO_QUEUE_COMPACTION_FAILED"
        );
        assert_eq!(StoreErrorCode::AeroQueueInvalidRecord.code(), "AERO_QUEUE_INVALID_RECORD");
        assert_eq!(StoreErrorCode::AeroQueueStaleIterator.code(), "AERO_QUEUE_STALE_ITERATOR");
        assert_eq!(StoreErrorCode::AeroQueueCorruption.code(), "AERO_QUEUE_CORRUPTION");
    }

    #[test]
    fn test_only_corruption_is_fatal() {
        assert!(StoreError::corruption_at_offset(7, "torn frame").is_fatal());
        assert!(!StoreError::write_failed("disk full", io::Error::other("disk full")).is_fatal());
        assert!(!StoreError::invalid_record("newline").is_fatal());
    }

    #[test]
    fn test_usage_errors_distinct_from_io() {
        assert!(StoreError::invalid_record("newline").code().is_usage_error());
        assert!(StoreError::stale_iterator(0, 1).code().is_usage_error());
        assert!(!StoreError::io_error("open", io::Error::other("x"))
            .code()
            .is_usage_error());
    }


    #[test]
    fn test_error_display_contains_required_fields() {
        let err = StoreError::corruption_at_offset(1024, "frame not newline-terminated");
        let display = format!("{}", err);
        assert!(display.contains("AERO_QUEUE_CORRUPTION"));
        assert!(display.contains("FATAL"));
        assert!(display.contains("frame not newline-terminated"));
        assert!(display.contains("byte_offset: 1024"));
    }
}
