//! Crash point injection for durability testing
//!
//! A crash point is armed through the `AEROQUEUE_CRASH_POINT` environment
//! variable. When the running code reaches the named point the process is
//! terminated via `std::process::abort()`: no cleanup, no unwinding.
//!
//! # Usage
//!
//! ```ignore
//! use aeroqueue::crash_point::{maybe_crash, points};
//!
//! maybe_crash(points::COMPACTION_BEFORE_RENAME);
//! ```
//!
//! ```bash
//! AEROQUEUE_CRASH_POINT=compaction_before_rename aeroqueue drain --config q.json
//! ```

use std::sync::OnceLock;

/// Environment variable that arms a crash point
pub const CRASH_POINT_ENV: &str = "AEROQUEUE_CRASH_POINT";

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn get_crash_point() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var(CRASH_POINT_ENV).ok())
        .as_deref()
}

/// Returns true if `AEROQUEUE_CRASH_POINT` equals the given name.
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    get_crash_point().map(|p| p == name).unwrap_or(false)
}

/// Aborts the process if the named crash point is armed.
///
/// No-op when the environment variable is unset or names another point.
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// All defined crash point names
pub mod points {
    // Append path
    pub const APPEND_BEFORE_WRITE: &str = "append_before_write";
    pub const APPEND_AFTER_WRITE: &str = "append_after_write";
    pub const APPEND_AFTER_SYNC: &str = "append_after_sync";

    // Compaction path
    pub const COMPACTION_START: &str = "compaction_start";
    pub const COMPACTION_AFTER_TEMP_WRITE: &str = "compaction_after_temp_write";
    pub const COMPACTION_BEFORE_RENAME: &str = "compaction_before_rename";
    pub const COMPACTION_AFTER_RENAME: &str = "compaction_after_rename";

    // Open-time recovery
    pub const RECOVERY_BEFORE_TRUNCATE: &str = "recovery_before_truncate";

    /// Get all crash point names
    pub fn all() -> &'static [&'static str] {
        &[
            APPEND_BEFORE_WRITE,
            APPEND_AFTER_WRITE,
            APPEND_AFTER_SYNC,
            COMPACTION_START,
            COMPACTION_AFTER_TEMP_WRITE,
            COMPACTION_BEFORE_RENAME,
            COMPACTION_AFTER_RENAME,
            RECOVERY_BEFORE_TRUNCATE,
        ]
    }
}
