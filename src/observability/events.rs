//! Observable queue events
//!
//! Events are explicit and typed. Each maps to one stable upper-case name
//! used as the `event` key of a log line.

use std::fmt;

/// Observable events in a record store's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Record store opened and size measured
    StoreOpened,
    /// Configuration loaded
    ConfigLoaded,

    // Recovery
    /// A partial trailing frame was truncated on open
    RecoveredTornTail,
    /// A leftover compaction temp file was removed on open
    StaleCompactionRemoved,
    /// The file on disk already exceeds the configured ceiling
    OverCeilingOnOpen,

    // Append path
    /// First append dropped after the store filled up
    StoreFull,
    /// Append failed with an I/O error
    AppendFailed,
    /// Record file length disagreed with the tracked size and was adopted
    SizeResynced,

    // Compaction
    /// Compaction of the consumed prefix completed
    CompactionComplete,
    /// Compaction failed, the old file was kept
    CompactionFailed,
    /// Directory fsync after a published compaction failed
    DirectorySyncFailed,

    // Corruption
    /// A frame inside an iterator snapshot was unreadable
    Corruption,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StoreOpened => "STORE_OPENED",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::RecoveredTornTail => "STORE_RECOVERED_TORN_TAIL",
            Event::StaleCompactionRemoved => "STORE_STALE_COMPACTION_REMOVED",
            Event::OverCeilingOnOpen => "STORE_OVER_CEILING_ON_OPEN",
            Event::StoreFull => "STORE_FULL",
            Event::AppendFailed => "APPEND_FAILED",
            Event::SizeResynced => "STORE_SIZE_RESYNCED",
            Event::CompactionComplete => "COMPACTION_COMPLETE",
            Event::CompactionFailed => "COMPACTION_FAILED",
            Event::DirectorySyncFailed => "STORE_DIRECTORY_SYNC_FAILED",
            Event::Corruption => "STORE_CORRUPTION",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::Corruption)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::StoreOpened,
            Event::ConfigLoaded,
            Event::RecoveredTornTail,
            Event::StaleCompactionRemoved,
            Event::OverCeilingOnOpen,
            Event::StoreFull,
            Event::AppendFailed,
            Event::SizeResynced,
            Event::CompactionComplete,
            Event::CompactionFailed,
            Event::DirectorySyncFailed,
            Event::Corruption,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::Corruption.is_fatal());
        assert!(!Event::StoreFull.is_fatal());
        assert!(!Event::CompactionFailed.is_fatal());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::StoreFull), "STORE_FULL");
    }
}
