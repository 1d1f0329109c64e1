//! Observability for aeroqueue
//!
//! - Structured JSON logging with a process-wide severity threshold
//! - Per-store counters
//! - Typed lifecycle events
//!
//! Observability never changes store behavior: logging failures are
//! ignored and counters are advisory.
//!
//! # Usage
//!
//! ```ignore
//! use aeroqueue::observability::{log_event_with_fields, Event, Severity};
//!
//! log_event_with_fields(Event::StoreFull, Severity::Warn, &[("size", "100")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};

/// Log a lifecycle event with fields
///
/// Fatal events are always logged at FATAL regardless of `severity`.
pub fn log_event_with_fields(event: Event, severity: Severity, fields: &[(&str, &str)]) {
    let severity = if event.is_fatal() {
        Severity::Fatal
    } else {
        severity
    };
    Logger::log(severity, event.as_str(), fields);
}
