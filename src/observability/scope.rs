//! ObservationScope for start/complete logging around an operation
//!
//! - `{name}_BEGIN` at TRACE on creation
//! - `{name}_COMPLETE` at INFO on `complete`
//! - `{name}_FAILED` at ERROR on `fail`
//! - `{name}_INCOMPLETE` at WARN if dropped without either

use std::time::Instant;

use super::logger::Logger;

/// A scope that logs the begin and outcome of one operation
///
/// ```ignore
/// let scope = ObservationScope::new("RECOVERY");
/// // ... do work ...
/// scope.complete_with_fields(&[("torn_bytes", "0")]);
/// ```
pub struct ObservationScope<'a> {
    name: &'a str,
    completed: bool,
    timer: Timer,
}

impl<'a> ObservationScope<'a> {
    /// Create a new observation scope, logging `{name}_BEGIN`
    pub fn new(name: &'a str) -> Self {
        Logger::trace(&format!("{}_BEGIN", name), &[]);
        Self {
            name,
            completed: false,
            timer: Timer::new(),
        }
    }

    /// Mark the scope as completed, attaching extra fields and the elapsed time
    pub fn complete_with_fields(mut self, extra_fields: &[(&str, &str)]) {
        self.completed = true;
        let elapsed = self.timer.elapsed_ms();
        let mut fields: Vec<(&str, &str)> = extra_fields.to_vec();
        fields.push(("elapsed_ms", elapsed.as_str()));
        Logger::info(&format!("{}_COMPLETE", self.name), &fields);
    }

    /// Mark the scope as failed with a reason
    pub fn fail(mut self, reason: &str) {
        self.completed = true;
        Logger::error(&format!("{}_FAILED", self.name), &[("reason", reason)]);
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.completed {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

/// A simple duration timer for logging elapsed time
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed milliseconds as a string
    pub fn elapsed_ms(&self) -> String {
        self.start.elapsed().as_millis().to_string()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
