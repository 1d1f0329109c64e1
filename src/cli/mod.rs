//! CLI module for aeroqueue
//!
//! Provides command-line interface for:
//! - init: Create the data directory and record file
//! - put: Append stdin lines as records
//! - drain: Consume records in order and compact them away
//! - stats: Report size, record count and counters

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{drain, init, put, run, run_command, stats};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_records, write_response};
