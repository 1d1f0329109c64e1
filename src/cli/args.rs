//! CLI argument definitions using clap
//!
//! Commands:
//! - aeroqueue init --config <path>
//! - aeroqueue put --config <path>
//! - aeroqueue drain --config <path> [--limit <n>] [--batch <n>]
//! - aeroqueue stats --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aeroqueue - A durable, bounded, disk-backed record queue
#[derive(Parser, Debug)]
#[command(name = "aeroqueue")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a new aeroqueue data directory
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./aeroqueue.json")]
        config: PathBuf,
    },

    /// Append one record per stdin line
    Put {
        /// Path to configuration file
        #[arg(long, default_value = "./aeroqueue.json")]
        config: PathBuf,
    },

    /// Read records in order, print them and remove them
    Drain {
        /// Path to configuration file
        #[arg(long, default_value = "./aeroqueue.json")]
        config: PathBuf,

        /// Stop after this many records
        #[arg(long)]
        limit: Option<u64>,

        /// Commit consumed records every N reads
        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
        batch: u64,
    },

    /// Print size, record count and counters
    Stats {
        /// Path to configuration file
        #[arg(long, default_value = "./aeroqueue.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_defaults() {
        let cli = Cli::try_parse_from(["aeroqueue", "drain"]).unwrap();
        match cli.command {
            Command::Drain {
                config,
                limit,
                batch,
            } => {
                assert_eq!(config, PathBuf::from("./aeroqueue.json"));
                assert_eq!(limit, None);
                assert_eq!(batch, 100);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_zero_batch_rejected() {
        assert!(Cli::try_parse_from(["aeroqueue", "drain", "--batch", "0"]).is_err());
    }
}
