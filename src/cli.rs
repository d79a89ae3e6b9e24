//! Command-line interface parsing for cockpit
//!
//! `cockpit fetch <dataset>` prints one dataset as JSON for the dashboard
//! build; `cockpit cache ...` inspects and maintains the cache directory.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

use crate::cache::SweepPolicy;
use crate::dataset::{Dataset, DEFAULT_DAYS};

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// The trailing window must cover at least one day
    #[error("Invalid --days value: {0}. Must be at least 1")]
    InvalidDays(u32),

    /// `cache clear` was given a blank key
    #[error("Invalid cache key: '{0}'. Omit the key to clear everything")]
    InvalidKey(String),
}

/// cockpit - cached GitHub statistics for profile dashboards
#[derive(Parser, Debug)]
#[command(name = "cockpit")]
#[command(about = "Cached GitHub statistics for profile README dashboards")]
#[command(version)]
pub struct Cli {
    /// Config file (default: ~/.config/cockpit/config.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Cache directory, overriding config and COCKPIT_CACHE_DIR
    #[arg(long, global = true, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Fetch a dataset and print it as JSON
    ///
    /// Falls back to the last cached copy when GitHub is unreachable, and to
    /// an empty payload when nothing is cached. Always exits 0.
    Fetch {
        #[arg(value_enum)]
        dataset: Dataset,

        /// Trailing window in days
        #[arg(long, default_value_t = DEFAULT_DAYS)]
        days: u32,

        /// Use a fresh cache entry instead of fetching
        #[arg(long)]
        cache_first: bool,
    },

    /// Inspect or maintain the cache directory
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CacheCommand {
    /// Print entry count and total size
    Stats,
    /// List cached keys
    Keys,
    /// Delete one entry, or every entry when no key is given
    Clear { key: Option<String> },
    /// Evict entries by age, count and total size
    Sweep(SweepArgs),
}

/// Limits for `cache sweep`; unset limits come from the config file
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct SweepArgs {
    /// Remove entries older than this many hours
    #[arg(long, value_name = "HOURS")]
    pub max_age_hours: Option<u64>,

    /// Keep at most this many entries
    #[arg(long, value_name = "N")]
    pub max_entries: Option<usize>,

    /// Keep the cache under this many bytes
    #[arg(long, value_name = "BYTES")]
    pub max_bytes: Option<u64>,
}

impl SweepArgs {
    /// Overlays the command-line limits on `base`
    pub fn apply(&self, base: SweepPolicy) -> SweepPolicy {
        SweepPolicy {
            max_age: match self.max_age_hours {
                Some(hours) => SweepPolicy::max_age_from_hours(hours),
                None => base.max_age,
            },
            max_entries: self.max_entries.or(base.max_entries),
            max_total_bytes: self.max_bytes.or(base.max_total_bytes),
        }
    }
}

impl Cli {
    /// Checks values clap cannot express as types
    pub fn validate(&self) -> Result<(), CliError> {
        match &self.command {
            Command::Fetch { days: 0, .. } => Err(CliError::InvalidDays(0)),
            Command::Cache {
                action: CacheCommand::Clear { key: Some(key) },
            } if key.trim().is_empty() => Err(CliError::InvalidKey(key.clone())),
            _ => Ok(()),
        }
    }
}
