//! cockpit - cached GitHub statistics for profile README dashboards
//!
//! Fetches aggregates from the GitHub API through a file cache with stale
//! fallback and prints them as JSON for the dashboard generator.

use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use cockpit::cache::{CacheManager, ReadThrough};
use cockpit::cli::{CacheCommand, Cli, CliError, Command};
use cockpit::config::{Config, ConfigError};
use cockpit::dataset::{DatasetLoader, DatasetReport};
use cockpit::github::GitHubClient;
use cockpit::logging;

/// Startup failures; everything after startup degrades instead of failing
#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Cli(#[from] CliError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_cache_command(
    cache: &CacheManager,
    config: &Config,
    action: &CacheCommand,
) -> Result<(), AppError> {
    match action {
        CacheCommand::Stats => {
            let stats = cache.stats();
            print_json(&json!({
                "dir": cache.dir(),
                "entry_count": stats.entry_count,
                "total_size_bytes": stats.total_size_bytes,
                "total_size_mb": stats.total_size_mb(),
            }))
        }
        CacheCommand::Keys => print_json(&cache.keys()),
        CacheCommand::Clear { key } => {
            let removed = cache.clear(key.as_deref());
            print_json(&json!({ "removed": removed }))
        }
        CacheCommand::Sweep(args) => {
            let policy = args.apply(config.cache.sweep_policy());
            print_json(&cache.sweep(&policy))
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    cli.validate()?;

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.cache_dir {
        config.cache.dir = Some(dir);
    }
    let cache = config.cache.manager();
    debug!(dir = %cache.dir().display(), "Using cache directory");

    match cli.command {
        Command::Fetch {
            dataset,
            days,
            cache_first,
        } => {
            let client = match GitHubClient::new(&config.github) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!(error = %e, "GitHub client unavailable, serving cached data only");
                    None
                }
            };
            let read_through = ReadThrough::new(cache).with_enabled(config.cache.enabled);
            let loader = DatasetLoader::new(
                client,
                read_through,
                config.retry.policy(),
                config.github.username.as_deref(),
                config.cache.ttl(),
            );

            let fetched = loader.load(dataset, days, cache_first).await;
            print_json(&DatasetReport::new(dataset, fetched))
        }
        Command::Cache { action } => run_cache_command(&cache, &config, &action),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
