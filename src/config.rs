//! Configuration loading
//!
//! Settings come from a TOML file (`--config <path>`, or
//! `~/.config/cockpit/config.toml` when present), then environment variables
//! override individual values. Every field has a default, so an empty or
//! missing file is valid.
//!
//! ```toml
//! [cache]
//! dir = "data/cache"
//! ttl_secs = 3600
//! max_entries = 256
//!
//! [github]
//! username = "octocat"
//! timeout_secs = 30
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 1000
//! ```

use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cache::{CacheManager, SweepPolicy, Ttl};
use crate::retry::RetryPolicy;

/// Default GitHub REST API endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Cache directory used when no XDG cache directory exists
const FALLBACK_CACHE_DIR: &str = "data/cache";

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML or has the wrong shape
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub github: GitHubConfig,
    pub retry: RetryConfig,
}

/// Cache settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory; the XDG cache directory when unset
    pub dir: Option<PathBuf>,
    /// Freshness window for cache-first reads
    pub ttl_secs: u64,
    /// When false, fetches bypass the cache entirely
    pub enabled: bool,
    /// Sweep limit on the number of entries
    pub max_entries: Option<usize>,
    /// Sweep limit on total size in bytes
    pub max_total_bytes: Option<u64>,
    /// Sweep limit on entry age in hours
    pub max_age_hours: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            ttl_secs: 3600,
            enabled: true,
            max_entries: None,
            max_total_bytes: None,
            max_age_hours: None,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Ttl {
        Ttl::from_std(std::time::Duration::from_secs(self.ttl_secs))
    }

    pub fn sweep_policy(&self) -> SweepPolicy {
        SweepPolicy {
            max_age: self.max_age_hours.and_then(SweepPolicy::max_age_from_hours),
            max_entries: self.max_entries,
            max_total_bytes: self.max_total_bytes,
        }
    }

    /// Builds the cache manager for the configured directory
    ///
    /// Without a configured directory the XDG cache directory is used, or
    /// `data/cache` under the working directory if that cannot be determined.
    pub fn manager(&self) -> CacheManager {
        match &self.dir {
            Some(dir) => CacheManager::with_dir(dir),
            None => {
                CacheManager::new().unwrap_or_else(|| CacheManager::with_dir(FALLBACK_CACHE_DIR))
            }
        }
    }
}

/// GitHub API settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    /// Personal access token; usually supplied through `GITHUB_TOKEN`
    pub token: Option<String>,
    /// Account to report on; the token's owner when unset
    pub username: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            username: None,
            timeout_secs: 30,
        }
    }
}

/// Retry settings for GitHub requests
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            std::time::Duration::from_millis(self.base_delay_ms),
        )
    }
}

impl Config {
    /// Loads the config file and applies environment overrides
    ///
    /// # Arguments
    /// * `path` - Explicit config file; when `None` the XDG config file is used if it exists
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// `~/.config/cockpit/config.toml` or the platform equivalent
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "cockpit").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overrides values from environment variables
    ///
    /// `GITHUB_TOKEN`, `GITHUB_API_URL`, `COCKPIT_GITHUB_USER` and
    /// `COCKPIT_CACHE_DIR`. Empty values are ignored.
    pub(crate) fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(token) = lookup("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(api_url) = lookup("GITHUB_API_URL") {
            self.github.api_url = api_url;
        }
        if let Some(username) = lookup("COCKPIT_GITHUB_USER") {
            self.github.username = Some(username);
        }
        if let Some(dir) = lookup("COCKPIT_CACHE_DIR") {
            self.cache.dir = Some(PathBuf::from(dir));
        }
    }
}
