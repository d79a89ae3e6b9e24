//! Error types for cache operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing cache entries
///
/// These are surfaced only by the `try_*` methods of
/// [`CacheManager`](super::CacheManager). The regular methods log them and
/// degrade to a cache miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The key is empty
    #[error("Invalid cache key: '{0}'")]
    InvalidKey(String),

    /// Filesystem operation failed
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Entry could not be serialized
    #[error("Failed to serialize cache entry '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Entry on disk is not valid JSON or has the wrong shape
    #[error("Corrupt cache entry '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
