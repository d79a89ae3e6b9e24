//! Cache manager for persisting fetched datasets to disk
//!
//! Provides a `CacheManager` that stores serializable data to JSON files with
//! a write timestamp. Freshness is judged at read time against a caller-chosen
//! [`Ttl`]; reads never delete, so expired entries stay available for stale
//! fallback until an explicit [`CacheManager::clear`] or [`CacheManager::sweep`].

use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use serde::{de::DeserializeOwned, de::IgnoredAny, Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::CacheError;

/// File extension of cache entries
const ENTRY_EXTENSION: &str = "json";

/// Wrapper struct for cached data stored on disk
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    /// When the data was cached
    timestamp: DateTime<Utc>,
    /// The cached data
    data: T,
}

/// Freshness window applied when reading an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Entries younger than this duration are fresh
    Finite(Duration),
    /// Every entry is fresh regardless of age
    Unbounded,
}

impl Ttl {
    /// Values too large for chrono become `Unbounded`
    pub fn seconds(secs: i64) -> Self {
        Duration::try_seconds(secs).map_or(Ttl::Unbounded, Ttl::Finite)
    }

    /// Values too large for chrono become `Unbounded`
    pub fn hours(hours: i64) -> Self {
        Duration::try_hours(hours).map_or(Ttl::Unbounded, Ttl::Finite)
    }

    /// Converts a std duration; values too large for chrono become `Unbounded`
    pub fn from_std(duration: std::time::Duration) -> Self {
        Duration::from_std(duration)
            .map(Ttl::Finite)
            .unwrap_or(Ttl::Unbounded)
    }

    /// Returns true if an entry written at `cached_at` is still fresh at `now`
    pub fn is_fresh(&self, cached_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Ttl::Unbounded => true,
            Ttl::Finite(ttl) => now - cached_at < *ttl,
        }
    }
}

/// Result of reading from cache, including metadata about cache freshness
#[derive(Debug)]
pub struct CachedData<T> {
    /// The cached data
    pub data: T,
    /// When the data was originally cached
    pub cached_at: DateTime<Utc>,
    /// Whether the cache entry is past the requested TTL
    pub is_expired: bool,
}

/// Size summary of the cache directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of entry files
    pub entry_count: usize,
    /// Combined size of entry files in bytes
    pub total_size_bytes: u64,
}

impl CacheStats {
    /// Total size in megabytes rounded to two decimals
    pub fn total_size_mb(&self) -> f64 {
        let mb = self.total_size_bytes as f64 / (1024.0 * 1024.0);
        (mb * 100.0).round() / 100.0
    }
}

/// Limits enforced by [`CacheManager::sweep`]
#[derive(Debug, Clone, Default)]
pub struct SweepPolicy {
    /// Remove entries written longer ago than this
    pub max_age: Option<Duration>,
    /// Keep at most this many entries, dropping the oldest first
    pub max_entries: Option<usize>,
    /// Keep the directory under this many bytes, dropping the oldest first
    pub max_total_bytes: Option<u64>,
}

impl SweepPolicy {
    /// Converts an hour count into an age limit
    ///
    /// Counts too large for chrono yield `None`: no entry can be that old, so
    /// the limit would never remove anything.
    pub fn max_age_from_hours(hours: u64) -> Option<Duration> {
        i64::try_from(hours).ok().and_then(Duration::try_hours)
    }
}

/// Outcome of a sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Keys whose entries were deleted
    pub removed: Vec<String>,
    /// Cache size after the sweep
    pub remaining: CacheStats,
}

/// An entry file found in the cache directory
#[derive(Debug)]
struct EntryFile {
    key: String,
    path: PathBuf,
    size: u64,
}

/// Manages reading and writing cached data to disk
///
/// The cache manager stores data as JSON files named `<key>.json` in a single
/// directory. It never propagates errors from its regular methods: I/O and
/// parse failures are logged at WARN and treated as a cache miss, so caching
/// can never interrupt the caller. The `try_*` variants surface the error.
#[derive(Debug, Clone)]
pub struct CacheManager {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
}

impl CacheManager {
    /// Creates a new CacheManager using the XDG-compliant cache directory
    ///
    /// Uses `~/.cache/cockpit/` on Linux, or the equivalent on other platforms.
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "cockpit")?;
        let cache_dir = project_dirs.cache_dir().to_path_buf();
        Some(Self { cache_dir })
    }

    /// Creates a new CacheManager rooted at the given directory
    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Directory holding the cache entries
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Maps a key to a safe file stem
    ///
    /// Bytes outside `[A-Za-z0-9._-]` are percent-encoded as `%XX`, as is a
    /// leading dot, so a key can neither escape the directory nor hide as a
    /// dotfile. Distinct keys always map to distinct stems.
    pub fn encode_key(key: &str) -> String {
        let mut stem = String::with_capacity(key.len());
        for (i, byte) in key.bytes().enumerate() {
            let plain = byte.is_ascii_alphanumeric()
                || matches!(byte, b'_' | b'-')
                || (byte == b'.' && i > 0);
            if plain {
                stem.push(char::from(byte));
            } else {
                stem.push_str(&format!("%{:02X}", byte));
            }
        }
        stem
    }

    /// Inverse of [`CacheManager::encode_key`]
    ///
    /// Returns `None` for stems that [`CacheManager::encode_key`] never produces.
    pub fn decode_key(stem: &str) -> Option<String> {
        let bytes = stem.as_bytes();
        let mut key = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let hex = stem.get(i + 1..i + 3)?;
                if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return None;
                }
                key.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            } else {
                key.push(bytes[i]);
                i += 1;
            }
        }
        String::from_utf8(key).ok()
    }

    /// Returns the path to a cache file for the given key
    fn cache_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        let stem = Self::encode_key(key);
        if stem.is_empty() {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self
            .cache_dir
            .join(format!("{}.{}", stem, ENTRY_EXTENSION)))
    }

    /// Writes `data` under `key`, stamped with the current time
    ///
    /// Returns `true` if the entry was written. Failures are logged and swallowed.
    pub fn put<T: Serialize>(&self, key: &str, data: &T) -> bool {
        match self.try_put(key, data) {
            Ok(()) => {
                info!(key, "Cached data");
                true
            }
            Err(e) => {
                warn!(key, error = %e, "Could not write cache entry");
                false
            }
        }
    }

    /// Writes `data` under `key`, stamped with the current time
    ///
    /// The entry is written to a temporary file in the cache directory and
    /// renamed over the previous entry, so readers see either the old or the
    /// new entry, never a partial one.
    pub fn try_put<T: Serialize>(&self, key: &str, data: &T) -> Result<(), CacheError> {
        self.try_put_at(key, data, Utc::now())
    }

    pub(crate) fn try_put_at<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        timestamp: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let path = self.cache_path(key)?;
        fs::create_dir_all(&self.cache_dir).map_err(|e| CacheError::io(&self.cache_dir, e))?;

        let entry = CacheEntry { timestamp, data };
        let json = serde_json::to_vec_pretty(&entry).map_err(|source| CacheError::Serialize {
            key: key.to_string(),
            source,
        })?;

        let mut tmp =
            NamedTempFile::new_in(&self.cache_dir).map_err(|e| CacheError::io(&self.cache_dir, e))?;
        tmp.write_all(&json).map_err(|e| CacheError::io(&path, e))?;
        tmp.persist(&path)
            .map_err(|e| CacheError::io(&path, e.error))?;
        Ok(())
    }

    /// Reads the entry for `key` regardless of age
    ///
    /// Returns `Some(CachedData)` with `is_expired` computed against `ttl`, or
    /// `None` if the entry doesn't exist or cannot be read.
    pub fn read<T: DeserializeOwned>(&self, key: &str, ttl: Ttl) -> Option<CachedData<T>> {
        self.read_at(key, ttl, Utc::now())
    }

    fn read_at<T: DeserializeOwned>(
        &self,
        key: &str,
        ttl: Ttl,
        now: DateTime<Utc>,
    ) -> Option<CachedData<T>> {
        match self.try_read_at(key, ttl, now) {
            Ok(cached) => cached,
            Err(e) => {
                warn!(key, error = %e, "Could not read cache entry, treating as miss");
                None
            }
        }
    }

    /// Reads the entry for `key` regardless of age, surfacing I/O and parse errors
    ///
    /// A missing entry is `Ok(None)`, not an error.
    pub fn try_read<T: DeserializeOwned>(
        &self,
        key: &str,
        ttl: Ttl,
    ) -> Result<Option<CachedData<T>>, CacheError> {
        self.try_read_at(key, ttl, Utc::now())
    }

    fn try_read_at<T: DeserializeOwned>(
        &self,
        key: &str,
        ttl: Ttl,
        now: DateTime<Utc>,
    ) -> Result<Option<CachedData<T>>, CacheError> {
        let path = self.cache_path(key)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&path, e)),
        };
        let entry: CacheEntry<T> =
            serde_json::from_str(&content).map_err(|source| CacheError::Corrupt {
                key: key.to_string(),
                source,
            })?;

        Ok(Some(CachedData {
            is_expired: !ttl.is_fresh(entry.timestamp, now),
            cached_at: entry.timestamp,
            data: entry.data,
        }))
    }

    /// Returns the value for `key` only if it is fresh under `ttl`
    ///
    /// Expired entries yield `None` but are left on disk.
    pub fn get<T: DeserializeOwned>(&self, key: &str, ttl: Ttl) -> Option<T> {
        self.get_at(key, ttl, Utc::now())
    }

    fn get_at<T: DeserializeOwned>(&self, key: &str, ttl: Ttl, now: DateTime<Utc>) -> Option<T> {
        let cached = self.read_at::<T>(key, ttl, now)?;
        if cached.is_expired {
            debug!(key, cached_at = %cached.cached_at, "Cache entry expired");
            return None;
        }
        debug!(key, "Cache hit");
        Some(cached.data)
    }

    /// Deletes the entry for `key`, or every entry when `key` is `None`
    ///
    /// Returns the number of entries removed. Missing files are not errors.
    pub fn clear(&self, key: Option<&str>) -> usize {
        let removed = match key {
            Some(key) => match self.cache_path(key) {
                Ok(path) => usize::from(self.remove_entry(&path)),
                Err(e) => {
                    warn!(key, error = %e, "Could not clear cache entry");
                    0
                }
            },
            None => self
                .entry_files()
                .iter()
                .filter(|file| self.remove_entry(&file.path))
                .count(),
        };
        info!(key = key.unwrap_or("*"), removed, "Cleared cache");
        removed
    }

    /// Counts entries and their total size
    pub fn stats(&self) -> CacheStats {
        let files = self.entry_files();
        CacheStats {
            entry_count: files.len(),
            total_size_bytes: files.iter().map(|f| f.size).sum(),
        }
    }

    /// Lists the keys currently stored, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entry_files().into_iter().map(|f| f.key).collect();
        keys.sort();
        keys
    }

    /// Deletes entries until the cache satisfies `policy`
    ///
    /// Unreadable entries go first, then entries older than `max_age`, then
    /// the oldest-written entries until both `max_entries` and
    /// `max_total_bytes` hold. Never runs implicitly on reads or writes.
    pub fn sweep(&self, policy: &SweepPolicy) -> SweepReport {
        self.sweep_at(policy, Utc::now())
    }

    fn sweep_at(&self, policy: &SweepPolicy, now: DateTime<Utc>) -> SweepReport {
        let mut removed = Vec::new();
        let mut live: Vec<(EntryFile, DateTime<Utc>)> = Vec::new();

        for file in self.entry_files() {
            match Self::entry_timestamp(&file.path) {
                Some(timestamp) => live.push((file, timestamp)),
                None => {
                    warn!(key = %file.key, "Removing unreadable cache entry");
                    if self.remove_entry(&file.path) {
                        removed.push(file.key);
                    }
                }
            }
        }

        if let Some(max_age) = policy.max_age {
            live.retain(|(file, timestamp)| {
                if now - *timestamp < max_age {
                    return true;
                }
                if self.remove_entry(&file.path) {
                    removed.push(file.key.clone());
                }
                false
            });
        }

        live.sort_by_key(|(_, timestamp)| *timestamp);
        let mut total: u64 = live.iter().map(|(file, _)| file.size).sum();
        let mut remaining = live.len();
        for (file, _) in &live {
            let over_count = policy.max_entries.is_some_and(|max| remaining > max);
            let over_size = policy.max_total_bytes.is_some_and(|max| total > max);
            if !over_count && !over_size {
                break;
            }
            if self.remove_entry(&file.path) {
                removed.push(file.key.clone());
            }
            total = total.saturating_sub(file.size);
            remaining -= 1;
        }

        let report = SweepReport {
            removed,
            remaining: self.stats(),
        };
        info!(
            removed = report.removed.len(),
            remaining = report.remaining.entry_count,
            "Swept cache"
        );
        report
    }

    /// Reads only the timestamp of an entry file
    fn entry_timestamp(path: &Path) -> Option<DateTime<Utc>> {
        let content = fs::read_to_string(path).ok()?;
        let entry: CacheEntry<IgnoredAny> = serde_json::from_str(&content).ok()?;
        Some(entry.timestamp)
    }

    /// Removes one entry file, returning true if it existed and was deleted
    fn remove_entry(&self, path: &Path) -> bool {
        match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not remove cache entry");
                false
            }
        }
    }

    /// Lists `*.json` entry files in the cache directory
    fn entry_files(&self) -> Vec<EntryFile> {
        let dir = match fs::read_dir(&self.cache_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(dir = %self.cache_dir.display(), error = %e, "Could not list cache directory");
                return Vec::new();
            }
        };

        dir.filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                    return None;
                }
                let metadata = entry.metadata().ok()?;
                if !metadata.is_file() {
                    return None;
                }
                let stem = path.file_stem()?.to_str()?;
                let key = Self::decode_key(stem).unwrap_or_else(|| stem.to_string());
                Some(EntryFile {
                    key,
                    path,
                    size: metadata.len(),
                })
            })
            .collect()
    }
}
