//! Cache module for storing fetched datasets to disk
//!
//! This module provides a cache manager that persists values to the filesystem
//! with a write timestamp, and a read-through wrapper that refreshes entries from
//! a live fetch and falls back to stale entries when the fetch fails. Cache
//! failures are logged and degrade to a miss; they never reach the caller.

mod error;
mod manager;
mod read_through;

pub use error::CacheError;
pub use manager::{CacheManager, CacheStats, CachedData, SweepPolicy, SweepReport, Ttl};
pub use read_through::{EmptyPolicy, Emptiness, FetchOutcome, Fetched, ReadThrough, Source};
