//! cockpit library
//!
//! A TTL file cache with read-through stale fallback, retry with backoff, and
//! a GitHub client that aggregates account statistics for dashboards. Exposed
//! as a library for the binary and integration tests.

pub mod cache;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod github;
pub mod logging;
pub mod retry;
