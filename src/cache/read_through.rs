//! Read-through fetch wrapper with stale fallback
//!
//! [`ReadThrough`] runs a caller-supplied fetch, stores successful results in the
//! [`CacheManager`], and on failure returns the last cached value flagged as
//! stale. It never returns an error: the worst outcome is `None`, or the
//! caller's default when using [`ReadThrough::get_or_default`]. A fetch that
//! panics counts as a failed fetch.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, info, warn};

use super::{CacheManager, Ttl};

/// Decides whether a fetched value counts as "no data"
///
/// Collections are empty when they have no elements. Numbers are never empty,
/// so a legitimate zero is cached like any other value.
pub trait Emptiness {
    fn is_empty_payload(&self) -> bool;
}

impl<T> Emptiness for Vec<T> {
    fn is_empty_payload(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> Emptiness for BTreeMap<K, V> {
    fn is_empty_payload(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V, S> Emptiness for HashMap<K, V, S> {
    fn is_empty_payload(&self) -> bool {
        self.is_empty()
    }
}

impl Emptiness for String {
    fn is_empty_payload(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Emptiness> Emptiness for Option<T> {
    fn is_empty_payload(&self) -> bool {
        self.as_ref().map_or(true, Emptiness::is_empty_payload)
    }
}

impl Emptiness for serde_json::Value {
    fn is_empty_payload(&self) -> bool {
        match self {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            serde_json::Value::Object(map) => map.is_empty(),
            serde_json::Value::Bool(_) | serde_json::Value::Number(_) => false,
        }
    }
}

macro_rules! never_empty {
    ($($t:ty),*) => {
        $(impl Emptiness for $t {
            fn is_empty_payload(&self) -> bool {
                false
            }
        })*
    };
}

never_empty!(bool, i32, i64, u32, u64, usize, f64);

/// Classified result of a fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    /// The fetch produced data
    Success(T),
    /// The fetch succeeded but produced an empty value
    Empty(T),
    /// The fetch failed
    Failure(String),
}

impl<T: Emptiness> FetchOutcome<T> {
    /// Classifies a fetch result using [`Emptiness`]
    pub fn from_result<E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(data) if data.is_empty_payload() => FetchOutcome::Empty(data),
            Ok(data) => FetchOutcome::Success(data),
            Err(e) => FetchOutcome::Failure(e.to_string()),
        }
    }
}

/// What to do when a fetch returns an empty value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyPolicy {
    /// Treat empty like a failed fetch and fall back to the cache
    #[default]
    Fallback,
    /// Treat empty as real data: return it and cache it
    Accept,
}

/// Where a returned value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Fetched just now
    Live,
    /// Fresh cache entry, no fetch made
    Cached,
    /// Cached entry returned because the fetch failed
    Stale,
    /// Caller-supplied default; neither fetch nor cache had data
    Default,
}

/// A value returned by [`ReadThrough`]
#[derive(Debug, Clone, Serialize)]
pub struct Fetched<T> {
    pub data: T,
    pub source: Source,
    /// Write time of the cache entry, when the value came from cache
    pub cached_at: Option<DateTime<Utc>>,
}

impl<T> Fetched<T> {
    fn live(data: T) -> Self {
        Self {
            data,
            source: Source::Live,
            cached_at: None,
        }
    }

    pub(crate) fn fallback_default(data: T) -> Self {
        Self {
            data,
            source: Source::Default,
            cached_at: None,
        }
    }

    /// Converts the payload, keeping provenance
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            data: f(self.data),
            source: self.source,
            cached_at: self.cached_at,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.source == Source::Stale
    }

    /// Appends a staleness marker to a display label
    pub fn annotate(&self, label: &str) -> String {
        if self.is_stale() {
            format!("{} (stale)", label)
        } else {
            label.to_string()
        }
    }
}

/// Coordinates a live fetch, the cache, and stale fallback
#[derive(Debug, Clone)]
pub struct ReadThrough {
    cache: CacheManager,
    empty_policy: EmptyPolicy,
    enabled: bool,
}

impl ReadThrough {
    pub fn new(cache: CacheManager) -> Self {
        Self {
            cache,
            empty_policy: EmptyPolicy::default(),
            enabled: true,
        }
    }

    /// Sets the policy used by [`ReadThrough::get_with_cache`]
    pub fn with_empty_policy(mut self, empty_policy: EmptyPolicy) -> Self {
        self.empty_policy = empty_policy;
        self
    }

    /// Turns caching on or off; when off, fetch results pass straight through
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Fetches fresh data, falling back to any cached value on failure
    ///
    /// 1. A successful fetch is written to the cache (always, refreshing the
    ///    timestamp) and returned as [`Source::Live`].
    /// 2. A failed fetch, or an empty one under [`EmptyPolicy::Fallback`],
    ///    returns the cached entry regardless of age as [`Source::Stale`].
    /// 3. With nothing cached, returns `None`.
    pub async fn get_with_cache<T, E, F, Fut>(&self, key: &str, fetch: F) -> Option<Fetched<T>>
    where
        T: Serialize + DeserializeOwned + Emptiness,
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get_with_cache_policy(key, self.empty_policy, fetch)
            .await
    }

    /// Same as [`ReadThrough::get_with_cache`] with an explicit empty policy
    pub async fn get_with_cache_policy<T, E, F, Fut>(
        &self,
        key: &str,
        policy: EmptyPolicy,
        fetch: F,
    ) -> Option<Fetched<T>>
    where
        T: Serialize + DeserializeOwned + Emptiness,
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let outcome = match AssertUnwindSafe(async move { fetch().await })
            .catch_unwind()
            .await
        {
            Ok(result) => FetchOutcome::from_result(result),
            Err(_) => FetchOutcome::Failure("fetch panicked".to_string()),
        };
        self.resolve(key, policy, outcome)
    }

    /// Like [`ReadThrough::get_with_cache_policy`], but returns `default` as
    /// [`Source::Default`] when neither the fetch nor the cache has data
    pub async fn get_or_default<T, E, F, Fut>(
        &self,
        key: &str,
        policy: EmptyPolicy,
        fetch: F,
        default: T,
    ) -> Fetched<T>
    where
        T: Serialize + DeserializeOwned + Emptiness,
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get_with_cache_policy(key, policy, fetch).await {
            Some(fetched) => fetched,
            None => {
                warn!(key, "No data available, using default");
                Fetched::fallback_default(default)
            }
        }
    }

    /// Returns a fresh cache entry without fetching; otherwise fetches as
    /// [`ReadThrough::get_with_cache_policy`] does
    pub async fn cached_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Ttl,
        policy: EmptyPolicy,
        fetch: F,
    ) -> Option<Fetched<T>>
    where
        T: Serialize + DeserializeOwned + Emptiness,
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.enabled {
            if let Some(cached) = self.cache.read::<T>(key, ttl) {
                if !cached.is_expired {
                    debug!(key, cached_at = %cached.cached_at, "Using fresh cached data");
                    return Some(Fetched {
                        data: cached.data,
                        source: Source::Cached,
                        cached_at: Some(cached.cached_at),
                    });
                }
            }
        }
        self.get_with_cache_policy(key, policy, fetch).await
    }

    fn resolve<T>(&self, key: &str, policy: EmptyPolicy, outcome: FetchOutcome<T>) -> Option<Fetched<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let reason = match outcome {
            FetchOutcome::Success(data) => return Some(self.store(key, data)),
            FetchOutcome::Empty(data) if policy == EmptyPolicy::Accept => {
                return Some(self.store(key, data))
            }
            FetchOutcome::Empty(_) => "fetch returned no data".to_string(),
            FetchOutcome::Failure(reason) => reason,
        };

        if !self.enabled {
            warn!(key, reason = %reason, "Fetch failed and caching is disabled");
            return None;
        }

        match self.cache.read::<T>(key, Ttl::Unbounded) {
            Some(cached) => {
                info!(key, reason = %reason, cached_at = %cached.cached_at, "Using stale cached data");
                Some(Fetched {
                    data: cached.data,
                    source: Source::Stale,
                    cached_at: Some(cached.cached_at),
                })
            }
            None => {
                warn!(key, reason = %reason, "Fetch failed and no cached data available");
                None
            }
        }
    }

    fn store<T: Serialize>(&self, key: &str, data: T) -> Fetched<T> {
        if self.enabled {
            self.cache.put(key, &data);
        }
        Fetched::live(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::{json, Value};
    use std::cell::Cell;
    use tempfile::TempDir;

    fn create_read_through() -> (ReadThrough, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let read_through = ReadThrough::new(CacheManager::with_dir(temp_dir.path()));
        (read_through, temp_dir)
    }

    fn long_ago() -> DateTime<Utc> {
        Utc::now() - Duration::days(30)
    }

    async fn panicking_fetch() -> Result<Value, String> {
        panic!("client bug")
    }

    #[tokio::test]
    async fn test_success_is_live_and_cached() {
        let (rt, _temp_dir) = create_read_through();

        let fetched = rt
            .get_with_cache("stats", || async { Ok::<_, String>(json!({"stars": 42})) })
            .await
            .unwrap();

        assert_eq!(fetched.source, Source::Live);
        assert!(!fetched.is_stale());
        assert_eq!(
            rt.cache().get::<Value>("stats", Ttl::Unbounded),
            Some(json!({"stars": 42}))
        );
    }

    #[tokio::test]
    async fn test_success_refreshes_timestamp_even_when_unchanged() {
        let (rt, _temp_dir) = create_read_through();
        rt.cache().try_put_at("stars", &json!([42]), long_ago()).unwrap();

        rt.get_with_cache("stars", || async { Ok::<_, String>(json!([42])) })
            .await
            .unwrap();

        let cached = rt.cache().read::<Value>("stars", Ttl::hours(1)).unwrap();
        assert!(!cached.is_expired);
        assert!(cached.cached_at > long_ago());
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_expired_entry() {
        let (rt, _temp_dir) = create_read_through();
        rt.cache().try_put_at("stars", &json!({"total": 42}), long_ago()).unwrap();

        assert_eq!(rt.cache().get::<Value>("stars", Ttl::hours(1)), None);

        let fetched = rt
            .get_with_cache("stars", || async { Err::<Value, _>("network down") })
            .await
            .unwrap();

        assert_eq!(fetched.data, json!({"total": 42}));
        assert!(fetched.is_stale());
        assert_eq!(fetched.annotate("Stars"), "Stars (stale)");
        assert!(fetched.cached_at.is_some());
    }

    #[tokio::test]
    async fn test_panicking_fetch_falls_back_to_cache() {
        let (rt, _temp_dir) = create_read_through();
        rt.cache().try_put_at("stars", &json!([7]), long_ago()).unwrap();

        let fetched = rt.get_with_cache("stars", panicking_fetch).await.unwrap();

        assert_eq!(fetched.source, Source::Stale);
        assert_eq!(fetched.data, json!([7]));
    }

    #[tokio::test]
    async fn test_panicking_fetch_without_cache_returns_default() {
        let (rt, _temp_dir) = create_read_through();

        let fetched = rt
            .get_or_default("stars", EmptyPolicy::Fallback, panicking_fetch, json!([]))
            .await;

        assert_eq!(fetched.source, Source::Default);
        assert_eq!(rt.cache().stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_failure_without_cache_returns_none() {
        let (rt, _temp_dir) = create_read_through();

        let fetched = rt
            .get_with_cache("missing", || async { Err::<Value, _>("boom") })
            .await;

        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn test_get_or_default_returns_default_on_total_failure() {
        let (rt, _temp_dir) = create_read_through();

        let fetched = rt
            .get_or_default(
                "missing",
                EmptyPolicy::Fallback,
                || async { Err::<Vec<u32>, _>("boom") },
                vec![0, 0, 0],
            )
            .await;

        assert_eq!(fetched.source, Source::Default);
        assert_eq!(fetched.data, vec![0, 0, 0]);
        assert!(!fetched.is_stale());
        assert_eq!(fetched.annotate("Commits"), "Commits");
    }

    #[tokio::test]
    async fn test_empty_mapping_triggers_fallback_under_fallback_policy() {
        let (rt, _temp_dir) = create_read_through();
        let mut previous = BTreeMap::new();
        previous.insert("Rust".to_string(), 100u64);
        rt.cache().try_put("languages", &previous).unwrap();

        let fetched = rt
            .get_with_cache_policy("languages", EmptyPolicy::Fallback, || async {
                Ok::<_, String>(BTreeMap::<String, u64>::new())
            })
            .await
            .unwrap();

        assert_eq!(fetched.source, Source::Stale);
        assert_eq!(fetched.data, previous);
        assert_eq!(
            rt.cache().get::<BTreeMap<String, u64>>("languages", Ttl::Unbounded),
            Some(previous),
            "Empty result must not overwrite the cache"
        );
    }

    #[tokio::test]
    async fn test_empty_mapping_is_data_under_accept_policy() {
        let (rt, _temp_dir) = create_read_through();
        rt.cache().try_put("issues", &vec!["old issue"]).unwrap();

        let fetched = rt
            .get_with_cache_policy("issues", EmptyPolicy::Accept, || async {
                Ok::<_, String>(Vec::<String>::new())
            })
            .await
            .unwrap();

        assert_eq!(fetched.source, Source::Live);
        assert!(fetched.data.is_empty());
        assert_eq!(
            rt.cache().get::<Vec<String>>("issues", Ttl::Unbounded),
            Some(Vec::new())
        );
    }

    #[tokio::test]
    async fn test_default_policy_is_fallback() {
        let (rt, _temp_dir) = create_read_through();

        let fetched = rt
            .get_with_cache("empty", || async { Ok::<_, String>(json!({})) })
            .await;

        assert!(fetched.is_none());
        assert!(rt.cache().keys().is_empty());
    }

    #[tokio::test]
    async fn test_cached_or_fetch_skips_fetch_when_fresh() {
        let (rt, _temp_dir) = create_read_through();
        rt.cache().try_put("stats", &json!({"stars": 1})).unwrap();
        let calls = Cell::new(0);

        let fetched = rt
            .cached_or_fetch("stats", Ttl::hours(1), EmptyPolicy::Fallback, || {
                calls.set(calls.get() + 1);
                async { Ok::<_, String>(json!({"stars": 2})) }
            })
            .await
            .unwrap();

        assert_eq!(calls.get(), 0);
        assert_eq!(fetched.source, Source::Cached);
        assert_eq!(fetched.data, json!({"stars": 1}));
    }

    #[tokio::test]
    async fn test_cached_or_fetch_fetches_when_expired() {
        let (rt, _temp_dir) = create_read_through();
        rt.cache().try_put_at("stats", &json!({"stars": 1}), long_ago()).unwrap();
        let calls = Cell::new(0);

        let fetched = rt
            .cached_or_fetch("stats", Ttl::hours(1), EmptyPolicy::Fallback, || {
                calls.set(calls.get() + 1);
                async { Ok::<_, String>(json!({"stars": 2})) }
            })
            .await
            .unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(fetched.source, Source::Live);
        assert_eq!(fetched.data, json!({"stars": 2}));
    }

    #[tokio::test]
    async fn test_disabled_cache_passes_through() {
        let (rt, _temp_dir) = create_read_through();
        let rt = rt.with_enabled(false);

        let fetched = rt
            .get_with_cache("k", || async { Ok::<_, String>(json!([1])) })
            .await
            .unwrap();
        assert_eq!(fetched.source, Source::Live);
        assert!(rt.cache().keys().is_empty());

        rt.cache().try_put("k", &json!([0])).unwrap();
        let failed = rt
            .get_with_cache("k", || async { Err::<Value, _>("down") })
            .await;
        assert!(failed.is_none());
    }

    #[test]
    fn test_fetch_outcome_classification() {
        assert_eq!(
            FetchOutcome::from_result(Ok::<_, String>(vec![1])),
            FetchOutcome::Success(vec![1])
        );
        assert_eq!(
            FetchOutcome::from_result(Ok::<_, String>(Vec::<i32>::new())),
            FetchOutcome::Empty(Vec::new())
        );
        assert_eq!(
            FetchOutcome::from_result(Err::<Vec<i32>, _>("rate limited")),
            FetchOutcome::Failure("rate limited".to_string())
        );
        assert_eq!(
            FetchOutcome::from_result(Ok::<_, String>(0u64)),
            FetchOutcome::Success(0)
        );
    }

    #[test]
    fn test_json_value_emptiness() {
        assert!(Value::Null.is_empty_payload());
        assert!(json!({}).is_empty_payload());
        assert!(json!([]).is_empty_payload());
        assert!(json!("").is_empty_payload());
        assert!(!json!(0).is_empty_payload());
        assert!(!json!(false).is_empty_payload());
        assert!(!json!({"a": null}).is_empty_payload());
    }
}
