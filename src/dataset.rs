//! Dashboard datasets
//!
//! Each [`Dataset`] names one GitHub aggregate the dashboard renders. The
//! [`DatasetLoader`] fetches it with retries, caches it, and falls back to the
//! last cached copy or an empty default, so a dashboard build always has
//! something to show.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;

use crate::cache::{EmptyPolicy, Emptiness, Fetched, ReadThrough, Source, Ttl};
use crate::github::{
    ActivityMetrics, CommitSummary, GitHubClient, GitHubError, IssueSummary, PullRequestSummary,
    ReleaseSummary, RepoStats, WorkflowHealth,
};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Trailing window used when none is given
pub const DEFAULT_DAYS: u32 = 30;

/// Owner label used in cache keys when the token owner is implied
const SELF_OWNER: &str = "self";

/// A dataset the dashboard can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// Stars, forks and languages across repositories
    RepoStats,
    /// Activity counters over the window
    Activity,
    /// Recent commits, excluding bot and dashboard-only commits
    Commits,
    /// Pull requests merged within the window
    PullRequests,
    /// Currently open issues
    Issues,
    /// Releases published within the window
    Releases,
    /// CI health from the latest workflow runs
    Workflows,
}

impl Dataset {
    pub const ALL: [Dataset; 7] = [
        Dataset::RepoStats,
        Dataset::Activity,
        Dataset::Commits,
        Dataset::PullRequests,
        Dataset::Issues,
        Dataset::Releases,
        Dataset::Workflows,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Dataset::RepoStats => "repo_stats",
            Dataset::Activity => "activity",
            Dataset::Commits => "commits",
            Dataset::PullRequests => "pull_requests",
            Dataset::Issues => "issues",
            Dataset::Releases => "releases",
            Dataset::Workflows => "workflows",
        }
    }

    /// Cache key in the `<name>_<user>_<days>` form
    pub fn cache_key(&self, owner: &str, days: u32) -> String {
        format!("{}_{}_{}", self.name(), owner, days)
    }

    /// Aggregates fall back to the cache when empty; lists accept empty results
    pub fn empty_policy(&self) -> EmptyPolicy {
        match self {
            Dataset::RepoStats | Dataset::Activity | Dataset::Workflows => EmptyPolicy::Fallback,
            Dataset::Commits
            | Dataset::PullRequests
            | Dataset::Issues
            | Dataset::Releases => EmptyPolicy::Accept,
        }
    }
}

/// What `cockpit fetch` prints
#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub dataset: Dataset,
    pub source: Source,
    pub stale: bool,
    pub cached_at: Option<DateTime<Utc>>,
    pub data: Value,
}

impl DatasetReport {
    pub fn new(dataset: Dataset, fetched: Fetched<Value>) -> Self {
        Self {
            dataset,
            source: fetched.source,
            stale: fetched.is_stale(),
            cached_at: fetched.cached_at,
            data: fetched.data,
        }
    }
}

/// Loads datasets through the cache
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    client: Option<GitHubClient>,
    read_through: ReadThrough,
    retry: RetryPolicy,
    owner: String,
    ttl: Ttl,
}

impl DatasetLoader {
    /// Creates a loader
    ///
    /// # Arguments
    /// * `client` - GitHub client; `None` serves only cached data or defaults
    /// * `username` - Configured account, used in cache keys
    pub fn new(
        client: Option<GitHubClient>,
        read_through: ReadThrough,
        retry: RetryPolicy,
        username: Option<&str>,
        ttl: Ttl,
    ) -> Self {
        Self {
            client,
            read_through,
            retry,
            owner: username.unwrap_or(SELF_OWNER).to_string(),
            ttl,
        }
    }

    pub fn cache_key(&self, dataset: Dataset, days: u32) -> String {
        dataset.cache_key(&self.owner, days)
    }

    fn client(&self) -> Result<&GitHubClient, GitHubError> {
        self.client.as_ref().ok_or(GitHubError::MissingToken)
    }

    /// Loads `dataset` over the last `days` days
    ///
    /// With `cache_first`, a cache entry younger than the TTL is returned
    /// without touching the network. Never fails: the worst case is an empty
    /// payload with [`Source::Default`].
    pub async fn load(&self, dataset: Dataset, days: u32, cache_first: bool) -> Fetched<Value> {
        let key = self.cache_key(dataset, days);
        let policy = dataset.empty_policy();

        match dataset {
            Dataset::RepoStats => {
                self.load_as(&key, policy, cache_first, RepoStats::default(), move || async move {
                    self.client()?.repo_stats().await
                })
                .await
            }
            Dataset::Activity => {
                self.load_as(
                    &key,
                    policy,
                    cache_first,
                    ActivityMetrics::default(),
                    move || async move { self.client()?.activity_metrics(days).await },
                )
                .await
            }
            Dataset::Commits => {
                self.load_as(
                    &key,
                    policy,
                    cache_first,
                    Vec::<CommitSummary>::new(),
                    move || async move { self.client()?.recent_commits(days, true).await },
                )
                .await
            }
            Dataset::PullRequests => {
                self.load_as(
                    &key,
                    policy,
                    cache_first,
                    Vec::<PullRequestSummary>::new(),
                    move || async move { self.client()?.merged_prs(days).await },
                )
                .await
            }
            Dataset::Issues => {
                self.load_as(
                    &key,
                    policy,
                    cache_first,
                    Vec::<IssueSummary>::new(),
                    move || async move { self.client()?.open_issues().await },
                )
                .await
            }
            Dataset::Releases => {
                self.load_as(
                    &key,
                    policy,
                    cache_first,
                    Vec::<ReleaseSummary>::new(),
                    move || async move { self.client()?.recent_releases(days).await },
                )
                .await
            }
            Dataset::Workflows => {
                self.load_as(
                    &key,
                    policy,
                    cache_first,
                    WorkflowHealth::default(),
                    move || async move { self.client()?.workflow_health(None).await },
                )
                .await
            }
        }
    }

    /// Runs the typed fetch so emptiness is judged on the aggregate, then
    /// converts the result to JSON
    async fn load_as<T, F, Fut>(
        &self,
        key: &str,
        policy: EmptyPolicy,
        cache_first: bool,
        default: T,
        op: F,
    ) -> Fetched<Value>
    where
        T: Serialize + DeserializeOwned + Emptiness,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GitHubError>>,
    {
        let fetch = move || async move {
            self.client()?;
            retry_with_backoff(&self.retry, op).await
        };

        let fetched = if cache_first {
            self.read_through
                .cached_or_fetch(key, self.ttl, policy, fetch)
                .await
                .unwrap_or_else(|| Fetched::fallback_default(default))
        } else {
            self.read_through
                .get_or_default(key, policy, fetch, default)
                .await
        };

        fetched.map(|data| serde_json::to_value(data).unwrap_or_default())
    }
}
