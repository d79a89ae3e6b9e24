//! GitHub statistics for the dashboard
//!
//! [`GitHubClient`] fans out over the account's repositories and folds the
//! per-repository results into the aggregates defined in [`models`].

mod client;
pub mod filters;
pub mod models;

pub use client::{GitHubClient, GitHubError};
pub use models::{
    ActiveRepo, ActivityMetrics, CommitSummary, HealthStatus, IssueSummary, PullRequestSummary,
    RateLimit, ReleaseSummary, RepoStats, RepoSummary, Repository, RunOutcome, WorkflowHealth,
    WorkflowRun,
};
