//! GitHub REST API response types and the aggregates built from them

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cache::Emptiness;

/// Number of workflow outcomes kept in [`WorkflowHealth::recent`]
const RECENT_OUTCOMES: usize = 10;

/// Number of active repositories listed in [`ActivityMetrics::active_repos`]
const TOP_ACTIVE_REPOS: usize = 5;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ApiUser {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRateLimitResponse {
    pub resources: ApiRateLimitResources,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRateLimitResources {
    pub core: ApiRateLimitCore,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRateLimitCore {
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp of the window reset
    pub reset: i64,
}

/// A repository as returned by the repository listing endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
    pub language: Option<String>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiCommit {
    pub sha: String,
    pub html_url: String,
    pub commit: ApiCommitDetail,
    #[serde(default)]
    pub files: Option<Vec<ApiCommitFile>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiCommitDetail {
    pub message: String,
    pub author: Option<ApiGitAuthor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiGitAuthor {
    pub name: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiCommitFile {
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiPull {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiIssue {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Present when the issue is actually a pull request
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRelease {
    pub tag_name: String,
    pub name: Option<String>,
    pub html_url: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiWorkflowRuns {
    #[serde(default)]
    pub workflow_runs: Vec<ApiWorkflowRun>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiWorkflowRun {
    pub id: u64,
    pub name: Option<String>,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub html_url: String,
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// API quota for the core REST resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    pub remaining: u32,
    pub limit: u32,
    pub reset: DateTime<Utc>,
    pub used_percent: f64,
}

impl From<ApiRateLimitCore> for RateLimit {
    fn from(core: ApiRateLimitCore) -> Self {
        let used_percent = if core.limit == 0 {
            0.0
        } else {
            (1.0 - f64::from(core.remaining) / f64::from(core.limit)) * 100.0
        };
        Self {
            remaining: core.remaining,
            limit: core.limit,
            reset: Utc.timestamp_opt(core.reset, 0).single().unwrap_or_default(),
            used_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoSummary {
    pub name: String,
    pub stars: u64,
    pub updated: Option<DateTime<Utc>>,
    pub url: String,
}

/// Totals across the user's own, non-fork repositories
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoStats {
    pub total_stars: u64,
    pub total_forks: u64,
    pub total_repos: usize,
    /// Bytes of code per language
    pub languages: BTreeMap<String, u64>,
    pub repos: Vec<RepoSummary>,
}

impl RepoStats {
    /// Sums counters over `repos`; languages are merged in separately
    pub fn from_repos(repos: &[Repository]) -> Self {
        Self {
            total_stars: repos.iter().map(|r| r.stargazers_count).sum(),
            total_forks: repos.iter().map(|r| r.forks_count).sum(),
            total_repos: repos.len(),
            languages: BTreeMap::new(),
            repos: repos
                .iter()
                .map(|r| RepoSummary {
                    name: r.name.clone(),
                    stars: r.stargazers_count,
                    updated: r.updated_at,
                    url: r.html_url.clone(),
                })
                .collect(),
        }
    }

    pub fn add_languages(&mut self, languages: BTreeMap<String, u64>) {
        for (language, bytes) in languages {
            *self.languages.entry(language).or_insert(0) += bytes;
        }
    }
}

impl Emptiness for RepoStats {
    fn is_empty_payload(&self) -> bool {
        self.total_repos == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveRepo {
    pub name: String,
    pub full_name: String,
    pub url: String,
    pub pushed_at: DateTime<Utc>,
    pub stars: u64,
    pub language: Option<String>,
}

/// Repositories pushed after `cutoff`, most recent first
pub fn active_repos(repos: &[Repository], cutoff: DateTime<Utc>) -> Vec<ActiveRepo> {
    let mut active: Vec<ActiveRepo> = repos
        .iter()
        .filter_map(|r| {
            let pushed_at = r.pushed_at.filter(|pushed| *pushed > cutoff)?;
            Some(ActiveRepo {
                name: r.name.clone(),
                full_name: r.full_name.clone(),
                url: r.html_url.clone(),
                pushed_at,
                stars: r.stargazers_count,
                language: r.language.clone(),
            })
        })
        .collect();
    active.sort_by(|a, b| b.pushed_at.cmp(&a.pushed_at));
    active
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitSummary {
    /// Abbreviated (7 character) commit hash
    pub sha: String,
    /// First line of the commit message
    pub message: String,
    pub repo: String,
    pub repo_url: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    pub url: String,
}

impl CommitSummary {
    pub(crate) fn from_api(commit: &ApiCommit, repo: &Repository) -> Self {
        let author = commit.commit.author.as_ref();
        Self {
            sha: commit.sha.chars().take(7).collect(),
            message: commit
                .commit
                .message
                .lines()
                .next()
                .unwrap_or_default()
                .to_string(),
            repo: repo.name.clone(),
            repo_url: repo.html_url.clone(),
            author: author
                .and_then(|a| a.name.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            date: author.and_then(|a| a.date),
            url: commit.html_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    pub repo: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub url: String,
}

impl PullRequestSummary {
    pub(crate) fn from_api(pull: ApiPull, repo: &Repository) -> Self {
        Self {
            number: pull.number,
            title: pull.title,
            repo: repo.name.clone(),
            created_at: pull.created_at,
            merged_at: pull.merged_at,
            url: pull.html_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub number: u64,
    pub title: String,
    pub repo: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub url: String,
}

impl IssueSummary {
    pub(crate) fn from_api(issue: ApiIssue, repo: &Repository) -> Self {
        Self {
            number: issue.number,
            title: issue.title,
            repo: repo.name.clone(),
            created_at: issue.created_at,
            closed_at: issue.closed_at,
            url: issue.html_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseSummary {
    pub tag: String,
    pub name: String,
    pub repo: String,
    pub published_at: DateTime<Utc>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub repo: String,
    pub url: String,
}

impl WorkflowRun {
    pub(crate) fn from_api(run: ApiWorkflowRun, repo: &str) -> Self {
        Self {
            id: run.id,
            name: run.name.unwrap_or_default(),
            status: run.status.unwrap_or_default(),
            conclusion: run.conclusion,
            created_at: run.created_at,
            updated_at: run.updated_at,
            repo: repo.to_string(),
            url: run.html_url,
        }
    }

    fn outcome(&self) -> RunOutcome {
        match self.conclusion.as_deref() {
            Some("success") => RunOutcome::Success,
            Some("failure") => RunOutcome::Failure,
            _ if self.status == "in_progress" => RunOutcome::InProgress,
            _ => RunOutcome::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Operational,
    Running,
    Degraded,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failure,
    InProgress,
    Other,
}

/// CI health derived from the most recent workflow runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowHealth {
    pub status: HealthStatus,
    pub last_run: Option<WorkflowRun>,
    pub last_success: Option<WorkflowRun>,
    /// Percentage of runs that concluded successfully
    pub success_rate: f64,
    /// Outcomes of the latest runs, newest first
    pub recent: Vec<RunOutcome>,
}

impl WorkflowHealth {
    /// Summarizes `runs`, which must be sorted newest first
    pub fn from_runs(runs: &[WorkflowRun]) -> Self {
        let Some(last_run) = runs.first() else {
            return Self::default();
        };

        let successful = runs
            .iter()
            .filter(|r| r.outcome() == RunOutcome::Success)
            .count();
        let failed = runs
            .iter()
            .filter(|r| r.outcome() == RunOutcome::Failure)
            .count();

        let status = if last_run.outcome() == RunOutcome::Success {
            HealthStatus::Operational
        } else if last_run.status == "in_progress" {
            HealthStatus::Running
        } else if failed * 2 > successful {
            HealthStatus::Degraded
        } else {
            HealthStatus::Operational
        };

        Self {
            status,
            last_run: Some(last_run.clone()),
            last_success: runs
                .iter()
                .find(|r| r.outcome() == RunOutcome::Success)
                .cloned(),
            success_rate: successful as f64 / runs.len() as f64 * 100.0,
            recent: runs
                .iter()
                .take(RECENT_OUTCOMES)
                .map(WorkflowRun::outcome)
                .collect(),
        }
    }
}

impl Emptiness for WorkflowHealth {
    fn is_empty_payload(&self) -> bool {
        self.last_run.is_none()
    }
}

/// Activity counters over a trailing window of days
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityMetrics {
    pub period_days: u32,
    pub commits_count: usize,
    /// Commit count per `YYYY-MM-DD`
    pub commits_by_day: BTreeMap<String, usize>,
    pub merged_prs_count: usize,
    pub closed_issues_count: usize,
    pub open_prs_count: usize,
    pub open_issues_count: usize,
    pub active_repos_count: usize,
    pub active_repos: Vec<ActiveRepo>,
}

impl ActivityMetrics {
    pub fn commits_by_day(commits: &[CommitSummary]) -> BTreeMap<String, usize> {
        let mut by_day = BTreeMap::new();
        for date in commits.iter().filter_map(|c| c.date) {
            *by_day
                .entry(date.format("%Y-%m-%d").to_string())
                .or_insert(0) += 1;
        }
        by_day
    }

    /// Keeps only the most recently pushed repositories in `active_repos`
    pub(crate) fn with_active(mut self, mut active: Vec<ActiveRepo>) -> Self {
        self.active_repos_count = active.len();
        active.truncate(TOP_ACTIVE_REPOS);
        self.active_repos = active;
        self
    }
}

impl Emptiness for ActivityMetrics {
    fn is_empty_payload(&self) -> bool {
        self.commits_count == 0
            && self.merged_prs_count == 0
            && self.closed_issues_count == 0
            && self.open_prs_count == 0
            && self.open_issues_count == 0
            && self.active_repos_count == 0
    }
}
