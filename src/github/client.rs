//! GitHub REST API client
//!
//! Fetches repository, commit, pull request, issue, release and workflow data
//! for one account and aggregates it across repositories. A failure on a single
//! repository is logged and the repository skipped; a failure listing the
//! repositories themselves fails the call.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use super::filters::{is_bot_commit, is_dashboard_only_change};
use super::models::{
    active_repos, ActiveRepo, ActivityMetrics, ApiCommit, ApiIssue, ApiPull, ApiRateLimitResponse,
    ApiRelease, ApiUser, ApiWorkflowRuns, CommitSummary, IssueSummary, PullRequestSummary,
    RateLimit, ReleaseSummary, RepoStats, Repository, WorkflowHealth, WorkflowRun,
};
use crate::config::GitHubConfig;

/// Page size for paginated listings (the API maximum)
const PER_PAGE: usize = 100;

/// Upper bound on pages fetched for one listing
const MAX_PAGES: u32 = 10;

/// Commits examined per repository
const COMMITS_PER_REPO: usize = 20;

/// Recently updated closed pull requests examined per repository
const CLOSED_PULLS_PER_REPO: usize = 10;

/// Releases examined per repository
const RELEASES_PER_REPO: usize = 5;

/// Workflow runs considered by [`GitHubClient::workflow_health`]
const HEALTH_RUNS: usize = 20;

const USER_AGENT_VALUE: &str = concat!("cockpit/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur when talking to the GitHub API
#[derive(Debug, Error)]
pub enum GitHubError {
    /// Neither a token nor a username was configured
    #[error("GITHUB_TOKEN or a GitHub username is required")]
    MissingToken,

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API rate limit exhausted
    #[error("GitHub API rate limit exceeded, resets at {reset}")]
    RateLimited { reset: String },

    /// API answered with a non-success status
    #[error("GitHub API returned {status} for {url}")]
    Status { status: u16, url: String },

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Client for the GitHub REST API
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http_client: Client,
    base_url: String,
    token: Option<String>,
    username: Option<String>,
}

impl GitHubClient {
    /// Creates a client from configuration
    ///
    /// Fails with [`GitHubError::MissingToken`] when neither a token nor a
    /// username is configured, since there is no account to report on.
    pub fn new(config: &GitHubConfig) -> Result<Self, GitHubError> {
        if config.token.is_none() && config.username.is_none() {
            return Err(GitHubError::MissingToken);
        }
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            username: config.username.clone(),
        })
    }

    /// Performs a GET request and parses the JSON body
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GitHubError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET");

        let mut request = self
            .http_client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let header = |name: &str| {
                response
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let exhausted = header("x-ratelimit-remaining").as_deref() == Some("0");
            if exhausted
                && (status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS)
            {
                return Err(GitHubError::RateLimited {
                    reset: header("x-ratelimit-reset").unwrap_or_else(|| "unknown".to_string()),
                });
            }
            return Err(GitHubError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Fetches every page of a listing, up to [`MAX_PAGES`]
    async fn get_paginated<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, GitHubError> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut items = Vec::new();
        for page in 1..=MAX_PAGES {
            let batch: Vec<T> = self
                .get_json(&format!("{}{}per_page={}&page={}", path, separator, PER_PAGE, page))
                .await?;
            let last_page = batch.len() < PER_PAGE;
            items.extend(batch);
            if last_page {
                break;
            }
        }
        Ok(items)
    }

    /// Login of the account the token belongs to
    pub async fn authenticated_login(&self) -> Result<String, GitHubError> {
        let user: ApiUser = self.get_json("/user").await?;
        Ok(user.login)
    }

    /// The configured username, or the token owner's login
    pub async fn owner(&self) -> Result<String, GitHubError> {
        match &self.username {
            Some(username) => Ok(username.clone()),
            None => self.authenticated_login().await,
        }
    }

    /// Current core API quota
    pub async fn rate_limit(&self) -> Result<RateLimit, GitHubError> {
        let response: ApiRateLimitResponse = self.get_json("/rate_limit").await?;
        Ok(response.resources.core.into())
    }

    /// Returns true if at least `min_remaining` calls are left
    pub async fn check_rate_limit(&self, min_remaining: u32) -> Result<bool, GitHubError> {
        Ok(self.rate_limit().await?.remaining >= min_remaining)
    }

    /// Repositories owned by the account
    ///
    /// Uses the authenticated `/user/repos` listing when a token is set (which
    /// includes private repositories), otherwise the public listing of the
    /// configured user.
    pub async fn repos(&self, include_forks: bool) -> Result<Vec<Repository>, GitHubError> {
        let path = match (&self.token, &self.username) {
            (Some(_), _) => "/user/repos?type=owner".to_string(),
            (None, Some(username)) => format!("/users/{}/repos?type=owner", username),
            (None, None) => return Err(GitHubError::MissingToken),
        };
        let repos: Vec<Repository> = self.get_paginated(&path).await?;
        Ok(repos
            .into_iter()
            .filter(|r| include_forks || !r.fork)
            .collect())
    }

    /// Stars, forks and language bytes across the account's repositories
    pub async fn repo_stats(&self) -> Result<RepoStats, GitHubError> {
        let repos = self.repos(false).await?;
        let mut stats = RepoStats::from_repos(&repos);
        for repo in &repos {
            let path = format!("/repos/{}/languages", repo.full_name);
            match self.get_json::<BTreeMap<String, u64>>(&path).await {
                Ok(languages) => stats.add_languages(languages),
                Err(e) => skip_repo(repo, &e),
            }
        }
        Ok(stats)
    }

    /// Repositories pushed to within the last `days` days, most recent first
    pub async fn active_repos(&self, days: u32) -> Result<Vec<ActiveRepo>, GitHubError> {
        let repos = self.repos(false).await?;
        Ok(active_repos(&repos, cutoff(days)))
    }

    /// Recent commits across repositories, newest first
    ///
    /// When `exclude_bot` is set, commits by the dashboard bot and commits that
    /// only touch dashboard output are dropped.
    pub async fn recent_commits(
        &self,
        days: u32,
        exclude_bot: bool,
    ) -> Result<Vec<CommitSummary>, GitHubError> {
        let repos = self.repos(false).await?;
        Ok(self.recent_commits_for(&repos, days, exclude_bot).await)
    }

    async fn recent_commits_for(
        &self,
        repos: &[Repository],
        days: u32,
        exclude_bot: bool,
    ) -> Vec<CommitSummary> {
        let since = format_cutoff(cutoff(days));
        let mut all_commits = Vec::new();

        for repo in repos {
            let path = format!(
                "/repos/{}/commits?since={}&per_page={}",
                repo.full_name, since, COMMITS_PER_REPO
            );
            let commits: Vec<ApiCommit> = match self.get_json(&path).await {
                Ok(commits) => commits,
                Err(e) => {
                    skip_repo(repo, &e);
                    continue;
                }
            };

            for commit in commits.iter().take(COMMITS_PER_REPO) {
                let summary = CommitSummary::from_api(commit, repo);
                if exclude_bot {
                    if is_bot_commit(&summary.message, &summary.author) {
                        continue;
                    }
                    if self.is_dashboard_commit(repo, &commit.sha).await {
                        continue;
                    }
                }
                all_commits.push(summary);
            }
        }

        all_commits.sort_by(|a, b| b.date.cmp(&a.date));
        all_commits
    }

    /// Looks up a commit's changed files; lookup failures keep the commit
    async fn is_dashboard_commit(&self, repo: &Repository, sha: &str) -> bool {
        let path = format!("/repos/{}/commits/{}", repo.full_name, sha);
        match self.get_json::<ApiCommit>(&path).await {
            Ok(detail) => {
                let files: Vec<String> = detail
                    .files
                    .unwrap_or_default()
                    .into_iter()
                    .map(|f| f.filename)
                    .collect();
                is_dashboard_only_change(&files)
            }
            Err(e) => {
                debug!(repo = %repo.full_name, sha, error = %e, "Could not list commit files");
                false
            }
        }
    }

    /// Pull requests merged within the last `days` days, newest first
    pub async fn merged_prs(&self, days: u32) -> Result<Vec<PullRequestSummary>, GitHubError> {
        let repos = self.repos(false).await?;
        Ok(self.merged_prs_for(&repos, days).await)
    }

    async fn merged_prs_for(&self, repos: &[Repository], days: u32) -> Vec<PullRequestSummary> {
        let cutoff = cutoff(days);
        let mut merged = Vec::new();

        for repo in repos {
            let path = format!(
                "/repos/{}/pulls?state=closed&sort=updated&direction=desc&per_page={}",
                repo.full_name, CLOSED_PULLS_PER_REPO
            );
            match self.get_json::<Vec<ApiPull>>(&path).await {
                Ok(pulls) => merged.extend(
                    pulls
                        .into_iter()
                        .take(CLOSED_PULLS_PER_REPO)
                        .filter(|p| p.merged_at.is_some_and(|merged_at| merged_at > cutoff))
                        .map(|p| PullRequestSummary::from_api(p, repo)),
                ),
                Err(e) => skip_repo(repo, &e),
            }
        }

        merged.sort_by(|a, b| b.merged_at.cmp(&a.merged_at));
        merged
    }

    /// Open pull requests across repositories
    pub async fn open_prs(&self) -> Result<Vec<PullRequestSummary>, GitHubError> {
        let repos = self.repos(false).await?;
        Ok(self.open_prs_for(&repos).await)
    }

    async fn open_prs_for(&self, repos: &[Repository]) -> Vec<PullRequestSummary> {
        let mut open = Vec::new();
        for repo in repos {
            let path = format!("/repos/{}/pulls?state=open", repo.full_name);
            match self.get_paginated::<ApiPull>(&path).await {
                Ok(pulls) => open.extend(
                    pulls
                        .into_iter()
                        .map(|p| PullRequestSummary::from_api(p, repo)),
                ),
                Err(e) => skip_repo(repo, &e),
            }
        }
        open
    }

    /// Open issues across repositories, excluding pull requests
    pub async fn open_issues(&self) -> Result<Vec<IssueSummary>, GitHubError> {
        let repos = self.repos(false).await?;
        Ok(self.open_issues_for(&repos).await)
    }

    async fn open_issues_for(&self, repos: &[Repository]) -> Vec<IssueSummary> {
        let mut open = Vec::new();
        for repo in repos {
            let path = format!("/repos/{}/issues?state=open", repo.full_name);
            match self.get_paginated::<ApiIssue>(&path).await {
                Ok(issues) => open.extend(
                    issues
                        .into_iter()
                        .filter(|i| i.pull_request.is_none())
                        .map(|i| IssueSummary::from_api(i, repo)),
                ),
                Err(e) => skip_repo(repo, &e),
            }
        }
        open
    }

    /// Issues closed within the last `days` days, excluding pull requests
    pub async fn closed_issues(&self, days: u32) -> Result<Vec<IssueSummary>, GitHubError> {
        let repos = self.repos(false).await?;
        Ok(self.closed_issues_for(&repos, days).await)
    }

    async fn closed_issues_for(&self, repos: &[Repository], days: u32) -> Vec<IssueSummary> {
        let cutoff = cutoff(days);
        let since = format_cutoff(cutoff);
        let mut closed = Vec::new();

        for repo in repos {
            let path = format!("/repos/{}/issues?state=closed&since={}", repo.full_name, since);
            match self.get_paginated::<ApiIssue>(&path).await {
                Ok(issues) => closed.extend(
                    issues
                        .into_iter()
                        .filter(|i| i.pull_request.is_none())
                        .filter(|i| i.closed_at.is_some_and(|closed_at| closed_at > cutoff))
                        .map(|i| IssueSummary::from_api(i, repo)),
                ),
                Err(e) => skip_repo(repo, &e),
            }
        }
        closed
    }

    /// Releases published within the last `days` days, newest first
    pub async fn recent_releases(&self, days: u32) -> Result<Vec<ReleaseSummary>, GitHubError> {
        let cutoff = cutoff(days);
        let repos = self.repos(false).await?;
        let mut releases = Vec::new();

        for repo in &repos {
            let path = format!(
                "/repos/{}/releases?per_page={}",
                repo.full_name, RELEASES_PER_REPO
            );
            match self.get_json::<Vec<ApiRelease>>(&path).await {
                Ok(found) => releases.extend(found.into_iter().take(RELEASES_PER_REPO).filter_map(
                    |release| {
                        let published_at = release.published_at.filter(|p| *p > cutoff)?;
                        Some(ReleaseSummary {
                            name: release
                                .name
                                .filter(|n| !n.is_empty())
                                .unwrap_or_else(|| release.tag_name.clone()),
                            tag: release.tag_name,
                            repo: repo.name.clone(),
                            published_at,
                            url: release.html_url,
                        })
                    },
                )),
                Err(e) => skip_repo(repo, &e),
            }
        }

        releases.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(releases)
    }

    /// Latest workflow runs, newest first, for one repository or all of them
    ///
    /// `repo` may be a bare name (resolved against [`GitHubClient::owner`]) or
    /// an `owner/name` pair.
    pub async fn workflow_runs(
        &self,
        repo: Option<&str>,
        limit: usize,
    ) -> Result<Vec<WorkflowRun>, GitHubError> {
        let targets: Vec<(String, String)> = match repo {
            Some(full_name) if full_name.contains('/') => {
                let name = full_name.rsplit('/').next().unwrap_or(full_name);
                vec![(full_name.to_string(), name.to_string())]
            }
            Some(name) => vec![(format!("{}/{}", self.owner().await?, name), name.to_string())],
            None => self
                .repos(false)
                .await?
                .into_iter()
                .map(|r| (r.full_name, r.name))
                .collect(),
        };

        let mut runs = Vec::new();
        for (full_name, name) in &targets {
            let path = format!("/repos/{}/actions/runs?per_page={}", full_name, limit);
            match self.get_json::<ApiWorkflowRuns>(&path).await {
                Ok(response) => runs.extend(
                    response
                        .workflow_runs
                        .into_iter()
                        .take(limit)
                        .map(|run| WorkflowRun::from_api(run, name)),
                ),
                Err(e) => warn!(repo = %full_name, error = %e, "Skipping repository"),
            }
        }

        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit);
        Ok(runs)
    }

    /// CI health from the latest workflow runs
    pub async fn workflow_health(&self, repo: Option<&str>) -> Result<WorkflowHealth, GitHubError> {
        let runs = self.workflow_runs(repo, HEALTH_RUNS).await?;
        Ok(WorkflowHealth::from_runs(&runs))
    }

    /// Activity counters over the last `days` days
    ///
    /// Lists repositories once and reuses the list for every counter.
    pub async fn activity_metrics(&self, days: u32) -> Result<ActivityMetrics, GitHubError> {
        let repos = self.repos(false).await?;

        let commits = self.recent_commits_for(&repos, days, true).await;
        let merged_prs = self.merged_prs_for(&repos, days).await;
        let closed_issues = self.closed_issues_for(&repos, days).await;
        let open_prs = self.open_prs_for(&repos).await;
        let open_issues = self.open_issues_for(&repos).await;

        let metrics = ActivityMetrics {
            period_days: days,
            commits_count: commits.len(),
            commits_by_day: ActivityMetrics::commits_by_day(&commits),
            merged_prs_count: merged_prs.len(),
            closed_issues_count: closed_issues.len(),
            open_prs_count: open_prs.len(),
            open_issues_count: open_issues.len(),
            ..Default::default()
        };
        Ok(metrics.with_active(active_repos(&repos, cutoff(days))))
    }
}

fn cutoff(days: u32) -> DateTime<Utc> {
    Utc::now() - Duration::days(i64::from(days))
}

fn format_cutoff(cutoff: DateTime<Utc>) -> String {
    cutoff.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn skip_repo(repo: &Repository, error: &GitHubError) {
    warn!(repo = %repo.full_name, error = %error, "Skipping repository");
}
