//! Integration tests for the GitHub client against a mock API server

use chrono::{Duration, SecondsFormat, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cockpit::config::GitHubConfig;
use cockpit::github::{GitHubClient, GitHubError, HealthStatus};

fn days_ago(days: i64) -> String {
    (Utc::now() - Duration::days(days)).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn client_for(server: &MockServer) -> GitHubClient {
    GitHubClient::new(&GitHubConfig {
        api_url: server.uri(),
        username: Some("octocat".to_string()),
        ..Default::default()
    })
    .unwrap()
}

fn repo_json(name: &str, stars: u64, fork: bool) -> Value {
    json!({
        "name": name,
        "full_name": format!("octocat/{}", name),
        "html_url": format!("https://github.com/octocat/{}", name),
        "fork": fork,
        "stargazers_count": stars,
        "forks_count": 2,
        "open_issues_count": 0,
        "language": "Rust",
        "pushed_at": days_ago(1),
        "updated_at": days_ago(1)
    })
}

fn commit_json(sha: &str, message: &str, author: &str) -> Value {
    json!({
        "sha": sha,
        "html_url": format!("https://github.com/octocat/app/commit/{}", sha),
        "commit": {
            "message": message,
            "author": { "name": author, "date": days_ago(1) }
        }
    })
}

async fn mount_repos(server: &MockServer, repos: Value) {
    Mock::given(method("GET"))
        .and(path("/users/octocat/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repos))
        .mount(server)
        .await;
}

async fn mount_json(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_repo_stats_sums_and_skips_failed_languages() {
    let server = MockServer::start().await;
    mount_repos(
        &server,
        json!([
            repo_json("app", 10, false),
            repo_json("lib", 5, false),
            repo_json("forked", 100, true)
        ]),
    )
    .await;
    mount_json(
        &server,
        "/repos/octocat/app/languages",
        json!({"Rust": 3000, "Shell": 1000}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/repos/octocat/lib/languages"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let stats = client_for(&server).repo_stats().await.unwrap();

    assert_eq!(stats.total_repos, 2, "Forks are excluded");
    assert_eq!(stats.total_stars, 15);
    assert_eq!(stats.total_forks, 4);
    assert_eq!(stats.languages.get("Rust"), Some(&3000));
    assert_eq!(stats.languages.get("Shell"), Some(&1000));
    assert_eq!(stats.languages.len(), 2, "Failed repository adds no languages");
}

#[tokio::test]
async fn test_repo_listing_failure_fails_the_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/octocat/repos"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let result = client_for(&server).repo_stats().await;

    assert!(matches!(result, Err(GitHubError::Status { status: 502, .. })));
}

#[tokio::test]
async fn test_rate_limit_is_detected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/octocat/repos"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", "1700000000"),
        )
        .mount(&server)
        .await;

    let err = client_for(&server).repos(false).await.unwrap_err();

    match err {
        GitHubError::RateLimited { reset } => assert_eq!(reset, "1700000000"),
        other => panic!("expected rate limit error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_token_is_sent_and_user_repos_used() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(header("authorization", "Bearer ghp_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([repo_json("app", 1, false)])))
        .mount(&server)
        .await;

    let client = GitHubClient::new(&GitHubConfig {
        api_url: server.uri(),
        token: Some("ghp_test".to_string()),
        ..Default::default()
    })
    .unwrap();

    let repos = client.repos(false).await.unwrap();
    assert_eq!(repos.len(), 1);
    assert_eq!(repos[0].name, "app");
}

#[tokio::test]
async fn test_rate_limit_endpoint() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/rate_limit",
        json!({"resources": {"core": {"limit": 5000, "remaining": 42, "reset": 1700000000}}}),
    )
    .await;

    let client = client_for(&server);
    let limit = client.rate_limit().await.unwrap();

    assert_eq!(limit.remaining, 42);
    assert!(client.check_rate_limit(10).await.unwrap());
    assert!(!client.check_rate_limit(100).await.unwrap());
}

#[tokio::test]
async fn test_recent_commits_drop_bot_and_dashboard_commits() {
    let server = MockServer::start().await;
    mount_repos(&server, json!([repo_json("app", 1, false)])).await;
    mount_json(
        &server,
        "/repos/octocat/app/commits",
        json!([
            commit_json("aaaaaaa1", "Fix parser\n\nLonger body", "alice"),
            commit_json("bbbbbbb2", "Refresh stats", "github-actions[bot]"),
            commit_json("ccccccc3", "Tweak readme", "alice")
        ]),
    )
    .await;
    mount_json(
        &server,
        "/repos/octocat/app/commits/aaaaaaa1",
        json!({"sha": "aaaaaaa1", "html_url": "", "commit": {"message": "Fix parser"},
               "files": [{"filename": "src/parser.rs"}]}),
    )
    .await;
    mount_json(
        &server,
        "/repos/octocat/app/commits/ccccccc3",
        json!({"sha": "ccccccc3", "html_url": "", "commit": {"message": "Tweak readme"},
               "files": [{"filename": "README.md"}]}),
    )
    .await;

    let commits = client_for(&server).recent_commits(30, true).await.unwrap();

    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].sha, "aaaaaaa");
    assert_eq!(commits[0].message, "Fix parser");
    assert_eq!(commits[0].repo, "app");
}

#[tokio::test]
async fn test_merged_prs_respect_window() {
    let server = MockServer::start().await;
    mount_repos(&server, json!([repo_json("app", 1, false)])).await;
    mount_json(
        &server,
        "/repos/octocat/app/pulls",
        json!([
            {"number": 1, "title": "Recent", "html_url": "u1",
             "created_at": days_ago(3), "merged_at": days_ago(2)},
            {"number": 2, "title": "Old", "html_url": "u2",
             "created_at": days_ago(90), "merged_at": days_ago(60)},
            {"number": 3, "title": "Closed unmerged", "html_url": "u3",
             "created_at": days_ago(3), "merged_at": null}
        ]),
    )
    .await;

    let prs = client_for(&server).merged_prs(30).await.unwrap();

    assert_eq!(prs.len(), 1);
    assert_eq!(prs[0].number, 1);
}

#[tokio::test]
async fn test_open_issues_exclude_pull_requests() {
    let server = MockServer::start().await;
    mount_repos(&server, json!([repo_json("app", 1, false)])).await;
    mount_json(
        &server,
        "/repos/octocat/app/issues",
        json!([
            {"number": 7, "title": "Bug", "html_url": "u7", "created_at": days_ago(5), "closed_at": null},
            {"number": 8, "title": "PR", "html_url": "u8", "created_at": days_ago(5), "closed_at": null,
             "pull_request": {"url": "x"}}
        ]),
    )
    .await;

    let issues = client_for(&server).open_issues().await.unwrap();

    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].number, 7);
}

#[tokio::test]
async fn test_workflow_health_from_runs() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/repos/octocat/app/actions/runs",
        json!({"workflow_runs": [
            {"id": 3, "name": "CI", "status": "completed", "conclusion": "success",
             "created_at": days_ago(1), "updated_at": days_ago(1), "html_url": "r3"},
            {"id": 2, "name": "CI", "status": "completed", "conclusion": "failure",
             "created_at": days_ago(2), "updated_at": days_ago(2), "html_url": "r2"}
        ]}),
    )
    .await;

    let health = client_for(&server)
        .workflow_health(Some("octocat/app"))
        .await
        .unwrap();

    assert_eq!(health.status, HealthStatus::Operational);
    assert_eq!(health.success_rate, 50.0);
    assert_eq!(health.last_run.map(|r| r.id), Some(3));
}

#[tokio::test]
async fn test_activity_metrics_counts() {
    let server = MockServer::start().await;
    mount_repos(&server, json!([repo_json("app", 1, false)])).await;
    mount_json(
        &server,
        "/repos/octocat/app/commits",
        json!([commit_json("aaaaaaa1", "Add feature", "alice")]),
    )
    .await;
    mount_json(
        &server,
        "/repos/octocat/app/commits/aaaaaaa1",
        json!({"sha": "aaaaaaa1", "html_url": "", "commit": {"message": "Add feature"},
               "files": [{"filename": "src/lib.rs"}]}),
    )
    .await;
    mount_json(
        &server,
        "/repos/octocat/app/pulls",
        json!([{"number": 1, "title": "Merged", "html_url": "u1",
                "created_at": days_ago(3), "merged_at": days_ago(2)}]),
    )
    .await;
    mount_json(&server, "/repos/octocat/app/issues", json!([])).await;

    let metrics = client_for(&server).activity_metrics(30).await.unwrap();

    assert_eq!(metrics.period_days, 30);
    assert_eq!(metrics.commits_count, 1);
    assert_eq!(metrics.merged_prs_count, 1);
    assert_eq!(metrics.active_repos_count, 1);
    assert_eq!(metrics.commits_by_day.values().sum::<usize>(), 1);
}
