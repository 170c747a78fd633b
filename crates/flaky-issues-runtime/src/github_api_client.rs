use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flaky_issues::{GithubIssue, GithubIssueComment, GithubUser, IssueState, IssueTracker};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
const PAGE_SIZE: usize = 100;
const RETRY_ATTEMPT_HEADER: &str = "x-flaky-retry-attempt";
const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";
/// Exponential backoff ceiling for server errors.
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Longest rate-limit wait the reporter sits through before giving up.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(300);
const ERROR_MESSAGE_MAX_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How a request may be repeated after a failure.
pub enum RetryPolicy {
    /// Reads, edits, state changes and label calls: repeating them converges on
    /// the same tracker state.
    Idempotent,
    /// Issue and comment creation. Repeated only when GitHub provably did not
    /// act on the request: rate-limit rejections and failed connections.
    SingleDelivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    /// Retry after the server-provided wait, or after backoff when `None`.
    Retry(Option<Duration>),
    GiveUp,
}

impl RetryPolicy {
    pub fn for_status(
        self,
        status: StatusCode,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> RetryVerdict {
        if is_rate_limited(status, headers) {
            return match rate_limit_wait(headers, now) {
                Some(wait) if wait > MAX_RATE_LIMIT_WAIT => RetryVerdict::GiveUp,
                wait => RetryVerdict::Retry(wait),
            };
        }
        match self {
            Self::Idempotent if status.is_server_error() => RetryVerdict::Retry(None),
            _ => RetryVerdict::GiveUp,
        }
    }

    pub fn for_transport_error(self, error: &reqwest::Error) -> bool {
        match self {
            Self::Idempotent => error.is_timeout() || error.is_connect() || error.is_request(),
            Self::SingleDelivery => error.is_connect(),
        }
    }
}

/// 429, or a 403 carrying GitHub's primary or secondary rate-limit signal.
fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && (header_str(headers, RATE_LIMIT_REMAINING_HEADER) == Some("0")
            || headers.contains_key(RETRY_AFTER))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

/// Wait requested by the server: `Retry-After` as seconds or an HTTP date,
/// else the `x-ratelimit-reset` epoch.
pub fn rate_limit_wait(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(raw) = header_str(headers, RETRY_AFTER.as_str()) {
        if let Ok(seconds) = raw.parse::<u64>() {
            return Some(Duration::from_secs(seconds));
        }
        if let Ok(at) = DateTime::parse_from_rfc2822(raw) {
            return Some(until(at.with_timezone(&Utc), now));
        }
    }
    let reset = header_str(headers, RATE_LIMIT_RESET_HEADER)?
        .parse::<i64>()
        .ok()?;
    DateTime::<Utc>::from_timestamp(reset, 0).map(|at| until(at, now))
}

fn until(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}

fn backoff(base: Duration, attempt: usize, server_wait: Option<Duration>) -> Duration {
    match server_wait {
        Some(wait) => wait.max(base),
        None => {
            let doublings = attempt.saturating_sub(1).min(16) as u32;
            base.saturating_mul(1_u32 << doublings).min(MAX_BACKOFF)
        }
    }
}

/// GitHub's JSON `message`, or the raw body, shortened for error reports.
fn github_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct GithubErrorBody {
        message: String,
    }
    let message = serde_json::from_str::<GithubErrorBody>(body)
        .map(|parsed| parsed.message)
        .unwrap_or_else(|_| body.trim().to_string());
    if message.chars().count() <= ERROR_MESSAGE_MAX_CHARS {
        return message;
    }
    let mut shortened = message
        .chars()
        .take(ERROR_MESSAGE_MAX_CHARS)
        .collect::<String>();
    shortened.push_str("...");
    shortened
}

#[derive(Debug, Clone)]
pub struct GithubApiClientConfig {
    pub api_base: String,
    pub token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl GithubApiClientConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            token: token.into(),
            request_timeout_ms: 30_000,
            retry_max_attempts: 4,
            retry_base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GithubRepository {
    name: String,
}

#[derive(Clone)]
/// GitHub REST client backing the flaky issue lifecycle.
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
    retry_max_attempts: usize,
    retry_base_delay: Duration,
}

impl GithubApiClient {
    pub fn new(config: GithubApiClientConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("flaky-issues-reporter"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", config.token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid github authorization header")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms.max(1)),
        })
    }

    fn repo_url(&self, org: &str, repo: &str, tail: &str) -> String {
        format!("{}/repos/{org}/{repo}/{tail}", self.api_base)
    }

    /// Label names may contain characters that need escaping in a path segment.
    fn label_url(&self, org: &str, repo: &str, issue_number: u64, label: &str) -> Result<Url> {
        let number = issue_number.to_string();
        let mut url = Url::parse(&self.api_base)
            .with_context(|| format!("invalid github api base '{}'", self.api_base))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("github api base '{}' cannot carry a path", self.api_base))?
            .pop_if_empty()
            .extend(["repos", org, repo, "issues", number.as_str(), "labels", label]);
        Ok(url)
    }

    async fn list_all_pages<T>(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut page = 1_u32;
        let mut rows = Vec::new();
        loop {
            let page_value = page.to_string();
            let per_page = PAGE_SIZE.to_string();
            let chunk: Vec<T> = self
                .request_json(operation, RetryPolicy::Idempotent, || {
                    self.http.get(url).query(query).query(&[
                        ("per_page", per_page.as_str()),
                        ("page", page_value.as_str()),
                    ])
                })
                .await?;
            let chunk_len = chunk.len();
            rows.extend(chunk);
            if chunk_len < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(rows)
    }

    async fn set_issue_state(
        &self,
        org: &str,
        repo: &str,
        issue_number: u64,
        state: IssueState,
    ) -> Result<()> {
        let payload = json!({ "state": state.as_str() });
        let url = self.repo_url(org, repo, &format!("issues/{issue_number}"));
        let _: IgnoredAny = self
            .request_json("edit issue state", RetryPolicy::Idempotent, || {
                self.http.patch(&url).json(&payload)
            })
            .await?;
        Ok(())
    }

    async fn request_json<T, F>(
        &self,
        operation: &str,
        policy: RetryPolicy,
        mut request_builder: F,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 1_usize;
        loop {
            let sent = request_builder()
                .header(RETRY_ATTEMPT_HEADER, (attempt - 1).to_string())
                .send()
                .await;
            let (failure, verdict) = match sent {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<T>()
                        .await
                        .with_context(|| format!("failed to decode github {operation}"));
                }
                Ok(response) => {
                    let status = response.status();
                    let verdict = policy.for_status(status, response.headers(), Utc::now());
                    let body = response.text().await.unwrap_or_default();
                    let failure = anyhow!(
                        "github api {operation} failed with status {}: {}",
                        status.as_u16(),
                        github_error_message(&body)
                    );
                    (failure, verdict)
                }
                Err(error) => {
                    let verdict = if policy.for_transport_error(&error) {
                        RetryVerdict::Retry(None)
                    } else {
                        RetryVerdict::GiveUp
                    };
                    let failure = anyhow::Error::new(error)
                        .context(format!("github api {operation} request failed"));
                    (failure, verdict)
                }
            };
            let RetryVerdict::Retry(server_wait) = verdict else {
                return Err(failure);
            };
            if attempt >= self.retry_max_attempts {
                return Err(failure);
            }
            let delay = backoff(self.retry_base_delay, attempt, server_wait);
            tracing::warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %format!("{failure:#}"),
                "retrying github request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl IssueTracker for GithubApiClient {
    async fn authenticated_user(&self) -> Result<GithubUser> {
        let url = format!("{}/user", self.api_base);
        self.request_json("resolve authenticated user", RetryPolicy::Idempotent, || {
            self.http.get(&url)
        })
        .await
    }

    async fn list_repos(&self, org: &str) -> Result<Vec<String>> {
        let url = format!("{}/orgs/{org}/repos", self.api_base);
        let repos: Vec<GithubRepository> =
            self.list_all_pages("list repositories", &url, &[]).await?;
        Ok(repos.into_iter().map(|repo| repo.name).collect())
    }

    async fn list_issues_by_labels(
        &self,
        org: &str,
        repo: &str,
        labels: &[String],
    ) -> Result<Vec<GithubIssue>> {
        let url = self.repo_url(org, repo, "issues");
        let labels = labels.join(",");
        let issues: Vec<GithubIssue> = self
            .list_all_pages(
                "list issues",
                &url,
                &[("state", "all"), ("labels", labels.as_str())],
            )
            .await?;
        Ok(issues
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .collect())
    }

    async fn list_comments(
        &self,
        org: &str,
        repo: &str,
        issue_number: u64,
    ) -> Result<Vec<GithubIssueComment>> {
        let url = self.repo_url(org, repo, &format!("issues/{issue_number}/comments"));
        self.list_all_pages("list issue comments", &url, &[]).await
    }

    async fn create_issue(
        &self,
        org: &str,
        repo: &str,
        title: &str,
        body: &str,
    ) -> Result<GithubIssue> {
        let payload = json!({ "title": title, "body": body });
        let url = self.repo_url(org, repo, "issues");
        self.request_json("create issue", RetryPolicy::SingleDelivery, || {
            self.http.post(&url).json(&payload)
        })
        .await
    }

    async fn create_comment(
        &self,
        org: &str,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<GithubIssueComment> {
        let payload = json!({ "body": body });
        let url = self.repo_url(org, repo, &format!("issues/{issue_number}/comments"));
        self.request_json("create issue comment", RetryPolicy::SingleDelivery, || {
            self.http.post(&url).json(&payload)
        })
        .await
    }

    async fn edit_comment(&self, org: &str, repo: &str, comment_id: u64, body: &str) -> Result<()> {
        let payload = json!({ "body": body });
        let url = self.repo_url(org, repo, &format!("issues/comments/{comment_id}"));
        let _: IgnoredAny = self
            .request_json("update issue comment", RetryPolicy::Idempotent, || {
                self.http.patch(&url).json(&payload)
            })
            .await?;
        Ok(())
    }

    async fn add_labels(
        &self,
        org: &str,
        repo: &str,
        issue_number: u64,
        labels: &[String],
    ) -> Result<()> {
        let payload = json!({ "labels": labels });
        let url = self.repo_url(org, repo, &format!("issues/{issue_number}/labels"));
        let _: IgnoredAny = self
            .request_json("add issue labels", RetryPolicy::Idempotent, || {
                self.http.post(&url).json(&payload)
            })
            .await?;
        Ok(())
    }

    async fn remove_label(
        &self,
        org: &str,
        repo: &str,
        issue_number: u64,
        label: &str,
    ) -> Result<()> {
        let url = self.label_url(org, repo, issue_number, label)?;
        let _: IgnoredAny = self
            .request_json("remove issue label", RetryPolicy::Idempotent, || {
                self.http.delete(url.clone())
            })
            .await?;
        Ok(())
    }

    async fn close_issue(&self, org: &str, repo: &str, issue_number: u64) -> Result<()> {
        self.set_issue_state(org, repo, issue_number, IssueState::Closed)
            .await
    }

    async fn reopen_issue(&self, org: &str, repo: &str, issue_number: u64) -> Result<()> {
        self.set_issue_state(org, repo, issue_number, IssueState::Open)
            .await
    }
}
