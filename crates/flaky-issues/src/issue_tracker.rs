use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GithubUser {
    pub id: u64,
    pub login: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
/// Issue as returned by the tracker's REST API.
pub struct GithubIssue {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: IssueState,
    pub html_url: String,
    pub repository_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pull_request: Option<Value>,
}

impl GithubIssue {
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }

    pub fn is_open(&self) -> bool {
        self.state == IssueState::Open
    }

    /// Repository name taken from `repository_url`; the API's repository
    /// field is not always populated.
    pub fn repo_name(&self) -> &str {
        self.repository_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubIssueComment {
    pub id: u64,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub user: GithubUser,
}

impl GithubIssueComment {
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }
}

/// Tracker operations the flaky issue lifecycle depends on.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn authenticated_user(&self) -> Result<GithubUser>;

    async fn list_repos(&self, org: &str) -> Result<Vec<String>>;

    /// Issues in any state carrying every label in `labels`.
    async fn list_issues_by_labels(
        &self,
        org: &str,
        repo: &str,
        labels: &[String],
    ) -> Result<Vec<GithubIssue>>;

    async fn list_comments(
        &self,
        org: &str,
        repo: &str,
        issue_number: u64,
    ) -> Result<Vec<GithubIssueComment>>;

    async fn create_issue(
        &self,
        org: &str,
        repo: &str,
        title: &str,
        body: &str,
    ) -> Result<GithubIssue>;

    async fn create_comment(
        &self,
        org: &str,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<GithubIssueComment>;

    async fn edit_comment(&self, org: &str, repo: &str, comment_id: u64, body: &str) -> Result<()>;

    async fn add_labels(
        &self,
        org: &str,
        repo: &str,
        issue_number: u64,
        labels: &[String],
    ) -> Result<()>;

    async fn remove_label(&self, org: &str, repo: &str, issue_number: u64, label: &str)
        -> Result<()>;

    async fn close_issue(&self, org: &str, repo: &str, issue_number: u64) -> Result<()>;

    async fn reopen_issue(&self, org: &str, repo: &str, issue_number: u64) -> Result<()>;
}
