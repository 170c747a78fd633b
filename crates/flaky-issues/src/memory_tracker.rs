//! In-memory [`IssueTracker`] for lifecycle tests.
//!
//! Keeps issues, labels and comments per repository, records every mutation,
//! and can be told to fail chosen operations.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::issue_tracker::{GithubIssue, GithubIssueComment, GithubUser, IssueState, IssueTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerOperation {
    CreateIssue,
    CreateComment,
    EditComment,
    AddLabels,
    RemoveLabel,
    CloseIssue,
    ReopenIssue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerMutation {
    pub operation: TrackerOperation,
    pub repo: String,
    /// Issue number, or comment id for comment edits.
    pub target: u64,
}

#[derive(Debug, Clone)]
pub struct SeedIssue {
    title: String,
    body: String,
    created_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    labels: Vec<String>,
}

impl SeedIssue {
    pub fn new(body: &str) -> Self {
        Self {
            title: "[flaky] seeded".to_string(),
            body: body.to_string(),
            created_at: None,
            closed_at: None,
            labels: Vec::new(),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Seed the issue as closed at `closed_at`.
    pub fn closed_at(mut self, closed_at: DateTime<Utc>) -> Self {
        self.closed_at = Some(closed_at);
        self
    }

    pub fn labeled(mut self, label: &str) -> Self {
        self.labels.push(label.to_string());
        self
    }
}

#[derive(Debug, Clone)]
struct StoredIssue {
    repo: String,
    issue: GithubIssue,
    labels: Vec<String>,
    comments: Vec<GithubIssueComment>,
}

#[derive(Debug)]
struct MemoryTrackerState {
    repos: Vec<String>,
    issues: Vec<StoredIssue>,
    next_id: u64,
    clock: DateTime<Utc>,
    failing: HashSet<TrackerOperation>,
    mutations: Vec<TrackerMutation>,
}

pub struct MemoryTracker {
    org: String,
    bot: GithubUser,
    state: Mutex<MemoryTrackerState>,
}

impl MemoryTracker {
    pub fn new(bot: GithubUser) -> Self {
        Self::with_org("knative", bot)
    }

    pub fn with_org(org: &str, bot: GithubUser) -> Self {
        let clock = Utc
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        Self {
            org: org.to_string(),
            bot,
            state: Mutex::new(MemoryTrackerState {
                repos: Vec::new(),
                issues: Vec::new(),
                next_id: 1,
                clock,
                failing: HashSet::new(),
                mutations: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryTrackerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn bot(&self) -> &GithubUser {
        &self.bot
    }

    /// Current tracker time; advances one second per created record.
    pub fn now(&self) -> DateTime<Utc> {
        self.state().clock
    }

    pub fn add_repo(&self, repo: &str) {
        let mut state = self.state();
        if !state.repos.iter().any(|existing| existing == repo) {
            state.repos.push(repo.to_string());
        }
    }

    pub fn fail_operation(&self, operation: TrackerOperation) {
        self.state().failing.insert(operation);
    }

    pub fn clear_failures(&self) {
        self.state().failing.clear();
    }

    pub fn mutations(&self) -> Vec<TrackerMutation> {
        self.state().mutations.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.state().mutations.len()
    }

    pub fn seed_issue(&self, repo: &str, seed: SeedIssue) -> u64 {
        self.add_repo(repo);
        let mut state = self.state();
        let created_at = seed.created_at.unwrap_or_else(|| state.tick());
        let stored = state.new_issue(&self.org, repo, &seed.title, &seed.body, created_at);
        let number = stored.issue.number;
        state.issues.push(StoredIssue {
            labels: seed.labels,
            issue: GithubIssue {
                state: if seed.closed_at.is_some() {
                    IssueState::Closed
                } else {
                    IssueState::Open
                },
                closed_at: seed.closed_at,
                ..stored.issue
            },
            ..stored
        });
        number
    }

    pub fn seed_comment(&self, repo: &str, issue_number: u64, user: &GithubUser, body: &str) -> u64 {
        let mut state = self.state();
        let created_at = state.tick();
        let id = state.allocate_id();
        if let Some(stored) = state.find_mut(repo, issue_number) {
            stored.comments.push(GithubIssueComment {
                id,
                body: Some(body.to_string()),
                created_at,
                user: user.clone(),
            });
        }
        id
    }

    pub fn issue(&self, repo: &str, issue_number: u64) -> Option<GithubIssue> {
        self.state()
            .find(repo, issue_number)
            .map(|stored| stored.issue.clone())
    }

    pub fn issues(&self, repo: &str) -> Vec<GithubIssue> {
        self.state()
            .issues
            .iter()
            .filter(|stored| stored.repo == repo)
            .map(|stored| stored.issue.clone())
            .collect()
    }

    pub fn labels(&self, repo: &str, issue_number: u64) -> Vec<String> {
        self.state()
            .find(repo, issue_number)
            .map(|stored| stored.labels.clone())
            .unwrap_or_default()
    }

    pub fn comments(&self, repo: &str, issue_number: u64) -> Vec<GithubIssueComment> {
        self.state()
            .find(repo, issue_number)
            .map(|stored| stored.comments.clone())
            .unwrap_or_default()
    }

    /// Move the tracker clock forward, e.g. to age closed issues.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state();
        state.clock += by;
    }

    fn mutate<T>(
        &self,
        operation: TrackerOperation,
        repo: &str,
        target: u64,
        apply: impl FnOnce(&mut MemoryTrackerState) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state();
        if state.failing.contains(&operation) {
            bail!("injected {operation:?} failure for {repo}#{target}");
        }
        let value = apply(&mut state)?;
        state.mutations.push(TrackerMutation {
            operation,
            repo: repo.to_string(),
            target,
        });
        Ok(value)
    }
}

impl MemoryTrackerState {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += Duration::seconds(1);
        self.clock
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn new_issue(
        &mut self,
        org: &str,
        repo: &str,
        title: &str,
        body: &str,
        created_at: DateTime<Utc>,
    ) -> StoredIssue {
        let id = self.allocate_id();
        let number = self
            .issues
            .iter()
            .filter(|stored| stored.repo == repo)
            .count() as u64
            + 1;
        StoredIssue {
            repo: repo.to_string(),
            issue: GithubIssue {
                id,
                number,
                title: title.to_string(),
                body: Some(body.to_string()),
                state: IssueState::Open,
                html_url: format!("https://github.com/{org}/{repo}/issues/{number}"),
                repository_url: format!("https://api.github.com/repos/{org}/{repo}"),
                created_at,
                closed_at: None,
                pull_request: None,
            },
            labels: Vec::new(),
            comments: Vec::new(),
        }
    }

    fn find(&self, repo: &str, issue_number: u64) -> Option<&StoredIssue> {
        self.issues
            .iter()
            .find(|stored| stored.repo == repo && stored.issue.number == issue_number)
    }

    fn find_mut(&mut self, repo: &str, issue_number: u64) -> Option<&mut StoredIssue> {
        self.issues
            .iter_mut()
            .find(|stored| stored.repo == repo && stored.issue.number == issue_number)
    }

    fn require_mut(&mut self, repo: &str, issue_number: u64) -> Result<&mut StoredIssue> {
        self.find_mut(repo, issue_number)
            .ok_or_else(|| anyhow!("issue {repo}#{issue_number} not found"))
    }
}

#[async_trait]
impl IssueTracker for MemoryTracker {
    async fn authenticated_user(&self) -> Result<GithubUser> {
        Ok(self.bot.clone())
    }

    async fn list_repos(&self, org: &str) -> Result<Vec<String>> {
        if org != self.org {
            bail!("unknown org '{org}'");
        }
        Ok(self.state().repos.clone())
    }

    async fn list_issues_by_labels(
        &self,
        _org: &str,
        repo: &str,
        labels: &[String],
    ) -> Result<Vec<GithubIssue>> {
        Ok(self
            .state()
            .issues
            .iter()
            .filter(|stored| stored.repo == repo)
            .filter(|stored| labels.iter().all(|label| stored.labels.contains(label)))
            .map(|stored| stored.issue.clone())
            .collect())
    }

    async fn list_comments(
        &self,
        _org: &str,
        repo: &str,
        issue_number: u64,
    ) -> Result<Vec<GithubIssueComment>> {
        self.state()
            .find(repo, issue_number)
            .map(|stored| stored.comments.clone())
            .ok_or_else(|| anyhow!("issue {repo}#{issue_number} not found"))
    }

    async fn create_issue(
        &self,
        _org: &str,
        repo: &str,
        title: &str,
        body: &str,
    ) -> Result<GithubIssue> {
        self.add_repo(repo);
        self.mutate(TrackerOperation::CreateIssue, repo, 0, |state| {
            let created_at = state.tick();
            let stored = state.new_issue(&self.org, repo, title, body, created_at);
            let issue = stored.issue.clone();
            state.issues.push(stored);
            Ok(issue)
        })
    }

    async fn create_comment(
        &self,
        _org: &str,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<GithubIssueComment> {
        self.mutate(TrackerOperation::CreateComment, repo, issue_number, |state| {
            let created_at = state.tick();
            let id = state.allocate_id();
            let comment = GithubIssueComment {
                id,
                body: Some(body.to_string()),
                created_at,
                user: self.bot.clone(),
            };
            state
                .require_mut(repo, issue_number)?
                .comments
                .push(comment.clone());
            Ok(comment)
        })
    }

    async fn edit_comment(&self, _org: &str, repo: &str, comment_id: u64, body: &str) -> Result<()> {
        self.mutate(TrackerOperation::EditComment, repo, comment_id, |state| {
            let comment = state
                .issues
                .iter_mut()
                .filter(|stored| stored.repo == repo)
                .flat_map(|stored| stored.comments.iter_mut())
                .find(|comment| comment.id == comment_id)
                .ok_or_else(|| anyhow!("comment {comment_id} not found in {repo}"))?;
            comment.body = Some(body.to_string());
            Ok(())
        })
    }

    async fn add_labels(
        &self,
        _org: &str,
        repo: &str,
        issue_number: u64,
        labels: &[String],
    ) -> Result<()> {
        self.mutate(TrackerOperation::AddLabels, repo, issue_number, |state| {
            let stored = state.require_mut(repo, issue_number)?;
            for label in labels {
                if !stored.labels.contains(label) {
                    stored.labels.push(label.clone());
                }
            }
            Ok(())
        })
    }

    async fn remove_label(
        &self,
        _org: &str,
        repo: &str,
        issue_number: u64,
        label: &str,
    ) -> Result<()> {
        self.mutate(TrackerOperation::RemoveLabel, repo, issue_number, |state| {
            state
                .require_mut(repo, issue_number)?
                .labels
                .retain(|existing| existing != label);
            Ok(())
        })
    }

    async fn close_issue(&self, _org: &str, repo: &str, issue_number: u64) -> Result<()> {
        self.mutate(TrackerOperation::CloseIssue, repo, issue_number, |state| {
            let closed_at = state.tick();
            let stored = state.require_mut(repo, issue_number)?;
            stored.issue.state = IssueState::Closed;
            stored.issue.closed_at = Some(closed_at);
            Ok(())
        })
    }

    async fn reopen_issue(&self, _org: &str, repo: &str, issue_number: u64) -> Result<()> {
        self.mutate(TrackerOperation::ReopenIssue, repo, issue_number, |state| {
            let stored = state.require_mut(repo, issue_number)?;
            stored.issue.state = IssueState::Open;
            stored.issue.closed_at = None;
            Ok(())
        })
    }
}
