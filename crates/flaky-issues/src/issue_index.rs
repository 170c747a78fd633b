//! Snapshot of every labeled flaky issue, keyed by identity.
//!
//! Built once at the start of a cycle and treated as frozen afterwards:
//! mutations made during the cycle never feed back into lookups.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};

use crate::errors::IntegrityError;
use crate::flaky_identity::extract_identity;
use crate::issue_comment::extract_latest_status_token;
use crate::issue_tracker::{GithubIssue, GithubIssueComment, GithubUser, IssueTracker};
use crate::reporter_config::FlakyReporterConfig;
use crate::test_stat::TestStatus;

#[derive(Debug, Clone)]
/// First comment posted by the reporter account on an issue; carries the
/// identity, latest status and history.
pub struct PinnedComment {
    pub comment: GithubIssueComment,
    pub latest_status: Option<TestStatus>,
}

impl PinnedComment {
    pub fn id(&self) -> u64 {
        self.comment.id
    }

    pub fn body(&self) -> &str {
        self.comment.body_text()
    }
}

#[derive(Debug, Clone)]
pub struct FlakyIssue {
    pub issue: GithubIssue,
    pub identity: String,
    pub pinned: PinnedComment,
}

#[derive(Debug, Clone, Default)]
pub struct FlakyIssueIndex {
    issues: BTreeMap<String, Vec<FlakyIssue>>,
}

impl FlakyIssueIndex {
    /// Group issues by identity and resolve duplicates within each group.
    pub fn from_issues(issues: impl IntoIterator<Item = FlakyIssue>) -> Self {
        let mut grouped: BTreeMap<String, Vec<FlakyIssue>> = BTreeMap::new();
        for issue in issues {
            grouped
                .entry(issue.identity.clone())
                .or_default()
                .push(issue);
        }
        let issues = grouped
            .into_iter()
            .map(|(identity, group)| (identity, reconcile_issue_group(group)))
            .collect();
        Self { issues }
    }

    pub fn get(&self, identity: &str) -> Option<&[FlakyIssue]> {
        self.issues.get(identity).map(Vec::as_slice)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.issues.contains_key(identity)
    }

    /// Number of distinct identities.
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issue_count(&self) -> usize {
        self.issues.values().map(Vec::len).sum()
    }
}

/// Apply the duplicate policy to issues sharing one identity.
///
/// All open: keep all. All closed: keep only the earliest created. Mixed:
/// keep only the open ones.
pub fn reconcile_issue_group(mut group: Vec<FlakyIssue>) -> Vec<FlakyIssue> {
    let has_open = group.iter().any(|entry| entry.issue.is_open());
    let has_closed = group.iter().any(|entry| !entry.issue.is_open());
    if has_open && has_closed {
        group.retain(|entry| entry.issue.is_open());
    } else if !has_open {
        group.sort_by(|left, right| {
            left.issue
                .created_at
                .cmp(&right.issue.created_at)
                .then(left.issue.number.cmp(&right.issue.number))
        });
        group.truncate(1);
    }
    group
}

/// Earliest comment by `bot` whose embedded identity equals `identity`.
pub fn find_pinned_comment<'a>(
    comments: &'a [GithubIssueComment],
    bot: &GithubUser,
    identity: &str,
) -> Option<&'a GithubIssueComment> {
    let mut ordered = comments.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|comment| comment.created_at);
    ordered.into_iter().find(|comment| {
        comment.user.id == bot.id
            && extract_identity(comment.body_text()).as_deref() == Some(identity)
    })
}

pub fn is_stale(issue: &GithubIssue, cutoff: DateTime<Utc>) -> bool {
    issue
        .closed_at
        .map(|closed_at| closed_at < cutoff)
        .unwrap_or(false)
}

fn parse_latest_status(
    issue: &GithubIssue,
    comment: &GithubIssueComment,
) -> Result<Option<TestStatus>, IntegrityError> {
    let Some(token) = extract_latest_status_token(comment.body_text()) else {
        return Ok(None);
    };
    TestStatus::from_token(token)
        .map(Some)
        .ok_or_else(|| IntegrityError::InvalidStatusToken {
            issue_url: issue.html_url.clone(),
            token: token.to_string(),
        })
}

/// Resolve identity and pinned comment for one labeled issue.
pub fn resolve_flaky_issue(
    issue: GithubIssue,
    comments: &[GithubIssueComment],
    bot: &GithubUser,
) -> Result<FlakyIssue, IntegrityError> {
    let identity =
        extract_identity(issue.body_text()).ok_or_else(|| IntegrityError::MissingIdentity {
            issue_url: issue.html_url.clone(),
        })?;
    let comment = find_pinned_comment(comments, bot, &identity)
        .cloned()
        .ok_or_else(|| IntegrityError::MissingPinnedComment {
            issue_url: issue.html_url.clone(),
            identity: identity.clone(),
        })?;
    let latest_status = parse_latest_status(&issue, &comment)?;
    Ok(FlakyIssue {
        issue,
        identity,
        pinned: PinnedComment {
            comment,
            latest_status,
        },
    })
}

/// Closed issues whose `closed_at` precedes the returned instant are stale.
pub fn stale_cutoff(now: DateTime<Utc>, stale_after_days: i64) -> Result<DateTime<Utc>> {
    Duration::try_days(stale_after_days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| anyhow!("stale-after window of {stale_after_days} days is out of range"))
}

/// Scan every repository of the org for labeled issues and build the index.
///
/// Fails on the first malformed issue.
pub async fn build_flaky_issue_index(
    tracker: &dyn IssueTracker,
    config: &FlakyReporterConfig,
    bot: &GithubUser,
    now: DateTime<Utc>,
) -> Result<FlakyIssueIndex> {
    let cutoff = stale_cutoff(now, config.stale_after_days)?;
    let labels = config.labels();
    let repos = tracker
        .list_repos(&config.org)
        .await
        .with_context(|| format!("failed to list repositories of '{}'", config.org))?;
    let mut resolved = Vec::new();
    for repo in repos {
        let issues = tracker
            .list_issues_by_labels(&config.org, &repo, &labels)
            .await
            .with_context(|| format!("failed to list flaky issues in repo '{repo}'"))?;
        for issue in issues {
            if issue.pull_request.is_some() || is_stale(&issue, cutoff) {
                continue;
            }
            let comments = tracker
                .list_comments(&config.org, issue.repo_name(), issue.number)
                .await
                .with_context(|| format!("failed to list comments of '{}'", issue.html_url))?;
            resolved.push(resolve_flaky_issue(issue, &comments, bot)?);
        }
    }
    let index = FlakyIssueIndex::from_issues(resolved);
    if index.is_empty() {
        tracing::info!(org = config.org.as_str(), "no flaky issues found");
        return Ok(index);
    }
    tracing::info!(
        identities = index.len(),
        issues = index.issue_count(),
        "built flaky issue index"
    );
    Ok(index)
}
