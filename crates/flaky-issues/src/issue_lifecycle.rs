//! Open/closed state machine for flaky issues and the mutations it drives.

use anyhow::{Context, Result};

use crate::action_executor::ActionExecutor;
use crate::errors::IssueCreationError;
use crate::issue_comment::{prepend_comment, CLOSE_ISSUE_COMMENT, REOPEN_ISSUE_COMMENT};
use crate::issue_index::FlakyIssue;
use crate::issue_tracker::{IssueState, IssueTracker};
use crate::test_stat::TestStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Mutations decided for one existing issue.
pub struct IssueUpdatePlan {
    pub update_comment: bool,
    pub close: bool,
    pub reopen: bool,
}

impl IssueUpdatePlan {
    pub fn is_noop(&self) -> bool {
        !self.update_comment && !self.close && !self.reopen
    }
}

/// Decide how an issue reacts to this cycle's classification.
///
/// Closing needs two consecutive clean cycles. Only a flaky result reopens a
/// closed issue; a test that now fails consistently is a different problem.
pub fn plan_issue_update(
    state: IssueState,
    previous: Option<TestStatus>,
    current: TestStatus,
) -> IssueUpdatePlan {
    let is_open = state == IssueState::Open;
    IssueUpdatePlan {
        update_comment: current != TestStatus::Passed || is_open,
        close: current == TestStatus::Passed && is_open && previous == Some(TestStatus::Passed),
        reopen: current == TestStatus::Flaky && !is_open,
    }
}

/// Scope shared by every mutation of one cycle.
#[derive(Clone, Copy)]
pub struct LifecycleContext<'a> {
    pub tracker: &'a dyn IssueTracker,
    pub executor: ActionExecutor,
    pub org: &'a str,
    pub flaky_label: &'a str,
}

/// Apply `plan` to an existing issue. Returns messages for performed actions.
pub async fn apply_issue_update(
    ctx: LifecycleContext<'_>,
    flaky_issue: &FlakyIssue,
    new_comment: &str,
    plan: IssueUpdatePlan,
) -> Result<Vec<String>> {
    let issue = &flaky_issue.issue;
    let repo = issue.repo_name();
    let mut messages = Vec::new();

    if plan.update_comment {
        let body = prepend_comment(flaky_issue.pinned.body(), new_comment);
        ctx.executor
            .run("updating comment", || {
                ctx.tracker
                    .edit_comment(ctx.org, repo, flaky_issue.pinned.id(), &body)
            })
            .await
            .with_context(|| format!("failed updating comments for issue '{}'", issue.html_url))?;
    }

    if plan.close {
        ctx.executor
            .run("closing issue", || async {
                ctx.tracker.close_issue(ctx.org, repo, issue.number).await?;
                ctx.tracker
                    .create_comment(ctx.org, repo, issue.number, CLOSE_ISSUE_COMMENT)
                    .await?;
                Ok(())
            })
            .await
            .with_context(|| format!("failed closing issue '{}'", issue.html_url))?;
        messages.push(format!("Closed issue '{}'", issue.html_url));
    } else if plan.reopen {
        ctx.executor
            .run("reopening issue", || async {
                ctx.tracker.reopen_issue(ctx.org, repo, issue.number).await?;
                ctx.tracker
                    .create_comment(ctx.org, repo, issue.number, REOPEN_ISSUE_COMMENT)
                    .await?;
                Ok(())
            })
            .await
            .with_context(|| format!("failed reopening issue '{}'", issue.html_url))?;
        messages.push(format!("Reopened issue '{}'", issue.html_url));
    }

    tracing::info!(
        issue_url = issue.html_url.as_str(),
        identity = flaky_issue.identity.as_str(),
        update_comment = plan.update_comment,
        close = plan.close,
        reopen = plan.reopen,
        dry_run = ctx.executor.is_dry_run(),
        "applied flaky issue update"
    );
    Ok(messages)
}

/// Request for a new flaky issue.
pub struct NewFlakyIssue<'a> {
    pub repo: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub pinned_comment: &'a str,
}

/// Create an issue, post its pinned comment and attach the flaky label.
///
/// The three steps are not atomic. If the comment or label cannot be
/// attached, the issue would be invisible to the index next cycle and a
/// duplicate would be filed forever, so it is unlabeled and closed instead.
pub async fn create_flaky_issue(
    ctx: LifecycleContext<'_>,
    request: NewFlakyIssue<'_>,
) -> Result<(), IssueCreationError> {
    let NewFlakyIssue {
        repo,
        title,
        body,
        pinned_comment,
    } = request;

    let created = ctx
        .executor
        .run("creating issue", || {
            ctx.tracker.create_issue(ctx.org, repo, title, body)
        })
        .await
        .map_err(|error| IssueCreationError::Create {
            title: title.to_string(),
            repo: repo.to_string(),
            reason: format!("{error:#}"),
        })?;
    // Dry-run: nothing was created, the follow-up steps are logged against a placeholder.
    let (issue_number, issue_url) = match &created {
        Some(issue) => (issue.number, issue.html_url.clone()),
        None => (0, format!("<dry-run issue '{title}' in repo '{repo}'>")),
    };

    let mut errors = Vec::new();
    let mut label_attempted = false;
    if let Err(error) = ctx
        .executor
        .run("adding comment", || {
            ctx.tracker
                .create_comment(ctx.org, repo, issue_number, pinned_comment)
        })
        .await
    {
        errors.push(format!(
            "failed adding comment to issue '{issue_url}': {error:#}"
        ));
    }
    if errors.is_empty() {
        label_attempted = true;
        let labels = vec![ctx.flaky_label.to_string()];
        if let Err(error) = ctx
            .executor
            .run("adding flaky label", || {
                ctx.tracker.add_labels(ctx.org, repo, issue_number, &labels)
            })
            .await
        {
            errors.push(format!(
                "failed adding '{}' label to issue '{issue_url}': {error:#}",
                ctx.flaky_label
            ));
        }
    }
    if errors.is_empty() {
        tracing::info!(
            issue_url = issue_url.as_str(),
            repo,
            dry_run = ctx.executor.is_dry_run(),
            "created flaky issue"
        );
        return Ok(());
    }

    tracing::warn!(
        issue_url = issue_url.as_str(),
        "rolling back flaky issue without identity"
    );
    let mut rollback_errors = Vec::new();
    if label_attempted {
        if let Err(error) = ctx
            .executor
            .run("removing flaky label", || {
                ctx.tracker
                    .remove_label(ctx.org, repo, issue_number, ctx.flaky_label)
            })
            .await
        {
            rollback_errors.push(format!(
                "failed removing '{}' label from issue '{issue_url}': {error:#}",
                ctx.flaky_label
            ));
        }
    }
    if let Err(error) = ctx
        .executor
        .run("closing invalid issue", || {
            ctx.tracker.close_issue(ctx.org, repo, issue_number)
        })
        .await
    {
        rollback_errors.push(format!("failed closing issue '{issue_url}': {error:#}"));
    }
    Err(IssueCreationError::AttachIdentity {
        issue_url,
        errors,
        rollback_errors,
    })
}
