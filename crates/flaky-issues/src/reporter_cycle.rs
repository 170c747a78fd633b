//! One reporting cycle: index the tracker, then walk every job's results.

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::action_executor::ActionExecutor;
use crate::cycle_summary::{CycleSummary, JobReport};
use crate::errors::IssueCreationError;
use crate::flaky_identity::{bulk_identity, test_identity};
use crate::issue_comment::{
    render_bulk_pinned_comment, render_issue_body, render_issue_title, render_new_pinned_comment,
    render_test_status_comment,
};
use crate::issue_history::build_history;
use crate::issue_index::{build_flaky_issue_index, FlakyIssueIndex};
use crate::issue_lifecycle::{
    apply_issue_update, create_flaky_issue, plan_issue_update, LifecycleContext, NewFlakyIssue,
};
use crate::issue_tracker::IssueTracker;
use crate::reporter_config::FlakyReporterConfig;
use crate::test_stat::{RepoData, TestStat, TestStatus};

pub const ISSUES_DISABLED_MESSAGE: &str =
    "skip creating/updating issues, job is marked to not create GitHub issues";

/// Run a full cycle over `repo_data`.
///
/// Configuration, authentication and index failures abort the cycle. Failures
/// while acting on a single test or job are collected in the summary instead.
pub async fn run_reporting_cycle(
    tracker: &dyn IssueTracker,
    config: &FlakyReporterConfig,
    repo_data: &[RepoData],
    now: DateTime<Utc>,
) -> Result<CycleSummary> {
    config.validate()?;
    let bot = tracker
        .authenticated_user()
        .await
        .context("failed to resolve the authenticated tracker account")?;
    let index = build_flaky_issue_index(tracker, config, &bot, now)
        .await
        .context("failed to build flaky issue index")?;

    let mut created_bulk_identities = HashSet::new();
    let mut summary = CycleSummary::default();
    for data in repo_data {
        let report =
            process_repo_data(tracker, config, &index, &mut created_bulk_identities, data).await;
        summary.push(report);
    }
    tracing::info!(
        jobs = summary.jobs.len(),
        messages = summary.message_count(),
        errors = summary.error_count(),
        rollback_errors = summary.rollback_error_count(),
        dry_run = config.dry_run,
        "flaky reporting cycle finished"
    );
    Ok(summary)
}

/// Create, update, close or reopen issues for one job's results.
///
/// `created_bulk_identities` remembers bulk issues filed earlier in the same
/// cycle, since the index is not refreshed while the cycle runs.
pub async fn process_repo_data(
    tracker: &dyn IssueTracker,
    config: &FlakyReporterConfig,
    index: &FlakyIssueIndex,
    created_bulk_identities: &mut HashSet<String>,
    repo_data: &RepoData,
) -> JobReport {
    let job = &repo_data.config;
    let mut report = JobReport::new(&job.repo, &job.name);
    let Some(issue_repo) = job.issue_repo() else {
        tracing::info!(repo = job.repo.as_str(), job = job.name.as_str(), "{ISSUES_DISABLED_MESSAGE}");
        report.messages.push(ISSUES_DISABLED_MESSAGE.to_string());
        return report;
    };
    let ctx = LifecycleContext {
        tracker,
        executor: ActionExecutor::new(config.dry_run),
        org: &config.org,
        flaky_label: &config.flaky_label,
    };

    let flaky_rate = repo_data.flaky_rate(config.min_runs_for_status);
    if flaky_rate >= config.bulk_flaky_threshold {
        tracing::info!(
            repo = job.repo.as_str(),
            job = job.name.as_str(),
            flaky_rate,
            "flaky rate above threshold, tracking a single bulk issue"
        );
        process_bulk_issue(
            ctx,
            index,
            created_bulk_identities,
            repo_data,
            issue_repo,
            flaky_rate,
            &mut report,
        )
        .await;
        return report;
    }

    for (test_full_name, stat) in &repo_data.test_stats {
        process_test(
            ctx,
            config,
            index,
            repo_data,
            issue_repo,
            test_full_name,
            stat,
            &mut report,
        )
        .await;
    }
    report
}

async fn process_bulk_issue(
    ctx: LifecycleContext<'_>,
    index: &FlakyIssueIndex,
    created_bulk_identities: &mut HashSet<String>,
    repo_data: &RepoData,
    issue_repo: &str,
    flaky_rate: f64,
    report: &mut JobReport,
) {
    let identity = bulk_identity(
        flaky_rate,
        &repo_data.config.repo,
        repo_data.last_build_start_time,
    );
    if index.contains(&identity) || created_bulk_identities.contains(&identity) {
        tracing::info!(identity = identity.as_str(), "bulk issue already exists, skip creating");
        return;
    }
    let title = render_issue_title(&identity);
    report
        .messages
        .push(format!("Creating issue '{title}' in repo '{issue_repo}'"));
    let body = render_issue_body(&identity, &repo_data.config.repo, &identity);
    let pinned_comment = render_bulk_pinned_comment(&identity);
    let created = create_flaky_issue(
        ctx,
        NewFlakyIssue {
            repo: issue_repo,
            title: &title,
            body: &body,
            pinned_comment: &pinned_comment,
        },
    )
    .await;
    match created {
        Ok(()) => {
            created_bulk_identities.insert(identity);
        }
        Err(error) => {
            // An issue exists once creation itself succeeded, even if attaching failed.
            if matches!(error, IssueCreationError::AttachIdentity { .. }) {
                created_bulk_identities.insert(identity);
            }
            record_creation_error(report, error);
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_test(
    ctx: LifecycleContext<'_>,
    config: &FlakyReporterConfig,
    index: &FlakyIssueIndex,
    repo_data: &RepoData,
    issue_repo: &str,
    test_full_name: &str,
    stat: &TestStat,
    report: &mut JobReport,
) {
    let status = stat.status(config.min_runs_for_status);
    if !matches!(status, TestStatus::Flaky | TestStatus::Passed) {
        return;
    }
    let identity = test_identity(test_full_name, &repo_data.config.repo);
    let content =
        render_test_status_comment(repo_data, test_full_name, status, &config.job_logs_url);

    let Some(existing) = index.get(&identity) else {
        if status == TestStatus::Flaky {
            create_test_issue(
                ctx,
                config,
                repo_data,
                issue_repo,
                test_full_name,
                &identity,
                &content,
                report,
            )
            .await;
        }
        return;
    };

    for flaky_issue in existing {
        let url = flaky_issue.issue.html_url.as_str();
        if flaky_issue.pinned.body().contains(&content) {
            tracing::info!(
                issue_url = url,
                last_build_start_time = repo_data.last_build_start_time,
                "skip updating issue, it already contains this run's data"
            );
            continue;
        }
        let plan = plan_issue_update(flaky_issue.issue.state, flaky_issue.pinned.latest_status, status);
        if plan.is_noop() {
            continue;
        }
        let history = build_history(
            repo_data,
            flaky_issue.pinned.body(),
            test_full_name,
            &config.job_logs_url,
        );
        report
            .messages
            .push(format!("Updating issue '{url}' for '{}'", flaky_issue.identity));
        match apply_issue_update(ctx, flaky_issue, &format!("{content}{history}"), plan).await {
            Ok(messages) => report.messages.extend(messages),
            Err(error) => {
                tracing::warn!(issue_url = url, error = %format!("{error:#}"), "flaky issue update failed");
                report.errors.push(format!("{error:#}"));
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn create_test_issue(
    ctx: LifecycleContext<'_>,
    config: &FlakyReporterConfig,
    repo_data: &RepoData,
    issue_repo: &str,
    test_full_name: &str,
    identity: &str,
    content: &str,
    report: &mut JobReport,
) {
    let title = render_issue_title(test_full_name);
    report
        .messages
        .push(format!("Creating issue '{title}' in repo '{issue_repo}'"));
    let history = build_history(repo_data, "", test_full_name, &config.job_logs_url);
    let body = render_issue_body(test_full_name, &repo_data.config.repo, identity);
    let pinned_comment = render_new_pinned_comment(content, &history, identity);
    if let Err(error) = create_flaky_issue(
        ctx,
        NewFlakyIssue {
            repo: issue_repo,
            title: &title,
            body: &body,
            pinned_comment: &pinned_comment,
        },
    )
    .await
    {
        record_creation_error(report, error);
    }
}

fn record_creation_error(report: &mut JobReport, error: IssueCreationError) {
    tracing::warn!(error = %error, "flaky issue creation failed");
    report
        .rollback_errors
        .extend(error.rollback_errors().iter().cloned());
    report.errors.push(error.to_string());
}
