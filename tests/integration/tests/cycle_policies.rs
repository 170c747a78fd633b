use flaky_integration_tests::{flaky, human, passed, repo_data, Harness, FIRST_START, LABEL, REPO};
use flaky_issues::flaky_identity::{identity_marker, test_identity};
use flaky_issues::issue_comment::render_issue_body;
use flaky_issues::memory_tracker::{SeedIssue, TrackerOperation};
use flaky_issues::{run_reporting_cycle, IntegrityError, IssueState, RepoData};

fn mostly_flaky(start: i64) -> RepoData {
    repo_data(
        start,
        &[
            ("TestA", flaky()),
            ("TestB", flaky()),
            ("TestC", flaky()),
            ("TestD", flaky()),
            ("TestE", flaky()),
            ("TestF", flaky()),
            ("TestG", flaky()),
            ("TestH", flaky()),
            ("TestI", flaky()),
        ],
    )
}

#[tokio::test]
async fn integration_bulk_issue_replaces_per_test_issues() {
    let harness = Harness::new();
    let summary = harness.cycle(&[mostly_flaky(FIRST_START)]).await;

    let issues = harness.tracker.issues(REPO);
    assert_eq!(issues.len(), 1);
    assert_eq!(
        issues[0].title,
        "[flaky] 90.00% tests failed in repo serving on 2023-11-14 22:13:20 +0000 UTC"
    );
    assert_eq!(harness.tracker.labels(REPO, issues[0].number), vec![LABEL]);
    assert_eq!(summary.message_count(), 1);
}

#[tokio::test]
async fn integration_bulk_issue_is_unique_per_rate_repo_and_start_time() {
    let harness = Harness::new();
    let data = mostly_flaky(FIRST_START);
    harness.cycle(&[data.clone(), data.clone()]).await;
    assert_eq!(harness.tracker.issues(REPO).len(), 1);

    let summary = harness.cycle(&[data]).await;
    assert_eq!(harness.tracker.issues(REPO).len(), 1);
    assert_eq!(summary.message_count(), 0);

    harness.cycle(&[mostly_flaky(FIRST_START + 60)]).await;
    assert_eq!(harness.tracker.issues(REPO).len(), 2);
}

#[tokio::test]
async fn integration_bulk_cycle_leaves_existing_per_test_issues_untouched() {
    let harness = Harness::new();
    harness.seed_flaky_issue("TestA", "Passed", None);
    let seeded_mutations = harness.tracker.mutation_count();
    harness.cycle(&[mostly_flaky(FIRST_START)]).await;

    let operations = harness
        .tracker
        .mutations()
        .into_iter()
        .skip(seeded_mutations)
        .map(|mutation| mutation.operation)
        .collect::<Vec<_>>();
    assert_eq!(
        operations,
        vec![
            TrackerOperation::CreateIssue,
            TrackerOperation::CreateComment,
            TrackerOperation::AddLabels,
        ]
    );
}

#[tokio::test]
async fn integration_label_failure_rolls_back_new_issue() {
    let harness = Harness::new();
    harness.tracker.fail_operation(TrackerOperation::AddLabels);
    let summary = harness
        .cycle(&[repo_data(FIRST_START, &[("TestA", flaky())])])
        .await;

    let issue = &harness.tracker.issues(REPO)[0];
    assert_eq!(issue.state, IssueState::Closed);
    assert!(harness.tracker.labels(REPO, issue.number).is_empty());
    assert_eq!(summary.error_count(), 1);
    assert_eq!(summary.rollback_error_count(), 0);
    assert!(summary.jobs[0].errors[0].contains("failed adding 'auto:flaky' label"));

    harness.tracker.clear_failures();
    harness
        .cycle(&[repo_data(FIRST_START, &[("TestA", flaky())])])
        .await;
    let issues = harness.tracker.issues(REPO);
    assert_eq!(issues.len(), 2);
    assert!(issues[1].is_open());
}

#[tokio::test]
async fn integration_rollback_failures_are_reported_separately() {
    let harness = Harness::new();
    harness.tracker.fail_operation(TrackerOperation::AddLabels);
    harness.tracker.fail_operation(TrackerOperation::CloseIssue);
    let summary = harness
        .cycle(&[repo_data(FIRST_START, &[("TestA", flaky())])])
        .await;

    assert_eq!(summary.error_count(), 1);
    assert_eq!(summary.rollback_error_count(), 1);
    assert!(summary.jobs[0].rollback_errors[0].starts_with("failed closing issue"));
    assert!(summary
        .render()
        .contains("Rollback errors in job 'ci-serving' in repo 'serving':"));
}

#[tokio::test]
async fn integration_update_failure_does_not_stop_other_tests() {
    let harness = Harness::new();
    let existing = harness.seed_flaky_issue("TestA", "Flaky", None);
    harness.tracker.fail_operation(TrackerOperation::EditComment);
    let summary = harness
        .cycle(&[repo_data(
            FIRST_START,
            &[("TestA", flaky()), ("TestB", flaky()), ("TestC", passed())],
        )])
        .await;

    assert_eq!(summary.error_count(), 1);
    assert!(summary.jobs[0].errors[0].starts_with("failed updating comments for issue"));
    assert!(harness.tracker.issue(REPO, existing).expect("issue").is_open());
    assert_eq!(harness.tracker.issues(REPO).len(), 2);
}

#[tokio::test]
async fn integration_dry_run_reports_actions_without_mutating() {
    let mut harness = Harness::new();
    harness.config.dry_run = true;
    harness.seed_flaky_issue("TestA", "Passed", None);
    let summary = harness
        .cycle(&[repo_data(
            FIRST_START,
            &[("TestA", passed()), ("TestB", flaky())],
        )])
        .await;

    assert_eq!(harness.tracker.mutation_count(), 0);
    let messages = &summary.jobs[0].messages;
    assert_eq!(messages.len(), 3);
    assert!(messages[0].starts_with("Updating issue"));
    assert!(messages[1].starts_with("Closed issue"));
    assert_eq!(messages[2], "Creating issue '[flaky] TestB' in repo 'serving'");
    assert!(!summary.has_errors());
}

#[tokio::test]
async fn integration_disabled_job_is_skipped_while_others_run() {
    let harness = Harness::new();
    let mut disabled = repo_data(FIRST_START, &[("TestA", flaky())]);
    disabled.config.name = "ci-disabled".to_string();
    disabled.config.issue_repo = None;
    let enabled = repo_data(FIRST_START, &[("TestB", flaky())]);
    let summary = harness.cycle(&[disabled, enabled]).await;

    assert_eq!(
        summary.jobs[0].messages,
        vec!["skip creating/updating issues, job is marked to not create GitHub issues".to_string()]
    );
    assert_eq!(harness.tracker.issues(REPO).len(), 1);
    assert_eq!(harness.tracker.issues(REPO)[0].title, "[flaky] TestB");
}

#[tokio::test]
async fn integration_issue_without_pinned_comment_aborts_cycle() {
    let harness = Harness::new();
    let identity = test_identity("TestA", REPO);
    let number = harness.tracker.seed_issue(
        REPO,
        SeedIssue::new(&render_issue_body("TestA", REPO, &identity)).labeled(LABEL),
    );
    harness.tracker.seed_comment(
        REPO,
        number,
        &human(),
        &format!("copied marker <!--{}-->", identity_marker(&identity)),
    );

    let error = run_reporting_cycle(
        &harness.tracker,
        &harness.config,
        &[repo_data(FIRST_START, &[("TestB", flaky())])],
        harness.now(),
    )
    .await
    .expect_err("integrity failure");
    assert!(matches!(
        error.downcast_ref::<IntegrityError>(),
        Some(IntegrityError::MissingPinnedComment { .. })
    ));
    assert_eq!(harness.tracker.mutation_count(), 0);
}

#[tokio::test]
async fn integration_unknown_status_token_aborts_cycle() {
    let harness = Harness::new();
    harness.seed_flaky_issue("TestA", "Exploded", None);
    let error = run_reporting_cycle(
        &harness.tracker,
        &harness.config,
        &[repo_data(FIRST_START, &[("TestA", flaky())])],
        harness.now(),
    )
    .await
    .expect_err("integrity failure");
    assert_eq!(
        error.downcast_ref::<IntegrityError>(),
        Some(&IntegrityError::InvalidStatusToken {
            issue_url: "https://github.com/knative/serving/issues/1".to_string(),
            token: "Exploded".to_string(),
        })
    );
    assert_eq!(harness.tracker.mutation_count(), 0);
}

#[tokio::test]
async fn integration_legacy_not_enough_data_status_is_accepted() {
    let harness = Harness::new();
    let number = harness.seed_flaky_issue("TestA", "Not enough data", None);
    harness
        .cycle(&[repo_data(FIRST_START, &[("TestA", passed())])])
        .await;
    assert!(harness.tracker.issue(REPO, number).expect("issue").is_open());
    assert!(harness
        .pinned_body(number)
        .starts_with("Latest result for this test: Passed\n"));
}
