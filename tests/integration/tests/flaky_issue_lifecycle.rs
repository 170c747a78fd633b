use chrono::Duration;
use flaky_integration_tests::{
    failed, flaky, passed, repo_data, Harness, FIRST_START, LABEL, REPO,
};
use flaky_issues::flaky_identity::{extract_identity, test_identity};
use flaky_issues::issue_comment::{CLOSE_ISSUE_COMMENT, REOPEN_ISSUE_COMMENT};
use flaky_issues::issue_history::{extract_history_entries, MAX_HISTORY_ENTRIES};
use flaky_issues::memory_tracker::TrackerOperation;
use flaky_issues::IssueState;

const HOUR: i64 = 3_600;

#[tokio::test]
async fn integration_open_issue_closes_after_second_clean_cycle() {
    let harness = Harness::new();
    let number = harness.seed_flaky_issue("TestA", "Passed", None);
    let summary = harness
        .cycle(&[repo_data(FIRST_START, &[("TestA", passed())])])
        .await;

    let issue = harness.tracker.issue(REPO, number).expect("issue");
    assert_eq!(issue.state, IssueState::Closed);
    assert_eq!(harness.last_comment(number), CLOSE_ISSUE_COMMENT);
    assert!(harness
        .pinned_body(number)
        .starts_with("Latest result for this test: Passed\n"));
    assert_eq!(
        summary.jobs[0].messages,
        vec![
            format!(
                "Updating issue '{}' for '{}'",
                issue.html_url,
                test_identity("TestA", REPO)
            ),
            format!("Closed issue '{}'", issue.html_url),
        ]
    );
}

#[tokio::test]
async fn integration_open_issue_with_flaky_result_only_gets_comment_update() {
    let harness = Harness::new();
    let after_passed = harness.seed_flaky_issue("TestA", "Passed", None);
    let after_flaky = harness.seed_flaky_issue("TestB", "Flaky", None);
    harness
        .cycle(&[repo_data(
            FIRST_START,
            &[("TestA", flaky()), ("TestB", flaky()), ("TestC", passed())],
        )])
        .await;

    for number in [after_passed, after_flaky] {
        assert!(harness.tracker.issue(REPO, number).expect("issue").is_open());
        assert!(harness
            .pinned_body(number)
            .starts_with("Latest result for this test: Flaky\n"));
    }
    let operations = harness
        .tracker
        .mutations()
        .into_iter()
        .map(|mutation| mutation.operation)
        .collect::<Vec<_>>();
    assert_eq!(
        operations,
        vec![TrackerOperation::EditComment, TrackerOperation::EditComment]
    );
}

#[tokio::test]
async fn integration_closed_issue_reopens_when_test_turns_flaky() {
    let harness = Harness::new();
    let number = harness.seed_flaky_issue("TestA", "Passed", Some(harness.now()));
    let summary = harness
        .cycle(&[repo_data(FIRST_START, &[("TestA", flaky())])])
        .await;

    assert!(harness.tracker.issue(REPO, number).expect("issue").is_open());
    assert_eq!(harness.last_comment(number), REOPEN_ISSUE_COMMENT);
    assert!(summary.jobs[0]
        .messages
        .iter()
        .any(|message| message.starts_with("Reopened issue")));
}

#[tokio::test]
async fn integration_closed_issue_ignores_failed_only_and_clean_results() {
    let harness = Harness::new();
    let failing = harness.seed_flaky_issue("TestA", "Flaky", Some(harness.now()));
    let clean = harness.seed_flaky_issue("TestB", "Passed", Some(harness.now()));
    let summary = harness
        .cycle(&[repo_data(
            FIRST_START,
            &[("TestA", failed()), ("TestB", passed())],
        )])
        .await;

    assert_eq!(harness.tracker.mutation_count(), 0);
    assert!(summary.jobs[0].messages.is_empty());
    assert_eq!(
        harness.tracker.issue(REPO, failing).expect("issue").state,
        IssueState::Closed
    );
    assert_eq!(
        harness.tracker.issue(REPO, clean).expect("issue").state,
        IssueState::Closed
    );
}

#[tokio::test]
async fn integration_full_lifecycle_across_cycles() {
    let harness = Harness::new();

    harness
        .cycle(&[repo_data(FIRST_START, &[("TestA", flaky())])])
        .await;
    let issues = harness.tracker.issues(REPO);
    assert_eq!(issues.len(), 1);
    let number = issues[0].number;
    assert_eq!(harness.tracker.labels(REPO, number), vec![LABEL]);

    harness
        .cycle(&[repo_data(FIRST_START + HOUR, &[("TestA", passed())])])
        .await;
    assert!(harness.tracker.issue(REPO, number).expect("issue").is_open());

    harness
        .cycle(&[repo_data(FIRST_START + 2 * HOUR, &[("TestA", passed())])])
        .await;
    assert!(!harness.tracker.issue(REPO, number).expect("issue").is_open());

    harness
        .cycle(&[repo_data(FIRST_START + 3 * HOUR, &[("TestA", flaky())])])
        .await;
    assert!(harness.tracker.issue(REPO, number).expect("issue").is_open());
    assert_eq!(harness.tracker.issues(REPO).len(), 1);

    let entries = extract_history_entries(&harness.pinned_body(number)).expect("history");
    assert_eq!(entries.len(), 4);
    assert!(entries[0].starts_with("2023-11-15 01:13:20 +0000 UTC:"));
    assert!(entries[3].starts_with("2023-11-14 22:13:20 +0000 UTC:"));
}

#[tokio::test]
async fn integration_repeated_cycle_with_identical_data_is_idempotent() {
    let harness = Harness::new();
    let existing = harness.seed_flaky_issue("TestA", "Flaky", None);
    let data = repo_data(FIRST_START, &[("TestA", flaky()), ("TestB", flaky()), ("TestC", passed())]);

    harness.cycle(&[data.clone()]).await;
    let after_first = harness.tracker.mutation_count();
    assert!(after_first > 0);
    let pinned_after_first = harness.pinned_body(existing);

    let summary = harness.cycle(&[data]).await;
    assert_eq!(harness.tracker.mutation_count(), after_first);
    assert!(summary.jobs[0].messages.is_empty());
    assert_eq!(harness.pinned_body(existing), pinned_after_first);
    assert_eq!(harness.tracker.issues(REPO).len(), 2);
}

#[tokio::test]
async fn integration_duplicate_open_issues_are_all_updated() {
    let harness = Harness::new();
    let first = harness.seed_flaky_issue("TestA", "Flaky", None);
    let second = harness.seed_flaky_issue("TestA", "Flaky", None);
    let summary = harness
        .cycle(&[repo_data(FIRST_START, &[("TestA", flaky())])])
        .await;

    assert_eq!(summary.jobs[0].messages.len(), 2);
    for number in [first, second] {
        assert!(harness
            .pinned_body(number)
            .contains("Last build start time: 2023-11-14 22:13:20 +0000 UTC"));
    }
}

#[tokio::test]
async fn integration_open_duplicate_supersedes_closed_sibling() {
    let harness = Harness::new();
    let closed = harness.seed_flaky_issue("TestA", "Flaky", Some(harness.now()));
    let open = harness.seed_flaky_issue("TestA", "Flaky", None);
    harness
        .cycle(&[repo_data(FIRST_START, &[("TestA", flaky())])])
        .await;

    assert!(harness
        .pinned_body(open)
        .starts_with("Latest result for this test: Flaky\nLast build start time: 2023"));
    assert!(!harness.tracker.issue(REPO, closed).expect("issue").is_open());
    assert!(harness
        .pinned_body(closed)
        .ends_with("Last build start time: earlier\n<!--[DONT_MODIFY_TEST_IDENTIFIER]'TestA' in repo 'serving'[DONT_MODIFY_TEST_IDENTIFIER]-->"));
}

#[tokio::test]
async fn integration_only_earliest_of_closed_duplicates_is_reopened() {
    let harness = Harness::new();
    let earliest = harness.seed_flaky_issue("TestA", "Passed", Some(harness.now()));
    let later = harness.seed_flaky_issue("TestA", "Passed", Some(harness.now()));
    harness
        .cycle(&[repo_data(FIRST_START, &[("TestA", flaky())])])
        .await;

    assert!(harness.tracker.issue(REPO, earliest).expect("issue").is_open());
    assert!(!harness.tracker.issue(REPO, later).expect("issue").is_open());
    assert_eq!(harness.tracker.issues(REPO).len(), 2);
}

#[tokio::test]
async fn integration_stale_closed_issue_is_replaced_by_new_issue() {
    let harness = Harness::new();
    let stale = harness.seed_flaky_issue(
        "TestA",
        "Passed",
        Some(harness.now() - Duration::days(31)),
    );
    harness
        .cycle(&[repo_data(FIRST_START, &[("TestA", flaky())])])
        .await;

    let issues = harness.tracker.issues(REPO);
    assert_eq!(issues.len(), 2);
    assert!(!harness.tracker.issue(REPO, stale).expect("issue").is_open());
    let fresh = issues
        .iter()
        .find(|issue| issue.number != stale)
        .expect("fresh issue");
    assert!(fresh.is_open());
    assert_eq!(
        extract_identity(fresh.body_text()),
        Some(test_identity("TestA", REPO))
    );
}

#[tokio::test]
async fn integration_history_never_exceeds_ten_entries() {
    let harness = Harness::new();
    harness
        .cycle(&[repo_data(FIRST_START, &[("TestA", flaky())])])
        .await;
    let number = harness.tracker.issues(REPO)[0].number;
    for cycle in 1..=12 {
        harness
            .cycle(&[repo_data(FIRST_START + cycle * HOUR, &[("TestA", flaky())])])
            .await;
    }
    let entries = extract_history_entries(&harness.pinned_body(number)).expect("history");
    assert_eq!(entries.len(), MAX_HISTORY_ENTRIES);
    assert!(entries[0].starts_with("2023-11-15 10:13:20 +0000 UTC:"));
    assert_eq!(harness.tracker.issues(REPO).len(), 1);
}
