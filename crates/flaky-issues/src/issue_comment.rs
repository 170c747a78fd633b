use crate::flaky_identity::{format_build_start_time, identity_marker};
use crate::test_stat::{RepoData, TestStatus};

pub const LATEST_STATUS_TOKEN: &str = "Latest result for this test: ";
pub const ISSUE_BODY_BOUNDARY: &str =
    "<!-------------End of issue body, Please don't edit below this line------------->";
pub const OLDER_RESULTS_SUMMARY: &str = "Click to see older results";
pub const CLOSE_ISSUE_COMMENT: &str = "Closing issue: this test has passed in latest 2 scans";
pub const REOPEN_ISSUE_COMMENT: &str = "Reopening issue: this test is flaky";

pub fn job_log_url(job_logs_url: &str, job_name: &str, build_id: u64) -> String {
    format!(
        "{}/{job_name}/{build_id}",
        job_logs_url.trim_end_matches('/')
    )
}

pub fn render_issue_title(subject: &str) -> String {
    format!("[flaky] {subject}")
}

/// Issue body carrying the human-readable test name and the hidden identity.
pub fn render_issue_body(subject: &str, repo_name: &str, identity: &str) -> String {
    format!(
        "\n### Auto-generated issue tracking flakiness of test\n* **Test name**: {subject}\n* **Repository name**: {repo_name}\n\n{ISSUE_BODY_BOUNDARY}\n<!--{}-->",
        identity_marker(identity)
    )
}

/// Latest status line plus a failure summary for one test in this cycle.
///
/// This text is also the content-match key used to detect re-delivered build
/// data, so it must depend only on the cycle's inputs.
pub fn render_test_status_comment(
    repo_data: &RepoData,
    test_full_name: &str,
    status: TestStatus,
    job_logs_url: &str,
) -> String {
    let stat = repo_data
        .test_stats
        .get(test_full_name)
        .cloned()
        .unwrap_or_default();
    let mut content = format!(
        "{LATEST_STATUS_TOKEN}{}\nLast build start time: {}\nFailed {} times out of {} runs.",
        status.as_str(),
        format_build_start_time(repo_data.last_build_start_time),
        stat.failed.len(),
        stat.total_runs()
    );
    if !stat.failed.is_empty() {
        let failed_links = stat
            .failed
            .iter()
            .map(|build_id| {
                format!(
                    "[{build_id}]({})",
                    job_log_url(job_logs_url, &repo_data.config.name, *build_id)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        content.push_str(&format!(" Failed runs: {failed_links}"));
    }
    content
}

/// Pinned comment posted together with a newly created issue.
pub fn render_new_pinned_comment(content: &str, history: &str, identity: &str) -> String {
    format!("{content}{history}\n<!--{}-->", identity_marker(identity))
}

pub fn render_bulk_pinned_comment(identity: &str) -> String {
    format!(
        "Bulk issue tracking: {identity}\n<!--{}-->",
        identity_marker(identity)
    )
}

/// Put `new_comment` on top and fold the previous body into a collapsed block.
pub fn prepend_comment(old_comment: &str, new_comment: &str) -> String {
    if old_comment.is_empty() {
        return format!("{new_comment}\n\n");
    }
    // The blank line after <p> is required for GitHub to render the collapsed markdown.
    format!(
        "{new_comment}\n\n\n<details>\n\t<summary>{OLDER_RESULTS_SUMMARY}</summary><p>\n\n{old_comment}\n</p></details>"
    )
}

/// Raw token following the first latest-status marker, if the marker exists.
pub fn extract_latest_status_token(comment: &str) -> Option<&str> {
    let start = comment.find(LATEST_STATUS_TOKEN)? + LATEST_STATUS_TOKEN.len();
    let rest = &comment[start..];
    let end = rest
        .find(|ch: char| !ch.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}
