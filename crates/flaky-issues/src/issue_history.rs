//! Bounded run history embedded in pinned comments.
//!
//! Each entry is one line holding the build start time followed by one linked
//! glyph per build. Entries are kept newest first between a fixed pair of HTML
//! comment sentinels, so they survive markdown rendering invisibly and can be
//! parsed back on the next cycle.

use crate::flaky_identity::format_build_start_time;
use crate::issue_comment::job_log_url;
use crate::test_stat::{BuildResult, RepoData};

pub const BEFORE_HISTORY_TOKEN: &str = "<!------Latest History of Up To 10 runs------>";
pub const AFTER_HISTORY_TOKEN: &str = "<!------End of History------>";
pub const MAX_HISTORY_ENTRIES: usize = 10;

pub const PASSED_GLYPH: &str = "&#10004;";
pub const FAILED_GLYPH: &str = "&#10006;";
pub const SKIPPED_GLYPH: &str = "&#9723;";

fn glyph_for(result: BuildResult) -> &'static str {
    match result {
        BuildResult::Passed => PASSED_GLYPH,
        BuildResult::Failed => FAILED_GLYPH,
        BuildResult::Skipped => SKIPPED_GLYPH,
    }
}

fn history_legend() -> String {
    format!("{PASSED_GLYPH} Passed\t{FAILED_GLYPH} Failed\t{SKIPPED_GLYPH} Skipped")
}

/// Render this cycle's builds for one test as a single history line.
pub fn render_history_entry(
    repo_data: &RepoData,
    test_full_name: &str,
    job_logs_url: &str,
) -> String {
    let mut entry = format!(
        "{}:",
        format_build_start_time(repo_data.last_build_start_time)
    );
    for (build_id, result) in repo_data.results_for_test(test_full_name) {
        entry.push_str(&format!(
            " [{}]({})",
            glyph_for(result),
            job_log_url(job_logs_url, &repo_data.config.name, build_id)
        ));
    }
    entry
}

/// Entries of the first history block in `comment`, newest first.
pub fn extract_history_entries(comment: &str) -> Option<Vec<String>> {
    let start = comment.find(BEFORE_HISTORY_TOKEN)? + BEFORE_HISTORY_TOKEN.len();
    let end = comment[start..].find(AFTER_HISTORY_TOKEN)?;
    Some(
        comment[start..start + end]
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned)
            .collect(),
    )
}

/// Wrap entries with the sentinels and append the legend.
///
/// The block always ends its entry list with a line break so that a block
/// rendered from zero previous entries parses the same way as a full one.
pub fn render_history_block(entries: &[String]) -> String {
    let mut body = String::from("\n");
    for entry in entries.iter().take(MAX_HISTORY_ENTRIES) {
        body.push_str(entry);
        body.push('\n');
    }
    format!(
        "\n{BEFORE_HISTORY_TOKEN}{body}{AFTER_HISTORY_TOKEN}\n{}\n",
        history_legend()
    )
}

/// Merge this cycle's entry with the history recorded in `previous_comment`.
pub fn build_history(
    repo_data: &RepoData,
    previous_comment: &str,
    test_full_name: &str,
    job_logs_url: &str,
) -> String {
    let mut entries = vec![render_history_entry(
        repo_data,
        test_full_name,
        job_logs_url,
    )];
    if let Some(previous) = extract_history_entries(previous_comment) {
        entries.extend(
            previous
                .into_iter()
                .take(MAX_HISTORY_ENTRIES.saturating_sub(1)),
        );
    }
    render_history_block(&entries)
}
