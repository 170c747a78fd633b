use chrono::{DateTime, Utc};

/// Sentinel wrapping the identity in issue bodies and pinned comments.
pub const TEST_IDENTIFIER_TOKEN: &str = "DONT_MODIFY_TEST_IDENTIFIER";

const TEST_IDENTIFIER_MARKER: &str = "[DONT_MODIFY_TEST_IDENTIFIER]";

/// Identity of a single test inside the repository it runs in.
pub fn test_identity(test_full_name: &str, repo_name: &str) -> String {
    format!("'{test_full_name}' in repo '{repo_name}'")
}

/// Identity of a bulk-failure event. Embeds the build start time, so every
/// reporting cycle yields a distinct value.
pub fn bulk_identity(flaky_rate: f64, repo_name: &str, build_start_unix: i64) -> String {
    format!(
        "{:.2}% tests failed in repo {repo_name} on {}",
        flaky_rate * 100.0,
        format_build_start_time(build_start_unix)
    )
}

/// Render a unix timestamp the way it appears in identities, comments and history.
pub fn format_build_start_time(unix_seconds: i64) -> String {
    match DateTime::<Utc>::from_timestamp(unix_seconds, 0) {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S %z UTC").to_string(),
        None => format!("unix {unix_seconds}"),
    }
}

/// Wrap an identity with the sentinel pair.
pub fn identity_marker(identity: &str) -> String {
    format!("{TEST_IDENTIFIER_MARKER}{identity}{TEST_IDENTIFIER_MARKER}")
}

/// Recover the first sentinel-wrapped identity from free text.
///
/// Mirrors a lazy single-line match: an opening sentinel pairs with the next
/// sentinel after it, and the candidate is rejected when the enclosed text
/// spans a line break, in which case the scan resumes at the next sentinel.
pub fn extract_identity(text: &str) -> Option<String> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find(TEST_IDENTIFIER_MARKER) {
        let open = search_from + offset;
        let content_start = open + TEST_IDENTIFIER_MARKER.len();
        let close = text[content_start..].find(TEST_IDENTIFIER_MARKER)?;
        let candidate = &text[content_start..content_start + close];
        if !candidate.contains('\n') {
            return Some(candidate.to_string());
        }
        search_from = open + 1;
    }
    None
}
