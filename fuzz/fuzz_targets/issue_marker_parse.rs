#![no_main]

use flaky_issues::flaky_identity::{extract_identity, identity_marker};
use flaky_issues::issue_comment::extract_latest_status_token;
use flaky_issues::issue_history::{extract_history_entries, render_history_block};
use flaky_issues::TestStatus;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);

    if let Some(identity) = extract_identity(&raw) {
        assert!(!identity.contains('\n'));
        let marker = identity_marker(&identity);
        assert_eq!(extract_identity(&marker).as_deref(), Some(identity.as_str()));
    }

    if let Some(token) = extract_latest_status_token(&raw) {
        if let Some(status) = TestStatus::from_token(token) {
            assert!(!status.as_str().is_empty());
        }
    }

    if let Some(entries) = extract_history_entries(&raw) {
        assert!(entries.iter().all(|entry| !entry.trim().is_empty()));
        let block = render_history_block(&entries);
        assert!(extract_history_entries(&block).is_some());
    }
});
