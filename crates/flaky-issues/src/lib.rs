//! Lifecycle management for auto-generated flaky-test issues.
//!
//! Consumes per-build test statistics, reconciles them against the labeled
//! issues already present in the tracker, and opens, updates, closes, or
//! reopens one issue per flaky test. All durable state lives in marker-delimited
//! regions of issue bodies and pinned comments, so every cycle rebuilds its view
//! of the world from the tracker alone.

pub mod action_executor;
pub mod cycle_summary;
pub mod errors;
pub mod flaky_identity;
pub mod issue_comment;
pub mod issue_history;
pub mod issue_index;
pub mod issue_lifecycle;
pub mod issue_tracker;
#[cfg(any(test, feature = "test-support"))]
pub mod memory_tracker;
pub mod reporter_config;
pub mod reporter_cycle;
pub mod test_stat;

pub use action_executor::ActionExecutor;
pub use cycle_summary::{CycleSummary, JobReport};
pub use errors::{IntegrityError, IssueCreationError};
pub use issue_index::{build_flaky_issue_index, FlakyIssue, FlakyIssueIndex, PinnedComment};
pub use issue_lifecycle::{plan_issue_update, IssueUpdatePlan};
pub use issue_tracker::{GithubIssue, GithubIssueComment, GithubUser, IssueState, IssueTracker};
pub use reporter_config::FlakyReporterConfig;
pub use reporter_cycle::{process_repo_data, run_reporting_cycle};
pub use test_stat::{BuildResult, JobConfig, RepoData, TestStat, TestStatus};
