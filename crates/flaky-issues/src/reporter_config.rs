use anyhow::{bail, Result};

pub const DEFAULT_FLAKY_LABEL: &str = "auto:flaky";
pub const DEFAULT_JOB_LOGS_URL: &str = "https://prow.knative.dev/view/gcs/knative-prow/logs/";
pub const DEFAULT_STALE_AFTER_DAYS: i64 = 30;
pub const DEFAULT_MIN_RUNS_FOR_STATUS: usize = 8;
pub const DEFAULT_BULK_FLAKY_THRESHOLD: f64 = 0.05;
pub const MAX_STALE_AFTER_DAYS: i64 = 36_500;

#[derive(Debug, Clone, PartialEq)]
/// Settings shared by the index builder, lifecycle and orchestrator.
pub struct FlakyReporterConfig {
    pub org: String,
    pub flaky_label: String,
    /// Closed issues older than this are ignored; a regression opens a new issue.
    pub stale_after_days: i64,
    /// Runs (passed + failed) needed before a test is classified.
    pub min_runs_for_status: usize,
    /// Flaky-test share at or above which a single bulk issue replaces per-test issues.
    pub bulk_flaky_threshold: f64,
    pub job_logs_url: String,
    pub dry_run: bool,
}

impl FlakyReporterConfig {
    pub fn new(org: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            flaky_label: DEFAULT_FLAKY_LABEL.to_string(),
            stale_after_days: DEFAULT_STALE_AFTER_DAYS,
            min_runs_for_status: DEFAULT_MIN_RUNS_FOR_STATUS,
            bulk_flaky_threshold: DEFAULT_BULK_FLAKY_THRESHOLD,
            job_logs_url: DEFAULT_JOB_LOGS_URL.to_string(),
            dry_run: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.org.trim().is_empty() {
            bail!("flaky reporter org must not be empty");
        }
        if self.flaky_label.trim().is_empty() {
            bail!("flaky reporter label must not be empty");
        }
        if !(self.bulk_flaky_threshold > 0.0 && self.bulk_flaky_threshold <= 1.0) {
            bail!(
                "bulk flaky threshold must be within (0, 1], got {}",
                self.bulk_flaky_threshold
            );
        }
        if self.min_runs_for_status == 0 {
            bail!("min runs for status must be greater than 0");
        }
        if !(0..=MAX_STALE_AFTER_DAYS).contains(&self.stale_after_days) {
            bail!(
                "stale-after days must be within 0..={MAX_STALE_AFTER_DAYS}, got {}",
                self.stale_after_days
            );
        }
        if self.job_logs_url.trim().is_empty() {
            bail!("job logs url must not be empty");
        }
        Ok(())
    }

    pub fn labels(&self) -> Vec<String> {
        vec![self.flaky_label.clone()]
    }
}
