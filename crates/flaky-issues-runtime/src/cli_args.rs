use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use flaky_issues::reporter_config::{
    DEFAULT_BULK_FLAKY_THRESHOLD, DEFAULT_FLAKY_LABEL, DEFAULT_JOB_LOGS_URL,
    DEFAULT_MIN_RUNS_FOR_STATUS, DEFAULT_STALE_AFTER_DAYS, MAX_STALE_AFTER_DAYS,
};
use flaky_issues::FlakyReporterConfig;

use crate::github_api_client::{GithubApiClientConfig, DEFAULT_GITHUB_API_BASE};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_threshold_fraction(value: &str) -> Result<f64, String> {
    let parsed = value
        .parse::<f64>()
        .map_err(|error| format!("failed to parse float: {error}"))?;
    if !parsed.is_finite() || parsed <= 0.0 || parsed > 1.0 {
        return Err("value must be a fraction within (0, 1]".to_string());
    }
    Ok(parsed)
}

fn parse_stale_after_days(value: &str) -> Result<i64, String> {
    let parsed = value
        .parse::<i64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if !(0..=MAX_STALE_AFTER_DAYS).contains(&parsed) {
        return Err(format!("value must be within 0..={MAX_STALE_AFTER_DAYS}"));
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "flaky-issues-reporter",
    about = "File, update, close and reopen GitHub issues for flaky tests",
    version
)]
pub struct FlakyReporterCli {
    #[arg(
        long = "org",
        env = "FLAKY_REPORTER_ORG",
        default_value = "knative",
        help = "GitHub organization whose repositories hold flaky issues"
    )]
    pub org: String,

    #[arg(
        long = "repo-data",
        env = "FLAKY_REPORTER_REPO_DATA",
        value_delimiter = ',',
        required = true,
        help = "JSON file with aggregated test results (one job or an array of jobs); repeatable"
    )]
    pub repo_data: Vec<PathBuf>,

    #[arg(
        long = "github-token",
        env = "GITHUB_TOKEN",
        hide_env_values = true,
        help = "GitHub token used for API access; takes precedence over --github-token-file"
    )]
    pub github_token: Option<String>,

    #[arg(
        long = "github-token-file",
        env = "FLAKY_REPORTER_GITHUB_TOKEN_FILE",
        help = "File containing the GitHub token"
    )]
    pub github_token_file: Option<PathBuf>,

    #[arg(
        long = "github-api-base",
        env = "FLAKY_REPORTER_GITHUB_API_BASE",
        default_value = DEFAULT_GITHUB_API_BASE,
        help = "GitHub API base URL"
    )]
    pub github_api_base: String,

    #[arg(
        long = "flaky-label",
        env = "FLAKY_REPORTER_LABEL",
        default_value = DEFAULT_FLAKY_LABEL,
        help = "Label marking auto-generated flaky issues"
    )]
    pub flaky_label: String,

    #[arg(
        long = "bulk-flaky-threshold",
        env = "FLAKY_REPORTER_BULK_THRESHOLD",
        default_value_t = DEFAULT_BULK_FLAKY_THRESHOLD,
        value_parser = parse_threshold_fraction,
        help = "Share of flaky tests at which a single bulk issue replaces per-test issues"
    )]
    pub bulk_flaky_threshold: f64,

    #[arg(
        long = "stale-after-days",
        env = "FLAKY_REPORTER_STALE_AFTER_DAYS",
        default_value_t = DEFAULT_STALE_AFTER_DAYS,
        value_parser = parse_stale_after_days,
        help = "Ignore flaky issues closed more than this many days ago"
    )]
    pub stale_after_days: i64,

    #[arg(
        long = "min-runs-for-status",
        env = "FLAKY_REPORTER_MIN_RUNS",
        default_value_t = DEFAULT_MIN_RUNS_FOR_STATUS,
        value_parser = parse_positive_usize,
        help = "Passed plus failed runs required before a test is classified"
    )]
    pub min_runs_for_status: usize,

    #[arg(
        long = "job-logs-url",
        env = "FLAKY_REPORTER_JOB_LOGS_URL",
        default_value = DEFAULT_JOB_LOGS_URL,
        help = "Prefix joined with job name and build id to link build logs"
    )]
    pub job_logs_url: String,

    #[arg(
        long = "request-timeout-ms",
        env = "FLAKY_REPORTER_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        help = "Timeout in milliseconds for each GitHub API request"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        env = "FLAKY_REPORTER_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Maximum attempts for rate-limited or failing GitHub API requests"
    )]
    pub retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        env = "FLAKY_REPORTER_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        help = "Base backoff delay in milliseconds between GitHub API retries"
    )]
    pub retry_base_delay_ms: u64,

    #[arg(
        long = "dry-run",
        env = "FLAKY_REPORTER_DRY_RUN",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Log intended issue mutations without performing them"
    )]
    pub dry_run: bool,
}

impl FlakyReporterCli {
    pub fn reporter_config(&self) -> FlakyReporterConfig {
        FlakyReporterConfig {
            org: self.org.trim().to_string(),
            flaky_label: self.flaky_label.trim().to_string(),
            stale_after_days: self.stale_after_days,
            min_runs_for_status: self.min_runs_for_status,
            bulk_flaky_threshold: self.bulk_flaky_threshold,
            job_logs_url: self.job_logs_url.trim().to_string(),
            dry_run: self.dry_run,
        }
    }

    pub fn resolve_github_token(&self) -> Result<String> {
        if let Some(token) = self.github_token.as_deref() {
            let token = token.trim();
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }
        if let Some(path) = self.github_token_file.as_deref() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read github token file {}", path.display()))?;
            let token = raw.trim();
            if token.is_empty() {
                bail!("github token file {} is empty", path.display());
            }
            return Ok(token.to_string());
        }
        bail!("a GitHub token is required: pass --github-token or --github-token-file")
    }

    pub fn github_client_config(&self, token: String) -> GithubApiClientConfig {
        GithubApiClientConfig {
            api_base: self.github_api_base.clone(),
            token,
            request_timeout_ms: self.request_timeout_ms,
            retry_max_attempts: self.retry_max_attempts,
            retry_base_delay_ms: self.retry_base_delay_ms,
        }
    }
}
