//! GitHub transport and command-line entry point for the flaky issue reporter.

pub mod cli_args;
pub mod github_api_client;
pub mod repo_data_loader;
pub mod reporter_logging;

use anyhow::Result;
use chrono::Utc;
use flaky_issues::{run_reporting_cycle, CycleSummary};

use crate::cli_args::FlakyReporterCli;
use crate::github_api_client::GithubApiClient;
use crate::repo_data_loader::load_repo_data;

/// Load the aggregated results named on the command line and run one cycle
/// against GitHub.
pub async fn run_flaky_reporter(cli: &FlakyReporterCli) -> Result<CycleSummary> {
    let config = cli.reporter_config();
    config.validate()?;
    let repo_data = load_repo_data(&cli.repo_data)?;
    let token = cli.resolve_github_token()?;
    let client = GithubApiClient::new(cli.github_client_config(token))?;
    tracing::info!(
        org = config.org.as_str(),
        jobs = repo_data.len(),
        dry_run = config.dry_run,
        "starting flaky reporting cycle"
    );
    let summary = run_reporting_cycle(&client, &config, &repo_data, Utc::now()).await?;
    if summary.has_errors() {
        tracing::warn!(
            errors = summary.error_count(),
            rollback_errors = summary.rollback_error_count(),
            "flaky reporting cycle finished with errors"
        );
    }
    Ok(summary)
}
