//! Log setup for the reporter binary. Logs go to stderr; stdout carries only
//! the cycle summary.

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// Reporter crates log at info, dependencies only warn.
pub const DEFAULT_LOG_DIRECTIVES: &str = "warn,flaky_issues=info,flaky_issues_runtime=info";

/// Filter from `RUST_LOG`-style directives, or the reporter default when unset or blank.
pub fn reporter_log_filter(directives: Option<&str>) -> Result<EnvFilter> {
    match directives.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => {
            EnvFilter::try_new(raw).with_context(|| format!("invalid log filter '{raw}'"))
        }
        None => Ok(EnvFilter::new(DEFAULT_LOG_DIRECTIVES)),
    }
}

pub fn init_reporter_logging() -> Result<()> {
    let filter = reporter_log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|error| anyhow!("failed to install log subscriber: {error}"))
}
