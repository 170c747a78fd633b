use anyhow::Result;
use clap::Parser;
use flaky_issues_runtime::cli_args::FlakyReporterCli;
use flaky_issues_runtime::reporter_logging::init_reporter_logging;
use flaky_issues_runtime::run_flaky_reporter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = FlakyReporterCli::parse();
    init_reporter_logging()?;
    let summary = run_flaky_reporter(&cli).await?;
    println!("{}", summary.render());
    Ok(())
}
