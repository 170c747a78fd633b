use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flaky_issues::RepoData;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum RepoDataFile {
    Many(Vec<RepoData>),
    One(Box<RepoData>),
}

/// Read one aggregator output file holding a single job or an array of jobs.
pub fn load_repo_data_file(path: &Path) -> Result<Vec<RepoData>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read repo data file {}", path.display()))?;
    let parsed: RepoDataFile = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse repo data file {}", path.display()))?;
    Ok(match parsed {
        RepoDataFile::Many(rows) => rows,
        RepoDataFile::One(row) => vec![*row],
    })
}

/// Load every file in order; jobs keep their file and in-file order.
pub fn load_repo_data(paths: &[PathBuf]) -> Result<Vec<RepoData>> {
    let mut rows = Vec::new();
    for path in paths {
        rows.extend(load_repo_data_file(path)?);
    }
    tracing::info!(files = paths.len(), jobs = rows.len(), "loaded repo data");
    Ok(rows)
}
