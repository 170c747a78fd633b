use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Classification of one test over the runs observed in a cycle.
pub enum TestStatus {
    Passed,
    Flaky,
    Failed,
    LackData,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "Passed",
            Self::Flaky => "Flaky",
            Self::Failed => "Failed",
            Self::LackData => "LackData",
        }
    }

    /// Parse a latest-status token recorded in a pinned comment.
    ///
    /// `Not` is what older comments rendered as "Not enough data" yield.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "Passed" => Some(Self::Passed),
            "Flaky" => Some(Self::Flaky),
            "Failed" => Some(Self::Failed),
            "LackData" | "Not" => Some(Self::LackData),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Outcome of a test in one build.
pub enum BuildResult {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Build ids in which one test passed, failed, or was skipped.
pub struct TestStat {
    #[serde(default)]
    pub passed: Vec<u64>,
    #[serde(default)]
    pub failed: Vec<u64>,
    #[serde(default)]
    pub skipped: Vec<u64>,
}

impl TestStat {
    pub fn total_runs(&self) -> usize {
        self.passed.len() + self.failed.len() + self.skipped.len()
    }

    pub fn has_enough_runs(&self, min_runs: usize) -> bool {
        self.passed.len() + self.failed.len() >= min_runs
    }

    pub fn status(&self, min_runs: usize) -> TestStatus {
        if !self.has_enough_runs(min_runs) {
            TestStatus::LackData
        } else if self.passed.is_empty() {
            TestStatus::Failed
        } else if !self.failed.is_empty() {
            TestStatus::Flaky
        } else {
            TestStatus::Passed
        }
    }

    /// Builds without a recorded outcome count as skipped.
    pub fn result_for_build(&self, build_id: u64) -> BuildResult {
        if self.passed.contains(&build_id) {
            BuildResult::Passed
        } else if self.failed.contains(&build_id) {
            BuildResult::Failed
        } else {
            BuildResult::Skipped
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Job-level settings supplied with each repository's results.
pub struct JobConfig {
    pub name: String,
    pub repo: String,
    /// Repository receiving flaky issues; blank or absent disables issue handling.
    #[serde(default)]
    pub issue_repo: Option<String>,
}

impl JobConfig {
    pub fn issue_repo(&self) -> Option<&str> {
        self.issue_repo
            .as_deref()
            .map(str::trim)
            .filter(|repo| !repo.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Aggregated results of one job for one reporting cycle.
pub struct RepoData {
    pub config: JobConfig,
    /// Builds considered this cycle, newest first.
    pub build_ids: Vec<u64>,
    /// Unix seconds.
    pub last_build_start_time: i64,
    #[serde(default)]
    pub test_stats: BTreeMap<String, TestStat>,
}

impl RepoData {
    pub fn results_for_test(&self, test_full_name: &str) -> Vec<(u64, BuildResult)> {
        let stat = self.test_stats.get(test_full_name);
        self.build_ids
            .iter()
            .map(|build_id| {
                let result = stat
                    .map(|stat| stat.result_for_build(*build_id))
                    .unwrap_or(BuildResult::Skipped);
                (*build_id, result)
            })
            .collect()
    }

    pub fn flaky_test_count(&self, min_runs: usize) -> usize {
        self.test_stats
            .values()
            .filter(|stat| stat.status(min_runs) == TestStatus::Flaky)
            .count()
    }

    /// Share of tests classified flaky; zero when no tests were reported.
    pub fn flaky_rate(&self, min_runs: usize) -> f64 {
        if self.test_stats.is_empty() {
            return 0.0;
        }
        self.flaky_test_count(min_runs) as f64 / self.test_stats.len() as f64
    }
}
