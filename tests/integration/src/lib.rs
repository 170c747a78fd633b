//! Fixtures shared by the reporting-cycle scenario tests.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use flaky_issues::flaky_identity::test_identity;
use flaky_issues::issue_comment::{render_issue_body, render_issue_title, render_new_pinned_comment};
use flaky_issues::memory_tracker::{MemoryTracker, SeedIssue};
use flaky_issues::{
    run_reporting_cycle, CycleSummary, FlakyReporterConfig, GithubUser, JobConfig, RepoData,
    TestStat,
};

pub const ORG: &str = "knative";
pub const REPO: &str = "serving";
pub const JOB: &str = "ci-serving";
pub const LABEL: &str = "auto:flaky";
pub const FIRST_START: i64 = 1_700_000_000;

pub fn bot() -> GithubUser {
    GithubUser {
        id: 99,
        login: "flaky-bot".to_string(),
    }
}

pub fn human() -> GithubUser {
    GithubUser {
        id: 7,
        login: "maintainer".to_string(),
    }
}

pub fn flaky() -> TestStat {
    TestStat {
        passed: vec![4, 3],
        failed: vec![2],
        skipped: vec![1],
    }
}

pub fn passed() -> TestStat {
    TestStat {
        passed: vec![4, 3, 2],
        failed: Vec::new(),
        skipped: vec![1],
    }
}

pub fn failed() -> TestStat {
    TestStat {
        passed: Vec::new(),
        failed: vec![4, 3, 2],
        skipped: Vec::new(),
    }
}

/// Results for one job. A clean `TestStable` is always included so a single
/// flaky test stays below the bulk threshold.
pub fn repo_data(start: i64, stats: &[(&str, TestStat)]) -> RepoData {
    let mut test_stats = stats
        .iter()
        .map(|(name, stat)| (name.to_string(), stat.clone()))
        .collect::<BTreeMap<_, _>>();
    test_stats
        .entry("TestStable".to_string())
        .or_insert_with(passed);
    RepoData {
        config: JobConfig {
            name: JOB.to_string(),
            repo: REPO.to_string(),
            issue_repo: Some(REPO.to_string()),
        },
        build_ids: vec![4, 3, 2, 1],
        last_build_start_time: start,
        test_stats,
    }
}

pub fn config() -> FlakyReporterConfig {
    let mut config = FlakyReporterConfig::new(ORG);
    config.min_runs_for_status = 2;
    config.bulk_flaky_threshold = 0.9;
    config.job_logs_url = "https://logs.test/".to_string();
    config
}

pub struct Harness {
    pub tracker: MemoryTracker,
    pub config: FlakyReporterConfig,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        let tracker = MemoryTracker::with_org(ORG, bot());
        tracker.add_repo(REPO);
        Self {
            tracker,
            config: config(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.tracker.now()
    }

    pub async fn cycle(&self, repo_data: &[RepoData]) -> CycleSummary {
        match run_reporting_cycle(&self.tracker, &self.config, repo_data, self.now()).await {
            Ok(summary) => summary,
            Err(error) => panic!("reporting cycle failed: {error:#}"),
        }
    }

    /// File an issue the way a previous cycle would have, with `status` as the
    /// latest recorded result.
    pub fn seed_flaky_issue(&self, test: &str, status: &str, closed_at: Option<DateTime<Utc>>) -> u64 {
        let identity = test_identity(test, REPO);
        let mut seed = SeedIssue::new(&render_issue_body(test, REPO, &identity))
            .title(&render_issue_title(test))
            .labeled(LABEL);
        if let Some(closed_at) = closed_at {
            seed = seed.closed_at(closed_at);
        }
        let number = self.tracker.seed_issue(REPO, seed);
        self.tracker.seed_comment(REPO, number, &human(), "+1, seeing this too");
        self.tracker.seed_comment(
            REPO,
            number,
            &bot(),
            &render_new_pinned_comment(
                &format!("Latest result for this test: {status}\nLast build start time: earlier"),
                "",
                &identity,
            ),
        );
        number
    }

    pub fn pinned_body(&self, issue_number: u64) -> String {
        self.tracker
            .comments(REPO, issue_number)
            .into_iter()
            .find(|comment| comment.user.id == bot().id)
            .map(|comment| comment.body_text().to_string())
            .unwrap_or_default()
    }

    pub fn last_comment(&self, issue_number: u64) -> String {
        self.tracker
            .comments(REPO, issue_number)
            .last()
            .map(|comment| comment.body_text().to_string())
            .unwrap_or_default()
    }
}
