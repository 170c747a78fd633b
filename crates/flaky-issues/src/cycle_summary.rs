use std::fmt::Write as _;

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
/// Outcome of processing one job's build data.
pub struct JobReport {
    pub repo: String,
    pub job: String,
    pub messages: Vec<String>,
    pub errors: Vec<String>,
    pub rollback_errors: Vec<String>,
}

impl JobReport {
    pub fn new(repo: &str, job: &str) -> Self {
        Self {
            repo: repo.to_string(),
            job: job.to_string(),
            ..Self::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || !self.rollback_errors.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub jobs: Vec<JobReport>,
}

impl CycleSummary {
    pub fn push(&mut self, report: JobReport) {
        self.jobs.push(report);
    }

    pub fn has_errors(&self) -> bool {
        self.jobs.iter().any(JobReport::has_errors)
    }

    pub fn message_count(&self) -> usize {
        self.jobs.iter().map(|job| job.messages.len()).sum()
    }

    pub fn error_count(&self) -> usize {
        self.jobs.iter().map(|job| job.errors.len()).sum()
    }

    pub fn rollback_error_count(&self) -> usize {
        self.jobs.iter().map(|job| job.rollback_errors.len()).sum()
    }

    /// Human-readable report grouped by job.
    pub fn render(&self) -> String {
        let mut out = String::from("Summary:\n");
        for job in &self.jobs {
            let _ = writeln!(
                out,
                "Summary of job '{}' in repo '{}':",
                job.job, job.repo
            );
            for message in &job.messages {
                let _ = writeln!(out, "\t{message}");
            }
            if !job.errors.is_empty() {
                let _ = writeln!(out, "Errors in job '{}' in repo '{}':", job.job, job.repo);
                for error in &job.errors {
                    let _ = writeln!(out, "\t{error}");
                }
            }
            if !job.rollback_errors.is_empty() {
                let _ = writeln!(
                    out,
                    "Rollback errors in job '{}' in repo '{}':",
                    job.job, job.repo
                );
                for error in &job.rollback_errors {
                    let _ = writeln!(out, "\t{error}");
                }
            }
        }
        out
    }
}
