use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
/// Malformed flaky issues. Any of these aborts the reporting cycle.
pub enum IntegrityError {
    #[error("cannot get test identifier from auto flaky issue '{issue_url}'")]
    MissingIdentity { issue_url: String },
    #[error("cannot find auto comment for issue '{issue_url}' with identity '{identity}'")]
    MissingPinnedComment { issue_url: String, identity: String },
    #[error("invalid test status code '{token}' found from issue '{issue_url}'")]
    InvalidStatusToken { issue_url: String, token: String },
}

#[derive(Debug, Error)]
/// Failure while creating an issue and attaching its identity.
pub enum IssueCreationError {
    #[error("failed creating issue '{title}' in repo '{repo}': {reason}")]
    Create {
        title: String,
        repo: String,
        reason: String,
    },
    #[error("failed attaching identity to issue '{issue_url}': {}", .errors.join("; "))]
    AttachIdentity {
        issue_url: String,
        errors: Vec<String>,
        /// Cleanup failures; the issue may be left open or labeled and needs manual attention.
        rollback_errors: Vec<String>,
    },
}

impl IssueCreationError {
    pub fn rollback_errors(&self) -> &[String] {
        match self {
            Self::Create { .. } => &[],
            Self::AttachIdentity {
                rollback_errors, ..
            } => rollback_errors,
        }
    }
}
