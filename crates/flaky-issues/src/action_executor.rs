use std::future::Future;

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Single execution point for tracker mutations.
///
/// In dry-run mode the intended action is logged and reported as skipped, so
/// the lifecycle decisions run unchanged without touching the tracker. Transient
/// failures are retried by the tracker client's request path, not here.
pub struct ActionExecutor {
    dry_run: bool,
}

impl ActionExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run `operation` unless in dry-run mode. Returns `Ok(None)` when skipped.
    pub async fn run<T, F, Fut>(&self, action: &str, operation: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.dry_run {
            tracing::info!(action, dry_run = true, "dry-run: skipped {action}");
            return Ok(None);
        }
        tracing::debug!(action, "running tracker action");
        operation().await.map(Some)
    }
}
