use crate::client::{
    driver::{CallDriver, DriverReport, deadline::DeadlineSet},
    error::CallError,
};
use std::sync::Arc;
use tokio::sync::oneshot;

/// How a worker finished, as reported through its completion notifier.
#[derive(Debug)]
pub enum WorkerOutcome {
    Completed(DriverReport),
    Failed(CallError),
}

/// Owns a worker's completion notifier and its per-call deadline tokens.
///
/// Both are released exactly once: when [`WorkerGuard::complete`] sends the
/// outcome, or when the guard is dropped without one (panic, runtime
/// shutdown). The notifier is closed first, then every deadline token is
/// cancelled.
pub struct WorkerGuard {
    deadlines: Arc<DeadlineSet>,
    notifier: Option<oneshot::Sender<WorkerOutcome>>,
}

impl WorkerGuard {
    pub fn new(deadlines: Arc<DeadlineSet>, notifier: oneshot::Sender<WorkerOutcome>) -> Self {
        Self {
            deadlines,
            notifier: Some(notifier),
        }
    }

    pub fn deadlines(&self) -> &DeadlineSet {
        &self.deadlines
    }

    /// Reports `outcome` and releases the worker's resources.
    pub fn complete(mut self, outcome: WorkerOutcome) {
        if let Some(notifier) = self.notifier.take() {
            if notifier.send(outcome).is_err() {
                tracing::debug!("Nobody is waiting for this worker anymore");
            }
        }
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.notifier.take();
        if self.deadlines.release() {
            tracing::trace!("Released {} deadline tokens", self.deadlines.len());
        }
    }
}

/// Runs `driver` to completion and reports through `guard`.
///
/// Meant to be spawned; the caller observes the outcome only through the
/// guard's notifier.
pub async fn run_worker(driver: CallDriver, guard: WorkerGuard) {
    let outcome = match driver.run(guard.deadlines()).await {
        Ok(report) => {
            tracing::info!(
                calls = report.calls,
                descriptors = report.descriptors,
                "Worker finished its calls"
            );
            WorkerOutcome::Completed(report)
        }
        Err(e) => {
            tracing::error!("Worker stopped: {e}");
            WorkerOutcome::Failed(e)
        }
    };

    guard.complete(outcome);
}
