//! The worker orchestrator.
//!
//! [`Orchestrator::run`] opens `client_num` connections, one after the other,
//! and starts `concur_num` workers on each as soon as it is up. Every worker is
//! spawned as its own task and paired with a race between its completion
//! notifier and its budget (see [`CallPlan::worker_budget`], unless
//! [`ClientConfig::worker_budget`] overrides it).
//!
//! Losing the race is observe-only: the orchestrator stops waiting and
//! records the worker as timed out, but the task keeps running. Its calls
//! are still bounded by their own deadlines, and its resources are released
//! by its [`WorkerGuard`] whenever it finishes.

use crate::client::{
    config::ClientConfig,
    driver::{
        CallDriver, CallPlan,
        deadline::{DeadlineSet, instant_after},
    },
    error::CallError,
    pool::worker::{WorkerGuard, WorkerOutcome, run_worker},
};
use chainres_core::proto::{ServiceChain, chain_gateway_client::ChainGatewayClient};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::{
    sync::oneshot,
    time::{Instant, sleep_until},
};
use tonic::codec::CompressionEncoding;
use tracing::Instrument;

/// Which side of a worker's race fired first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerVerdict {
    Completed,
    Failed,
    /// The budget ran out first. The worker may still be running.
    TimedOut,
    /// The notifier closed without an outcome.
    Abandoned,
}

/// Tally of every worker the orchestrator was asked to start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub abandoned: usize,
    /// Workers never started because their connection could not be opened.
    pub unreachable: usize,
}

impl RunReport {
    fn record(&mut self, verdict: WorkerVerdict) {
        match verdict {
            WorkerVerdict::Completed => self.completed += 1,
            WorkerVerdict::Failed => self.failed += 1,
            WorkerVerdict::TimedOut => self.timed_out += 1,
            WorkerVerdict::Abandoned => self.abandoned += 1,
        }
    }

    pub const fn total(&self) -> usize {
        self.completed + self.failed + self.timed_out + self.abandoned + self.unreachable
    }

    pub const fn all_completed(&self) -> bool {
        self.completed == self.total()
    }
}

pub struct Orchestrator {
    config: ClientConfig,
    chains: Arc<[ServiceChain]>,
}

impl Orchestrator {
    /// # Errors
    ///
    /// [`CallError::NoChains`] if `chains` is empty.
    pub fn new(config: ClientConfig, chains: Vec<ServiceChain>) -> Result<Self, CallError> {
        if chains.is_empty() {
            return Err(CallError::NoChains);
        }
        Ok(Self {
            config,
            chains: chains.into(),
        })
    }

    pub async fn run(&self) -> RunReport {
        let plan = self.config.plan;
        let budget = self
            .config
            .worker_budget
            .unwrap_or_else(|| plan.worker_budget());
        let mut report = RunReport::default();
        let mut races = FuturesUnordered::new();

        tracing::info!(
            pattern = %self.config.pattern,
            clients = self.config.client_num,
            workers_per_client = self.config.concur_num,
            budget = ?budget,
            "Starting workers"
        );

        for client_id in 0..self.config.client_num {
            let span = tracing::info_span!("client", client_id);

            let driver = match self.connect(plan).instrument(span.clone()).await {
                Ok(driver) => driver,
                Err(e) => {
                    span.in_scope(|| {
                        tracing::error!(
                            "Failed to connect to {}: {e}",
                            self.config.endpoint.uri()
                        );
                    });
                    report.unreachable += self.config.concur_num;
                    continue;
                }
            };

            for worker_id in 0..self.config.concur_num {
                let worker_span = tracing::info_span!(parent: &span, "worker", worker_id);
                let (tx, rx) = oneshot::channel();
                let guard = WorkerGuard::new(Arc::new(DeadlineSet::new(plan.call_num)), tx);

                tokio::spawn(run_worker(driver.clone(), guard).instrument(worker_span.clone()));
                let deadline = instant_after(Instant::now(), budget);
                races.push(await_worker(rx, deadline).instrument(worker_span));
            }
        }

        while let Some(verdict) = races.next().await {
            report.record(verdict);
        }

        tracing::info!(
            completed = report.completed,
            failed = report.failed,
            timed_out = report.timed_out,
            abandoned = report.abandoned,
            unreachable = report.unreachable,
            "All workers accounted for"
        );
        report
    }

    /// Opens a dedicated connection and wraps it in a driver.
    async fn connect(&self, plan: CallPlan) -> anyhow::Result<CallDriver> {
        let channel = self.config.endpoint.connect().await?;
        tracing::debug!("Connected to {}", self.config.endpoint.uri());

        let client = ChainGatewayClient::new(channel)
            .send_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Zstd);
        let driver = CallDriver::new(client, self.config.pattern, Arc::clone(&self.chains), plan)?;
        Ok(driver)
    }
}

/// Waits for a worker's outcome until `deadline`.
///
/// Giving up leaves the worker alone: it keeps running and still releases its
/// resources when it ends.
pub async fn await_worker(rx: oneshot::Receiver<WorkerOutcome>, deadline: Instant) -> WorkerVerdict {
    tokio::select! {
        outcome = rx => match outcome {
            Ok(WorkerOutcome::Completed(_)) => {
                tracing::info!("Worker completed");
                WorkerVerdict::Completed
            }
            Ok(WorkerOutcome::Failed(e)) => {
                tracing::warn!("Worker failed: {e}");
                WorkerVerdict::Failed
            }
            Err(_) => {
                tracing::warn!("Worker ended without reporting");
                WorkerVerdict::Abandoned
            }
        },
        () = sleep_until(deadline) => {
            tracing::warn!("Worker timed out; no longer waiting for it");
            WorkerVerdict::TimedOut
        }
    }
}
