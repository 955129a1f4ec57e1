//! Call sequences for the four interaction patterns.
//!
//! A [`CallDriver`] issues `call_num` calls of one [`CallPattern`], one after
//! the other, pausing `call_interval` between them. Call `k` sends chain
//! `k % chains.len()` (unary) or the whole chain list (streaming patterns).
//!
//! Each call is bounded twice: its deadline is sent to the server as
//! `grpc-timeout`, and the call future is raced locally against the call's
//! token from the worker's [`DeadlineSet`], armed to expire at that deadline.
//! The first error of any kind ends the sequence.

pub mod deadline;

use crate::client::error::CallError;
use chainres_core::proto::{ServiceChain, ServiceChains, chain_gateway_client::ChainGatewayClient};
use core::time::Duration;
use deadline::{DeadlinePolicy, DeadlineSet};
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    time::{Instant, sleep},
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, transport::Channel};
use tracing::Instrument;

/// Pause between two outbound chains of a bidi call.
pub const BIDI_SEND_PAUSE: Duration = Duration::from_millis(1);

/// Interaction pattern driven by a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum CallPattern {
    /// One chain in, one descriptor out.
    #[value(alias = "simple")]
    Unary,
    /// All chains in one batch, one descriptor streamed back per chain.
    #[value(alias = "server_stream")]
    ServerStream,
    /// All chains streamed in, one aggregate back.
    #[value(alias = "client_stream")]
    ClientStream,
    /// All chains streamed in while descriptors stream back.
    #[value(alias = "bi_stream")]
    BidiStream,
}

impl CallPattern {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unary => "unary",
            Self::ServerStream => "server-stream",
            Self::ClientStream => "client-stream",
            Self::BidiStream => "bidi-stream",
        }
    }
}

impl core::fmt::Display for CallPattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call count and pacing shared by every worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallPlan {
    pub call_num: usize,
    pub call_interval: Duration,
    pub call_timeout: Duration,
    pub deadline_policy: DeadlinePolicy,
}

impl CallPlan {
    pub fn worker_budget(&self) -> Duration {
        self.deadline_policy
            .worker_budget(self.call_num, self.call_timeout, self.call_interval)
    }
}

/// What a driver got through before it stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DriverReport {
    /// Calls that completed.
    pub calls: usize,
    /// Descriptors received across those calls.
    pub descriptors: usize,
}

#[derive(Clone, Debug)]
pub struct CallDriver {
    client: ChainGatewayClient<Channel>,
    pattern: CallPattern,
    chains: Arc<[ServiceChain]>,
    plan: CallPlan,
}

impl CallDriver {
    /// # Errors
    ///
    /// [`CallError::NoChains`] if `chains` is empty.
    pub fn new(
        client: ChainGatewayClient<Channel>,
        pattern: CallPattern,
        chains: Arc<[ServiceChain]>,
        plan: CallPlan,
    ) -> Result<Self, CallError> {
        if chains.is_empty() {
            return Err(CallError::NoChains);
        }
        Ok(Self {
            client,
            pattern,
            chains,
            plan,
        })
    }

    /// Issues one call per token in `deadlines`, in order.
    ///
    /// # Errors
    ///
    /// The first [`CallError`] hit by any call. No later call is issued.
    pub async fn run(&self, deadlines: &DeadlineSet) -> Result<DriverReport, CallError> {
        tracing::info!("Calling {} rpc", self.pattern);
        let worker_start = Instant::now();
        let mut client = self.client.clone();
        let mut report = DriverReport::default();

        for index in 0..deadlines.len() {
            let deadline = self.plan.deadline_policy.deadline(
                worker_start,
                Instant::now(),
                index,
                self.plan.call_timeout,
                self.plan.call_interval,
            );
            let Some(token) = deadlines.arm(index, deadline) else {
                break;
            };

            let descriptors = self.call_once(&mut client, index, &token, deadline).await?;
            report.calls += 1;
            report.descriptors += descriptors;

            sleep(self.plan.call_interval).await;
        }

        Ok(report)
    }

    async fn call_once(
        &self,
        client: &mut ChainGatewayClient<Channel>,
        index: usize,
        token: &CancellationToken,
        deadline: Instant,
    ) -> Result<usize, CallError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let call = async {
            match self.pattern {
                CallPattern::Unary => self.unary(client, index, timeout).await,
                CallPattern::ServerStream => self.server_stream(client, index, timeout).await,
                CallPattern::ClientStream => self.client_stream(client, index, timeout).await,
                CallPattern::BidiStream => self.bidi_stream(client, index, timeout).await,
            }
        };

        tokio::select! {
            res = call => res,
            () = token.cancelled() => Err(CallError::DeadlineExceeded { call: index }),
        }
    }

    fn chain_for(&self, index: usize) -> &ServiceChain {
        &self.chains[index % self.chains.len()]
    }

    async fn unary(
        &self,
        client: &mut ChainGatewayClient<Channel>,
        index: usize,
        timeout: Duration,
    ) -> Result<usize, CallError> {
        let mut req = Request::new(self.chain_for(index).clone());
        req.set_timeout(timeout);

        let reply = client
            .resolve_chain(req)
            .await
            .map_err(|status| CallError::from_status(index, status))?
            .into_inner();
        tracing::debug!(call = index, "Got a response from unary rpc: {reply:?}");
        Ok(1)
    }

    async fn server_stream(
        &self,
        client: &mut ChainGatewayClient<Channel>,
        index: usize,
        timeout: Duration,
    ) -> Result<usize, CallError> {
        let mut req = Request::new(ServiceChains {
            chains: self.chains.to_vec(),
        });
        req.set_timeout(timeout);

        let mut stream = client
            .resolve_chains(req)
            .await
            .map_err(|status| CallError::from_status(index, status))?
            .into_inner();

        let mut received = 0;
        while let Some(desc) = stream
            .message()
            .await
            .map_err(|status| CallError::from_status(index, status))?
        {
            tracing::debug!(call = index, "Got a response from server-stream rpc: {desc:?}");
            received += 1;
        }
        Ok(received)
    }

    async fn client_stream(
        &self,
        client: &mut ChainGatewayClient<Channel>,
        index: usize,
        timeout: Duration,
    ) -> Result<usize, CallError> {
        let mut req = Request::new(tokio_stream::iter(self.chains.to_vec()));
        req.set_timeout(timeout);

        let reply = client
            .resolve_chain_stream(req)
            .await
            .map_err(|status| CallError::from_status(index, status))?
            .into_inner();
        tracing::debug!(call = index, "Got a response from client-stream rpc: {reply:?}");
        Ok(reply.chain_descs.len())
    }

    /// Sends every chain from a separate task while this one reads the
    /// replies. The call is done once both sides are.
    ///
    /// If the deadline fires first the sender task is left detached. It holds
    /// at most `chains.len()` buffered sends and stops at the first failed
    /// send, so it ends shortly after the call is dropped.
    async fn bidi_stream(
        &self,
        client: &mut ChainGatewayClient<Channel>,
        index: usize,
        timeout: Duration,
    ) -> Result<usize, CallError> {
        let (tx, rx) = mpsc::channel(self.chains.len());
        let mut req = Request::new(ReceiverStream::new(rx));
        req.set_timeout(timeout);

        let chains = Arc::clone(&self.chains);
        let sender = tokio::spawn(
            async move {
                for chain in chains.iter() {
                    if tx.send(chain.clone()).await.is_err() {
                        return Err(CallError::OutboundClosed { call: index });
                    }
                    tracing::trace!(call = index, chain_id = chain.chain_id, "Sent chain");
                    sleep(BIDI_SEND_PAUSE).await;
                }
                Ok(())
            }
            .in_current_span(),
        );

        let received = async {
            let mut inbound = client
                .resolve_chains_bidi(req)
                .await
                .map_err(|status| CallError::from_status(index, status))?
                .into_inner();

            let mut received = 0;
            while let Some(desc) = inbound
                .message()
                .await
                .map_err(|status| CallError::from_status(index, status))?
            {
                tracing::debug!(call = index, "Got a response from bidi-stream rpc: {desc:?}");
                received += 1;
            }
            Ok::<_, CallError>(received)
        }
        .await;

        let sent = sender.await.map_err(|e| CallError::TaskFailed {
            call: index,
            reason: e.to_string(),
        });

        // A failed receive usually closes the outbound side too; report the
        // receive error, which carries the server's status.
        let received = received?;
        sent??;
        Ok(received)
    }
}
