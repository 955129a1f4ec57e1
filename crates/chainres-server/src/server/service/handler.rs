//! gRPC service implementation for service-chain resolution.
//!
//! This module defines [`ChainService`], the implementation of the
//! [`ChainGateway`] service from the protobuf definition. All four methods
//! share one [`ChainResolver`] and differ only in how many chains they read
//! and how many descriptors they send back:
//!
//! | Method                 | In            | Out                   |
//! | ---------------------- | ------------- | --------------------- |
//! | `resolve_chain`        | one chain     | one descriptor        |
//! | `resolve_chains`       | one batch     | stream of descriptors |
//! | `resolve_chain_stream` | chain stream  | one aggregate         |
//! | `resolve_chains_bidi`  | chain stream  | stream of descriptors |
//!
//! Resolver errors become the call's terminal status as-is. Only the failing
//! call is affected.

use crate::server::{
    config::ServerConfig,
    streaming::{
        StreamGuard, batch::emit_batch, collect::collect_resolved, relay::relay_resolved,
        resolve_logged,
    },
    telemetry::increment_requests,
};
use chainres_core::{
    ChainResolver,
    proto::{
        ServiceChain, ServiceChainDescriptor, ServiceChainDescriptors, ServiceChains,
        chain_gateway_server::ChainGateway,
    },
    types::ServiceTable,
};
use core::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};
use tracing::Instrument;

type DescriptorStream = Pin<Box<dyn Stream<Item = Result<ServiceChainDescriptor, Status>> + Send>>;

/// gRPC gateway resolving service chains against an immutable service table.
///
/// Cloning is cheap: the table is shared, never copied.
#[derive(Clone)]
pub struct ChainService {
    resolver: ChainResolver,
    stream_buffer_size: usize,
    span: tracing::Span,
}

impl ChainService {
    /// Builds the service over `table`.
    ///
    /// `span` is the parent of every request span, so all request logs carry
    /// the fields the caller put on it.
    pub fn new(table: ServiceTable, config: &ServerConfig, span: tracing::Span) -> Self {
        let resolver = ChainResolver::new(table)
            .with_completeness(config.completeness)
            .with_max_chain_len(config.max_chain_len);

        span.in_scope(|| {
            tracing::info!(
                services = resolver.table().len(),
                completeness = ?resolver.completeness(),
                "Chain service ready"
            );
        });

        Self {
            resolver,
            stream_buffer_size: config.stream_buffer_size,
            span,
        }
    }
}

#[tonic::async_trait]
impl ChainGateway for ChainService {
    type ResolveChainsStream = DescriptorStream;
    type ResolveChainsBidiStream = DescriptorStream;

    async fn resolve_chain(
        &self,
        req: Request<ServiceChain>,
    ) -> Result<Response<ServiceChainDescriptor>, Status> {
        let span = tracing::info_span!(
            parent: &self.span,
            "resolve_chain",
            chain_id = req.get_ref().chain_id
        );
        span.in_scope(|| {
            increment_requests("unary");
            tracing::debug!("Received service chain request: {:?}", req.get_ref());
            resolve_logged(&self.resolver, req.get_ref())
        })
        .map(Response::new)
    }

    async fn resolve_chains(
        &self,
        req: Request<ServiceChains>,
    ) -> Result<Response<Self::ResolveChainsStream>, Status> {
        let span = tracing::info_span!(
            parent: &self.span,
            "resolve_chains",
            chains = req.get_ref().chains.len()
        );
        increment_requests("server_stream");
        let chains = req.into_inner().chains;
        let (resp_tx, resp_rx) = mpsc::channel(self.stream_buffer_size);
        let resolver = self.resolver.clone();

        let fut = async move {
            let _guard = StreamGuard::open();
            let emitted = emit_batch(resolver, chains, resp_tx).await;
            tracing::debug!("Batch stream closed after {emitted} descriptors");
        };
        tokio::spawn(fut.instrument(span));

        Ok(Response::new(Box::pin(ReceiverStream::new(resp_rx))))
    }

    async fn resolve_chain_stream(
        &self,
        req: Request<Streaming<ServiceChain>>,
    ) -> Result<Response<ServiceChainDescriptors>, Status> {
        let span = tracing::info_span!(parent: &self.span, "resolve_chain_stream");
        increment_requests("client_stream");
        let inbound = req.into_inner();
        let resolver = self.resolver.clone();

        let fut = async move {
            let _guard = StreamGuard::open();
            let aggregate = collect_resolved(&resolver, inbound).await?;
            tracing::debug!("Aggregated {} descriptors", aggregate.chain_descs.len());
            Ok::<_, Status>(Response::new(aggregate))
        };
        fut.instrument(span).await
    }

    async fn resolve_chains_bidi(
        &self,
        req: Request<Streaming<ServiceChain>>,
    ) -> Result<Response<Self::ResolveChainsBidiStream>, Status> {
        let span = tracing::info_span!(parent: &self.span, "resolve_chains_bidi");
        increment_requests("bidi_stream");
        let inbound = req.into_inner();
        let (resp_tx, resp_rx) = mpsc::channel(self.stream_buffer_size);
        let resolver = self.resolver.clone();

        let fut = async move {
            let _guard = StreamGuard::open();
            let relayed = relay_resolved(resolver, inbound, resp_tx).await;
            tracing::debug!("Bidi stream closed after {relayed} descriptors");
        };
        tokio::spawn(fut.instrument(span));

        Ok(Response::new(Box::pin(ReceiverStream::new(resp_rx))))
    }
}
