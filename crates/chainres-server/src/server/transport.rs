//! Transport wiring for the gateway: one tonic router carrying the chain
//! service, gRPC health and reflection, reachable over HTTP/2 as well as
//! gRPC-Web.

use crate::server::service::handler::ChainService;
use chainres_core::proto::{FILE_DESCRIPTOR_SET, chain_gateway_server::ChainGatewayServer};
use futures::Stream;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite};
use tonic::transport::server::Connected;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

/// Serves `service` on every connection yielded by `incoming` until
/// `shutdown` resolves.
///
/// Health reports `SERVING` for the chain gateway while the server runs and
/// flips to `NOT_SERVING` as soon as `shutdown` fires, before in-flight calls
/// are drained.
pub async fn serve_with_incoming<I, IO, IE, F>(
    incoming: I,
    service: ChainService,
    shutdown: F,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
    F: Future<Output = ()>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<ChainGatewayServer<ChainService>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let signal = async move {
        shutdown.await;
        tracing::info!("Shutdown signal received, terminating gracefully...");
        health_reporter
            .set_not_serving::<ChainGatewayServer<ChainService>>()
            .await;
    };

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_gateway_service(service))
        .serve_with_incoming_shutdown(incoming, signal)
        .await?;

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn build_gateway_service(service: ChainService) -> ChainGatewayServer<ChainService> {
    ChainGatewayServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}
