#![doc = include_str!("../README.md")]

use anyhow::Context;
use chainres_core::{fixture::load_services, types::ServiceTable};
use chainres_server::server::{
    config::{CliArgs, ServerConfig},
    service::handler::ChainService,
    telemetry::init_telemetry,
    transport::serve_with_incoming,
};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let table: ServiceTable = load_services(&config.svc_info_file)
        .context("failed to load the service table")?
        .into_iter()
        .collect();

    let span = tracing::info_span!("chain_service", service = %config.service_name);
    let service = ChainService::new(table, &config, span);

    let tcp = TcpListener::bind(config.server_addr).await?;
    let incoming = TcpListenerStream::new(tcp);
    log_startup_info(&config);

    let res = serve_with_incoming(incoming, service, shutdown_signal()).await;
    providers.shutdown();
    res
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting chain service on {} with full config: {:#?}",
            config.server_addr,
            config
        );
    } else {
        tracing::info!(
            "Starting chain service {} on {}",
            config.service_name,
            config.server_addr
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
