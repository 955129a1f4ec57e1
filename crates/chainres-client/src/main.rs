#![doc = include_str!("../README.md")]

use anyhow::Context;
use chainres_client::client::{
    config::{CliArgs, ClientConfig},
    pool::manager::Orchestrator,
    telemetry::init_tracing,
};
use chainres_core::fixture::load_chains;
use clap::Parser;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ClientConfig::try_from(args)?;

    init_tracing()?;

    let chains = load_chains(&config.chain_info_file).context("failed to load service chains")?;
    tracing::info!(
        "Loaded {} service chains from {}",
        chains.len(),
        config.chain_info_file.display()
    );

    let report = Orchestrator::new(config, chains)?.run().await;
    if report.all_completed() {
        Ok(())
    } else {
        anyhow::bail!(
            "{} of {} workers did not complete",
            report.total() - report.completed,
            report.total()
        )
    }
}
