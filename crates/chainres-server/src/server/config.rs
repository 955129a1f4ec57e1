use anyhow::bail;
use chainres_core::{
    Completeness,
    types::{DEFAULT_MAX_CHAIN_LEN, DEFAULT_PORT},
};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf};

/// Runtime configuration for the `chainres-server` binary.
///
/// All values are parsed from CLI arguments or environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "chainres-server",
    version,
    about = "A gRPC service resolving chains of named services"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = format!("0.0.0.0:{DEFAULT_PORT}"))]
    pub server_addr: String,

    /// JSON file holding the service descriptors served by this instance.
    ///
    /// Environment variable: `SVC_INFO_FILE`
    #[arg(long, env = "SVC_INFO_FILE", default_value = "testdata/services.json")]
    pub svc_info_file: PathBuf,

    /// Name of the service provided by this server. Only used to label logs.
    ///
    /// Environment variable: `SERVICE_NAME`
    #[arg(long, env = "SERVICE_NAME", default_value_t = String::from("svcA"))]
    pub service_name: String,

    /// Reject chains whose elements leave a position unfilled instead of
    /// returning an empty slot.
    ///
    /// Environment variable: `STRICT_CHAINS`
    #[arg(long, env = "STRICT_CHAINS", default_value_t = false)]
    pub strict_chains: bool,

    /// Largest `chain_len` a request may declare.
    ///
    /// Slots are allocated before the chain is inspected, so this bounds the
    /// memory a single request can claim.
    ///
    /// Environment variable: `MAX_CHAIN_LEN`
    #[arg(long, env = "MAX_CHAIN_LEN", default_value_t = DEFAULT_MAX_CHAIN_LEN)]
    pub max_chain_len: usize,

    /// Capacity of the buffer between a resolving task and its response
    /// stream.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: SocketAddr,
    pub svc_info_file: PathBuf,
    pub service_name: String,
    pub completeness: Completeness,
    pub max_chain_len: usize,
    pub stream_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            svc_info_file: PathBuf::from("testdata/services.json"),
            service_name: String::from("svcA"),
            completeness: Completeness::Lenient,
            max_chain_len: DEFAULT_MAX_CHAIN_LEN,
            stream_buffer_size: 8,
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_chain_len == 0 {
            bail!("MAX_CHAIN_LEN must be greater than 0");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        let Ok(server_addr) = args.server_addr.parse::<SocketAddr>() else {
            bail!("SERVER_ADDR ({}) is not a valid socket address", args.server_addr);
        };

        let completeness = if args.strict_chains {
            Completeness::Strict
        } else {
            Completeness::Lenient
        };

        Ok(Self {
            server_addr,
            svc_info_file: args.svc_info_file,
            service_name: args.service_name,
            completeness,
            max_chain_len: args.max_chain_len,
            stream_buffer_size: args.stream_buffer_size,
        })
    }
}
