use crate::client::driver::{CallPattern, CallPlan, deadline::DeadlinePolicy};
use anyhow::bail;
use chainres_core::types::DEFAULT_PORT;
use clap::Parser;
use core::time::Duration;
use std::path::PathBuf;
use tonic::transport::Endpoint;

/// Runtime configuration for the `chainres-client` binary.
///
/// All values are parsed from CLI arguments or environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "chainres-client",
    version,
    about = "Drives a chainres gateway with concurrent workers"
)]
pub struct CliArgs {
    /// URI of the gateway.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = format!("http://127.0.0.1:{DEFAULT_PORT}"))]
    pub server_addr: String,

    /// JSON file holding the service chains to send.
    ///
    /// Environment variable: `CHAIN_INFO_FILE`
    #[arg(long, env = "CHAIN_INFO_FILE", default_value = "testdata/chains.json")]
    pub chain_info_file: PathBuf,

    /// Interaction pattern every worker drives.
    ///
    /// Environment variable: `PATTERN`
    #[arg(long, env = "PATTERN", value_enum, default_value_t = CallPattern::Unary)]
    pub pattern: CallPattern,

    /// Calls issued by each worker.
    ///
    /// Environment variable: `CALL_NUM`
    #[arg(long, env = "CALL_NUM", default_value_t = 10)]
    pub call_num: usize,

    /// Concurrent workers per connection.
    ///
    /// Environment variable: `CONCUR_NUM`
    #[arg(long, env = "CONCUR_NUM", default_value_t = 1)]
    pub concur_num: usize,

    /// Independent connections, each with its own workers.
    ///
    /// Environment variable: `CLIENT_NUM`
    #[arg(long, env = "CLIENT_NUM", default_value_t = 1)]
    pub client_num: usize,

    /// Pause after each call, in milliseconds.
    ///
    /// Environment variable: `CALL_INTERVAL_MS`
    #[arg(long, env = "CALL_INTERVAL_MS", default_value_t = 1000)]
    pub call_interval_ms: u64,

    /// Time a single call may take, in milliseconds.
    ///
    /// Environment variable: `CALL_TIMEOUT_MS`
    #[arg(long, env = "CALL_TIMEOUT_MS", default_value_t = 5000)]
    pub call_timeout_ms: u64,

    /// How per-call deadlines are computed.
    ///
    /// Environment variable: `DEADLINE_POLICY`
    #[arg(long, env = "DEADLINE_POLICY", value_enum, default_value_t = DeadlinePolicy::Fixed)]
    pub deadline_policy: DeadlinePolicy,

    /// Time to wait for each worker before reporting it as timed out, in
    /// milliseconds. Defaults to the worst case implied by the call count,
    /// interval, timeout and deadline policy.
    ///
    /// Environment variable: `WORKER_BUDGET_MS`
    #[arg(long, env = "WORKER_BUDGET_MS")]
    pub worker_budget_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub chain_info_file: PathBuf,
    pub pattern: CallPattern,
    pub client_num: usize,
    pub concur_num: usize,
    pub plan: CallPlan,
    /// Overrides [`CallPlan::worker_budget`] when set.
    pub worker_budget: Option<Duration>,
}

impl TryFrom<CliArgs> for ClientConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.call_num == 0 {
            bail!("CALL_NUM must be greater than 0");
        }

        if args.concur_num == 0 {
            bail!("CONCUR_NUM must be greater than 0");
        }

        if args.client_num == 0 {
            bail!("CLIENT_NUM must be greater than 0");
        }

        if args.call_timeout_ms == 0 {
            bail!("CALL_TIMEOUT_MS must be greater than 0");
        }

        let Ok(endpoint) = Endpoint::from_shared(args.server_addr.clone()) else {
            bail!("SERVER_ADDR ({}) is not a valid URI", args.server_addr);
        };

        let call_timeout = Duration::from_millis(args.call_timeout_ms);

        Ok(Self {
            endpoint: endpoint.connect_timeout(call_timeout),
            chain_info_file: args.chain_info_file,
            pattern: args.pattern,
            client_num: args.client_num,
            concur_num: args.concur_num,
            plan: CallPlan {
                call_num: args.call_num,
                call_interval: Duration::from_millis(args.call_interval_ms),
                call_timeout,
                deadline_policy: args.deadline_policy,
            },
            worker_budget: args.worker_budget_ms.map(Duration::from_millis),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> anyhow::Result<ClientConfig> {
        let args = CliArgs::try_parse_from(
            ["chainres-client"].into_iter().chain(extra.iter().copied()),
        )?;
        ClientConfig::try_from(args)
    }

    #[test]
    fn builds_the_call_plan() {
        let config = parse(&[
            "--server-addr",
            "http://10.0.0.1:9000",
            "--pattern",
            "bi_stream",
            "--call-num",
            "3",
            "--call-interval-ms",
            "20",
            "--call-timeout-ms",
            "250",
            "--deadline-policy",
            "linear",
        ])
        .unwrap();

        assert_eq!(config.endpoint.uri().port_u16(), Some(9000));
        assert_eq!(config.pattern, CallPattern::BidiStream);
        assert_eq!(
            config.plan,
            CallPlan {
                call_num: 3,
                call_interval: Duration::from_millis(20),
                call_timeout: Duration::from_millis(250),
                deadline_policy: DeadlinePolicy::Linear,
            }
        );
        assert_eq!(config.worker_budget, None);

        let config = parse(&["--server-addr", "http://127.0.0.1:1", "--worker-budget-ms", "50"])
            .unwrap();
        assert_eq!(config.worker_budget, Some(Duration::from_millis(50)));
    }

    #[test]
    fn accepts_timeouts_beyond_the_representable_deadline() {
        // Deadlines and budgets clamp instead of overflowing, so these stay valid.
        let config = parse(&[
            "--server-addr",
            "http://127.0.0.1:1",
            "--call-num",
            "100000",
            "--call-timeout-ms",
            "18446744073709551615",
        ])
        .unwrap();
        assert_eq!(config.plan.worker_budget(), Duration::MAX);
    }

    #[test]
    fn rejects_zero_counts_and_timeouts() {
        for flag in ["--call-num", "--concur-num", "--client-num", "--call-timeout-ms"] {
            assert!(parse(&["--server-addr", "http://127.0.0.1:1", flag, "0"]).is_err());
        }
        assert!(parse(&["--server-addr", "not a uri"]).is_err());
    }
}
