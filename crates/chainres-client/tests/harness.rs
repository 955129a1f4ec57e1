use chainres_client::{
    CallError,
    client::{
        config::ClientConfig,
        driver::{
            CallDriver, CallPattern, CallPlan,
            deadline::{DeadlinePolicy, DeadlineSet},
        },
        pool::{
            manager::{Orchestrator, RunReport, WorkerVerdict, await_worker},
            worker::{WorkerGuard, run_worker},
        },
    },
};
use chainres_core::{
    fixture::{load_chains, load_services},
    proto::{
        ServiceChain, ServiceChainDescriptor, ServiceChainDescriptors, ServiceChains, ServiceRef,
        chain_gateway_client::ChainGatewayClient,
        chain_gateway_server::{ChainGateway, ChainGatewayServer},
    },
    types::ServiceTable,
};
use chainres_server::server::{
    config::ServerConfig, service::handler::ChainService, transport::serve_with_incoming,
};
use core::{pin::Pin, time::Duration};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle, time::Instant};
use tokio_stream::{Stream, wrappers::TcpListenerStream};
use tonic::{
    Code, Request, Response, Status, Streaming,
    transport::{Endpoint, Server},
};

const ALL_PATTERNS: [CallPattern; 4] = [
    CallPattern::Unary,
    CallPattern::ServerStream,
    CallPattern::ClientStream,
    CallPattern::BidiStream,
];

const TESTDATA: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata");

struct Gateway {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Gateway {
    async fn start() -> Self {
        let table: ServiceTable = load_services(format!("{TESTDATA}/services.json"))
            .unwrap()
            .into_iter()
            .collect();
        let service = ChainService::new(table, &ServerConfig::default(), tracing::Span::none());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(serve_with_incoming(
            TcpListenerStream::new(listener),
            service,
            async {
                let _ = stopped.await;
            },
        ));

        Self { addr, stop, handle }
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        self.handle.await.unwrap().unwrap();
    }
}

type DescriptorStream = Pin<Box<dyn Stream<Item = Result<ServiceChainDescriptor, Status>> + Send>>;

/// A gateway that accepts every call and never answers.
struct Stalled;

#[tonic::async_trait]
impl ChainGateway for Stalled {
    type ResolveChainsStream = DescriptorStream;
    type ResolveChainsBidiStream = DescriptorStream;

    async fn resolve_chain(
        &self,
        _req: Request<ServiceChain>,
    ) -> Result<Response<ServiceChainDescriptor>, Status> {
        std::future::pending().await
    }

    async fn resolve_chains(
        &self,
        _req: Request<ServiceChains>,
    ) -> Result<Response<Self::ResolveChainsStream>, Status> {
        std::future::pending().await
    }

    async fn resolve_chain_stream(
        &self,
        _req: Request<Streaming<ServiceChain>>,
    ) -> Result<Response<ServiceChainDescriptors>, Status> {
        std::future::pending().await
    }

    async fn resolve_chains_bidi(
        &self,
        _req: Request<Streaming<ServiceChain>>,
    ) -> Result<Response<Self::ResolveChainsBidiStream>, Status> {
        std::future::pending().await
    }
}

async fn start_stalled() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(
        Server::builder()
            .add_service(ChainGatewayServer::new(Stalled))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );
    addr
}

async fn connect_driver(
    addr: SocketAddr,
    pattern: CallPattern,
    chains: Vec<ServiceChain>,
    plan: CallPlan,
) -> CallDriver {
    let client = ChainGatewayClient::connect(format!("http://{addr}"))
        .await
        .unwrap();
    CallDriver::new(client, pattern, chains.into(), plan).unwrap()
}

fn unknown_service_chain() -> ServiceChain {
    ServiceChain {
        chain_id: 99,
        chain_len: 1,
        chain: vec![ServiceRef {
            svc_name: "svcZ".to_string(),
            svc_pos: 1,
        }],
    }
}

fn config(addr: SocketAddr, pattern: CallPattern, deadline_policy: DeadlinePolicy) -> ClientConfig {
    ClientConfig {
        endpoint: Endpoint::from_shared(format!("http://{addr}"))
            .unwrap()
            .connect_timeout(Duration::from_secs(2)),
        chain_info_file: PathBuf::from(format!("{TESTDATA}/chains.json")),
        pattern,
        client_num: 2,
        concur_num: 3,
        plan: CallPlan {
            call_num: 3,
            call_interval: Duration::from_millis(10),
            call_timeout: Duration::from_secs(5),
            deadline_policy,
        },
        worker_budget: None,
    }
}

fn fixture_chains() -> Vec<ServiceChain> {
    load_chains(format!("{TESTDATA}/chains.json")).unwrap()
}

async fn run(config: ClientConfig, chains: Vec<ServiceChain>) -> RunReport {
    Orchestrator::new(config, chains).unwrap().run().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_pattern_completes_all_workers() {
    let gateway = Gateway::start().await;

    for pattern in ALL_PATTERNS {
        let report = run(
            config(gateway.addr, pattern, DeadlinePolicy::Fixed),
            fixture_chains(),
        )
        .await;

        assert_eq!(
            report,
            RunReport {
                completed: 6,
                ..RunReport::default()
            },
            "pattern {pattern}"
        );
    }

    gateway.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn linear_deadlines_complete_all_workers() {
    let gateway = Gateway::start().await;

    let report = run(
        config(gateway.addr, CallPattern::BidiStream, DeadlinePolicy::Linear),
        fixture_chains(),
    )
    .await;
    assert!(report.all_completed());
    assert_eq!(report.total(), 6);

    gateway.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn resolver_errors_fail_the_workers_that_hit_them() {
    let gateway = Gateway::start().await;

    // The failing chain goes first: unary sends it on call 0, the streaming
    // patterns send it as the first element of every call.
    let mut chains = fixture_chains();
    chains.insert(0, unknown_service_chain());

    for pattern in ALL_PATTERNS {
        let report = run(
            config(gateway.addr, pattern, DeadlinePolicy::Fixed),
            chains.clone(),
        )
        .await;
        assert_eq!(
            report,
            RunReport {
                failed: 6,
                ..RunReport::default()
            },
            "pattern {pattern}"
        );
    }

    gateway.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn drivers_surface_the_server_status() {
    let gateway = Gateway::start().await;
    let mut chains = fixture_chains();
    chains.insert(0, unknown_service_chain());
    let plan = config(gateway.addr, CallPattern::Unary, DeadlinePolicy::Fixed).plan;

    for pattern in ALL_PATTERNS {
        let driver = connect_driver(gateway.addr, pattern, chains.clone(), plan).await;
        let err = driver.run(&DeadlineSet::new(plan.call_num)).await.unwrap_err();

        match err {
            CallError::Rpc { call, status } => {
                assert_eq!(call, 0, "pattern {pattern}");
                assert_eq!(status.code(), Code::NotFound, "pattern {pattern}");
                assert_eq!(
                    status.message(),
                    "Error for service svcZ in chain 99: No service found"
                );
            }
            other => panic!("pattern {pattern}: unexpected error {other}"),
        }
    }

    gateway.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stalled_calls_end_at_their_deadline() {
    let addr = start_stalled().await;
    let plan = CallPlan {
        call_num: 3,
        call_interval: Duration::from_millis(10),
        call_timeout: Duration::from_millis(100),
        deadline_policy: DeadlinePolicy::Fixed,
    };

    for pattern in ALL_PATTERNS {
        let driver = connect_driver(addr, pattern, fixture_chains(), plan).await;
        let deadlines = DeadlineSet::new(plan.call_num);
        let started = Instant::now();

        let err = driver.run(&deadlines).await.unwrap_err();

        assert!(
            matches!(err, CallError::DeadlineExceeded { call: 0 }),
            "pattern {pattern}: {err}"
        );
        assert!(started.elapsed() >= plan.call_timeout);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    let mut stalled = config(addr, CallPattern::Unary, DeadlinePolicy::Fixed);
    stalled.plan = plan;
    let report = run(stalled, fixture_chains()).await;
    assert_eq!(
        report,
        RunReport {
            failed: 6,
            ..RunReport::default()
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exhausted_budget_stops_waiting_but_not_the_worker() {
    let gateway = Gateway::start().await;
    let plan = CallPlan {
        call_num: 3,
        call_interval: Duration::from_millis(100),
        call_timeout: Duration::from_secs(5),
        deadline_policy: DeadlinePolicy::Fixed,
    };
    let driver = connect_driver(gateway.addr, CallPattern::Unary, fixture_chains(), plan).await;

    let deadlines = Arc::new(DeadlineSet::new(plan.call_num));
    let (tx, rx) = oneshot::channel();
    let worker = tokio::spawn(run_worker(
        driver,
        WorkerGuard::new(Arc::clone(&deadlines), tx),
    ));

    let verdict = await_worker(rx, Instant::now() + Duration::from_millis(50)).await;
    assert_eq!(verdict, WorkerVerdict::TimedOut);
    assert!(!worker.is_finished());
    assert!(!deadlines.is_released());

    // The worker finishes its calls on its own and only then releases.
    worker.await.unwrap();
    assert!(deadlines.is_released());
    assert!(deadlines.iter().all(|token| token.is_cancelled()));
    assert!(!deadlines.release());

    gateway.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn orchestrator_reports_workers_over_budget() {
    let gateway = Gateway::start().await;

    let mut slow = config(gateway.addr, CallPattern::Unary, DeadlinePolicy::Fixed);
    slow.plan.call_interval = Duration::from_millis(100);
    slow.worker_budget = Some(Duration::from_millis(50));

    let report = run(slow, fixture_chains()).await;
    assert_eq!(
        report,
        RunReport {
            timed_out: 6,
            ..RunReport::default()
        }
    );

    // Give the detached workers time to finish before the server goes away.
    tokio::time::sleep(Duration::from_millis(600)).await;
    gateway.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unreachable_gateway_is_reported_per_worker() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let report = run(
        config(addr, CallPattern::Unary, DeadlinePolicy::Fixed),
        fixture_chains(),
    )
    .await;

    assert_eq!(
        report,
        RunReport {
            unreachable: 6,
            ..RunReport::default()
        }
    );
}

#[test]
fn empty_chain_fixture_is_rejected() {
    let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
    assert!(
        Orchestrator::new(
            config(addr, CallPattern::Unary, DeadlinePolicy::Fixed),
            Vec::new()
        )
        .is_err()
    );
}
