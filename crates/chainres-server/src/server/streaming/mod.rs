//! Per-pattern drivers behind the streaming RPCs.
//!
//! Every streaming call runs the same loop over one resolver:
//!
//! ```text
//! AwaitingInput -> Resolving -> Emitting -> AwaitingInput ... -> Closed(ok)
//!                      \-> Closed(error)
//! ```
//!
//! The loops differ in where input comes from and where output goes:
//!
//! - [`batch`] - input is an in-memory batch, output a response stream.
//! - [`collect`] - input is the caller's stream, output one aggregate.
//! - [`relay`] - input is the caller's stream, output a response stream with
//!   one descriptor per received chain.
//!
//! A resolver failure moves straight to `Closed(error)`: nothing is emitted
//! after it, and the error is the call's terminal status.

pub mod batch;
pub mod collect;
pub mod relay;

use crate::server::telemetry::{
    decrement_streams_inflight, increment_chains_resolved, increment_resolve_errors,
    increment_streams_inflight, record_stream_duration,
};
use chainres_core::{
    ChainResolver,
    proto::{ServiceChain, ServiceChainDescriptor},
};
use std::time::Instant;
use tonic::Status;

/// Resolves one chain, recording the outcome.
pub(crate) fn resolve_logged(
    resolver: &ChainResolver,
    chain: &ServiceChain,
) -> Result<ServiceChainDescriptor, Status> {
    match resolver.resolve(chain) {
        Ok(descriptor) => {
            increment_chains_resolved();
            tracing::debug!(chain_id = chain.chain_id, "Resolved service chain");
            Ok(descriptor)
        }
        Err(e) => {
            increment_resolve_errors();
            tracing::warn!(chain_id = chain.chain_id, "Failed to resolve service chain: {e}");
            Err(e.into())
        }
    }
}

/// Tracks one open stream for the in-flight gauge and the duration
/// histogram. Both are updated when the guard is dropped, however the stream
/// ends.
pub(crate) struct StreamGuard {
    start: Instant,
}

impl StreamGuard {
    pub(crate) fn open() -> Self {
        increment_streams_inflight();
        Self {
            start: Instant::now(),
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        decrement_streams_inflight();
        record_stream_duration(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chainres_core::{
        ChainResolver,
        proto::{ServiceChain, ServiceDescriptor, ServiceRef},
        types::ServiceTable,
    };

    pub fn resolver() -> ChainResolver {
        let table: ServiceTable = ["A", "B"]
            .into_iter()
            .map(|name| ServiceDescriptor {
                svc_name: name.to_string(),
                svc_desc: format!("This is service {name}"),
                svc_pos: 0,
            })
            .collect();
        ChainResolver::new(table)
    }

    /// A two-element chain over `A` and `second`.
    pub fn chain(chain_id: i32, second: &str) -> ServiceChain {
        ServiceChain {
            chain_id,
            chain_len: 2,
            chain: vec![
                ServiceRef {
                    svc_name: second.to_string(),
                    svc_pos: 2,
                },
                ServiceRef {
                    svc_name: "A".to_string(),
                    svc_pos: 1,
                },
            ],
        }
    }
}
