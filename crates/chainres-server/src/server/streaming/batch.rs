use super::resolve_logged;
use chainres_core::{
    ChainResolver,
    proto::{ServiceChain, ServiceChainDescriptor},
};
use tokio::sync::mpsc;
use tonic::Status;

/// Resolves a batch in order and forwards each descriptor to the response
/// stream as soon as it is resolved.
///
/// The first chain that fails to resolve ends the stream: its error is sent as
/// the terminal item and no later chain is looked at. If the client has gone
/// away the loop stops at the next send.
///
/// Returns the number of descriptors emitted.
pub async fn emit_batch(
    resolver: ChainResolver,
    chains: Vec<ServiceChain>,
    resp_tx: mpsc::Sender<Result<ServiceChainDescriptor, Status>>,
) -> usize {
    let mut emitted = 0;

    for chain in &chains {
        let reply = resolve_logged(&resolver, chain);
        let failed = reply.is_err();

        if let Err(_e) = resp_tx.send(reply).await {
            // typically "channel closed" (client disconnect)
            tracing::debug!("Response channel closed after {emitted} descriptors");
            return emitted;
        }

        if failed {
            return emitted;
        }
        emitted += 1;
    }

    emitted
}
