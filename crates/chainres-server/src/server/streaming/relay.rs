use super::resolve_logged;
use chainres_core::{
    ChainResolver,
    proto::{ServiceChain, ServiceChainDescriptor},
};
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tonic::Status;

/// Answers each chain received on `inbound` with its descriptor before
/// reading the next one.
///
/// The response stream ends cleanly when the caller ends its side. A resolver
/// or inbound error is forwarded as the terminal item and nothing else is
/// read.
///
/// Returns the number of descriptors sent.
pub async fn relay_resolved<S>(
    resolver: ChainResolver,
    mut inbound: S,
    resp_tx: mpsc::Sender<Result<ServiceChainDescriptor, Status>>,
) -> usize
where
    S: Stream<Item = Result<ServiceChain, Status>> + Unpin,
{
    let mut relayed = 0;

    while let Some(next) = inbound.next().await {
        let reply = next.and_then(|chain| {
            tracing::debug!(chain_id = chain.chain_id, "Received service chain");
            resolve_logged(&resolver, &chain)
        });
        let failed = reply.is_err();

        if let Err(_e) = resp_tx.send(reply).await {
            tracing::debug!("Response channel closed after {relayed} descriptors");
            return relayed;
        }

        if failed {
            return relayed;
        }
        relayed += 1;
    }

    relayed
}
