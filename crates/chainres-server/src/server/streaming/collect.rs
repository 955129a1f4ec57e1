use super::resolve_logged;
use chainres_core::{
    ChainResolver,
    proto::{ServiceChain, ServiceChainDescriptors},
};
use tokio_stream::{Stream, StreamExt};
use tonic::Status;

/// Resolves every chain the caller streams in and returns them as one
/// aggregate, in receive order, once the caller ends its stream.
///
/// Any inbound or resolver error is returned as-is and the descriptors
/// accumulated so far are dropped: the caller never sees a partial aggregate.
pub async fn collect_resolved<S>(
    resolver: &ChainResolver,
    mut inbound: S,
) -> Result<ServiceChainDescriptors, Status>
where
    S: Stream<Item = Result<ServiceChain, Status>> + Unpin,
{
    let mut chain_descs = Vec::new();

    while let Some(chain) = inbound.next().await {
        let chain = chain?;
        tracing::debug!(chain_id = chain.chain_id, "Received service chain");
        chain_descs.push(resolve_logged(resolver, &chain)?);
    }

    Ok(ServiceChainDescriptors { chain_descs })
}
