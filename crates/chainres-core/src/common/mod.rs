//! Shared wire types, data model and error definitions.
//!
//! ## Submodules
//!
//! - [`error`] - Resolution and service errors, convertible into
//!   [`tonic::Status`].
//! - [`types`] - The immutable [`ServiceTable`](types::ServiceTable) and
//!   protocol constants.
//! - [`proto`] - Generated Protobuf messages and the `ChainGateway` service.

pub mod error;
pub mod types;

pub use error::{Error, Result};

/// gRPC service and message definitions generated from
/// `proto/chainres.proto`.
///
/// ## Service
///
/// - `ResolveChain` - unary, one chain in, one descriptor out.
/// - `ResolveChains` - a batch in, a stream of descriptors out.
/// - `ResolveChainStream` - a stream of chains in, one aggregate out.
/// - `ResolveChainsBidi` - one descriptor out per chain in, on one stream.
///
/// ## Invariants
///
/// - `ServiceChainDescriptor.chain_desc.len() == chain_len`
/// - `chain_desc[i].descriptor`, when set, has `svc_pos == i + 1`
pub mod proto {
    tonic::include_proto!("chainres");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("chainres_descriptor");
}
