//! Error types for chain resolution.
//!
//! This module defines the central `Error` enum shared by the resolver and the
//! gRPC gateway. It implements `From<Error>` for `tonic::Status` so resolver
//! failures surface to callers with a meaningful status code, unwrapped.
//!
//! ## Error Cases
//! - `UnknownService`: A chain references a name absent from the service
//!   table.
//! - `InvalidPosition`: A chain element's position lies outside
//!   `[1, chain_len]`.
//! - `InvalidChainLength`: The chain length is negative or above the
//!   configured limit.
//! - `IncompleteChain`: Strict resolution left one or more slots unfilled.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for chain resolution.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The service table has no entry for `service_name`.
    #[error("Error for service {service_name} in chain {chain_id}: No service found")]
    UnknownService { service_name: String, chain_id: i32 },

    /// The element's position does not fit the chain.
    #[error(
        "Error for service {service_name} in chain {chain_id}: Wrong service position {position} with chain len {chain_len}"
    )]
    InvalidPosition {
        service_name: String,
        chain_id: i32,
        position: i32,
        chain_len: i32,
    },

    /// The declared length is negative or exceeds `max`.
    #[error("Chain {chain_id} has invalid length {chain_len} (max {max})")]
    InvalidChainLength {
        chain_id: i32,
        chain_len: i32,
        max: usize,
    },

    /// No element targeted the listed 1-based positions.
    #[error("Chain {chain_id} leaves positions {missing_positions:?} unfilled")]
    IncompleteChain {
        chain_id: i32,
        missing_positions: Vec<i32>,
    },
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::UnknownService { .. } => Status::not_found(message),
            Error::InvalidPosition { .. } | Error::InvalidChainLength { .. } => {
                Status::invalid_argument(message)
            }
            Error::IncompleteChain { .. } => Status::failed_precondition(message),
        }
    }
}
