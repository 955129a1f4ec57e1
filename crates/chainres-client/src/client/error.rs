use tonic::{Code, Status, TimeoutExpired};

/// Reasons a worker stops before finishing its calls.
///
/// Every variant is fatal for the worker that hit it. Other workers, and the
/// harness as a whole, keep running.
#[derive(thiserror::Error, Debug)]
pub enum CallError {
    #[error("Call {call} failed with {:?}: {}", status.code(), status.message())]
    Rpc { call: usize, status: Status },

    #[error("Call {call} exceeded its deadline")]
    DeadlineExceeded { call: usize },

    #[error("Call {call} could not send all chains: outbound stream closed")]
    OutboundClosed { call: usize },

    #[error("Call {call} lost a background task: {reason}")]
    TaskFailed { call: usize, reason: String },

    #[error("No service chains to send")]
    NoChains,
}

impl CallError {
    /// Wraps a status from call `call`. Expired `grpc-timeout`s come back as
    /// [`CallError::DeadlineExceeded`] whichever side enforced them. The
    /// channel's own timeout layer reports `Cancelled` with a fixed message.
    pub fn from_status(call: usize, status: Status) -> Self {
        match status.code() {
            Code::DeadlineExceeded => Self::DeadlineExceeded { call },
            Code::Cancelled if status.message() == TimeoutExpired(()).to_string() => {
                Self::DeadlineExceeded { call }
            }
            _ => Self::Rpc { call, status },
        }
    }
}
