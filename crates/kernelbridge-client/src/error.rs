//! Client error types.

use std::time::Duration;

use kernelbridge_wire::WireError;
use thiserror::Error;

use crate::coordinator::FaultKind;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the channel and the coordinator.
///
/// Transport and lifecycle failures come from the channel; the execution
/// outcomes (`Compile`, `Runtime`, `ExecutionTimeout`) only from the
/// coordinator's classification.
#[derive(Debug, Error)]
pub enum ClientError {
    /// ZeroMQ transport error.
    #[error("transport error: {0}")]
    Transport(#[from] zeromq::ZmqError),

    /// Malformed or unsigned message.
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),

    /// No message arrived before the deadline.
    #[error("no message from the kernel within the timeout")]
    ChannelTimeout,

    /// The channel was closed or its I/O task ended.
    #[error("channel closed")]
    ChannelClosed,

    /// Invalid classification pattern.
    #[error("invalid classification pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The fragment failed to compile.
    #[error("compilation failed: {0}")]
    Compile(String),

    /// The fragment compiled but faulted while running.
    #[error("runtime error: {message}")]
    Runtime { kind: FaultKind, message: String },

    /// The fragment ran longer than allotted.
    #[error("execution timed out after {0:?}")]
    ExecutionTimeout(Duration),
}
