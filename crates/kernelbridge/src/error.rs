//! Keyword-level error types.

use std::time::Duration;

use kernelbridge_client::ClientError;
use thiserror::Error;

/// Result type for keyword operations.
pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors surfaced to the keyword caller.
///
/// Display strings are stable so test scripts can match on them.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The kernel did not reach the ready state.
    #[error("kernel failed to start: {0}")]
    Startup(String),

    /// `start` while a session is active.
    #[error("kernel is already running")]
    AlreadyRunning,

    /// A keyword needing a session was called without one.
    #[error("kernel is not running")]
    NotRunning,

    /// The session's channel is gone.
    #[error("channel closed")]
    ChannelClosed,

    /// The kernel stopped answering.
    #[error("no message from the kernel within the timeout")]
    ChannelTimeout,

    /// Transport or protocol failure below the coordinator.
    #[error("transport error: {0}")]
    Transport(String),

    /// The fragment failed to compile.
    #[error("compilation failed: {0}")]
    Compile(String),

    /// The fragment faulted while running.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// An `Assert` condition evaluated to false.
    #[error("C++ Assertion Failed: {expression}")]
    AssertionFailed {
        expression: String,
        /// Diagnostic text reported by the kernel.
        detail: String,
    },

    /// The fragment ran longer than allotted.
    #[error("execution timed out after {0:?}")]
    ExecutionTimeout(Duration),

    /// No keyword with this name.
    #[error("no keyword named '{0}'")]
    UnknownKeyword(String),

    /// Wrong number of keyword arguments.
    #[error("keyword '{keyword}' expects {expected} argument(s), got {got}")]
    Arguments {
        keyword: String,
        expected: &'static str,
        got: usize,
    },

    /// Stopping the kernel process failed.
    #[error("supervisor error: {0}")]
    Supervisor(#[from] kernelbridge_supervisor::Error),

    /// I/O error, e.g. creating the runtime.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ClientError> for KernelError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Compile(message) => Self::Compile(message),
            ClientError::Runtime { message, .. } => Self::Runtime(message),
            ClientError::ExecutionTimeout(timeout) => Self::ExecutionTimeout(timeout),
            ClientError::ChannelTimeout => Self::ChannelTimeout,
            ClientError::ChannelClosed => Self::ChannelClosed,
            other @ (ClientError::Transport(_)
            | ClientError::Wire(_)
            | ClientError::Pattern(_)) => Self::Transport(other.to_string()),
        }
    }
}
