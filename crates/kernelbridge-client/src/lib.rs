//! # kernelbridge-client
//!
//! Talks to a running kernel over its ZeroMQ sockets.
//!
//! - [`KernelChannel`]: shell/control DEALER and iopub SUB sockets behind one
//!   I/O task, with per-request routing by correlation id
//! - [`Coordinator`]: one fragment in, one classified [`ExecutionResult`] out
//!
//! Classification of compile errors, runtime faults and timeouts happens here
//! and nowhere else; callers only map the resulting [`ClientError`]s.

mod channel;
mod coordinator;
mod error;

pub use channel::{ChannelKind, Incoming, KernelChannel, PendingRequest, RequestChannel};
pub use coordinator::{
    Classifier, Coordinator, ExecutionResult, ExecutionStatus, FaultKind, Phase,
    strip_trailing_newline,
};
pub use error::{ClientError, ClientResult};
