//! # kernelbridge
//!
//! Keyword library for testing C++ code through an incrementally compiling
//! Jupyter kernel (xeus-cpp `xcpp20` by default).
//!
//! - **Fresh interpreter per session** - every start launches a new kernel process
//! - **Persistent state within a session** - declarations stay visible to later fragments
//! - **Classified failures** - compile errors, runtime faults, assertion failures and
//!   timeouts are distinct, matchable errors
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           kernelbridge                           │
//! │  ┌──────────────┐   ┌─────────────┐   ┌──────────┐   ┌─────────┐ │
//! │  │KernelLibrary │ → │ Coordinator │ → │ Channel  │ → │ Process │ │
//! │  │  (keywords)  │   │ (classify)  │   │  (ZMQ)   │   │ (xcpp)  │ │
//! │  └──────────────┘   └─────────────┘   └──────────┘   └─────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use kernelbridge::{BridgeConfig, KernelLibrary};
//!
//! let mut library = KernelLibrary::new(BridgeConfig::load()?)?;
//! library.start_kernel(None)?;
//!
//! library.source_parse(&["int x = 42;".to_string()])?;
//! assert_eq!(library.get_value("x")?, "42");
//! library.assert("x == 42", None)?;
//! assert_eq!(library.typeid("x")?, "i");
//!
//! library.shutdown_kernel()?;
//! ```
//!
//! # Modules
//!
//! - **Keywords**: [`KernelLibrary`] (blocking), [`Kernel`] (async context)
//! - **Session**: [`Session`] - one kernel process and its coordinator
//! - **Fragments**: [`fragments`] - generated C++ snippets

mod error;
pub mod fragments;
mod kernel;
mod library;
mod session;

pub use error::{KernelError, Result};
pub use kernel::Kernel;
pub use library::{KEYWORDS, KernelLibrary};
pub use session::Session;

// Re-export the configuration and lower layers
pub use kernelbridge_client::{
    Classifier, Coordinator, ExecutionResult, ExecutionStatus, FaultKind, KernelChannel,
};
pub use kernelbridge_config::{BridgeConfig, ConfigLoader};
pub use kernelbridge_supervisor::{ConnectionInfo, KernelSpec, find_kernelspecs};
