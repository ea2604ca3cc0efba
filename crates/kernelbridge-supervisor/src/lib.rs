//! Kernel process supervision for kernelbridge.
//!
//! Provides the process side of a kernel session:
//! - Kernelspec discovery across the Jupyter data roots
//! - Fresh connection info (ports + signing key) per launch
//! - Spawning, liveness checks and graceful-then-forced termination
//!
//! Each [`KernelProcess`] owns exactly one OS process. Nothing here speaks the
//! messaging protocol; requesting a clean shutdown over the control channel is
//! the caller's job before [`KernelProcess::stop`].

pub mod connection;
pub mod error;
pub mod kernelspec;
pub mod process;
pub mod supervisor;

pub use connection::{ConnectionFile, ConnectionInfo};
pub use error::{Error, Result};
pub use kernelspec::{KernelSpec, find_kernelspec, find_kernelspecs, jupyter_data_roots};
pub use process::{KernelProcess, KernelStatus};
pub use supervisor::{KernelSupervisor, LaunchPlan};
