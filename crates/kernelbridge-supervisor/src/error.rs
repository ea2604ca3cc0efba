//! Error types for kernel process supervision.

use std::path::PathBuf;
use thiserror::Error;

/// Process supervision errors.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No kernelspec with this name in any search root.
    #[error("kernelspec '{name}' not found (searched {} roots)", searched.len())]
    KernelSpecNotFound { name: String, searched: Vec<PathBuf> },

    /// A kernel.json exists but cannot be used.
    #[error("invalid kernelspec at {path}: {reason}")]
    InvalidKernelSpec { path: PathBuf, reason: String },

    /// Could not reserve ports or write the connection file.
    #[error("failed to prepare connection file: {0}")]
    Connection(String),

    /// Process spawn error.
    #[error("failed to spawn kernel '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// Kernel process exited before becoming usable.
    #[error("kernel exited during startup with exit code {0:?}")]
    ExitedDuringStartup(Option<i32>),
}

/// Result type for supervision operations.
pub type Result<T> = std::result::Result<T, Error>;
