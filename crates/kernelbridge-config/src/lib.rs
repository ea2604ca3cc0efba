//! Configuration management for kernelbridge
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (KERNELBRIDGE_* prefix, `__` between sections; highest precedence)
//! 2. kernelbridge.local.toml (gitignored, local overrides)
//! 3. kernelbridge.toml (git-tracked, project config)
//! 4. ~/.config/kernelbridge/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::{ConfigLayer, ConfigSource, Paths};

/// Main kernelbridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub kernel: KernelConfig,
    pub execution: ExecutionConfig,
    pub classification: ClassificationConfig,
}

/// Which kernel to launch and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Kernelspec name (`jupyter kernelspec list`).
    pub name: String,
    /// Explicit argv; overrides the kernelspec. `{connection_file}` is substituted.
    pub command: Option<Vec<String>>,
    /// Extra Jupyter data roots searched before the standard ones.
    pub search_paths: Vec<PathBuf>,
    /// Address the kernel binds its sockets to.
    pub ip: String,
    pub startup_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            name: "xcpp20".to_string(),
            command: None,
            search_paths: Vec::new(),
            ip: "127.0.0.1".to_string(),
            startup_timeout_ms: 10_000,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl KernelConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Per-session execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound for a single fragment, from submit to idle.
    pub timeout_ms: u64,
    /// Interpreter flags applied at start via `%config Interpreter.flags`.
    pub flags: Vec<String>,
    /// Include directories, applied as `-I` flags and used to resolve headers.
    pub include_paths: Vec<PathBuf>,
    /// Headers included into every fresh session.
    pub headers: Vec<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            flags: vec!["-stdlib=libc++".to_string()],
            include_paths: Vec::new(),
            headers: [
                "iostream",
                "stdexcept",
                "typeinfo",
                "cxxabi.h",
                "memory",
                "cstdlib",
                "string",
                "sstream",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Patterns used to classify kernel output.
///
/// Diagnostic spelling depends on the kernel and compiler version, so all of
/// these are overridable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Regex over diagnostic text identifying a compilation failure.
    pub compile_error: String,
    /// Regex over diagnostic text identifying a runtime fault.
    pub runtime_fault: String,
    /// Marker thrown by generated assertion fragments.
    pub assertion_signature: String,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            compile_error: r"(?m)Compilation error|:\d+:\d+: error:|^error: ".to_string(),
            runtime_fault: r"(?i)\bexception\b|terminate called|segmentation fault|\baborted\b"
                .to_string(),
            assertion_signature: "AssertionError".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Checks invariants the loader cannot express through types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kernel.name.trim().is_empty() && self.kernel.command.is_none() {
            return Err(ConfigError::Invalid(
                "either kernel.name or kernel.command must be set".to_string(),
            ));
        }
        if let Some(command) = &self.kernel.command {
            if command.is_empty() {
                return Err(ConfigError::Invalid(
                    "kernel.command must not be empty".to_string(),
                ));
            }
        }
        for (key, value) in [
            ("kernel.startup_timeout_ms", self.kernel.startup_timeout_ms),
            ("execution.timeout_ms", self.execution.timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{key} must be greater than zero"
                )));
            }
        }
        for (key, pattern) in [
            ("classification.compile_error", &self.classification.compile_error),
            ("classification.runtime_fault", &self.classification.runtime_fault),
        ] {
            regex::Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                key,
                source: Box::new(source),
            })?;
        }
        if self.classification.assertion_signature.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "classification.assertion_signature must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        for path in self
            .kernel
            .search_paths
            .iter_mut()
            .chain(self.execution.include_paths.iter_mut())
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}
