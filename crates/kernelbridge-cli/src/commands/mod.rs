//! CLI command implementations.

pub mod config;
pub mod exec;
pub mod kernels;
pub mod repl;

use anyhow::{Context, Result};
use kernelbridge::BridgeConfig;

/// Loads the layered configuration for `project`.
pub fn load_config(project: &str) -> Result<BridgeConfig> {
    BridgeConfig::load_from_dir(project).context("failed to load configuration")
}
