//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A value is out of range or missing.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A classification regex does not compile.
    #[error("{key} is not a valid pattern: {source}")]
    InvalidPattern {
        key: &'static str,
        source: Box<regex::Error>,
    },

    #[error("no home directory for the user configuration")]
    NoHomeDir,
}
