//! Configuration loader with multi-source merging

use crate::{BridgeConfig, ConfigError, Paths};
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    extra_file: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "KERNELBRIDGE".to_string(),
            extra_file: None,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "KERNELBRIDGE")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Layer an explicit file above the project files (e.g. `--config`).
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.extra_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<BridgeConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = BridgeConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2-4. User, project and local files, when present
        for source in Paths::new().sources(&self.project_dir) {
            if source.exists() {
                builder = builder.add_source(
                    config::File::from(source.path)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        // 5. Explicit file, must exist
        if let Some(extra) = &self.extra_file {
            builder = builder.add_source(
                config::File::from(extra.clone())
                    .required(true)
                    .format(config::FileFormat::Toml),
            );
        }

        // 6. Environment variables (KERNELBRIDGE_SECTION__KEY)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // Build and deserialize
        let config = builder.build().context("Failed to build configuration")?;

        let mut bridge_config: BridgeConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Resolve relative paths
        bridge_config.resolve_paths(&self.project_dir);

        bridge_config
            .validate()
            .context("Configuration failed validation")?;

        Ok(bridge_config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default(self) -> BridgeConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeConfig {
    /// Parse a single TOML file without layering.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .with_env_prefix("KERNELBRIDGE_TEST_DEFAULTS")
            .load()
            .expect("Failed to load config");

        assert_eq!(config.kernel.name, "xcpp20");
        assert_eq!(config.execution.timeout_ms, 30_000);
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[kernel]
name = "xcpp17"
startup_timeout_ms = 20000

[execution]
timeout_ms = 1500
flags = []
include_paths = ["include"]

[classification]
assertion_signature = "RobotAssert"
"#;
        fs::write(project_dir.join("kernelbridge.toml"), config_content)
            .expect("Failed to write config");

        let config = ConfigLoader::new()
            .with_project_dir(project_dir)
            .with_env_prefix("KERNELBRIDGE_TEST_PROJECT")
            .load()
            .expect("Failed to load config");

        assert_eq!(config.kernel.name, "xcpp17");
        assert_eq!(config.kernel.startup_timeout_ms, 20_000);
        assert_eq!(config.execution.timeout_ms, 1500);
        assert!(config.execution.flags.is_empty());
        assert_eq!(config.execution.include_paths, vec![project_dir.join("include")]);
        assert_eq!(config.classification.assertion_signature, "RobotAssert");
        // Untouched sections keep their defaults.
        assert_eq!(config.kernel.ip, "127.0.0.1");
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("kernelbridge.toml"),
            r#"
[kernel]
name = "xcpp17"
"#,
        )
        .expect("Failed to write project config");

        fs::write(
            project_dir.join("kernelbridge.local.toml"),
            r#"
[kernel]
name = "xcpp20"
"#,
        )
        .expect("Failed to write local config");

        let config = ConfigLoader::new()
            .with_project_dir(project_dir)
            .with_env_prefix("KERNELBRIDGE_TEST_LOCAL")
            .load()
            .expect("Failed to load config");

        // Local config should override project config
        assert_eq!(config.kernel.name, "xcpp20");
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let result = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .with_file(temp_dir.path().join("missing.toml"))
            .load();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        fs::write(
            temp_dir.path().join("kernelbridge.toml"),
            "[execution]\ntimeout_ms = 0\n",
        )
        .expect("Failed to write config");

        let result = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .with_env_prefix("KERNELBRIDGE_TEST_INVALID")
            .load();
        assert!(result.is_err());
    }

    // Environment variables follow KERNELBRIDGE_<SECTION>__<KEY>, e.g.
    //
    // KERNELBRIDGE_KERNEL__NAME=xcpp17
    // KERNELBRIDGE_EXECUTION__TIMEOUT_MS=60000
    //
    // They are not exercised here because the process environment is shared
    // between concurrently running tests.

    #[test]
    fn test_from_toml_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("bridge.toml");
        fs::write(&path, "[kernel]\ncommand = [\"my-kernel\", \"-f\", \"{connection_file}\"]\n")
            .unwrap();

        let config = BridgeConfig::from_toml_file(&path).unwrap();
        assert_eq!(
            config.kernel.command.as_deref(),
            Some(
                &[
                    "my-kernel".to_string(),
                    "-f".to_string(),
                    "{connection_file}".to_string()
                ][..]
            )
        );
    }

    #[test]
    fn test_from_toml_file_reports_parse_errors() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("bad.toml");
        fs::write(&path, "[kernel\nname = ").unwrap();

        assert!(matches!(
            BridgeConfig::from_toml_file(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            BridgeConfig::from_toml_file(temp_dir.path().join("nope.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
