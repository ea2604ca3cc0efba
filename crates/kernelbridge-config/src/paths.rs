//! Where configuration files live.

use crate::ConfigError;
use directories::ProjectDirs;
use std::fmt;
use std::path::{Path, PathBuf};

const USER_FILE: &str = "config.toml";
const PROJECT_FILE: &str = "kernelbridge.toml";
const LOCAL_FILE: &str = "kernelbridge.local.toml";

/// A file-backed configuration layer, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigLayer {
    /// `~/.config/kernelbridge/config.toml`
    User,
    /// `kernelbridge.toml`, checked in with the tests.
    Project,
    /// `kernelbridge.local.toml`, gitignored machine overrides.
    Local,
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Project => "project",
            Self::Local => "local",
        })
    }
}

/// A candidate file for one layer. It may not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub layer: ConfigLayer,
    pub path: PathBuf,
}

impl ConfigSource {
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// Locates the user and project configuration files.
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("org", "kernelbridge", "kernelbridge"),
        }
    }

    /// `~/.config/kernelbridge/` or the platform equivalent.
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or(ConfigError::NoHomeDir)
    }

    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join(USER_FILE))
    }

    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(PROJECT_FILE)
    }

    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(LOCAL_FILE)
    }

    /// Every candidate file in layering order, present or not.
    ///
    /// The user layer is left out when no home directory can be found.
    pub fn sources(&self, project_dir: impl AsRef<Path>) -> Vec<ConfigSource> {
        let project_dir = project_dir.as_ref();
        let mut sources = Vec::with_capacity(3);
        if let Ok(path) = self.user_config_file() {
            sources.push(ConfigSource {
                layer: ConfigLayer::User,
                path,
            });
        }
        sources.push(ConfigSource {
            layer: ConfigLayer::Project,
            path: Self::project_config_file(project_dir),
        });
        sources.push(ConfigSource {
            layer: ConfigLayer::Local,
            path: Self::local_config_file(project_dir),
        });
        sources
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
