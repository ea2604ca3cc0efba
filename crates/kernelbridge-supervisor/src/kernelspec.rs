//! Kernelspec discovery.
//!
//! A kernelspec is a `kernels/<name>/kernel.json` file under one of the
//! Jupyter data roots. Roots are searched in order and the first match wins,
//! so user installs shadow system ones.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Placeholder substituted with the connection file path in `argv`.
pub const CONNECTION_FILE_PLACEHOLDER: &str = "{connection_file}";

/// Placeholder substituted with the kernelspec directory in `argv`.
const RESOURCE_DIR_PLACEHOLDER: &str = "{resource_dir}";

#[derive(Debug, Deserialize)]
struct KernelJson {
    argv: Vec<String>,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    env: HashMap<String, String>,
}

/// A parsed kernelspec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSpec {
    pub name: String,
    pub argv: Vec<String>,
    pub display_name: String,
    pub language: String,
    pub env: HashMap<String, String>,
    /// Directory holding kernel.json.
    pub resource_dir: PathBuf,
}

impl KernelSpec {
    /// Loads `<dir>/kernel.json`; the spec is named after `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join("kernel.json");
        let raw = fs::read_to_string(&path)?;
        let json: KernelJson =
            serde_json::from_str(&raw).map_err(|e| Error::InvalidKernelSpec {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if json.argv.is_empty() {
            return Err(Error::InvalidKernelSpec {
                path,
                reason: "argv is empty".to_string(),
            });
        }

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Ok(Self {
            name,
            argv: json.argv,
            display_name: json.display_name,
            language: json.language,
            env: json.env,
            resource_dir: dir.to_path_buf(),
        })
    }

    /// Builds a spec from an explicit command line.
    pub fn from_command(name: &str, argv: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            argv,
            display_name: name.to_string(),
            language: String::new(),
            env: HashMap::new(),
            resource_dir: PathBuf::new(),
        }
    }

    /// Returns argv with placeholders filled in.
    pub fn command_line(&self, connection_file: &Path) -> Vec<String> {
        let connection_file = connection_file.to_string_lossy();
        let resource_dir = self.resource_dir.to_string_lossy();
        self.argv
            .iter()
            .map(|arg| {
                arg.replace(CONNECTION_FILE_PLACEHOLDER, &connection_file)
                    .replace(RESOURCE_DIR_PLACEHOLDER, &resource_dir)
            })
            .collect()
    }
}

/// Returns the Jupyter data roots in search order.
///
/// `extra` comes first, then `JUPYTER_PATH`, the per-user data directory, the
/// active conda environment and finally the system-wide locations.
pub fn jupyter_data_roots(extra: &[PathBuf]) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = extra.to_vec();

    if let Some(jupyter_path) = std::env::var_os("JUPYTER_PATH") {
        roots.extend(std::env::split_paths(&jupyter_path).filter(|p| !p.as_os_str().is_empty()));
    }

    if let Some(user) = user_data_dir() {
        roots.push(user);
    }

    if let Some(prefix) = std::env::var_os("CONDA_PREFIX") {
        roots.push(PathBuf::from(prefix).join("share").join("jupyter"));
    }

    if cfg!(unix) {
        roots.push(PathBuf::from("/usr/local/share/jupyter"));
        roots.push(PathBuf::from("/usr/share/jupyter"));
    }

    let mut seen = std::collections::HashSet::new();
    roots.retain(|r| seen.insert(r.clone()));
    roots
}

fn user_data_dir() -> Option<PathBuf> {
    let base = directories::BaseDirs::new()?;
    if cfg!(target_os = "macos") {
        Some(base.home_dir().join("Library").join("Jupyter"))
    } else {
        Some(base.data_dir().join("jupyter"))
    }
}

/// Finds the kernelspec called `name` (case-insensitive).
pub fn find_kernelspec(name: &str, extra_roots: &[PathBuf]) -> Result<KernelSpec> {
    let wanted = name.to_lowercase();
    let roots = jupyter_data_roots(extra_roots);

    for root in &roots {
        let kernels = root.join("kernels");
        let Ok(entries) = fs::read_dir(&kernels) else {
            continue;
        };
        for entry in entries.flatten() {
            let dir = entry.path();
            let matches = dir
                .file_name()
                .is_some_and(|n| n.to_string_lossy().to_lowercase() == wanted);
            if matches && dir.join("kernel.json").is_file() {
                tracing::debug!(kernel = %wanted, dir = %dir.display(), "found kernelspec");
                return KernelSpec::load(&dir);
            }
        }
    }

    Err(Error::KernelSpecNotFound {
        name: name.to_string(),
        searched: roots,
    })
}

/// Lists every installed kernelspec; earlier roots shadow later ones.
pub fn find_kernelspecs(extra_roots: &[PathBuf]) -> BTreeMap<String, KernelSpec> {
    let mut specs = BTreeMap::new();

    for root in jupyter_data_roots(extra_roots) {
        let Ok(entries) = fs::read_dir(root.join("kernels")) else {
            continue;
        };
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.join("kernel.json").is_file() {
                continue;
            }
            match KernelSpec::load(&dir) {
                Ok(spec) => {
                    specs.entry(spec.name.clone()).or_insert(spec);
                }
                Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "skipping kernelspec"),
            }
        }
    }

    specs
}
