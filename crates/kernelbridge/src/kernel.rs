//! The keyword context: at most one active session at a time.

use std::path::{Path, PathBuf};

use kernelbridge_config::BridgeConfig;
use kernelbridge_supervisor::ConnectionInfo;

use crate::error::{KernelError, Result};
use crate::fragments;
use crate::session::Session;

/// Owns the current session and the include paths keywords resolve against.
///
/// Every keyword except [`start`](Self::start), [`attach`](Self::attach),
/// [`shutdown`](Self::shutdown) and [`add_include_path`](Self::add_include_path)
/// fails with [`KernelError::NotRunning`] when no session is active.
pub struct Kernel {
    config: BridgeConfig,
    session: Option<Session>,
    include_paths: Vec<PathBuf>,
}

impl Kernel {
    pub fn new(config: BridgeConfig) -> Self {
        let mut kernel = Self {
            config,
            session: None,
            include_paths: Vec::new(),
        };
        kernel.reset_include_paths();
        kernel
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn include_paths(&self) -> &[PathBuf] {
        &self.include_paths
    }

    pub fn session(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or(KernelError::NotRunning)
    }

    /// Starts a kernel, optionally overriding the configured kernel name.
    pub async fn start(&mut self, kernel_name: Option<&str>) -> Result<()> {
        if self.session.is_some() {
            return Err(KernelError::AlreadyRunning);
        }
        let session = Session::start(&self.config, kernel_name, &self.include_paths).await?;
        self.session = Some(session);
        Ok(())
    }

    /// Uses an already running kernel as the current session.
    pub async fn attach(&mut self, info: &ConnectionInfo) -> Result<()> {
        if self.session.is_some() {
            return Err(KernelError::AlreadyRunning);
        }
        let session = Session::attach(info, &self.config, &self.include_paths).await?;
        self.session = Some(session);
        Ok(())
    }

    /// Stops the current kernel. Without one this does nothing.
    ///
    /// Include paths added since construction are dropped as well.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.reset_include_paths();
        match self.session.take() {
            Some(session) => session.shutdown().await,
            None => Ok(()),
        }
    }

    /// Remembers include directories, made absolute and de-duplicated.
    ///
    /// With a running kernel each new directory is also passed to it as an
    /// `-I` flag.
    pub async fn add_include_path<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<()> {
        for path in paths {
            let path = std::path::absolute(path.as_ref())?;
            if self.include_paths.contains(&path) {
                continue;
            }
            if let Some(session) = self.session.as_mut() {
                session.parse(&fragments::include_dir_magic(&path)).await?;
            }
            self.include_paths.push(path);
        }
        Ok(())
    }

    /// Includes source files, looking them up in the include paths when
    /// they do not exist relative to the working directory.
    pub async fn source_include<S: AsRef<str>>(&mut self, files: &[S]) -> Result<()> {
        let resolved: Vec<PathBuf> = files
            .iter()
            .map(|file| fragments::resolve_include(file.as_ref(), &self.include_paths))
            .collect();
        let session = self.session()?;
        for path in &resolved {
            session.include(path).await?;
        }
        Ok(())
    }

    /// Runs declarations joined by newlines, discarding output.
    pub async fn source_parse<S: AsRef<str>>(&mut self, parts: &[S]) -> Result<()> {
        let code = join(parts);
        self.session()?.parse(&code).await
    }

    /// Runs code joined by newlines and returns what it printed.
    pub async fn source_exec<S: AsRef<str>>(&mut self, parts: &[S]) -> Result<String> {
        let code = join(parts);
        self.session()?.execute(&code).await
    }

    pub async fn assert(&mut self, condition: &str, otherwise: Option<&str>) -> Result<()> {
        self.session()?.assert(condition, otherwise).await
    }

    pub async fn get_value(&mut self, expr: &str) -> Result<String> {
        self.session()?.get_value(expr).await
    }

    pub async fn call_function(&mut self, func: &str, params: &[String]) -> Result<String> {
        self.session()?.call_function(func, params).await
    }

    pub async fn typeid(&mut self, expr: &str) -> Result<String> {
        self.session()?.typeid(expr).await
    }

    pub async fn typename(&mut self, expr: &str) -> Result<String> {
        self.session()?.typename(expr).await
    }

    pub async fn load_shared_library<S: AsRef<str>>(&mut self, libs: &[S]) -> Result<()> {
        let session = self.session()?;
        for lib in libs {
            session.load_library(lib.as_ref()).await?;
        }
        Ok(())
    }

    /// The C++ null pointer literal, for use as a keyword argument.
    pub fn nullptr() -> &'static str {
        "nullptr"
    }

    fn reset_include_paths(&mut self) {
        self.include_paths.clear();
        for path in &self.config.execution.include_paths {
            let path = std::path::absolute(path).unwrap_or_else(|_| path.clone());
            if !self.include_paths.contains(&path) {
                self.include_paths.push(path);
            }
        }
    }
}

fn join<S: AsRef<str>>(parts: &[S]) -> String {
    parts.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_keywords_need_a_session() {
        let mut kernel = Kernel::new(BridgeConfig::default());
        assert!(matches!(
            kernel.source_exec(&["int x = 1;"]).await,
            Err(KernelError::NotRunning)
        ));
        assert!(matches!(kernel.typeid("42").await, Err(KernelError::NotRunning)));
        assert!(matches!(
            kernel.assert("1 == 1", None).await,
            Err(KernelError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_without_session_is_noop() {
        let mut kernel = Kernel::new(BridgeConfig::default());
        kernel.shutdown().await.unwrap();
        kernel.shutdown().await.unwrap();
        assert!(!kernel.is_running());
    }

    #[tokio::test]
    async fn test_include_paths_are_absolute_and_unique() {
        let dir = TempDir::new().unwrap();
        let mut kernel = Kernel::new(BridgeConfig::default());

        kernel
            .add_include_path(&[dir.path(), dir.path(), Path::new("relative/inc")])
            .await
            .unwrap();

        assert_eq!(kernel.include_paths().len(), 2);
        assert!(kernel.include_paths().iter().all(|p| p.is_absolute()));
    }

    #[tokio::test]
    async fn test_shutdown_restores_configured_include_paths() {
        let dir = TempDir::new().unwrap();
        let mut config = BridgeConfig::default();
        config.execution.include_paths = vec![dir.path().to_path_buf()];
        let mut kernel = Kernel::new(config);

        kernel.add_include_path(&["extra"]).await.unwrap();
        assert_eq!(kernel.include_paths().len(), 2);

        kernel.shutdown().await.unwrap();
        assert_eq!(kernel.include_paths(), &[dir.path().to_path_buf()]);
    }

    #[test]
    fn test_join_uses_newlines() {
        assert_eq!(join(&["int a = 1;", "int b = 2;"]), "int a = 1;\nint b = 2;");
    }
}
