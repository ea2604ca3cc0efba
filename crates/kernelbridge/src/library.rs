//! Blocking keyword adapter for test runners.

use std::path::PathBuf;

use kernelbridge_config::BridgeConfig;
use kernelbridge_supervisor::ConnectionInfo;
use tokio::runtime::Runtime;

use crate::error::{KernelError, Result};
use crate::kernel::Kernel;

/// Keyword names as exposed to a test runner.
pub const KEYWORDS: &[&str] = &[
    "Start Kernel",
    "Shutdown Kernel",
    "Add Include Path",
    "Source Include",
    "Source Parse",
    "Source Exec",
    "Source Exec And Return Output",
    "Load Shared Library",
    "Assert",
    "Get Value",
    "Call Function",
    "Typeid",
    "Typename",
    "Nullptr",
];

/// A [`Kernel`] with its own runtime, so every keyword is a plain blocking
/// call.
///
/// Dropping the library shuts the kernel down.
pub struct KernelLibrary {
    // Declared before `runtime` so the session is gone before the runtime.
    kernel: Kernel,
    runtime: Runtime,
}

impl KernelLibrary {
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("kernelbridge")
            .enable_all()
            .build()?;
        Ok(Self {
            kernel: Kernel::new(config),
            runtime,
        })
    }

    /// Loads the layered configuration from the working directory.
    pub fn from_env() -> Result<Self> {
        let config = BridgeConfig::load().map_err(|e| KernelError::Startup(e.to_string()))?;
        Self::new(config)
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn start_kernel(&mut self, kernel_name: Option<&str>) -> Result<()> {
        self.runtime.block_on(self.kernel.start(kernel_name))
    }

    pub fn attach(&mut self, info: &ConnectionInfo) -> Result<()> {
        self.runtime.block_on(self.kernel.attach(info))
    }

    pub fn shutdown_kernel(&mut self) -> Result<()> {
        self.runtime.block_on(self.kernel.shutdown())
    }

    pub fn add_include_path(&mut self, paths: &[PathBuf]) -> Result<()> {
        self.runtime.block_on(self.kernel.add_include_path(paths))
    }

    pub fn source_include(&mut self, files: &[String]) -> Result<()> {
        self.runtime.block_on(self.kernel.source_include(files))
    }

    pub fn source_parse(&mut self, parts: &[String]) -> Result<()> {
        self.runtime.block_on(self.kernel.source_parse(parts))
    }

    pub fn source_exec(&mut self, parts: &[String]) -> Result<String> {
        self.runtime.block_on(self.kernel.source_exec(parts))
    }

    pub fn source_exec_and_return_output(&mut self, parts: &[String]) -> Result<String> {
        self.source_exec(parts)
    }

    pub fn load_shared_library(&mut self, libs: &[String]) -> Result<()> {
        self.runtime.block_on(self.kernel.load_shared_library(libs))
    }

    pub fn assert(&mut self, condition: &str, otherwise: Option<&str>) -> Result<()> {
        self.runtime.block_on(self.kernel.assert(condition, otherwise))
    }

    pub fn get_value(&mut self, expr: &str) -> Result<String> {
        self.runtime.block_on(self.kernel.get_value(expr))
    }

    pub fn call_function(&mut self, func: &str, params: &[String]) -> Result<String> {
        self.runtime.block_on(self.kernel.call_function(func, params))
    }

    pub fn typeid(&mut self, expr: &str) -> Result<String> {
        self.runtime.block_on(self.kernel.typeid(expr))
    }

    pub fn typename(&mut self, expr: &str) -> Result<String> {
        self.runtime.block_on(self.kernel.typename(expr))
    }

    pub fn nullptr(&self) -> &'static str {
        Kernel::nullptr()
    }

    /// Dispatches a keyword by name.
    ///
    /// Names match case-insensitively with spaces and underscores ignored,
    /// so `Source Exec`, `source_exec` and `assert_` all resolve. Keywords
    /// that produce text return `Some`.
    pub fn run_keyword(&mut self, name: &str, args: &[String]) -> Result<Option<String>> {
        let keyword = normalize(name);
        tracing::debug!(keyword = %name, args = args.len(), "running keyword");

        match keyword.as_str() {
            "startkernel" => {
                arity(name, args, 0, Some(1), "0 or 1")?;
                self.start_kernel(args.first().map(String::as_str))?;
                Ok(None)
            }
            "shutdownkernel" => {
                arity(name, args, 0, Some(0), "0")?;
                self.shutdown_kernel()?;
                Ok(None)
            }
            "addincludepath" => {
                let paths: Vec<PathBuf> = args.iter().map(PathBuf::from).collect();
                self.add_include_path(&paths)?;
                Ok(None)
            }
            "sourceinclude" => {
                self.source_include(args)?;
                Ok(None)
            }
            "sourceparse" => {
                self.source_parse(args)?;
                Ok(None)
            }
            "sourceexec" | "sourceexecandreturnoutput" => self.source_exec(args).map(Some),
            "loadsharedlibrary" => {
                self.load_shared_library(args)?;
                Ok(None)
            }
            "assert" => {
                arity(name, args, 1, Some(2), "1 or 2")?;
                self.assert(&args[0], args.get(1).map(String::as_str))?;
                Ok(None)
            }
            "getvalue" => {
                arity(name, args, 1, Some(1), "1")?;
                self.get_value(&args[0]).map(Some)
            }
            "callfunction" => {
                arity(name, args, 1, None, "at least 1")?;
                self.call_function(&args[0], &args[1..]).map(Some)
            }
            "typeid" => {
                arity(name, args, 1, Some(1), "1")?;
                self.typeid(&args[0]).map(Some)
            }
            "typename" => {
                arity(name, args, 1, Some(1), "1")?;
                self.typename(&args[0]).map(Some)
            }
            "nullptr" => {
                arity(name, args, 0, Some(0), "0")?;
                Ok(Some(self.nullptr().to_string()))
            }
            _ => Err(KernelError::UnknownKeyword(name.to_string())),
        }
    }
}

impl Drop for KernelLibrary {
    fn drop(&mut self) {
        if self.kernel.is_running() {
            if let Err(e) = self.runtime.block_on(self.kernel.shutdown()) {
                tracing::warn!(error = %e, "failed to shut down kernel on drop");
            }
        }
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn arity(
    keyword: &str,
    args: &[String],
    min: usize,
    max: Option<usize>,
    expected: &'static str,
) -> Result<()> {
    if args.len() < min || max.is_some_and(|max| args.len() > max) {
        return Err(KernelError::Arguments {
            keyword: keyword.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}
