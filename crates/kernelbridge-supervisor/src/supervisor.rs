//! Resolves which kernel to run and launches it.

use kernelbridge_config::KernelConfig;

use crate::{ConnectionFile, ConnectionInfo, KernelProcess, KernelSpec, Result, find_kernelspec};

/// What would be launched for a given kernel selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub spec: KernelSpec,
    /// True when `kernel.command` replaced kernelspec lookup.
    pub from_command: bool,
}

/// Launches kernel processes according to [`KernelConfig`].
#[derive(Debug, Clone)]
pub struct KernelSupervisor {
    config: KernelConfig,
}

impl KernelSupervisor {
    pub fn new(config: KernelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Resolves the kernel to run.
    ///
    /// An explicit `name` always goes through kernelspec lookup. Otherwise a
    /// configured command wins over `kernel.name`.
    pub fn plan(&self, name: Option<&str>) -> Result<LaunchPlan> {
        if let Some(name) = name {
            return Ok(LaunchPlan {
                spec: find_kernelspec(name, &self.config.search_paths)?,
                from_command: false,
            });
        }

        if let Some(command) = &self.config.command {
            let name = if self.config.name.trim().is_empty() {
                "custom"
            } else {
                self.config.name.as_str()
            };
            return Ok(LaunchPlan {
                spec: KernelSpec::from_command(name, command.clone()),
                from_command: true,
            });
        }

        Ok(LaunchPlan {
            spec: find_kernelspec(&self.config.name, &self.config.search_paths)?,
            from_command: false,
        })
    }

    /// Starts a fresh kernel process with its own ports and key.
    ///
    /// The returned process is [`Starting`](crate::KernelStatus::Starting);
    /// readiness is confirmed by the caller over the messaging channel.
    pub fn launch(&self, name: Option<&str>) -> Result<KernelProcess> {
        let plan = self.plan(name)?;
        let connection = ConnectionInfo::allocate(&self.config.ip, &plan.spec.name)?;
        let file = ConnectionFile::write(&connection)?;
        let argv = plan.spec.command_line(file.path());

        tracing::debug!(kernel = %plan.spec.name, argv = ?argv, "launching kernel");

        KernelProcess::spawn(&plan.spec.name, &argv, &plan.spec.env, connection, file)
    }
}
