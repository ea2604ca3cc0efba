//! One kernel process plus the coordinator talking to it.

use std::path::{Path, PathBuf};
use std::pin::pin;
use std::time::Duration;

use kernelbridge_client::{ClientError, Coordinator, FaultKind, KernelChannel};
use kernelbridge_config::BridgeConfig;
use kernelbridge_supervisor::{ConnectionInfo, Error as SupervisorError, KernelProcess, KernelSupervisor};
use tokio::time::Instant;

use crate::error::{KernelError, Result};
use crate::fragments;

/// How often startup re-checks the process while waiting on the kernel.
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How often a running fragment re-checks that the kernel process exists.
const LIVENESS_INTERVAL: Duration = Duration::from_millis(200);

/// A live kernel session.
///
/// Every session starts from a fresh interpreter; declarations persist from
/// one call to the next until [`shutdown`](Self::shutdown).
pub struct Session {
    coordinator: Coordinator,
    /// `None` when attached to a kernel this session did not launch.
    process: Option<KernelProcess>,
    grace: Duration,
}

impl Session {
    /// Launches a kernel, waits for it to answer and configures it.
    ///
    /// `kernel_name` overrides `kernel.name`. `include_paths` are added as
    /// `-I` flags before the standard headers are included.
    pub async fn start(
        config: &BridgeConfig,
        kernel_name: Option<&str>,
        include_paths: &[PathBuf],
    ) -> Result<Self> {
        let supervisor = KernelSupervisor::new(config.kernel.clone());
        let mut process = supervisor
            .launch(kernel_name)
            .map_err(|e| KernelError::Startup(e.to_string()))?;
        let grace = config.kernel.shutdown_grace();

        let channel = match handshake(&mut process, config.kernel.startup_timeout()).await {
            Ok(channel) => channel,
            Err(e) => {
                if let Err(stop) = process.stop(grace).await {
                    tracing::warn!(error = %stop, "failed to stop kernel after failed startup");
                }
                return Err(e);
            }
        };
        process.mark_running();
        tracing::info!(kernel = %process.name(), pid = ?process.pid(), "kernel ready");

        Self::configure(channel, Some(process), config, include_paths).await
    }

    /// Connects to a kernel that is already running.
    ///
    /// The session does not own the process; shutting it down only asks the
    /// kernel to exit.
    pub async fn attach(
        info: &ConnectionInfo,
        config: &BridgeConfig,
        include_paths: &[PathBuf],
    ) -> Result<Self> {
        let channel = KernelChannel::connect(info).await?;
        channel
            .wait_for_ready(config.kernel.startup_timeout())
            .await
            .map_err(|e| KernelError::Startup(e.to_string()))?;
        tracing::info!(shell = %info.shell_endpoint(), "attached to kernel");

        Self::configure(channel, None, config, include_paths).await
    }

    async fn configure(
        channel: KernelChannel,
        process: Option<KernelProcess>,
        config: &BridgeConfig,
        include_paths: &[PathBuf],
    ) -> Result<Self> {
        let grace = config.kernel.shutdown_grace();
        let coordinator = match Coordinator::from_config(channel, config) {
            Ok(coordinator) => coordinator,
            Err(e) => {
                if let Some(mut process) = process {
                    if let Err(stop) = process.stop(grace).await {
                        tracing::warn!(error = %stop, "failed to stop kernel after invalid classification config");
                    }
                }
                return Err(KernelError::Startup(e.to_string()));
            }
        };
        let mut session = Self {
            coordinator,
            process,
            grace,
        };

        let mut prelude: Vec<String> = config
            .execution
            .flags
            .iter()
            .map(|flag| fragments::flag_magic(flag))
            .collect();
        prelude.extend(include_paths.iter().map(|dir| fragments::include_dir_magic(dir)));
        prelude.extend(config.execution.headers.iter().map(|h| fragments::system_include(h)));
        prelude.push(fragments::demangle_helper());

        for code in &prelude {
            if let Err(e) = session.run(code).await {
                if let Err(stop) = session.shutdown().await {
                    tracing::warn!(error = %stop, "failed to stop misconfigured kernel");
                }
                return Err(KernelError::Startup(format!("failed to configure kernel: {e}")));
            }
        }
        Ok(session)
    }

    /// Runs `code` and returns its stdout minus one trailing newline.
    pub async fn execute(&mut self, code: &str) -> Result<String> {
        Ok(self.run(code).await?)
    }

    /// Runs declarations, discarding their output.
    pub async fn parse(&mut self, code: &str) -> Result<()> {
        self.execute(code).await.map(drop)
    }

    /// Fails with [`KernelError::AssertionFailed`] when `condition` is false.
    pub async fn assert(&mut self, condition: &str, otherwise: Option<&str>) -> Result<()> {
        let code = fragments::assertion(
            condition,
            otherwise,
            self.coordinator.classifier().assertion_signature(),
        );
        match self.run(&code).await {
            Ok(_) => Ok(()),
            Err(ClientError::Runtime {
                kind: FaultKind::Assertion,
                message,
            }) => Err(KernelError::AssertionFailed {
                expression: condition.to_string(),
                detail: message,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn typeid(&mut self, expr: &str) -> Result<String> {
        self.execute(&fragments::typeid(expr)).await
    }

    pub async fn typename(&mut self, expr: &str) -> Result<String> {
        self.execute(&fragments::typename(expr)).await
    }

    pub async fn get_value(&mut self, expr: &str) -> Result<String> {
        self.execute(&fragments::print(expr)).await
    }

    pub async fn call_function(&mut self, func: &str, params: &[String]) -> Result<String> {
        self.execute(&fragments::call(func, params)).await
    }

    pub async fn include(&mut self, path: &Path) -> Result<()> {
        self.parse(&fragments::local_include(path)).await
    }

    pub async fn load_library(&mut self, lib: &str) -> Result<()> {
        self.parse(&fragments::load_library(lib)).await
    }

    /// Runs one fragment while watching the owned kernel process.
    ///
    /// Sockets stay open when the kernel dies, so without the watch a crash
    /// would only surface as an execution timeout. A dead kernel fails the
    /// call with `ChannelClosed`; the session stays in place for shutdown.
    async fn run(&mut self, code: &str) -> std::result::Result<String, ClientError> {
        let Some(process) = self.process.as_mut() else {
            return self.coordinator.execute_to_text(code).await;
        };
        if !process.is_alive() {
            return Err(ClientError::ChannelClosed);
        }

        let mut execution = pin!(self.coordinator.execute_to_text(code));
        let mut liveness = tokio::time::interval(LIVENESS_INTERVAL);
        loop {
            tokio::select! {
                result = &mut execution => return result,
                _ = liveness.tick() => {
                    if !process.is_alive() {
                        tracing::warn!(
                            kernel = %process.name(),
                            code = ?process.exit_code(),
                            "kernel exited while running a fragment"
                        );
                        return Err(ClientError::ChannelClosed);
                    }
                }
            }
        }
    }

    /// Checks whether the kernel can still be reached.
    pub fn is_alive(&mut self) -> bool {
        match &mut self.process {
            Some(process) => process.is_alive() && !self.coordinator.channel().is_closed(),
            None => !self.coordinator.channel().is_closed(),
        }
    }

    /// Process id of an owned kernel.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(KernelProcess::pid)
    }

    pub fn coordinator(&mut self) -> &mut Coordinator {
        &mut self.coordinator
    }

    /// Asks the kernel to exit, closes the channel and stops the process.
    ///
    /// A kernel that ignores the request is killed after the grace period.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            coordinator,
            process,
            grace,
        } = self;

        let channel = coordinator.into_channel();
        if let Err(e) = channel.shutdown(grace).await {
            tracing::debug!(error = %e, "kernel did not acknowledge shutdown");
        }
        if tokio::time::timeout(grace, channel.close()).await.is_err() {
            tracing::debug!("channel task did not stop within the grace period");
        }

        if let Some(mut process) = process {
            process.stop(grace).await?;
            tracing::info!(kernel = %process.name(), "kernel stopped");
        }
        Ok(())
    }
}

/// Connects to a freshly launched kernel and waits until it answers.
///
/// Fails early when the process exits instead of waiting out the timeout.
async fn handshake(process: &mut KernelProcess, startup_timeout: Duration) -> Result<KernelChannel> {
    let deadline = Instant::now() + startup_timeout;
    let info = process.connection().clone();

    let channel = loop {
        let result = {
            let mut connect = pin!(KernelChannel::connect(&info));
            loop {
                tokio::select! {
                    result = &mut connect => break result,
                    () = tokio::time::sleep(STARTUP_POLL_INTERVAL) => {
                        check_startup(process, deadline, startup_timeout)?;
                    }
                }
            }
        };
        match result {
            Ok(channel) => break channel,
            Err(e) => {
                tracing::trace!(error = %e, "kernel sockets not reachable yet");
                check_startup(process, deadline, startup_timeout)?;
                tokio::time::sleep(STARTUP_POLL_INTERVAL).await;
            }
        }
    };

    loop {
        check_startup(process, deadline, startup_timeout)?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        match channel.kernel_info(remaining.min(STARTUP_POLL_INTERVAL)).await {
            Ok(reply) => {
                tracing::debug!(
                    implementation = %reply.implementation,
                    language = %reply.language_info.name,
                    "kernel answered kernel_info"
                );
                return Ok(channel);
            }
            Err(ClientError::ChannelTimeout) => {}
            Err(e) => return Err(KernelError::Startup(e.to_string())),
        }
    }
}

fn check_startup(process: &mut KernelProcess, deadline: Instant, startup_timeout: Duration) -> Result<()> {
    if !process.is_alive() {
        return Err(KernelError::Startup(
            SupervisorError::ExitedDuringStartup(process.exit_code()).to_string(),
        ));
    }
    if Instant::now() >= deadline {
        return Err(KernelError::Startup(format!(
            "kernel not ready within {startup_timeout:?}"
        )));
    }
    Ok(())
}
