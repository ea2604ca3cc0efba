//! Kernel process management.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use crate::{ConnectionFile, ConnectionInfo, Error, Result};

/// Status of a kernel process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelStatus {
    /// Spawned, not yet confirmed ready.
    Starting,

    /// Answered the readiness handshake.
    Running,

    /// Stopped by us.
    Stopped,

    /// Exited on its own.
    Crashed,
}

/// A managed kernel process.
///
/// The child is killed if this value is dropped without [`stop`](Self::stop).
#[derive(Debug)]
pub struct KernelProcess {
    name: String,
    child: Option<Child>,
    status: KernelStatus,
    exit_code: Option<i32>,
    connection: ConnectionInfo,
    connection_file: Option<ConnectionFile>,
}

impl KernelProcess {
    /// Spawns `argv` with the connection file already written.
    ///
    /// Must be called from within a tokio runtime. Stdout and stderr are
    /// forwarded to `tracing` at debug level.
    pub fn spawn(
        name: &str,
        argv: &[String],
        env: &HashMap<String, String>,
        connection: ConnectionInfo,
        connection_file: ConnectionFile,
    ) -> Result<Self> {
        let Some((program, args)) = argv.split_first() else {
            return Err(Error::Spawn {
                command: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"),
            });
        };

        let mut child = Command::new(program)
            .args(args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                command: argv.join(" "),
                source,
            })?;

        if let Some(stdout) = child.stdout.take() {
            forward_output(name.to_string(), "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(name.to_string(), "stderr", stderr);
        }

        tracing::info!(
            kernel = %name,
            pid = child.id(),
            connection_file = %connection_file.path().display(),
            "kernel process spawned"
        );

        Ok(Self {
            name: name.to_string(),
            child: Some(child),
            status: KernelStatus::Starting,
            exit_code: None,
            connection,
            connection_file: Some(connection_file),
        })
    }

    /// Records that the kernel answered the readiness handshake.
    pub fn mark_running(&mut self) {
        if self.status == KernelStatus::Starting {
            self.status = KernelStatus::Running;
        }
    }

    /// Checks if the process is alive, noting a crash if it has exited.
    pub fn is_alive(&mut self) -> bool {
        let Some(child) = &mut self.child else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.exit_code = status.code();
                if matches!(self.status, KernelStatus::Starting | KernelStatus::Running) {
                    tracing::warn!(kernel = %self.name, code = ?status.code(), "kernel process exited");
                    self.status = KernelStatus::Crashed;
                }
                false
            }
            Err(_) => false,
        }
    }

    /// Waits up to `grace` for the process to exit, then kills it.
    ///
    /// The connection file is removed either way. Stopping a process that is
    /// already stopped is a no-op.
    pub async fn stop(&mut self, grace: Duration) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let result = match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                self.exit_code = status.code();
                tracing::info!(kernel = %self.name, code = ?status.code(), "kernel exited");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => {
                tracing::warn!(
                    kernel = %self.name,
                    grace_ms = grace.as_millis(),
                    "kernel did not exit within grace period, killing"
                );
                // kill() also reaps the child.
                match child.kill().await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
                    Err(e) => Err(Error::Io(e)),
                }
            }
        };

        self.status = KernelStatus::Stopped;
        self.connection_file = None;
        result
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> KernelStatus {
        self.status
    }

    /// OS process id, while the child is held.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Exit code once the process has been observed to exit.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    /// Path of the connection file, until the process is stopped.
    pub fn connection_file(&self) -> Option<&std::path::Path> {
        self.connection_file.as_ref().map(ConnectionFile::path)
    }
}

fn forward_output<R>(kernel: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(kernel = %kernel, stream, "{line}");
        }
    });
}
