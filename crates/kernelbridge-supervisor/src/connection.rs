//! Connection info and connection files.

use std::io::Write;
use std::net::{Ipv4Addr, TcpListener};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{Error, Result};

/// Transport endpoints and signing key shared with a kernel.
///
/// Serialized as the standard Jupyter connection file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub ip: String,
    pub transport: String,
    pub shell_port: u16,
    pub iopub_port: u16,
    pub stdin_port: u16,
    pub control_port: u16,
    pub hb_port: u16,
    pub key: String,
    pub signature_scheme: String,
    #[serde(default)]
    pub kernel_name: String,
}

impl ConnectionInfo {
    /// Reserves five free TCP ports on `ip` and generates a fresh key.
    ///
    /// The ports are released again before returning so the kernel can bind
    /// them; another process could grab one in between.
    pub fn allocate(ip: &str, kernel_name: &str) -> Result<Self> {
        let bind_ip = if ip == "*" || ip == "0.0.0.0" {
            Ipv4Addr::UNSPECIFIED.to_string()
        } else {
            ip.to_string()
        };

        let listeners = (0..5)
            .map(|_| TcpListener::bind((bind_ip.as_str(), 0)))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| Error::Connection(format!("cannot reserve ports on {ip}: {e}")))?;
        let ports = listeners
            .iter()
            .map(|l| l.local_addr().map(|a| a.port()))
            .collect::<std::io::Result<Vec<_>>>()?;
        drop(listeners);

        Ok(Self {
            ip: ip.to_string(),
            transport: "tcp".to_string(),
            shell_port: ports[0],
            iopub_port: ports[1],
            stdin_port: ports[2],
            control_port: ports[3],
            hb_port: ports[4],
            key: uuid::Uuid::new_v4().to_string(),
            signature_scheme: "hmac-sha256".to_string(),
            kernel_name: kernel_name.to_string(),
        })
    }

    /// Reads an existing connection file, e.g. one written by `jupyter console`.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Connection(format!("{}: {e}", path.display())))
    }

    fn endpoint(&self, port: u16) -> String {
        let host = if self.ip == "0.0.0.0" || self.ip == "*" {
            "127.0.0.1"
        } else {
            self.ip.as_str()
        };
        format!("{}://{host}:{port}", self.transport)
    }

    pub fn shell_endpoint(&self) -> String {
        self.endpoint(self.shell_port)
    }

    pub fn iopub_endpoint(&self) -> String {
        self.endpoint(self.iopub_port)
    }

    pub fn control_endpoint(&self) -> String {
        self.endpoint(self.control_port)
    }

    pub fn stdin_endpoint(&self) -> String {
        self.endpoint(self.stdin_port)
    }

    pub fn hb_endpoint(&self) -> String {
        self.endpoint(self.hb_port)
    }
}

/// A connection file on disk, deleted when dropped.
#[derive(Debug)]
pub struct ConnectionFile {
    file: NamedTempFile,
}

impl ConnectionFile {
    /// Writes `info` to a private temporary file.
    pub fn write(info: &ConnectionInfo) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("kernel-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer_pretty(file.as_file_mut(), info)
            .map_err(|e| Error::Connection(e.to_string()))?;
        file.as_file_mut().flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
