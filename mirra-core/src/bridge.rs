//! Abstraction over the external device-bridge tool (`adb`).
//!
//! The server session only talks to [`DeviceBridge`], so tests can swap
//! in a fake. The real implementation, [`AdbBridge`], runs the bridge
//! binary as a child process and interprets its exit status.

use std::net::Ipv4Addr;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::MirraError;

/// Polymorphic capability over the device bridge.
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// Copy a local file to the device.
    async fn push(
        &self,
        serial: Option<&str>,
        local: &Path,
        remote: &str,
    ) -> Result<(), MirraError>;

    /// Map a device-side socket name onto a host TCP port, so the
    /// device can connect to the host.
    async fn reverse_add(
        &self,
        serial: Option<&str>,
        socket_name: &str,
        local_port: u16,
    ) -> Result<(), MirraError>;

    /// Remove a reverse mapping.
    async fn reverse_remove(&self, serial: Option<&str>, socket_name: &str)
    -> Result<(), MirraError>;

    /// Map a host TCP port onto a device-side socket name, so the host
    /// can connect to the device.
    async fn forward_add(
        &self,
        serial: Option<&str>,
        local_port: u16,
        socket_name: &str,
    ) -> Result<(), MirraError>;

    /// Remove a forward mapping.
    async fn forward_remove(&self, serial: Option<&str>, local_port: u16)
    -> Result<(), MirraError>;

    /// Start a remote process on the device and return a handle to the
    /// local bridge process driving it.
    async fn execute(
        &self,
        serial: Option<&str>,
        args: &[String],
    ) -> Result<ProcessHandle, MirraError>;
}

/// Probe whether a serial names an already-established TCP link.
///
/// Serials of the form `a.b.c.d:port` identify a direct-IP device; no
/// tunnel is needed for them. Malformed serials are rejected rather
/// than partially parsed.
pub fn connect_hint(serial: &str) -> Option<Ipv4Addr> {
    let (addr, port) = serial.split_once(':')?;
    port.parse::<u16>().ok()?;
    addr.parse::<Ipv4Addr>().ok()
}

// ── ProcessHandle ────────────────────────────────────────────────

/// A running bridge child process (the remote agent's local driver).
pub struct ProcessHandle {
    child: Child,
}

impl ProcessHandle {
    /// Wrap a spawned child.
    pub fn new(child: Child) -> Self {
        Self { child }
    }

    /// Request termination. Failure is reported so the caller can log
    /// it; it is never fatal.
    pub fn terminate(&mut self) -> Result<(), MirraError> {
        self.child.start_kill().map_err(MirraError::from)
    }

    /// Wait for the process to exit, ignoring its exit code.
    pub async fn wait(&mut self) {
        let _ = self.child.wait().await;
    }
}

// ── AdbBridge ────────────────────────────────────────────────────

/// Bridge implementation invoking the `adb` binary.
pub struct AdbBridge {
    program: String,
}

impl AdbBridge {
    /// Use the `adb` found on `PATH`.
    pub fn new() -> Self {
        Self {
            program: "adb".into(),
        }
    }

    /// Use an explicit binary path.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, serial: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(serial) = serial {
            cmd.arg("-s").arg(serial);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd
    }

    async fn run_checked(
        &self,
        serial: Option<&str>,
        action: &'static str,
        args: &[&str],
    ) -> Result<(), MirraError> {
        debug!(action, ?args, "running bridge command");
        let status = self.command(serial).args(args).status().await?;
        if !status.success() {
            return Err(MirraError::BridgeCommand {
                action,
                code: status.code(),
            });
        }
        Ok(())
    }
}

impl Default for AdbBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceBridge for AdbBridge {
    async fn push(
        &self,
        serial: Option<&str>,
        local: &Path,
        remote: &str,
    ) -> Result<(), MirraError> {
        let local = local.to_string_lossy();
        self.run_checked(serial, "push", &["push", &local, remote])
            .await
    }

    async fn reverse_add(
        &self,
        serial: Option<&str>,
        socket_name: &str,
        local_port: u16,
    ) -> Result<(), MirraError> {
        let local = format!("localabstract:{socket_name}");
        let remote = format!("tcp:{local_port}");
        self.run_checked(serial, "reverse", &["reverse", &local, &remote])
            .await
    }

    async fn reverse_remove(
        &self,
        serial: Option<&str>,
        socket_name: &str,
    ) -> Result<(), MirraError> {
        let local = format!("localabstract:{socket_name}");
        self.run_checked(serial, "reverse --remove", &["reverse", "--remove", &local])
            .await
    }

    async fn forward_add(
        &self,
        serial: Option<&str>,
        local_port: u16,
        socket_name: &str,
    ) -> Result<(), MirraError> {
        let local = format!("tcp:{local_port}");
        let remote = format!("localabstract:{socket_name}");
        self.run_checked(serial, "forward", &["forward", &local, &remote])
            .await
    }

    async fn forward_remove(
        &self,
        serial: Option<&str>,
        local_port: u16,
    ) -> Result<(), MirraError> {
        let local = format!("tcp:{local_port}");
        self.run_checked(serial, "forward --remove", &["forward", "--remove", &local])
            .await
    }

    async fn execute(
        &self,
        serial: Option<&str>,
        args: &[String],
    ) -> Result<ProcessHandle, MirraError> {
        debug!(?args, "spawning remote agent");
        let child = self.command(serial).args(args).spawn()?;
        Ok(ProcessHandle::new(child))
    }
}

// ── Tests ────────────────────────────────────────────────────────
