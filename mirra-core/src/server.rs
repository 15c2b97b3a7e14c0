//! Device session setup and teardown.
//!
//! Drives the full lifecycle of one mirroring session:
//!
//! 1. Push the agent jar to the device.
//! 2. Negotiate a tunnel (reverse, forward fallback, or direct IP).
//! 3. Bind the host listener (reverse mode only).
//! 4. Spawn the remote agent process.
//! 5. Establish the video and control sockets.
//!
//! ```text
//! Init → ServerPushed → (DirectIp | TunnelReverse | TunnelForward)
//!      → SocketsBound → AgentSpawned → Ready → Stopping → Stopped
//! ```
//!
//! Every setup failure unwinds the steps that already succeeded, in
//! reverse order; a partial failure never leaks a running agent.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::bridge::{DeviceBridge, ProcessHandle, connect_hint};
use crate::control::Size;
use crate::error::MirraError;

/// Device-side abstract socket name used for both tunnels.
pub const SOCKET_NAME: &str = "scrcpy";

/// Agent jar file name.
pub const SERVER_FILENAME: &str = "scrcpy-server.jar";

/// Where the agent jar lands on the device.
pub const DEVICE_SERVER_PATH: &str = "/data/local/tmp/scrcpy-server.jar";

/// Main class of the agent.
const SERVER_CLASS: &str = "com.genymobile.scrcpy.Server";

/// Environment variable overriding the local agent jar location.
pub const SERVER_PATH_ENV: &str = "SCRCPY_SERVER_PATH";

/// Fixed width of the device-name field in the session header.
pub const DEVICE_NAME_FIELD_LENGTH: usize = 64;

const CONNECT_ATTEMPTS: u32 = 100;
const CONNECT_DELAY: Duration = Duration::from_millis(100);

// ── Parameters ───────────────────────────────────────────────────

/// Parameters forwarded to the remote agent.
#[derive(Debug, Clone)]
pub struct ServerParams {
    pub local_port: u16,
    pub max_size: u16,
    pub bit_rate: u32,
    pub crop: Option<String>,
    pub control: bool,
    pub density: u16,
    pub size: Option<String>,
    pub tablet: bool,
    pub use_ime: bool,
}

impl Default for ServerParams {
    fn default() -> Self {
        Self {
            local_port: 27183,
            max_size: 0,
            bit_rate: 8_000_000,
            crop: None,
            control: true,
            density: 0,
            size: None,
            tablet: false,
            use_ime: false,
        }
    }
}

/// Build the fixed-order agent argument vector.
///
/// The frame-meta argument is always `true`: the stream worker requires
/// the 12-byte per-packet header.
pub fn agent_argv(params: &ServerParams, tunnel_forward: bool) -> Vec<String> {
    let spawn_mode = if cfg!(windows) { "fork" } else { "forkd" };
    vec![
        "shell".into(),
        format!("CLASSPATH={DEVICE_SERVER_PATH}"),
        "app_process".into(),
        "/".into(), // unused
        SERVER_CLASS.into(),
        params.max_size.to_string(),
        params.bit_rate.to_string(),
        bool_str(tunnel_forward).into(),
        params.crop.clone().unwrap_or_else(|| "-".into()),
        "true".into(), // always send frame meta
        bool_str(params.control).into(),
        format!("density={}", params.density),
        format!("size={}", params.size.as_deref().unwrap_or("0:0")),
        format!("tablet={}", bool_str(params.tablet)),
        format!("port={}", params.local_port),
        format!("useIME={}", bool_str(params.use_ime)),
        spawn_mode.into(),
    ]
}

fn bool_str(v: bool) -> &'static str {
    if v { "true" } else { "false" }
}

/// Local path of the agent jar, honoring the environment override.
pub fn server_jar_path() -> PathBuf {
    std::env::var_os(SERVER_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(SERVER_FILENAME))
}

// ── Phase ────────────────────────────────────────────────────────

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Init,
    ServerPushed,
    DirectIp,
    TunnelReverse,
    TunnelForward,
    SocketsBound,
    AgentSpawned,
    SocketsConnected,
    SocketsAccepted,
    Ready,
    Stopping,
    Stopped,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

// ── DeviceMeta ───────────────────────────────────────────────────

/// The session header the agent sends before the video stream: device
/// name and initial frame size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMeta {
    pub name: String,
    pub frame_size: Size,
}

/// Read the session header from the freshly-connected video socket.
pub async fn read_device_meta(socket: &mut TcpStream) -> Result<DeviceMeta, MirraError> {
    let mut buf = [0u8; DEVICE_NAME_FIELD_LENGTH + 4];
    socket
        .read_exact(&mut buf)
        .await
        .map_err(|_| MirraError::InvalidDeviceMeta("truncated session header"))?;

    let name_end = buf[..DEVICE_NAME_FIELD_LENGTH]
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(DEVICE_NAME_FIELD_LENGTH);
    let name = String::from_utf8_lossy(&buf[..name_end]).into_owned();

    let width = u16::from_be_bytes([buf[DEVICE_NAME_FIELD_LENGTH], buf[DEVICE_NAME_FIELD_LENGTH + 1]]);
    let height = u16::from_be_bytes([
        buf[DEVICE_NAME_FIELD_LENGTH + 2],
        buf[DEVICE_NAME_FIELD_LENGTH + 3],
    ]);

    Ok(DeviceMeta {
        name,
        frame_size: Size { width, height },
    })
}

// ── ServerSession ────────────────────────────────────────────────

/// One running device session, from agent push to teardown.
pub struct ServerSession {
    bridge: Arc<dyn DeviceBridge>,
    serial: Option<String>,
    local_port: u16,
    tunnel_forward: bool,
    tunnel_enabled: bool,
    direct_addr: Option<Ipv4Addr>,
    listener: Option<TcpListener>,
    process: Option<ProcessHandle>,
    phase: SessionPhase,
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("serial", &self.serial)
            .field("local_port", &self.local_port)
            .field("tunnel_forward", &self.tunnel_forward)
            .field("tunnel_enabled", &self.tunnel_enabled)
            .field("direct_addr", &self.direct_addr)
            .field("phase", &self.phase)
            .finish()
    }
}

impl ServerSession {
    /// Push the agent, negotiate a tunnel, and spawn the remote process.
    ///
    /// On error, everything that already succeeded is rolled back.
    pub async fn start(
        bridge: Arc<dyn DeviceBridge>,
        serial: Option<&str>,
        params: &ServerParams,
    ) -> Result<Self, MirraError> {
        let mut session = Self {
            bridge,
            serial: serial.map(str::to_owned),
            local_port: params.local_port,
            tunnel_forward: false,
            tunnel_enabled: false,
            direct_addr: None,
            listener: None,
            process: None,
            phase: SessionPhase::Init,
        };

        session
            .bridge
            .push(serial, &server_jar_path(), DEVICE_SERVER_PATH)
            .await?;
        session.phase = SessionPhase::ServerPushed;

        if let Some(addr) = serial.and_then(connect_hint) {
            // The bridge link is already a TCP connection; skip tunnels
            // and connect like in forward mode.
            debug!(%addr, "direct-IP serial, skipping tunnel setup");
            session.direct_addr = Some(addr);
            session.tunnel_forward = true;
            session.phase = SessionPhase::DirectIp;
        } else {
            session.enable_tunnel().await?;
        }

        // In reverse mode the host listens and the agent connects, so
        // the listener must exist before the agent starts.
        if !session.tunnel_forward {
            match TcpListener::bind(SocketAddr::from(SocketAddrV4::new(
                Ipv4Addr::LOCALHOST,
                params.local_port,
            )))
            .await
            {
                Ok(listener) => session.listener = Some(listener),
                Err(e) => {
                    warn!("could not listen on port {}: {e}", params.local_port);
                    session.disable_tunnel().await;
                    return Err(e.into());
                }
            }
            session.phase = SessionPhase::SocketsBound;
        }

        let argv = agent_argv(params, session.tunnel_forward);
        match session.bridge.execute(serial, &argv).await {
            Ok(process) => session.process = Some(process),
            Err(e) => {
                session.listener = None;
                session.disable_tunnel().await;
                return Err(e);
            }
        }
        session.phase = SessionPhase::AgentSpawned;

        if session.direct_addr.is_none() {
            session.tunnel_enabled = true;
        }

        Ok(session)
    }

    /// Establish the video and control sockets.
    ///
    /// After both are up the tunnel is removed; the sockets stay valid.
    pub async fn connect(&mut self) -> Result<(TcpStream, TcpStream), MirraError> {
        let (video, control) = if self.tunnel_forward {
            let addr = self.direct_addr.unwrap_or(Ipv4Addr::LOCALHOST);
            debug!("trying to connect to the agent at {addr}:{}", self.local_port);
            let video = connect_to_agent(addr, self.local_port).await?;
            // The agent is listening now; a single attempt suffices.
            let control =
                TcpStream::connect(SocketAddrV4::new(addr, self.local_port)).await?;
            debug!("connected");
            self.phase = SessionPhase::SocketsConnected;
            (video, control)
        } else {
            let listener = self
                .listener
                .as_ref()
                .ok_or(MirraError::InvalidPhase("connect without a listener"))?;
            let (video, _) = listener.accept().await?;
            let (control, _) = listener.accept().await?;
            // The listening socket has served its purpose.
            self.listener = None;
            self.phase = SessionPhase::SocketsAccepted;
            (video, control)
        };

        if self.tunnel_enabled {
            self.disable_tunnel().await;
        }

        self.phase = SessionPhase::Ready;
        Ok((video, control))
    }

    /// Terminate the agent and remove any surviving tunnel. Idempotent.
    pub async fn stop(&mut self) {
        self.phase = SessionPhase::Stopping;
        self.listener = None;

        if let Some(mut process) = self.process.take() {
            if let Err(e) = process.terminate() {
                warn!("could not terminate the agent process: {e}");
            }
            process.wait().await; // ignore exit code
            debug!("agent terminated");
        }

        if self.tunnel_enabled {
            self.disable_tunnel().await;
        }

        self.phase = SessionPhase::Stopped;
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The device serial this session targets, if any.
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// Whether the forward (or direct-IP) connection mode is active.
    pub fn tunnel_forward(&self) -> bool {
        self.tunnel_forward
    }

    /// Port the reverse-mode listener actually bound, for tests using
    /// an OS-assigned port.
    pub fn bound_port(&self) -> Option<u16> {
        self.listener
            .as_ref()
            .and_then(|l| l.local_addr().ok())
            .map(|a| a.port())
    }

    async fn enable_tunnel(&mut self) -> Result<(), MirraError> {
        let serial = self.serial.as_deref();
        if self
            .bridge
            .reverse_add(serial, SOCKET_NAME, self.local_port)
            .await
            .is_ok()
        {
            self.phase = SessionPhase::TunnelReverse;
            return Ok(());
        }

        warn!("reverse tunnel failed, falling back to forward");
        self.tunnel_forward = true;
        match self
            .bridge
            .forward_add(serial, self.local_port, SOCKET_NAME)
            .await
        {
            Ok(()) => {
                self.phase = SessionPhase::TunnelForward;
                Ok(())
            }
            Err(_) => Err(MirraError::TunnelFailed),
        }
    }

    async fn disable_tunnel(&mut self) {
        let serial = self.serial.as_deref();
        let result = if self.tunnel_forward {
            self.bridge.forward_remove(serial, self.local_port).await
        } else {
            self.bridge.reverse_remove(serial, SOCKET_NAME).await
        };
        if let Err(e) = result {
            warn!("could not remove the tunnel: {e}");
        }
        self.tunnel_enabled = false;
    }
}

/// Poll-connect to the agent behind a forward tunnel.
///
/// The tunnel accepts connections even before the agent listens, so a
/// successful `connect()` proves nothing. The agent writes one probe
/// byte as soon as it is ready; an empty read means "not yet".
async fn connect_to_agent(addr: Ipv4Addr, port: u16) -> Result<TcpStream, MirraError> {
    for attempt in (0..CONNECT_ATTEMPTS).rev() {
        debug!("remaining connection attempts: {}", attempt + 1);
        if let Some(socket) = connect_and_read_byte(addr, port).await {
            info!("connected to the agent");
            return Ok(socket);
        }
        if attempt > 0 {
            tokio::time::sleep(CONNECT_DELAY).await;
        }
    }
    Err(MirraError::ConnectTimeout {
        attempts: CONNECT_ATTEMPTS,
    })
}

async fn connect_and_read_byte(addr: Ipv4Addr, port: u16) -> Option<TcpStream> {
    let mut socket = TcpStream::connect(SocketAddrV4::new(addr, port)).await.ok()?;
    let mut byte = [0u8; 1];
    match socket.read(&mut byte).await {
        Ok(1) => Some(socket),
        _ => None,
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use tokio::io::AsyncWriteExt;

    /// Records bridge calls; individual operations can be failed.
    struct FakeBridge {
        calls: Mutex<Vec<String>>,
        fail_push: bool,
        fail_reverse: bool,
        fail_forward: bool,
    }

    impl FakeBridge {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_push: false,
                fail_reverse: false,
                fail_forward: false,
            }
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn fail(action: &'static str) -> MirraError {
            MirraError::BridgeCommand {
                action,
                code: Some(1),
            }
        }
    }

    #[async_trait]
    impl DeviceBridge for FakeBridge {
        async fn push(
            &self,
            _serial: Option<&str>,
            _local: &Path,
            remote: &str,
        ) -> Result<(), MirraError> {
            self.record(format!("push {remote}"));
            if self.fail_push {
                return Err(Self::fail("push"));
            }
            Ok(())
        }

        async fn reverse_add(
            &self,
            _serial: Option<&str>,
            socket_name: &str,
            local_port: u16,
        ) -> Result<(), MirraError> {
            self.record(format!("reverse_add {socket_name} {local_port}"));
            if self.fail_reverse {
                return Err(Self::fail("reverse"));
            }
            Ok(())
        }

        async fn reverse_remove(
            &self,
            _serial: Option<&str>,
            socket_name: &str,
        ) -> Result<(), MirraError> {
            self.record(format!("reverse_remove {socket_name}"));
            Ok(())
        }

        async fn forward_add(
            &self,
            _serial: Option<&str>,
            local_port: u16,
            socket_name: &str,
        ) -> Result<(), MirraError> {
            self.record(format!("forward_add {local_port} {socket_name}"));
            if self.fail_forward {
                return Err(Self::fail("forward"));
            }
            Ok(())
        }

        async fn forward_remove(
            &self,
            _serial: Option<&str>,
            local_port: u16,
        ) -> Result<(), MirraError> {
            self.record(format!("forward_remove {local_port}"));
            Ok(())
        }

        async fn execute(
            &self,
            _serial: Option<&str>,
            _args: &[String],
        ) -> Result<ProcessHandle, MirraError> {
            self.record("execute");
            // A harmless long-lived stand-in for the agent driver.
            let child = tokio::process::Command::new("sleep")
                .arg("600")
                .spawn()?;
            Ok(ProcessHandle::new(child))
        }
    }

    fn meta_bytes(name: &str, width: u16, height: u16) -> Vec<u8> {
        let mut buf = vec![0u8; DEVICE_NAME_FIELD_LENGTH + 4];
        buf[..name.len()].copy_from_slice(name.as_bytes());
        buf[DEVICE_NAME_FIELD_LENGTH..DEVICE_NAME_FIELD_LENGTH + 2]
            .copy_from_slice(&width.to_be_bytes());
        buf[DEVICE_NAME_FIELD_LENGTH + 2..].copy_from_slice(&height.to_be_bytes());
        buf
    }

    #[test]
    fn argv_order_and_forms() {
        let params = ServerParams {
            local_port: 27183,
            max_size: 1080,
            bit_rate: 8_000_000,
            crop: None,
            control: true,
            density: 420,
            size: Some("1080:1920".into()),
            tablet: true,
            use_ime: false,
        };
        let argv = agent_argv(&params, true);
        assert_eq!(
            &argv[..5],
            &[
                "shell",
                "CLASSPATH=/data/local/tmp/scrcpy-server.jar",
                "app_process",
                "/",
                "com.genymobile.scrcpy.Server",
            ]
        );
        assert_eq!(
            &argv[5..argv.len() - 1],
            &[
                "1080",
                "8000000",
                "true",
                "-",
                "true",
                "true",
                "density=420",
                "size=1080:1920",
                "tablet=true",
                "port=27183",
                "useIME=false",
            ]
        );
    }

    #[test]
    fn argv_defaults() {
        let argv = agent_argv(&ServerParams::default(), false);
        assert_eq!(argv[7], "false"); // tunnel_forward
        assert_eq!(argv[8], "-"); // no crop
        assert_eq!(argv[9], "true"); // frame meta, always
        assert_eq!(argv[12], "size=0:0");
    }

    #[tokio::test]
    async fn push_failure_aborts_immediately() {
        let mut bridge = FakeBridge::new();
        bridge.fail_push = true;
        let bridge = Arc::new(bridge);
        let err = ServerSession::start(bridge.clone(), None, &ServerParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MirraError::BridgeCommand { .. }));
        assert_eq!(bridge.calls(), ["push /data/local/tmp/scrcpy-server.jar"]);
    }

    #[tokio::test]
    async fn both_tunnels_failing_aborts() {
        let mut bridge = FakeBridge::new();
        bridge.fail_reverse = true;
        bridge.fail_forward = true;
        let bridge = Arc::new(bridge);
        let err = ServerSession::start(bridge.clone(), None, &ServerParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MirraError::TunnelFailed));
        // No agent was spawned.
        assert!(!bridge.calls().iter().any(|c| c == "execute"));
    }

    #[tokio::test]
    async fn reverse_failure_falls_back_to_forward() {
        let mut bridge = FakeBridge::new();
        bridge.fail_reverse = true;
        let bridge = Arc::new(bridge);
        let session = ServerSession::start(bridge.clone(), None, &ServerParams::default())
            .await
            .unwrap();
        assert!(session.tunnel_forward());
        assert!(
            bridge
                .calls()
                .iter()
                .any(|c| c.starts_with("forward_add"))
        );
    }

    #[tokio::test]
    async fn reverse_session_accepts_and_reads_meta() {
        let bridge = Arc::new(FakeBridge::new());
        let params = ServerParams {
            local_port: 0, // OS-assigned
            ..ServerParams::default()
        };
        let mut session = ServerSession::start(bridge.clone(), None, &params)
            .await
            .unwrap();
        assert_eq!(session.phase(), SessionPhase::AgentSpawned);

        let port = session.bound_port().unwrap();
        let agent = tokio::spawn(async move {
            let mut video = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            video
                .write_all(&meta_bytes("Pixel 3", 1080, 2160))
                .await
                .unwrap();
            let _control = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            // Keep both ends open until the host has read the header.
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let (mut video, _control) = session.connect().await.unwrap();
        assert_eq!(session.phase(), SessionPhase::Ready);

        let meta = read_device_meta(&mut video).await.unwrap();
        assert_eq!(meta.name, "Pixel 3");
        assert_eq!(meta.frame_size, Size {
            width: 1080,
            height: 2160,
        });

        // The reverse tunnel is torn down once the sockets are up.
        assert!(
            bridge
                .calls()
                .iter()
                .any(|c| c.starts_with("reverse_remove"))
        );

        session.stop().await;
        assert_eq!(session.phase(), SessionPhase::Stopped);
        // stop() twice is fine.
        session.stop().await;
        agent.await.unwrap();
    }

    #[tokio::test]
    async fn forward_session_polls_probe_byte() {
        // Stand-in agent endpoint: the listener plays the tunnel+agent.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let agent = tokio::spawn(async move {
            // Video connection: probe byte + session header.
            let (mut video, _) = listener.accept().await.unwrap();
            video.write_all(&[0]).await.unwrap();
            video
                .write_all(&meta_bytes("tab", 1920, 1200))
                .await
                .unwrap();
            // Control connection.
            let (_control, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let bridge = Arc::new(FakeBridge::new());
        let params = ServerParams {
            local_port: port,
            ..ServerParams::default()
        };
        // A direct-IP serial: tunnel setup is skipped entirely.
        let serial = format!("127.0.0.1:{port}");
        let mut session = ServerSession::start(bridge.clone(), Some(&serial), &params)
            .await
            .unwrap();
        assert!(session.tunnel_forward());
        assert!(!bridge.calls().iter().any(|c| c.contains("reverse")));

        let (mut video, _control) = session.connect().await.unwrap();
        let meta = read_device_meta(&mut video).await.unwrap();
        assert_eq!(meta.name, "tab");

        // Direct IP never had a tunnel, so nothing to remove.
        assert!(!bridge.calls().iter().any(|c| c.contains("remove")));

        session.stop().await;
        agent.await.unwrap();
    }

    #[tokio::test]
    async fn truncated_meta_is_setup_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let writer = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(&[0u8; 10]).await.unwrap();
        });
        let mut sock = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        writer.await.unwrap();
        let err = read_device_meta(&mut sock).await.unwrap_err();
        assert!(matches!(err, MirraError::InvalidDeviceMeta(_)));
    }
}
