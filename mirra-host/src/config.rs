//! Host configuration.

use std::path::{Path, PathBuf};

use mirra_core::ServerParams;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Device and agent settings.
    pub device: DeviceConfig,
    /// Session modes.
    pub session: SessionConfig,
    /// Input forwarding settings.
    pub input: InputConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Device and agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device serial, or `a.b.c.d:port` for a direct TCP link.
    pub serial: Option<String>,
    /// Host port used for the tunnel.
    pub local_port: u16,
    /// Maximum video dimension (0 = unlimited).
    pub max_size: u16,
    /// Target bit rate in bits per second.
    pub bit_rate: u32,
    /// Crop expression forwarded to the agent.
    pub crop: Option<String>,
    /// Display density override forwarded to the agent (0 = default).
    pub density: u16,
    /// Display size override forwarded to the agent (`W:H`).
    pub size: Option<String>,
    /// Tablet mode: drive device rotation from the window orientation.
    pub tablet: bool,
}

/// Session modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Decode and display the stream.
    pub display: bool,
    /// Forward input to the device.
    pub control: bool,
    /// Record the raw stream to this file.
    pub record: Option<PathBuf>,
    /// Start in fullscreen.
    pub fullscreen: bool,
    /// Flip the device's show_touches setting for the session.
    pub show_touches: bool,
    /// Turn the device screen off at session start.
    pub turn_screen_off: bool,
    /// Window title (defaults to the device name).
    pub window_title: Option<String>,
}

/// Input forwarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Let the device IME handle text (letters travel as text events).
    pub use_ime: bool,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: None,
            local_port: 27183,
            max_size: 0,
            bit_rate: 8_000_000,
            crop: None,
            density: 0,
            size: None,
            tablet: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            display: true,
            control: true,
            record: None,
            fullscreen: false,
            show_touches: false,
            turn_screen_off: false,
            window_title: None,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { use_ime: false }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl HostConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::debug!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// The agent parameters derived from this configuration.
    pub fn server_params(&self) -> ServerParams {
        ServerParams {
            local_port: self.device.local_port,
            max_size: self.device.max_size,
            bit_rate: self.device.bit_rate,
            crop: self.device.crop.clone(),
            control: self.session.control,
            density: self.device.density,
            size: self.device.size.clone(),
            tablet: self.device.tablet,
            use_ime: self.input.use_ime,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
