//! mirra — entry point.
//!
//! ```text
//! mirra                          Mirror the only connected device
//! mirra -s 192.168.1.12:5555    Target a direct-IP device
//! mirra --record out.h264       Record the raw stream while mirroring
//! mirra --gen-config            Dump the default config and exit
//! ```
//!
//! Exit code 0 on user quit or end of stream, non-zero on setup
//! failure.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mirra_core::AdbBridge;
use tokio::sync::mpsc;

use mirra_host::clipboard::{Clipboard, InMemoryClipboard, SystemClipboard};
use mirra_host::config::HostConfig;
use mirra_host::event::{Clock, UiEvent};
use mirra_host::screen::HeadlessDisplay;
use mirra_host::session;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mirra", about = "Screen mirroring and remote control host")]
struct Cli {
    /// Device serial (or a.b.c.d:port for a direct TCP link).
    #[arg(short, long)]
    serial: Option<String>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mirra.toml")]
    config: PathBuf,

    /// Record the raw H.264 stream to this file.
    #[arg(short, long)]
    record: Option<PathBuf>,

    /// Do not decode or display the stream (record-only).
    #[arg(long)]
    no_display: bool,

    /// Do not forward input to the device.
    #[arg(long)]
    no_control: bool,

    /// Start in fullscreen.
    #[arg(short, long)]
    fullscreen: bool,

    /// Show physical touches on the device during the session.
    #[arg(short = 't', long)]
    show_touches: bool,

    /// Turn the device screen off while mirroring.
    #[arg(short = 'S', long)]
    turn_screen_off: bool,

    /// Maximum video dimension (0 = unlimited).
    #[arg(short, long)]
    max_size: Option<u16>,

    /// Video bit rate in bits per second.
    #[arg(short, long)]
    bit_rate: Option<u32>,

    /// Host port used for the tunnel.
    #[arg(short, long)]
    port: Option<u16>,

    /// Crop expression forwarded to the agent (W:H:X:Y).
    #[arg(long)]
    crop: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

impl Cli {
    fn apply(self, config: &mut HostConfig) {
        if self.serial.is_some() {
            config.device.serial = self.serial;
        }
        if let Some(port) = self.port {
            config.device.local_port = port;
        }
        if let Some(max_size) = self.max_size {
            config.device.max_size = max_size;
        }
        if let Some(bit_rate) = self.bit_rate {
            config.device.bit_rate = bit_rate;
        }
        if self.crop.is_some() {
            config.device.crop = self.crop;
        }
        if self.record.is_some() {
            config.session.record = self.record;
        }
        if self.no_display {
            config.session.display = false;
        }
        if self.no_control {
            config.session.control = false;
        }
        if self.fullscreen {
            config.session.fullscreen = true;
        }
        if self.show_touches {
            config.session.show_touches = true;
        }
        if self.turn_screen_off {
            config.session.turn_screen_off = true;
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&HostConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = HostConfig::load(&cli.config);

    // Init tracing before applying overrides so load() warnings show.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    cli.apply(&mut config);

    info!("mirra v{}", env!("CARGO_PKG_VERSION"));

    // UI events: the windowing backend feeds this channel; the bundled
    // headless backend only maps Ctrl-C to a quit request.
    let clock = Clock::start();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = events_tx.send(UiEvent::Quit {
                timestamp: clock.now_ms(),
            });
        }
    });

    let clipboard: Box<dyn Clipboard> = match SystemClipboard::new() {
        Some(clipboard) => Box::new(clipboard),
        None => Box::new(InMemoryClipboard::default()),
    };

    let exit = session::run(
        &config,
        Arc::new(AdbBridge::new()),
        Box::new(HeadlessDisplay),
        clipboard,
        events_rx,
        clock,
    )
    .await;

    match exit {
        Ok(reason) => {
            info!("session ended: {reason:?}");
            Ok(())
        }
        Err(e) => {
            error!("session failed: {e}");
            Err(e.into())
        }
    }
}
