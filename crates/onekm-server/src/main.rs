//! OneKM capture host entry point.
//!
//! Loads the config, opens the input devices, the link to the target host
//! and the key-sync keyboard, then runs the dispatch loop on a blocking
//! thread until a signal or the hotkey chord asks it to stop.
//!
//! ```text
//! main()
//!  ├─ load + override config
//!  ├─ signal task        (SIGINT / SIGTERM -> running = false)
//!  └─ spawn_blocking
//!       └─ DispatchEngine::run()
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use onekm_server::infrastructure::storage::config::{
    config_file_path, load_config, ServerConfig, TransportConfig,
};
use onekm_server::infrastructure::transport::{DEFAULT_BAUD_RATE, DEFAULT_SERIAL_PATH};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Forward this machine's keyboard and mouse to a second host on a hotkey.
#[derive(Debug, Parser)]
#[command(name = "onekm-server", version)]
struct Cli {
    /// Config file.  Defaults to `$XDG_CONFIG_HOME/onekm/server.toml`.
    #[arg(long, env = "ONEKM_CONFIG")]
    config: Option<PathBuf>,

    /// Serial device of the link, e.g. `/dev/ttyACM0`.
    #[arg(long, env = "ONEKM_SERIAL", conflicts_with = "connect")]
    serial: Option<PathBuf>,

    /// Baud rate of the serial link.
    #[arg(long, env = "ONEKM_BAUD")]
    baud: Option<u32>,

    /// Connect to the target host over TCP instead, e.g. `10.0.0.2:24800`.
    #[arg(long, env = "ONEKM_CONNECT")]
    connect: Option<String>,

    /// evdev code of the switch hotkey (119 = Pause).
    #[arg(long, env = "ONEKM_HOTKEY")]
    hotkey: Option<u16>,
}

impl Cli {
    /// Loads the config file and applies command-line overrides.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let path = match self.config {
            Some(path) => path,
            None => config_file_path().context("no config path given and none could be derived")?,
        };
        let mut config =
            load_config(&path).with_context(|| format!("loading {}", path.display()))?;

        if let Some(hotkey) = self.hotkey {
            config.control.hotkey = hotkey;
        }
        if let Some(addr) = self.connect {
            config.transport = TransportConfig::Tcp { addr };
        }
        if self.serial.is_some() || self.baud.is_some() {
            let (default_path, default_baud) = match &config.transport {
                TransportConfig::Serial { path, baud } => (path.clone(), *baud),
                TransportConfig::Tcp { .. } => (PathBuf::from(DEFAULT_SERIAL_PATH), DEFAULT_BAUD_RATE),
            };
            config.transport = TransportConfig::Serial {
                path: self.serial.unwrap_or(default_path),
                baud: self.baud.unwrap_or(default_baud),
            };
        }

        config.validate()?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        running_clone.store(false, Ordering::Relaxed);
    });

    tokio::task::spawn_blocking(move || run_engine(&config, running))
        .await
        .context("dispatch thread panicked")??;

    info!("OneKM capture host stopped");
    Ok(())
}

#[cfg(target_os = "linux")]
fn run_engine(config: &ServerConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    use std::time::Duration;

    use onekm_server::application::dispatch::DispatchEngine;
    use onekm_server::application::key_sync::KeySyncRecovery;
    use onekm_server::infrastructure::input_capture::linux::EvdevCapture;
    use onekm_server::infrastructure::input_capture::CaptureSource;
    use onekm_server::infrastructure::transport::serial::open_serial;
    use onekm_server::infrastructure::transport::{StreamTransport, Transport};
    use onekm_server::infrastructure::virtual_keyboard::linux::UinputKeySync;
    use tracing::warn;

    let capture = EvdevCapture::open(&config.capture.device_paths, config.capture.max_devices)
        .context("opening input devices")?;
    let devices = capture.device_names();

    let transport: Box<dyn Transport> = match &config.transport {
        TransportConfig::Serial { path, baud } => Box::new(open_serial(path, *baud)?),
        TransportConfig::Tcp { addr } => Box::new(StreamTransport::connect_tcp(addr)?),
    };

    let recovery = if config.key_sync.enabled {
        match UinputKeySync::create(&config.key_sync.device_name) {
            Ok(sink) => KeySyncRecovery::new(
                Box::new(sink),
                Duration::from_millis(config.key_sync.inject_delay_ms),
            ),
            Err(e) => {
                warn!("key sync unavailable, continuing without it: {e}");
                KeySyncRecovery::disabled()
            }
        }
    } else {
        KeySyncRecovery::disabled()
    };

    info!(
        hotkey = config.control.hotkey,
        transport = %transport.describe(),
        devices = devices.len(),
        key_sync = recovery.is_enabled(),
        key_forwarding = ?config.dispatch.key_forwarding,
        "OneKM capture host ready"
    );
    for name in &devices {
        info!("  device: {name}");
    }

    let mut engine = DispatchEngine::new(
        Box::new(capture),
        transport,
        config.engine_config(),
        running,
    )
    .with_chord(config.chord_detector())
    .with_coalescer(config.motion_coalescer())
    .with_heartbeat(config.heartbeat())
    .with_recovery(recovery);

    engine.run()?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn run_engine(_config: &ServerConfig, _running: Arc<AtomicBool>) -> anyhow::Result<()> {
    anyhow::bail!("the capture host needs Linux evdev input devices")
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("failed to listen for Ctrl+C signal: {e}");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C signal: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
