//! OneKM target host entry point.
//!
//! Creates the platform injection device, then applies records from the
//! capture host until SIGINT/SIGTERM.
//!
//! ```text
//! main()
//!  ├─ load + override config
//!  ├─ platform emulator (SendInput / uinput)
//!  └─ serve_tcp | serve_serial
//!       └─ run_session -> EmulateInputUseCase
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use onekm_client::application::emulate_input::{EmulateInputUseCase, PlatformInputEmulator};
use onekm_client::infrastructure::network;
use onekm_client::infrastructure::storage::config::{
    config_file_path, load_config, ClientConfig, ListenerConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Apply keyboard and mouse input forwarded by a OneKM capture host.
#[derive(Debug, Parser)]
#[command(name = "onekm-client", version)]
struct Cli {
    /// Config file.  Defaults to `$XDG_CONFIG_HOME/onekm/client.toml`.
    #[arg(long, env = "ONEKM_CONFIG")]
    config: Option<PathBuf>,

    /// TCP address to listen on, e.g. `0.0.0.0:24800`.
    #[arg(long, env = "ONEKM_LISTEN", conflicts_with = "serial")]
    listen: Option<String>,

    /// Read records from this serial device instead of listening on TCP.
    #[arg(long, env = "ONEKM_SERIAL")]
    serial: Option<PathBuf>,

    /// Baud rate of the serial device.
    #[arg(long, env = "ONEKM_BAUD", requires = "serial")]
    baud: Option<u32>,
}

impl Cli {
    /// Loads the config file and applies command-line overrides.
    fn into_client_config(self) -> anyhow::Result<ClientConfig> {
        let path = match self.config {
            Some(path) => path,
            None => config_file_path().context("no config path given and none could be derived")?,
        };
        let mut config =
            load_config(&path).with_context(|| format!("loading {}", path.display()))?;

        if let Some(addr) = self.listen {
            config.listener = ListenerConfig::Tcp { addr };
        }
        if let Some(path) = self.serial {
            let baud = match (&config.listener, self.baud) {
                (_, Some(baud)) => baud,
                (ListenerConfig::Serial { baud, .. }, None) => *baud,
                (ListenerConfig::Tcp { .. }, None) => 230_400,
            };
            config.listener = ListenerConfig::Serial { path, baud };
        }

        config.validate()?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_client_config()?;
    let emulator = platform_emulator(&config)?;
    let mut use_case = EmulateInputUseCase::new(emulator);
    let burst_limit = config.session.burst_limit;

    match &config.listener {
        ListenerConfig::Tcp { addr } => {
            let listener = network::bind(addr).await?;
            network::serve_tcp(listener, &mut use_case, burst_limit, wait_for_shutdown_signal())
                .await?;
        }
        ListenerConfig::Serial { path, baud } => {
            serve_serial(path, *baud, &mut use_case, burst_limit).await?;
        }
    }

    info!("OneKM target host stopped");
    Ok(())
}

#[cfg(target_os = "linux")]
async fn serve_serial(
    path: &std::path::Path,
    baud: u32,
    use_case: &mut EmulateInputUseCase,
    burst_limit: usize,
) -> anyhow::Result<()> {
    let stats = network::serial::serve_serial(
        path,
        baud,
        use_case,
        burst_limit,
        wait_for_shutdown_signal(),
    )
    .await?;
    info!(applied = stats.applied, malformed = stats.malformed, "serial line closed");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn serve_serial(
    _path: &std::path::Path,
    _baud: u32,
    _use_case: &mut EmulateInputUseCase,
    _burst_limit: usize,
) -> anyhow::Result<()> {
    anyhow::bail!("serial input is only supported on Linux")
}

#[cfg(target_os = "linux")]
fn platform_emulator(config: &ClientConfig) -> anyhow::Result<Arc<dyn PlatformInputEmulator>> {
    use onekm_client::infrastructure::input_emulation::linux::UinputEmulator;

    let emulator = UinputEmulator::create(&config.injection.device_name)
        .context("creating the uinput injection device")?;
    Ok(Arc::new(emulator))
}

#[cfg(target_os = "windows")]
fn platform_emulator(_config: &ClientConfig) -> anyhow::Result<Arc<dyn PlatformInputEmulator>> {
    use onekm_client::infrastructure::input_emulation::windows::WindowsInputEmulator;

    Ok(Arc::new(WindowsInputEmulator::new()))
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
fn platform_emulator(_config: &ClientConfig) -> anyhow::Result<Arc<dyn PlatformInputEmulator>> {
    anyhow::bail!("no input injection backend for this platform")
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
    info!("shutdown signal received");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
