//! IQ Connector
//!
//! Opens an SDR, streams its samples to TCP clients and optionally listens
//! for control commands.

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iq_connector::{
    codec::WireFormat,
    config::ConnectorConfig,
    device::{DriverKind, Gain},
    error::{ConfigError, StartupError},
    Connector,
};

#[derive(Debug, Parser)]
#[command(name = "iq-connector", version, about = "Stream SDR IQ samples over TCP")]
struct Cli {
    /// Config file (defaults to the platform config dir, if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device index, serial, serial prefix or serial suffix
    #[arg(short, long)]
    device: Option<String>,

    /// Driver backend: rtlsdr or generator
    #[arg(long)]
    driver: Option<DriverKind>,

    /// IQ stream port
    #[arg(short, long)]
    port: Option<u16>,

    /// Control port; control is disabled without it
    #[arg(short, long)]
    control: Option<u16>,

    /// Port for a second, unsigned 8-bit stream (rtl_tcp style clients)
    #[arg(long)]
    rtltcp: Option<u16>,

    /// Center frequency in Hz
    #[arg(short, long)]
    frequency: Option<u32>,

    /// Sample rate in samples per second
    #[arg(short, long)]
    samplerate: Option<u32>,

    /// Gain in dB, or "auto"
    #[arg(short, long)]
    gain: Option<Gain>,

    /// Frequency correction in ppm
    #[arg(long, allow_hyphen_values = true)]
    ppm: Option<i32>,

    /// Swap I and Q
    #[arg(long)]
    iqswap: bool,

    /// Wire format: u8 or f32
    #[arg(long)]
    format: Option<WireFormat>,

    /// Address to bind all listeners to
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// List devices for the selected driver and exit
    #[arg(long)]
    list_devices: bool,
}

impl Cli {
    fn apply(self, config: &mut ConnectorConfig) {
        if let Some(device) = self.device {
            config.device = device;
        }
        if let Some(driver) = self.driver {
            config.driver = driver;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.control.is_some() {
            config.control_port = self.control;
        }
        if self.rtltcp.is_some() {
            config.rtltcp_port = self.rtltcp;
        }
        if let Some(frequency) = self.frequency {
            config.center_frequency = frequency;
        }
        if let Some(rate) = self.samplerate {
            config.sample_rate = rate;
        }
        if let Some(gain) = self.gain {
            config.gain = gain;
        }
        if let Some(ppm) = self.ppm {
            config.ppm = ppm;
        }
        if self.iqswap {
            config.iq_swap = true;
        }
        if let Some(format) = self.format {
            config.wire_format = format;
        }
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ConnectorConfig> {
    if let Some(path) = path {
        return ConnectorConfig::load(path).with_context(|| format!("loading {}", path.display()));
    }
    match ConnectorConfig::default_path() {
        Some(path) if path.exists() => {
            tracing::info!("Using config file {}", path.display());
            ConnectorConfig::load(&path).with_context(|| format!("loading {}", path.display()))
        }
        _ => Ok(ConnectorConfig::default()),
    }
}

fn list_devices(driver: DriverKind) -> ExitCode {
    match driver.enumerate() {
        Ok(devices) => {
            println!("\n=== Available {} Devices ===", driver);
            for info in &devices {
                println!("  {}: {}, SN: {}", info.index, info.name, info.serial);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Device enumeration failed: {e}");
            ExitCode::from(StartupError::DeviceNotFound(driver.to_string()).exit_code())
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{:#}", e);
            return match e.downcast::<ConfigError>() {
                Ok(err) => ExitCode::from(StartupError::Config(err).exit_code()),
                Err(_) => ExitCode::FAILURE,
            };
        }
    };

    if cli.list_devices {
        return list_devices(cli.driver.unwrap_or(config.driver));
    }
    cli.apply(&mut config);

    tracing::info!("Starting IQ connector");

    let connector = match Connector::start(config) {
        Ok(connector) => connector,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    match connector.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
