//! Startup configuration
//!
//! Values come from an optional TOML file and are then overridden by the
//! command line. Everything has a default, so an empty file is valid.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::codec::WireFormat;
use crate::constants::*;
use crate::device::{DriverKind, Gain};
use crate::error::ConfigError;

/// Name of the config file inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "connector.toml";

/// Everything the connector needs at startup
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectorConfig {
    /// Device selector: index, serial, serial prefix or serial suffix
    pub device: String,
    pub driver: DriverKind,
    /// Address both listeners bind to
    pub bind_address: IpAddr,
    pub port: u16,
    /// Control listener port; disabled when absent
    pub control_port: Option<u16>,
    /// Second stream of unsigned 8-bit samples for rtl_tcp style clients;
    /// disabled when absent
    pub rtltcp_port: Option<u16>,
    pub center_frequency: u32,
    pub sample_rate: u32,
    pub gain: Gain,
    pub ppm: i32,
    pub iq_swap: bool,
    pub wire_format: WireFormat,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            device: "0".to_string(),
            driver: DriverKind::default(),
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_STREAM_PORT,
            control_port: None,
            rtltcp_port: None,
            center_frequency: DEFAULT_CENTER_FREQUENCY,
            sample_rate: DEFAULT_SAMPLE_RATE,
            gain: Gain::Auto,
            ppm: 0,
            iq_swap: false,
            wire_format: WireFormat::default(),
        }
    }
}

impl ConnectorConfig {
    /// Platform config file location, e.g. `~/.config/iq-connector/connector.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "iq-connector").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text, &path.display().to_string())
    }

    /// Parse TOML text; `origin` only labels errors
    pub fn from_toml(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    /// Reject settings no device could run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample rate must be nonzero".to_string()));
        }
        if self.device.trim().is_empty() {
            return Err(ConfigError::Invalid("device selector is empty".to_string()));
        }
        let ports = [
            ("stream", Some(self.port)),
            ("control", self.control_port),
            ("rtl_tcp", self.rtltcp_port),
        ];
        for (i, (first, a)) in ports.iter().enumerate() {
            for (second, b) in &ports[i + 1..] {
                if let (Some(a), Some(b)) = (a, b) {
                    if *a != 0 && a == b {
                        return Err(ConfigError::Invalid(format!(
                            "{first} and {second} both use port {a}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn stream_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_port
            .map(|port| SocketAddr::new(self.bind_address, port))
    }

    pub fn rtltcp_addr(&self) -> Option<SocketAddr> {
        self.rtltcp_port
            .map(|port| SocketAddr::new(self.bind_address, port))
    }
}
