//! Hardware device interface
//!
//! Every supported receiver implements [`Device`]. The backend is picked at
//! startup from [`DriverKind`]; nothing downstream inspects concrete types.
//!
//! All methods take `&self`: the producer thread sits inside
//! [`Device::read_loop`] while the control thread calls the setters on the
//! same device. Backends must tolerate that overlap.

pub mod generator;
#[cfg(feature = "rtlsdr")]
pub mod rtlsdr;
pub mod select;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::codec::SampleFormat;
use crate::error::{ConfigError, DeviceError};

pub use generator::SignalGenerator;
pub use select::resolve_device;

/// Result type for device calls
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Receiver gain setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    /// Device automatic gain control
    #[default]
    Auto,
    /// Explicit gain in tenths of a dB
    Manual(i32),
}

impl Gain {
    /// Explicit gain from a decimal dB value, rounded to the nearest tenth
    pub fn from_db(db: f64) -> Self {
        Gain::Manual((db * 10.0).round() as i32)
    }
}

impl fmt::Display for Gain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gain::Auto => f.write_str("auto"),
            Gain::Manual(tenths) => write!(f, "{:.1} dB", *tenths as f64 / 10.0),
        }
    }
}

impl FromStr for Gain {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Gain::Auto);
        }
        s.parse::<f64>()
            .ok()
            .filter(|db| db.is_finite())
            .map(Gain::from_db)
            .ok_or_else(|| ConfigError::InvalidGain(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for Gain {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Db(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Db(db) => Ok(Gain::from_db(db)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Capability set every receiver backend provides
pub trait Device: Send + Sync {
    /// Human readable name for logs
    fn name(&self) -> &str;

    /// Format of the raw bytes passed to the read-loop callback
    fn native_format(&self) -> SampleFormat;

    /// Natural transfer size, in interleaved I/Q values per chunk
    fn get_buffer_size(&self) -> usize;

    fn open(&self) -> DeviceResult<()>;

    /// Block delivering chunks to `on_chunk` until the device is closed
    fn read_loop(&self, on_chunk: &mut dyn FnMut(&[u8])) -> DeviceResult<()>;

    fn close(&self) -> DeviceResult<()>;

    fn set_center_frequency(&self, frequency: u32) -> DeviceResult<()>;

    fn set_sample_rate(&self, sample_rate: u32) -> DeviceResult<()>;

    fn set_gain(&self, gain: Gain) -> DeviceResult<()>;

    fn set_ppm(&self, ppm: i32) -> DeviceResult<()>;

    /// Flush stale samples before streaming starts
    fn reset_buffer(&self) -> DeviceResult<()> {
        Ok(())
    }
}

/// Enumerated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub serial: String,
}

/// Available receiver backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// RTL2832U dongles through librtlsdr
    #[default]
    RtlSdr,
    /// Synthetic tone source, no hardware needed
    Generator,
}

impl DriverKind {
    /// List the devices this backend can open
    pub fn enumerate(self) -> DeviceResult<Vec<DeviceInfo>> {
        match self {
            #[cfg(feature = "rtlsdr")]
            DriverKind::RtlSdr => rtlsdr::enumerate(),
            #[cfg(not(feature = "rtlsdr"))]
            DriverKind::RtlSdr => Err(DeviceError::Unsupported("rtlsdr".to_string())),
            DriverKind::Generator => Ok(generator::enumerate()),
        }
    }

    /// Create an unopened device for an enumerated entry
    pub fn create(self, info: &DeviceInfo) -> DeviceResult<Arc<dyn Device>> {
        match self {
            #[cfg(feature = "rtlsdr")]
            DriverKind::RtlSdr => Ok(Arc::new(rtlsdr::RtlSdr::new(info))),
            #[cfg(not(feature = "rtlsdr"))]
            DriverKind::RtlSdr => Err(DeviceError::Unsupported("rtlsdr".to_string())),
            DriverKind::Generator => Ok(Arc::new(SignalGenerator::new(info))),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::RtlSdr => f.write_str("rtlsdr"),
            DriverKind::Generator => f.write_str("generator"),
        }
    }
}

impl FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rtlsdr" | "rtl" => Ok(DriverKind::RtlSdr),
            "generator" | "gen" => Ok(DriverKind::Generator),
            other => Err(format!("unknown driver: {other}")),
        }
    }
}

/// Live receiver settings.
///
/// Written by startup and the control channel, read by anyone; values are
/// individually atomic with no cross-field consistency.
#[derive(Debug)]
pub struct DeviceParameters {
    center_frequency: AtomicU32,
    sample_rate: AtomicU32,
    gain: Mutex<Gain>,
    ppm: AtomicI32,
    iq_swap: AtomicBool,
}

impl DeviceParameters {
    pub fn new(center_frequency: u32, sample_rate: u32, gain: Gain, ppm: i32, iq_swap: bool) -> Self {
        Self {
            center_frequency: AtomicU32::new(center_frequency),
            sample_rate: AtomicU32::new(sample_rate),
            gain: Mutex::new(gain),
            ppm: AtomicI32::new(ppm),
            iq_swap: AtomicBool::new(iq_swap),
        }
    }

    pub fn center_frequency(&self) -> u32 {
        self.center_frequency.load(Ordering::Relaxed)
    }

    pub fn set_center_frequency(&self, frequency: u32) {
        self.center_frequency.store(frequency, Ordering::Relaxed);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
    }

    pub fn gain(&self) -> Gain {
        *self.gain.lock()
    }

    pub fn set_gain(&self, gain: Gain) {
        *self.gain.lock() = gain;
    }

    pub fn ppm(&self) -> i32 {
        self.ppm.load(Ordering::Relaxed)
    }

    pub fn set_ppm(&self, ppm: i32) {
        self.ppm.store(ppm, Ordering::Relaxed);
    }

    pub fn iq_swap(&self) -> bool {
        self.iq_swap.load(Ordering::Relaxed)
    }

    pub fn set_iq_swap(&self, iq_swap: bool) {
        self.iq_swap.store(iq_swap, Ordering::Relaxed);
    }
}
