//! Error types for the IQ connector

use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device call that produced a status.
///
/// Gain is split into its two hardware steps so startup can tell a failed
/// mode switch from a failed gain value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOp {
    Open,
    ReadLoop,
    Close,
    SampleRate,
    CenterFrequency,
    GainMode,
    Gain,
    Ppm,
    ResetBuffer,
}

impl fmt::Display for DeviceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceOp::Open => "open",
            DeviceOp::ReadLoop => "read loop",
            DeviceOp::Close => "close",
            DeviceOp::SampleRate => "sample rate",
            DeviceOp::CenterFrequency => "center frequency",
            DeviceOp::GainMode => "gain mode",
            DeviceOp::Gain => "gain",
            DeviceOp::Ppm => "ppm",
            DeviceOp::ResetBuffer => "reset buffer",
        };
        f.write_str(name)
    }
}

/// Hardware device errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Driver library not found: {0}")]
    LibraryNotFound(String),

    #[error("Driver not compiled in: {0}")]
    Unsupported(String),

    #[error("No supported devices found")]
    NoDevices,

    #[error("Device is not open")]
    NotOpen,

    #[error("{op} failed with status {code}")]
    Status { op: DeviceOp, code: i32 },
}

impl DeviceError {
    /// The device call this error came from, if it was a status failure
    pub fn op(&self) -> Option<DeviceOp> {
        match self {
            DeviceError::Status { op, .. } => Some(*op),
            _ => None,
        }
    }
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    #[error("Send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("Thread spawn failed: {0}")]
    SpawnFailed(#[source] std::io::Error),
}

/// Control protocol errors. None of these are fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("message could not be parsed: {0:?}")]
    Unparseable(String),

    #[error("unknown key: {0:?}")]
    UnknownKey(String),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("device rejected {key}: {source}")]
    Rejected {
        key: String,
        #[source]
        source: DeviceError,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid gain {0:?}")]
    InvalidGain(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Fatal startup failures, one per stage, each with its own exit status
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("no matching device for selector {0:?}")]
    DeviceNotFound(String),

    #[error("device could not be opened: {0}")]
    Open(#[source] DeviceError),

    #[error("setting sample rate failed: {0}")]
    SampleRate(#[source] DeviceError),

    #[error("setting frequency failed: {0}")]
    CenterFrequency(#[source] DeviceError),

    #[error("setting gain mode failed: {0}")]
    GainMode(#[source] DeviceError),

    #[error("setting gain failed: {0}")]
    Gain(#[source] DeviceError),

    #[error("setting ppm failed: {0}")]
    Ppm(#[source] DeviceError),

    #[error("listener setup failed: {0}")]
    Bind(#[source] NetworkError),

    #[error("invalid configuration: {0}")]
    Config(#[source] ConfigError),
}

impl StartupError {
    /// Process exit status for this failure stage
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::DeviceNotFound(_) => 1,
            StartupError::Open(_) => 2,
            StartupError::SampleRate(_) => 3,
            StartupError::CenterFrequency(_) => 4,
            StartupError::GainMode(_) => 5,
            StartupError::Gain(_) => 6,
            StartupError::Ppm(_) => 7,
            StartupError::Bind(_) => 8,
            StartupError::Config(_) => 9,
        }
    }

    /// Map a failed gain application to the gain-mode or gain stage
    pub fn from_gain(err: DeviceError) -> Self {
        match err.op() {
            Some(DeviceOp::GainMode) => StartupError::GainMode(err),
            _ => StartupError::Gain(err),
        }
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
