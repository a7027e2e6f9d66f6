//! # IQ Connector
//!
//! Streams raw IQ samples from a software-defined radio to any number of TCP
//! clients, with an optional text control channel for retuning.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                               DEVICE                                 │
//! │        RTL-SDR (librtlsdr, loaded at runtime) | signal generator     │
//! └──────────────────────────────────┬───────────────────────────────────┘
//!                                    │ read_loop callback (native format)
//!                                    ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                 Producer thread (iq::producer)                       │
//! │   optional I/Q swap -> wire conversion (u8 or f32 LE) per output     │
//! └──────────────────────────────────┬───────────────────────────────────┘
//!                                    │ write, notify_all
//!                                    ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │             Lossy broadcast ring (iq::buffer)                        │
//! │     single write cursor, one independent read cursor per client      │
//! └───────┬──────────────────────┬──────────────────────┬────────────────┘
//!         ▼                      ▼                      ▼
//!   ┌───────────┐          ┌───────────┐          ┌───────────┐
//!   │ Client 0  │          │ Client 1  │   ...    │ Client N  │   network::stream
//!   │  thread   │          │  thread   │          │  thread   │
//!   └───────────┘          └───────────┘          └───────────┘
//!
//!   Optional rtl_tcp port: a second ring and listener carrying u8 samples
//!   Control thread (network::control): "key:value\n" -> device setters
//! ```

pub mod codec;
pub mod config;
pub mod connector;
pub mod device;
pub mod error;
pub mod iq;
pub mod network;

pub use connector::Connector;
pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default TCP port for the IQ stream
    pub const DEFAULT_STREAM_PORT: u16 = 4950;

    /// Default center frequency in Hz
    pub const DEFAULT_CENTER_FREQUENCY: u32 = 145_000_000;

    /// Default sample rate in samples per second
    pub const DEFAULT_SAMPLE_RATE: u32 = 2_400_000;

    /// Ring buffer capacity in device chunks
    pub const RING_BUFFER_CHUNKS: usize = 10;

    /// Bytes taken from the control socket per read
    pub const CONTROL_READ_SIZE: usize = 256;
}
