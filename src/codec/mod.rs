//! Sample format conversion
//!
//! Pure transforms between the format a device delivers and the format
//! clients receive, plus the optional I/Q channel swap.

pub mod converter;
pub mod format;

pub use converter::{convert, swap_iq};
pub use format::{SampleFormat, WireFormat};
