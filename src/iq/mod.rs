//! IQ data path: the shared ring buffer and the producer feeding it

pub mod buffer;
pub mod producer;

pub use buffer::{RingBuffer, RingReader, SharedRingBuffer};
pub use producer::Producer;
