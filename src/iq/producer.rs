//! Device read loop driving the ring buffers
//!
//! The producer runs on its own thread, blocked inside the device's read
//! loop. For every chunk the device hands over it swaps I/Q if requested,
//! converts to each output's wire format and writes into that output's ring.
//! Nothing on this path waits for clients.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::codec::{convert, swap_iq, SampleFormat, WireFormat};
use crate::device::{Device, DeviceParameters};
use crate::iq::buffer::SharedRingBuffer;

/// Pause before re-entering a read loop that failed
#[cfg(not(test))]
const READ_RETRY_DELAY: Duration = Duration::from_secs(1);
#[cfg(test)]
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// One ring fed in one wire format
struct Output {
    ring: SharedRingBuffer,
    wire: WireFormat,
    /// Converted chunk (reused)
    buffer: Vec<u8>,
}

/// Per-chunk conversion state
pub struct Producer {
    params: Arc<DeviceParameters>,
    native: SampleFormat,
    outputs: Vec<Output>,
    /// Swapped copy of the raw chunk (reused)
    swap_buffer: Vec<u8>,
    chunks: Arc<AtomicU64>,
}

impl Producer {
    /// Producer with no outputs yet; add them with [`Producer::with_output`]
    pub fn new(params: Arc<DeviceParameters>, native: SampleFormat) -> Self {
        Self {
            params,
            native,
            outputs: Vec::new(),
            swap_buffer: Vec::new(),
            chunks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Also write every chunk into `ring`, converted to `wire`
    pub fn with_output(mut self, ring: SharedRingBuffer, wire: WireFormat) -> Self {
        self.outputs.push(Output {
            ring,
            wire,
            buffer: Vec::new(),
        });
        self
    }

    /// Shared counter of chunks written so far
    pub fn chunk_counter(&self) -> Arc<AtomicU64> {
        self.chunks.clone()
    }

    /// Handle one chunk of raw native bytes from the device
    pub fn on_chunk(&mut self, raw: &[u8]) {
        let input: &[u8] = if self.params.iq_swap() {
            self.swap_buffer.clear();
            self.swap_buffer.extend_from_slice(raw);
            swap_iq(&mut self.swap_buffer, self.native.value_size());
            &self.swap_buffer
        } else {
            raw
        };

        for output in &mut self.outputs {
            output.buffer.clear();
            convert(input, self.native, output.wire, &mut output.buffer);
            output.ring.write(&output.buffer);
        }
        self.chunks.fetch_add(1, Ordering::Relaxed);
    }

    /// Run the device read loop on a dedicated thread.
    ///
    /// A failed read loop is logged and re-entered; a clean return means the
    /// device was closed and ends the thread.
    pub fn spawn(mut self, device: Arc<dyn Device>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("iq-producer".to_string())
            .spawn(move || loop {
                let result = device.read_loop(&mut |chunk: &[u8]| self.on_chunk(chunk));
                match result {
                    Ok(()) => {
                        tracing::info!(
                            "Read loop of {} ended after {} chunks",
                            device.name(),
                            self.chunks.load(Ordering::Relaxed)
                        );
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Read loop of {} failed: {}", device.name(), e);
                        thread::sleep(READ_RETRY_DELAY);
                    }
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{testing::RecordingDevice, Gain};
    use crate::iq::buffer::{RingBuffer, RingReader};

    fn params(iq_swap: bool) -> Arc<DeviceParameters> {
        Arc::new(DeviceParameters::new(100_000_000, 2_048_000, Gain::Auto, 0, iq_swap))
    }

    fn u8_producer(ring: SharedRingBuffer, params: Arc<DeviceParameters>) -> Producer {
        Producer::new(params, SampleFormat::U8).with_output(ring, WireFormat::U8)
    }

    #[test]
    fn test_chunk_is_converted_into_ring() {
        let ring = Arc::new(RingBuffer::new(8, 4));
        let mut reader = RingReader::new(ring.clone());
        let mut producer =
            Producer::new(params(false), SampleFormat::U8).with_output(ring, WireFormat::F32);

        producer.on_chunk(&[0, 255]);

        let mut out = Vec::new();
        assert_eq!(reader.drain_into(&mut out), 8);
        let i = f32::from_le_bytes([out[0], out[1], out[2], out[3]]);
        let q = f32::from_le_bytes([out[4], out[5], out[6], out[7]]);
        assert!((i + 1.0).abs() < 1e-6);
        assert!((q - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_both_outputs_receive_every_chunk() {
        let float_ring = Arc::new(RingBuffer::new(8, 4));
        let byte_ring = Arc::new(RingBuffer::new(2, 4));
        let mut float_reader = RingReader::new(float_ring.clone());
        let mut byte_reader = RingReader::new(byte_ring.clone());
        let mut producer = Producer::new(params(true), SampleFormat::U8)
            .with_output(float_ring, WireFormat::F32)
            .with_output(byte_ring, WireFormat::U8);

        producer.on_chunk(&[0, 255]);

        let mut out = Vec::new();
        assert_eq!(float_reader.drain_into(&mut out), 8);
        let i = f32::from_le_bytes([out[0], out[1], out[2], out[3]]);
        assert!((i - 1.0).abs() < 1e-6);

        byte_reader.drain_into(&mut out);
        assert_eq!(out, vec![255, 0]);
    }

    #[test]
    fn test_iq_swap_applied_before_conversion() {
        let ring = Arc::new(RingBuffer::new(4, 4));
        let mut reader = RingReader::new(ring.clone());
        let mut producer = u8_producer(ring, params(true));

        producer.on_chunk(&[1, 2, 3, 4]);

        let mut out = Vec::new();
        reader.drain_into(&mut out);
        assert_eq!(out, vec![2, 1, 4, 3]);
    }

    #[test]
    fn test_iq_swap_toggles_live() {
        let ring = Arc::new(RingBuffer::new(2, 4));
        let mut reader = RingReader::new(ring.clone());
        let params = params(false);
        let mut producer = u8_producer(ring, params.clone());

        producer.on_chunk(&[1, 2]);
        params.set_iq_swap(true);
        producer.on_chunk(&[1, 2]);

        let mut out = Vec::new();
        reader.drain_into(&mut out);
        assert_eq!(out, vec![1, 2, 2, 1]);
    }

    #[test]
    fn test_spawned_producer_feeds_ring() {
        let device = Arc::new(RecordingDevice::with_chunks(vec![vec![10, 20], vec![30, 40]]));
        let ring = Arc::new(RingBuffer::new(2, 4));
        let mut reader = RingReader::new(ring.clone());
        let producer = u8_producer(ring, params(false));
        let counter = producer.chunk_counter();

        let handle = producer.spawn(device).unwrap();
        handle.join().unwrap();

        let mut out = Vec::new();
        reader.drain_into(&mut out);
        assert_eq!(out, vec![10, 20, 30, 40]);
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_failed_read_loop_is_retried() {
        let device = Arc::new(RecordingDevice::with_chunks(vec![vec![5, 6], vec![7, 8]]));
        device.fail_read_loops(2);
        let ring = Arc::new(RingBuffer::new(2, 4));
        let mut reader = RingReader::new(ring.clone());
        let producer = u8_producer(ring, params(false));
        let counter = producer.chunk_counter();

        producer.spawn(device.clone()).unwrap().join().unwrap();

        assert_eq!(device.read_loop_attempts(), 3);
        let mut out = Vec::new();
        reader.drain_into(&mut out);
        assert_eq!(out, vec![5, 6, 7, 8]);
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }
}
