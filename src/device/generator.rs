//! Synthetic receiver producing a paced complex tone
//!
//! Stands in for hardware in demos and tests. A single carrier sits at
//! [`TONE_FREQUENCY`]; tuning, ppm and gain move and scale it the way they
//! would on a real front end. Chunks are released at the configured sample
//! rate.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{Device, DeviceInfo, DeviceResult, Gain};
use crate::codec::SampleFormat;
use crate::error::{DeviceError, DeviceOp};

/// Absolute frequency of the generated carrier
pub const TONE_FREQUENCY: u32 = 145_025_000;

/// Interleaved values per chunk (8192 complex samples)
const CHUNK_VALUES: usize = 16_384;

/// Amplitude used in automatic gain mode
const AUTO_AMPLITUDE: f64 = 0.5;

const SERIAL: &str = "SIGGEN00000001";

/// The single virtual device this backend offers
pub fn enumerate() -> Vec<DeviceInfo> {
    vec![DeviceInfo {
        index: 0,
        name: "Signal generator".to_string(),
        serial: SERIAL.to_string(),
    }]
}

pub struct SignalGenerator {
    name: String,
    open: AtomicBool,
    center_frequency: AtomicU32,
    sample_rate: AtomicU32,
    ppm: AtomicI32,
    gain: Mutex<Gain>,
}

impl SignalGenerator {
    pub fn new(info: &DeviceInfo) -> Self {
        Self {
            name: format!("{} (SN {})", info.name, info.serial),
            open: AtomicBool::new(false),
            center_frequency: AtomicU32::new(TONE_FREQUENCY),
            sample_rate: AtomicU32::new(2_400_000),
            ppm: AtomicI32::new(0),
            gain: Mutex::new(Gain::Auto),
        }
    }

    /// Tone offset from the (ppm corrected) tuned frequency, in Hz
    fn tone_offset(&self) -> f64 {
        let center = self.center_frequency.load(Ordering::Relaxed) as f64;
        let ppm = self.ppm.load(Ordering::Relaxed) as f64;
        TONE_FREQUENCY as f64 - center * (1.0 + ppm / 1e6)
    }

    fn amplitude(&self) -> f64 {
        match *self.gain.lock() {
            Gain::Auto => AUTO_AMPLITUDE,
            Gain::Manual(tenths) => (0.05 * 10f64.powf(tenths as f64 / 200.0)).min(1.0),
        }
    }

    /// Fill `chunk` with the next block of the tone, returning the new phase
    fn synthesize(&self, chunk: &mut Vec<u8>, mut phase: f64, sample_rate: f64) -> f64 {
        let step = TAU * self.tone_offset() / sample_rate;
        let scale = self.amplitude() * i16::MAX as f64;

        chunk.clear();
        for _ in 0..CHUNK_VALUES / 2 {
            let i = (phase.cos() * scale) as i16;
            let q = (phase.sin() * scale) as i16;
            chunk.extend_from_slice(&i.to_ne_bytes());
            chunk.extend_from_slice(&q.to_ne_bytes());
            phase = (phase + step) % TAU;
        }
        phase
    }
}

impl Device for SignalGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn native_format(&self) -> SampleFormat {
        SampleFormat::I16
    }

    fn get_buffer_size(&self) -> usize {
        CHUNK_VALUES
    }

    fn open(&self) -> DeviceResult<()> {
        self.open.store(true, Ordering::SeqCst);
        tracing::info!("Opened {}", self.name);
        Ok(())
    }

    fn read_loop(&self, on_chunk: &mut dyn FnMut(&[u8])) -> DeviceResult<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(DeviceError::NotOpen);
        }

        let mut chunk = Vec::with_capacity(CHUNK_VALUES * 2);
        let mut phase = 0.0;
        let mut deadline = Instant::now();

        while self.open.load(Ordering::Relaxed) {
            let sample_rate = self.sample_rate.load(Ordering::Relaxed).max(1) as f64;
            phase = self.synthesize(&mut chunk, phase, sample_rate);
            on_chunk(&chunk);

            deadline += Duration::from_secs_f64((CHUNK_VALUES / 2) as f64 / sample_rate);
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            } else {
                deadline = now;
            }
        }
        Ok(())
    }

    fn close(&self) -> DeviceResult<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_center_frequency(&self, frequency: u32) -> DeviceResult<()> {
        self.center_frequency.store(frequency, Ordering::Relaxed);
        Ok(())
    }

    fn set_sample_rate(&self, sample_rate: u32) -> DeviceResult<()> {
        if sample_rate == 0 {
            return Err(DeviceError::Status { op: DeviceOp::SampleRate, code: -22 });
        }
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
        Ok(())
    }

    fn set_gain(&self, gain: Gain) -> DeviceResult<()> {
        *self.gain.lock() = gain;
        Ok(())
    }

    fn set_ppm(&self, ppm: i32) -> DeviceResult<()> {
        self.ppm.store(ppm, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn generator() -> SignalGenerator {
        SignalGenerator::new(&enumerate()[0])
    }

    #[test]
    fn test_read_loop_requires_open() {
        let device = generator();
        let result = device.read_loop(&mut |_| {});
        assert_eq!(result, Err(DeviceError::NotOpen));
    }

    #[test]
    fn test_chunks_have_buffer_size() {
        let device = Arc::new(generator());
        device.set_sample_rate(10_000_000).unwrap();
        device.open().unwrap();

        let mut sizes = Vec::new();
        let closer = device.clone();
        device
            .read_loop(&mut |chunk| {
                sizes.push(chunk.len());
                if sizes.len() == 3 {
                    closer.close().unwrap();
                }
            })
            .unwrap();

        assert_eq!(sizes, vec![CHUNK_VALUES * 2; 3]);
    }

    #[test]
    fn test_tone_follows_tuning() {
        let device = generator();
        device.set_center_frequency(TONE_FREQUENCY - 10_000).unwrap();
        assert!((device.tone_offset() - 10_000.0).abs() < 1e-6);

        device.set_ppm(10).unwrap();
        assert!(device.tone_offset() < 10_000.0);
    }

    #[test]
    fn test_gain_scales_amplitude() {
        let device = generator();
        assert_eq!(device.amplitude(), AUTO_AMPLITUDE);
        device.set_gain(Gain::Manual(0)).unwrap();
        assert!((device.amplitude() - 0.05).abs() < 1e-9);
        device.set_gain(Gain::Manual(500)).unwrap();
        assert_eq!(device.amplitude(), 1.0);
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let device = generator();
        let err = device.set_sample_rate(0).unwrap_err();
        assert_eq!(err.op(), Some(DeviceOp::SampleRate));
    }
}
