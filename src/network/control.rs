//! Control channel
//!
//! Plain text, one `key:value` command per line, no replies. One connection
//! is served at a time. Framing is per read: a read of up to
//! [`CONTROL_READ_SIZE`] bytes must end in a newline or the whole read is
//! discarded; bytes are never carried over to the next read.
//!
//! Setters run straight from the control thread while the producer is inside
//! the device read loop.

use std::fmt;
use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::constants::CONTROL_READ_SIZE;
use crate::device::{Device, DeviceParameters, Gain};
use crate::error::{ControlError, NetworkError};

use super::create_listener;

/// A parsed control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    SampleRate(u32),
    CenterFrequency(u32),
    Ppm(i32),
    RfGain(Gain),
    IqSwap(bool),
}

impl ControlMessage {
    /// Parse one line without its newline
    pub fn parse(line: &str) -> Result<Self, ControlError> {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| ControlError::Unparseable(line.to_string()))?;
        let key = key.trim();
        let value = value.trim();

        let invalid = || ControlError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "samp_rate" => value.parse().map(Self::SampleRate).map_err(|_| invalid()),
            "center_freq" => value.parse().map(Self::CenterFrequency).map_err(|_| invalid()),
            "ppm" => value.parse().map(Self::Ppm).map_err(|_| invalid()),
            "rf_gain" => value.parse().map(Self::RfGain).map_err(|_| invalid()),
            "iqswap" => parse_bool(value).map(Self::IqSwap).ok_or_else(invalid),
            _ => Err(ControlError::UnknownKey(key.to_string())),
        }
    }

    /// Protocol key of this command
    pub fn key(&self) -> &'static str {
        match self {
            ControlMessage::SampleRate(_) => "samp_rate",
            ControlMessage::CenterFrequency(_) => "center_freq",
            ControlMessage::Ppm(_) => "ppm",
            ControlMessage::RfGain(_) => "rf_gain",
            ControlMessage::IqSwap(_) => "iqswap",
        }
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMessage::SampleRate(v) => write!(f, "samp_rate={v}"),
            ControlMessage::CenterFrequency(v) => write!(f, "center_freq={v}"),
            ControlMessage::Ppm(v) => write!(f, "ppm={v}"),
            ControlMessage::RfGain(v) => write!(f, "rf_gain={v}"),
            ControlMessage::IqSwap(v) => write!(f, "iqswap={v}"),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Applies control commands to the shared device
pub struct ControlHandler {
    device: Arc<dyn Device>,
    params: Arc<DeviceParameters>,
}

impl ControlHandler {
    pub fn new(device: Arc<dyn Device>, params: Arc<DeviceParameters>) -> Self {
        Self { device, params }
    }

    /// Handle the bytes of a single read.
    ///
    /// Every outcome is logged here; nothing is fatal to the connection.
    pub fn handle_frame(&self, frame: &[u8]) -> Vec<Result<ControlMessage, ControlError>> {
        let outcomes = match frame.strip_suffix(b"\n") {
            Some(body) => String::from_utf8_lossy(body)
                .split('\n')
                .map(|line| line.trim_end_matches('\r'))
                .filter(|line| !line.is_empty())
                .map(|line| ControlMessage::parse(line).and_then(|msg| self.apply(msg)))
                .collect(),
            None => vec![Err(ControlError::Unparseable(
                String::from_utf8_lossy(frame).into_owned(),
            ))],
        };

        for outcome in &outcomes {
            match outcome {
                Ok(msg) => tracing::info!("Control: set {}", msg),
                Err(e) => tracing::warn!("Control: {}", e),
            }
        }
        outcomes
    }

    /// Invoke the matching device setter and record the new value
    pub fn apply(&self, msg: ControlMessage) -> Result<ControlMessage, ControlError> {
        let rejected = |source| ControlError::Rejected {
            key: msg.key().to_string(),
            source,
        };

        match msg {
            ControlMessage::SampleRate(rate) => {
                self.device.set_sample_rate(rate).map_err(rejected)?;
                self.params.set_sample_rate(rate);
            }
            ControlMessage::CenterFrequency(frequency) => {
                self.device.set_center_frequency(frequency).map_err(rejected)?;
                self.params.set_center_frequency(frequency);
            }
            ControlMessage::Ppm(ppm) => {
                self.device.set_ppm(ppm).map_err(rejected)?;
                self.params.set_ppm(ppm);
            }
            ControlMessage::RfGain(gain) => {
                self.device.set_gain(gain).map_err(rejected)?;
                self.params.set_gain(gain);
            }
            ControlMessage::IqSwap(swap) => self.params.set_iq_swap(swap),
        }
        Ok(msg)
    }
}

/// Single-connection control listener
pub struct ControlServer {
    listener: TcpListener,
}

impl ControlServer {
    pub fn bind(addr: SocketAddr) -> Result<Self, NetworkError> {
        let listener = create_listener(addr, 1)?;
        tracing::info!("Control socket started on {}", listener.local_addr().unwrap_or(addr));
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.listener.local_addr().map_err(NetworkError::AcceptFailed)
    }

    /// Serve connections one after another, forever
    pub fn run(&self, handler: &ControlHandler) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    tracing::info!("Control connection established from {}", peer);
                    serve(stream, handler);
                    tracing::info!("Control connection ended");
                }
                Err(e) => tracing::warn!("Accept on control socket failed: {}", e),
            }
        }
    }

    /// Run the accept loop on its own thread
    pub fn spawn(self, handler: ControlHandler) -> Result<JoinHandle<()>, NetworkError> {
        thread::Builder::new()
            .name("control".to_string())
            .spawn(move || self.run(&handler))
            .map_err(NetworkError::SpawnFailed)
    }
}

/// Read frames from one connection until it closes or errors
pub fn serve<R: Read>(mut conn: R, handler: &ControlHandler) {
    let mut buf = [0u8; CONTROL_READ_SIZE];
    loop {
        match conn.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                handler.handle_frame(&buf[..n]);
            }
            Err(e) => {
                tracing::debug!("Control read failed: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::{Call, RecordingDevice};
    use crate::error::DeviceOp;
    use std::io::{self, Write};
    use std::net::TcpStream;
    use std::time::{Duration, Instant};

    fn handler() -> (Arc<RecordingDevice>, Arc<DeviceParameters>, ControlHandler) {
        let device = Arc::new(RecordingDevice::new());
        let params = Arc::new(DeviceParameters::new(145_000_000, 2_400_000, Gain::Auto, 0, false));
        let handler = ControlHandler::new(device.clone(), params.clone());
        (device, params, handler)
    }

    /// Yields each configured read, like a socket delivering segments
    struct Reads(Vec<Vec<u8>>);

    impl Read for Reads {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() {
                return Ok(0);
            }
            let next = self.0.remove(0);
            buf[..next.len()].copy_from_slice(&next);
            Ok(next.len())
        }
    }

    #[test]
    fn test_parse_keys() {
        assert_eq!(
            ControlMessage::parse("samp_rate:2048000"),
            Ok(ControlMessage::SampleRate(2_048_000))
        );
        assert_eq!(
            ControlMessage::parse("center_freq:100000000"),
            Ok(ControlMessage::CenterFrequency(100_000_000))
        );
        assert_eq!(ControlMessage::parse("ppm:-12"), Ok(ControlMessage::Ppm(-12)));
        assert_eq!(
            ControlMessage::parse("rf_gain:49.6"),
            Ok(ControlMessage::RfGain(Gain::Manual(496)))
        );
        assert_eq!(
            ControlMessage::parse("rf_gain:auto"),
            Ok(ControlMessage::RfGain(Gain::Auto))
        );
        assert_eq!(ControlMessage::parse("iqswap:on"), Ok(ControlMessage::IqSwap(true)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            ControlMessage::parse("bogus:1"),
            Err(ControlError::UnknownKey("bogus".to_string()))
        );
        assert!(matches!(
            ControlMessage::parse("samp_rate:fast"),
            Err(ControlError::InvalidValue { .. })
        ));
        assert!(matches!(
            ControlMessage::parse("samp_rate:-1"),
            Err(ControlError::InvalidValue { .. })
        ));
        // Only the first ':' splits; the rest belongs to the value
        assert_eq!(
            ControlMessage::parse("samp_rate:2048000:x"),
            Err(ControlError::InvalidValue {
                key: "samp_rate".to_string(),
                value: "2048000:x".to_string(),
            })
        );
        assert!(matches!(
            ControlMessage::parse("no separator"),
            Err(ControlError::Unparseable(_))
        ));
    }

    #[test]
    fn test_sample_rate_calls_setter_once() {
        let (device, params, handler) = handler();
        let outcomes = handler.handle_frame(b"samp_rate:2048000\n");

        assert_eq!(outcomes, vec![Ok(ControlMessage::SampleRate(2_048_000))]);
        assert_eq!(device.calls(), vec![Call::SampleRate(2_048_000)]);
        assert_eq!(params.sample_rate(), 2_048_000);
    }

    #[test]
    fn test_unknown_key_calls_nothing() {
        let (device, _, handler) = handler();
        let outcomes = handler.handle_frame(b"bogus:1\n");

        assert_eq!(outcomes, vec![Err(ControlError::UnknownKey("bogus".to_string()))]);
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_trailing_field_rejects_whole_command() {
        let (device, params, handler) = handler();
        let outcomes = handler.handle_frame(b"samp_rate:2048000:x\n");

        assert!(matches!(outcomes.as_slice(), [Err(ControlError::InvalidValue { .. })]));
        assert!(device.calls().is_empty());
        assert_eq!(params.sample_rate(), 2_400_000);
    }

    #[test]
    fn test_missing_newline_discarded() {
        let (device, params, handler) = handler();
        let outcomes = handler.handle_frame(b"center_freq:100000000");

        assert!(matches!(outcomes.as_slice(), [Err(ControlError::Unparseable(_))]));
        assert!(device.calls().is_empty());
        assert_eq!(params.center_frequency(), 145_000_000);
    }

    #[test]
    fn test_rf_gain_scaled_to_tenths() {
        let (device, params, handler) = handler();
        handler.handle_frame(b"rf_gain:29.7\n");

        assert_eq!(device.calls(), vec![Call::Gain(Gain::Manual(297))]);
        assert_eq!(params.gain(), Gain::Manual(297));
    }

    #[test]
    fn test_several_lines_in_one_read() {
        let (device, _, handler) = handler();
        handler.handle_frame(b"center_freq:433920000\r\nppm:3\n");

        assert_eq!(
            device.calls(),
            vec![Call::CenterFrequency(433_920_000), Call::Ppm(3)]
        );
    }

    #[test]
    fn test_setter_failure_keeps_previous_value() {
        let (device, params, handler) = handler();
        device.fail_on(DeviceOp::Ppm);

        let outcomes = handler.handle_frame(b"ppm:5\n");
        assert!(matches!(outcomes.as_slice(), [Err(ControlError::Rejected { .. })]));
        assert_eq!(params.ppm(), 0);

        // Connection stays usable
        handler.handle_frame(b"samp_rate:1024000\n");
        assert_eq!(device.calls(), vec![Call::SampleRate(1_024_000)]);
    }

    #[test]
    fn test_iqswap_updates_parameters_only() {
        let (device, params, handler) = handler();
        handler.handle_frame(b"iqswap:true\n");
        assert!(params.iq_swap());
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_split_command_is_not_reassembled() {
        let (device, _, handler) = handler();
        let conn = Reads(vec![b"samp_ra".to_vec(), b"te:1024000\n".to_vec()]);
        serve(conn, &handler);

        // First read lacks a newline, second has an unknown key
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_serve_reads_until_close() {
        let (device, _, handler) = handler();
        let conn = Reads(vec![
            b"center_freq:100000000\n".to_vec(),
            b"bogus:1\n".to_vec(),
            b"ppm:-1\n".to_vec(),
        ]);
        serve(conn, &handler);

        assert_eq!(device.calls(), vec![Call::CenterFrequency(100_000_000), Call::Ppm(-1)]);
    }

    #[test]
    fn test_control_server_over_tcp() {
        let (_, params, handler) = handler();
        let server = ControlServer::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = server.local_addr().unwrap();
        server.spawn(handler).unwrap();

        // Two consecutive connections: the loop resumes after the first ends
        for rate in [1_000_000u32, 2_000_000] {
            let mut conn = TcpStream::connect(addr).unwrap();
            conn.write_all(format!("samp_rate:{rate}\n").as_bytes()).unwrap();
            drop(conn);

            let deadline = Instant::now() + Duration::from_secs(5);
            while params.sample_rate() != rate && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            assert_eq!(params.sample_rate(), rate);
        }
    }
}
