//! Startup and wiring
//!
//! [`Connector::start`] performs every fallible startup step in order and
//! maps each failure to its own [`StartupError`]. [`Connector::run`] then
//! starts the producer and control threads and serves stream clients on the
//! calling thread until the process ends.
//!
//! With an rtl_tcp port configured the producer feeds a second ring of
//! unsigned 8-bit samples, served by its own listener next to the main one.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use crate::codec::WireFormat;
use crate::config::ConnectorConfig;
use crate::constants::RING_BUFFER_CHUNKS;
use crate::device::{resolve_device, Device, DeviceParameters};
use crate::error::{Error, StartupError};
use crate::iq::{Producer, RingBuffer, SharedRingBuffer};
use crate::network::{ControlHandler, ControlServer, StreamServer};

/// Everything that lives for the whole process
pub struct Connector {
    config: ConnectorConfig,
    device: Arc<dyn Device>,
    params: Arc<DeviceParameters>,
    ring: SharedRingBuffer,
    stream: StreamServer,
    /// u8 ring and its listener, when an rtl_tcp port is configured
    rtltcp: Option<(SharedRingBuffer, StreamServer)>,
    control: Option<ControlServer>,
}

impl Connector {
    /// Find the configured device and bring everything up
    pub fn start(config: ConnectorConfig) -> Result<Self, StartupError> {
        config.validate().map_err(StartupError::Config)?;

        let devices = config.driver.enumerate().map_err(|e| {
            tracing::error!("Device enumeration failed: {}", e);
            StartupError::DeviceNotFound(config.device.clone())
        })?;
        tracing::info!("Found {} {} device(s)", devices.len(), config.driver);

        let info = resolve_device(&config.device, &devices)
            .ok_or_else(|| StartupError::DeviceNotFound(config.device.clone()))?;
        tracing::info!("Using device {}: {} (SN {})", info.index, info.name, info.serial);

        let device = config.driver.create(info).map_err(StartupError::Open)?;
        Self::with_device(config, device)
    }

    /// Bring up an already created device
    pub fn with_device(config: ConnectorConfig, device: Arc<dyn Device>) -> Result<Self, StartupError> {
        config.validate().map_err(StartupError::Config)?;

        let chunk_values = device.get_buffer_size();
        let ring = Arc::new(RingBuffer::new(
            chunk_values * config.wire_format.value_size(),
            RING_BUFFER_CHUNKS,
        ));

        device.open().map_err(StartupError::Open)?;
        device
            .set_sample_rate(config.sample_rate)
            .map_err(StartupError::SampleRate)?;
        device
            .set_center_frequency(config.center_frequency)
            .map_err(StartupError::CenterFrequency)?;
        device.set_gain(config.gain).map_err(StartupError::from_gain)?;
        if config.ppm != 0 {
            device.set_ppm(config.ppm).map_err(StartupError::Ppm)?;
        }
        if let Err(e) = device.reset_buffer() {
            tracing::warn!("Failed to reset buffers: {}", e);
        }

        tracing::info!(
            "Tuned {} to {} Hz at {} S/s, gain {}, ppm {}",
            device.name(),
            config.center_frequency,
            config.sample_rate,
            config.gain,
            config.ppm
        );

        let params = Arc::new(DeviceParameters::new(
            config.center_frequency,
            config.sample_rate,
            config.gain,
            config.ppm,
            config.iq_swap,
        ));

        let stream =
            StreamServer::bind(config.stream_addr(), ring.clone()).map_err(StartupError::Bind)?;
        let rtltcp = config
            .rtltcp_addr()
            .map(|addr| {
                let ring = Arc::new(RingBuffer::new(
                    chunk_values * WireFormat::U8.value_size(),
                    RING_BUFFER_CHUNKS,
                ));
                StreamServer::bind(addr, ring.clone()).map(|server| (ring, server))
            })
            .transpose()
            .map_err(StartupError::Bind)?;
        let control = config
            .control_addr()
            .map(ControlServer::bind)
            .transpose()
            .map_err(StartupError::Bind)?;

        Ok(Self {
            config,
            device,
            params,
            ring,
            stream,
            rtltcp,
            control,
        })
    }

    /// Live parameters shared with the control channel
    pub fn parameters(&self) -> Arc<DeviceParameters> {
        self.params.clone()
    }

    pub fn stream_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.stream.local_addr()?)
    }

    pub fn rtltcp_addr(&self) -> Option<Result<SocketAddr, Error>> {
        self.rtltcp
            .as_ref()
            .map(|(_, server)| server.local_addr().map_err(Error::from))
    }

    pub fn control_addr(&self) -> Option<Result<SocketAddr, Error>> {
        self.control
            .as_ref()
            .map(|control| control.local_addr().map_err(Error::from))
    }

    /// Start the producer, rtl_tcp and control threads, then accept stream
    /// clients on this thread. Only returns if a worker thread cannot be
    /// started.
    pub fn run(self) -> Result<(), Error> {
        let mut producer = Producer::new(self.params.clone(), self.device.native_format())
            .with_output(self.ring.clone(), self.config.wire_format);
        if let Some((ring, _)) = &self.rtltcp {
            producer = producer.with_output(ring.clone(), WireFormat::U8);
        }
        producer.spawn(self.device.clone())?;
        tracing::info!(
            "IQ producer started ({} -> {}, ring {} bytes)",
            self.device.native_format(),
            self.config.wire_format,
            self.ring.capacity()
        );

        if let Some((_, server)) = self.rtltcp {
            thread::Builder::new()
                .name("rtltcp-accept".to_string())
                .spawn(move || server.run())?;
        }

        if let Some(control) = self.control {
            let handler = ControlHandler::new(self.device.clone(), self.params.clone());
            control.spawn(handler)?;
        }

        tracing::info!("Socket setup complete, waiting for connections");
        self.stream.run();
        Ok(())
    }
}
