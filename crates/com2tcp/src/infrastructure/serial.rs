//! Serial port endpoint.
//!
//! Opens the device with `tokio-serial` and exposes it as a bidirectional
//! [`Endpoint`].  The serial line itself never signals end-of-stream; a read
//! only ends the bridge when the device disappears (I/O error) or the endpoint
//! is closed.

use async_trait::async_trait;
use tokio_serial::SerialStream;
use tracing::{debug, info};

use bridge_core::{
    Configurable, Endpoint, EndpointError, EndpointKind, EndpointState, Lifecycle, ReadOutcome,
};

use super::duplex::DuplexHalves;
use crate::domain::{FlowControl, Parity, SerialSettings};

/// A serial device bridged as a byte stream.
pub struct SerialEndpoint {
    name: String,
    settings: Option<SerialSettings>,
    lifecycle: Lifecycle,
    io: DuplexHalves<SerialStream>,
}

impl SerialEndpoint {
    /// Creates an unconfigured endpoint.  Call [`Configurable::setup`] before
    /// opening it.
    pub fn new() -> Self {
        Self {
            name: "serial".to_string(),
            settings: None,
            lifecycle: Lifecycle::default(),
            io: DuplexHalves::new(),
        }
    }
}

impl Default for SerialEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

fn to_parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    }
}

fn to_flow_control(flow: FlowControl) -> tokio_serial::FlowControl {
    match flow {
        FlowControl::None => tokio_serial::FlowControl::None,
        FlowControl::Software => tokio_serial::FlowControl::Software,
        FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
    }
}

fn to_data_bits(bits: u8) -> tokio_serial::DataBits {
    match bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    }
}

fn to_stop_bits(bits: u8) -> tokio_serial::StopBits {
    match bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    }
}

impl Configurable for SerialEndpoint {
    type Config = SerialSettings;

    fn setup(&mut self, config: SerialSettings) -> Result<(), EndpointError> {
        config
            .check()
            .map_err(|e| EndpointError::configuration(&self.name, e.to_string()))?;
        self.lifecycle.configure(&self.name)?;
        self.name = format!("serial:{}", config.device);
        debug!(endpoint = %self.name, baud_rate = config.baud_rate, "serial endpoint configured");
        self.settings = Some(config);
        Ok(())
    }
}

#[async_trait]
impl Endpoint for SerialEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EndpointKind {
        EndpointKind::Bidirectional
    }

    fn state(&self) -> EndpointState {
        self.lifecycle.get()
    }

    async fn open(&self) -> Result<(), EndpointError> {
        if !self.lifecycle.begin_open(&self.name)? {
            return Ok(());
        }
        let Some(settings) = self.settings.as_ref() else {
            return Err(EndpointError::configuration(
                &self.name,
                "setup() has not been called",
            ));
        };

        let builder = tokio_serial::new(settings.device.as_str(), settings.baud_rate)
            .data_bits(to_data_bits(settings.data_bits))
            .parity(to_parity(settings.parity))
            .stop_bits(to_stop_bits(settings.stop_bits))
            .flow_control(to_flow_control(settings.flow_control));

        let stream = SerialStream::open(&builder)
            .map_err(|e| EndpointError::connection(&self.name, e.into()))?;

        self.io.install(stream).await;
        if !self.lifecycle.mark_open() {
            // Closed while the device was being opened.
            let _ = self.io.shutdown().await;
            return Err(EndpointError::closed(&self.name));
        }
        info!(endpoint = %self.name, baud_rate = settings.baud_rate, "serial port opened");
        Ok(())
    }

    async fn read_chunk(&self, buf: &mut [u8]) -> Result<ReadOutcome, EndpointError> {
        self.io.read(&self.name, &self.lifecycle, buf).await
    }

    async fn write_chunk(&self, bytes: &[u8]) -> Result<(), EndpointError> {
        self.io.write(&self.name, &self.lifecycle, bytes).await
    }

    async fn close(&self) -> Result<(), EndpointError> {
        if !self.lifecycle.mark_closed() {
            return Ok(());
        }
        self.io
            .shutdown()
            .await
            .map_err(|e| EndpointError::io(&self.name, e))?;
        debug!(endpoint = %self.name, "serial port released");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
