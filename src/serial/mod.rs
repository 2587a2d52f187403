//! # Serial Communication Module
//!
//! Handles the serial link to the sensor board.
//!
//! This module handles:
//! - Opening the serial port at the configured baud rate (8N1)
//! - Reading the newest newline-terminated frame with a bounded wait
//! - Reopening the port after the board is unplugged or resets
//! - Decoding frame bytes to text

pub mod port_trait;

pub use port_trait::{DeviceTransport, LineReader};

use async_trait::async_trait;
use std::time::Duration;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::error::{Result, UplinkError};

/// Serial link to the sensor board
///
/// A read error or end of stream drops the port; the next read reopens it.
pub struct SerialDevice {
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
    baud_rate: u32,
    /// `None` after a failure, until the port is reopened
    reader: Option<LineReader<tokio_serial::SerialStream>>,
}

impl std::fmt::Debug for SerialDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialDevice")
            .field("device_path", &self.device_path)
            .field("baud_rate", &self.baud_rate)
            .field("connected", &self.reader.is_some())
            .finish_non_exhaustive()
    }
}

impl SerialDevice {
    /// Open the configured serial port
    ///
    /// Failing here is fatal for the application: the scheduler is never
    /// started without a device.
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sensor_uplink::config::DeviceConfig;
    /// use sensor_uplink::serial::SerialDevice;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let config = DeviceConfig {
    ///         port: "/dev/ttyUSB0".to_string(),
    ///         baud_rate: 9600,
    ///         read_timeout_ms: 1000,
    ///     };
    ///     let device = SerialDevice::open(&config)?;
    ///     println!("Connected to: {}", device.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(config: &DeviceConfig) -> Result<Self> {
        let port = Self::open_port(&config.port, config.baud_rate)?;
        info!("Opened sensor board at {} ({} baud)", config.port, config.baud_rate);

        Ok(Self {
            device_path: config.port.clone(),
            baud_rate: config.baud_rate,
            reader: Some(LineReader::new(port)),
        })
    }

    /// Open a specific serial port with 8N1 settings
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| UplinkError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl DeviceTransport for SerialDevice {
    async fn read_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut reader = match self.reader.take() {
            Some(reader) => reader,
            None => {
                debug!("Reopening serial port: {}", self.device_path);
                let port = Self::open_port(&self.device_path, self.baud_rate)?;
                info!("Reopened sensor board at {}", self.device_path);
                LineReader::new(port)
            }
        };

        match reader.read_latest(timeout).await {
            Err(e) => {
                warn!("Serial link to {} lost: {}", self.device_path, e);
                Err(e)
            }
            ok => {
                self.reader = Some(reader);
                ok
            }
        }
    }
}

/// Decode a raw frame to text, trimming surrounding whitespace
///
/// # Errors
///
/// Returns error if the bytes are not valid UTF-8
pub fn decode_line(bytes: Vec<u8>) -> Result<String> {
    let text = String::from_utf8(bytes)?;
    Ok(text.trim().to_string())
}
