//! Endpoint enumeration and opening
//!
//! `PortProvider` is the seam between the pipeline and the platform's serial
//! stack; tests plug in-memory streams in here.

use std::io::Read;
use std::thread;
use std::time::Duration;

use crate::config::ConnectorConfig;
use crate::error::{CResult, ConnectorError};

/// An open endpoint: a blocking byte stream.
pub type ByteStream = Box<dyn Read + Send>;

pub trait PortProvider: Send + Sync {
    /// Endpoints currently present. May be empty.
    fn available(&self) -> CResult<Vec<String>>;

    fn open(&self, endpoint: &str) -> CResult<ByteStream>;
}

/// Serial ports through the `serialport` crate, 8N1 at a fixed baud rate.
#[derive(Clone, Debug)]
pub struct SerialPorts {
    baud_rate: u32,
    timeout: Duration,
}

impl SerialPorts {
    pub fn new(baud_rate: u32, timeout: Duration) -> Self {
        SerialPorts { baud_rate, timeout }
    }

    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self::new(config.baud_rate, config.read_timeout())
    }
}

impl PortProvider for SerialPorts {
    fn available(&self) -> CResult<Vec<String>> {
        let ports = serialport::available_ports()
            .map_err(|e| ConnectorError::Enumeration(e.to_string()))?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(&self, endpoint: &str) -> CResult<ByteStream> {
        let port = serialport::new(endpoint, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.timeout)
            .open()
            .map_err(|e| ConnectorError::transport(endpoint, e))?;
        log::info!("Opened {} at {} baud (8N1)", endpoint, self.baud_rate);
        Ok(Box::new(port))
    }
}

/// List endpoints, waiting `retry` between polls until at least one exists.
///
/// Only a failure of the platform listing itself is an error; "none found"
/// just waits.
pub fn list_endpoints(provider: &dyn PortProvider, retry: Duration) -> CResult<Vec<String>> {
    let mut polls = 0u64;
    loop {
        let ports = provider.available()?;
        if !ports.is_empty() {
            return Ok(ports);
        }
        if polls == 0 {
            log::info!("No serial ports found, polling every {:?}", retry);
        }
        polls += 1;
        thread::sleep(retry);
    }
}
