//! Serial port transport implementation

use std::io::{Read, Write};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};

use super::{ByteSink, TransportError};

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout; a read that times out yields an empty chunk
    pub read_timeout_ms: u64,
}

impl SerialConfig {
    /// Create a new serial configuration with default settings
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            read_timeout_ms: 100,
        }
    }

    /// Set read timeout
    #[must_use]
    pub fn read_timeout_ms(mut self, timeout: u64) -> Self {
        self.read_timeout_ms = timeout;
        self
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("COM1", 115_200)
    }
}

/// Open serial port (8N1, no flow control)
pub struct SerialTransport {
    config: SerialConfig,
    port: Box<dyn SerialPort>,
    buffer: Vec<u8>,
}

impl SerialTransport {
    /// Open the configured port
    pub fn open(config: SerialConfig) -> Result<Self, TransportError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(config.port.clone()),
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(config.port.clone())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            })?;

        Ok(Self {
            config,
            port,
            buffer: vec![0u8; 4096],
        })
    }

    /// Read whatever is available. An empty chunk means the read timed out.
    pub fn receive(&mut self) -> Result<Bytes, TransportError> {
        match self.port.read(&mut self.buffer) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => Ok(Bytes::copy_from_slice(&self.buffer[..n])),
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Bytes::new()),
            Err(e) => Err(TransportError::IoError(e)),
        }
    }

    /// Second handle on the same port for writing commands
    pub fn sink(&self) -> Result<SerialSink, TransportError> {
        let port = self
            .port
            .try_clone()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok(SerialSink { port })
    }

    /// Get connection info string
    pub fn connection_info(&self) -> String {
        format!("{} @ {} baud (8N1)", self.config.port, self.config.baud_rate)
    }
}

/// Write half of a [`SerialTransport`]
pub struct SerialSink {
    port: Box<dyn SerialPort>,
}

impl ByteSink for SerialSink {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }
}

/// Serial port as reported by the OS
#[derive(Debug, Clone, Serialize)]
pub struct PortInfo {
    /// Port name
    pub name: String,
    /// Port kind (USB, PCI, Bluetooth, Unknown)
    pub kind: String,
    /// USB product string when known
    pub description: Option<String>,
}

/// Enumerate serial ports
pub fn list_ports() -> Result<Vec<PortInfo>, TransportError> {
    let ports = serialport::available_ports()
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (kind, description) = match p.port_type {
                SerialPortType::UsbPort(info) => ("USB", info.product),
                SerialPortType::PciPort => ("PCI", None),
                SerialPortType::BluetoothPort => ("Bluetooth", None),
                SerialPortType::Unknown => ("Unknown", None),
            };
            PortInfo {
                name: p.port_name,
                kind: kind.to_string(),
                description,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = SerialConfig::new("/dev/ttyUSB0", 460_800).read_timeout_ms(20);
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 460_800);
        assert_eq!(config.read_timeout_ms, 20);
        assert_eq!(SerialConfig::default().baud_rate, 115_200);
    }
}
