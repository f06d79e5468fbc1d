//! Transport layer
//!
//! The core only ever writes to the receiver through [`ByteSink`]; reading is
//! left to the host loop, which hands chunks to the stream driver.
//!
//! Supports:
//! - Serial ports (USB-Serial receivers)
//! - In-memory recording sink for offline replay and tests

mod serial;

pub use serial::{list_ports, PortInfo, SerialConfig, SerialSink, SerialTransport};

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Disconnected
    #[error("Disconnected")]
    Disconnected,
}

/// Destination for bytes sent to the receiver
#[cfg_attr(test, mockall::automock)]
pub trait ByteSink: Send {
    /// Write all of `data`, flushing it to the device
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;
}

/// Sink that keeps every write in memory
///
/// Clones share the same record, so a copy can be kept for inspection after
/// the sink itself is boxed into a command queue.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingSink {
    /// Create empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All writes so far, oldest first
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    /// Writes decoded as text
    pub fn lines(&self) -> Vec<String> {
        self.writes
            .lock()
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    /// Forget recorded writes
    pub fn clear(&self) {
        self.writes.lock().clear();
    }
}

impl ByteSink for RecordingSink {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.writes.lock().push(data.to_vec());
        Ok(())
    }
}
