//! # rtkrelay Core Library
//!
//! RTK base station relay for GNSS receivers that interleave binary RTCM3
//! corrections with ASCII NMEA sentences and command replies:
//! - Reframes the mixed stream and verifies every frame and line
//! - Drives receiver initialization (Quectel LC29H, Unicore UM980/UM982)
//! - Averages GGA fixes into a surveyed base position
//! - Pushes verified frames to NTRIP casters
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rtkrelay_core::{DriverTimings, Logger, SerialConfig, SerialTransport, StreamDriver, SystemClock, QUECTEL};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut port = SerialTransport::open(SerialConfig::new("/dev/ttyUSB0", 115_200))?;
//!     let mut driver = StreamDriver::new(
//!         &QUECTEL,
//!         Box::new(port.sink()?),
//!         Arc::new(SystemClock::new()),
//!         Logger::discard(),
//!         DriverTimings::default(),
//!     );
//!     driver.initialize()?;
//!     loop {
//!         let chunk = port.receive()?;
//!         driver.process_chunk(&chunk)?;
//!         driver.poll()?;
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ConfigError};
pub use crate::core::bridge::{CasterConfig, CasterRelay, FrameConsumer};
pub use crate::core::clock::{Clock, ManualClock, SystemClock};
pub use crate::core::handshake::{CommandQueue, DeviceFamily, DeviceIdentity, QUECTEL, UNICORE};
pub use crate::core::location::LocationAverager;
pub use crate::core::logger::{LogEntry, LogFormat, LogLevel, LogSink, Logger, SessionLogger};
pub use crate::core::protocol::{ByteOutcome, FrameReassembler, RtcmFrame};
pub use crate::core::session::{DriverTimings, StatusSnapshot, StreamDriver};
pub use crate::core::transport::{ByteSink, SerialConfig, SerialTransport, TransportError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
