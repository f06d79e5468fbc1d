//! Core module containing the relay pipeline
//!
//! This module provides:
//! - Stream reassembly of interleaved RTCM3 frames and ASCII lines
//! - Checksums (XOR, CRC-24Q, Unicore CRC-32)
//! - Receiver initialization handshake with per-family response rules
//! - Base position averaging from GGA fixes
//! - Frame fan-out to NTRIP casters
//! - Injected logging, clock and byte sink capabilities

pub mod bridge;
pub mod clock;
pub mod handshake;
pub mod location;
pub mod logger;
pub mod protocol;
pub mod session;
pub mod transport;
