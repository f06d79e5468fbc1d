//! Protocol implementations
//!
//! Wire-level handling of what a GNSS receiver emits and accepts:
//! - Checksum algorithms (XOR, CRC-24Q, Unicore CRC-32)
//! - RTCM3 transport framing
//! - Mixed binary/ASCII stream reassembly
//! - NMEA GGA fix sentences

pub mod checksum;
pub mod framing;
pub mod nmea;
pub mod rtcm;

pub use checksum::{frame_command, verify_line, ChecksumScope, ChecksumType, LineChecksumError};
pub use framing::{BuildState, ByteOutcome, FrameError, FrameReassembler};
pub use nmea::{parse_gga, GgaFix};
pub use rtcm::RtcmFrame;
