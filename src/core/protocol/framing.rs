//! Mixed RTCM3 / ASCII stream reassembly
//!
//! A GNSS receiver interleaves binary RTCM3 frames (start byte `0xD3`) with
//! ASCII lines (`$...` NMEA sentences and command replies, `#...` reports).
//! [`FrameReassembler`] is a byte-at-a-time state machine that splits such a
//! stream back into lines and CRC-checked frames, carrying partial frames
//! across read boundaries.

use std::collections::VecDeque;

use bytes::Bytes;
use thiserror::Error;

use super::checksum::hex_dump;
use super::rtcm::{self, RtcmFrame, HEADER_LEN, MAX_FRAME_LEN, PREAMBLE};
use crate::core::logger::Logger;

/// Longest ASCII line accepted, including the leading marker
pub const MAX_LINE_LEN: usize = 254;

/// Capacity of the diagnostic skip buffer
pub const SKIP_BUFFER_LEN: usize = MAX_FRAME_LEN;

/// Current mode of the reassembler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildState {
    /// Waiting for a frame start marker
    #[default]
    Idle,
    /// Collecting an RTCM3 frame
    BuildingBinary,
    /// Collecting an ASCII line
    BuildingAscii,
}

/// Reasons a frame under construction is abandoned
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Byte outside 32..=126 inside an ASCII line
    #[error("Non-ASCII byte {byte:02X} after {len} bytes")]
    NonAscii {
        /// Offending byte
        byte: u8,
        /// Bytes collected before it
        len: usize,
    },

    /// ASCII line longer than [`MAX_LINE_LEN`]
    #[error("ASCII line overflowing at {len} bytes")]
    LineTooLong {
        /// Bytes collected
        len: usize,
    },

    /// Reserved header bits are not zero
    #[error("Binary length prefix too big {reserved:02X}")]
    ReservedBits {
        /// Value of bits 8-13
        reserved: u32,
    },

    /// Declared frame length out of range
    #[error("Binary length too big {len}")]
    InvalidLength {
        /// Declared total length
        len: usize,
    },

    /// Frame buffer reached its bound
    #[error("Buffer overflow {len}")]
    Overflow {
        /// Bytes collected
        len: usize,
    },

    /// CRC-24Q parity mismatch
    #[error("Checksum {message_type} ({provided:06x} != {calculated:06x}) [{len}]")]
    Checksum {
        /// Message type read from the (corrupt) frame
        message_type: u16,
        /// Parity carried by the frame
        provided: u32,
        /// Parity computed over the frame
        calculated: u32,
        /// Frame length
        len: usize,
    },
}

/// Result of feeding one byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteOutcome {
    /// Byte consumed, nothing complete yet
    Continue,
    /// Complete ASCII line, marker included, terminators stripped
    Line(String),
    /// Complete CRC-valid binary frame
    Frame(RtcmFrame),
    /// Frame abandoned; state is back to idle
    Error(FrameError),
}

/// Bounded byte buffer for the frame under construction
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl FrameBuffer {
    /// Create buffer holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append one byte. Fails when the buffer is full.
    pub fn push(&mut self, byte: u8) -> Result<(), usize> {
        if self.data.len() >= self.capacity {
            return Err(self.data.len());
        }
        self.data.push(byte);
        Ok(())
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when nothing has been written
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Maximum size
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// View contents
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Discard contents
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Move contents out, leaving the buffer empty
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.data, Vec::with_capacity(self.capacity))
    }
}

/// Byte-at-a-time reassembler for mixed RTCM3 / ASCII streams
#[derive(Debug)]
pub struct FrameReassembler {
    state: BuildState,
    buffer: FrameBuffer,
    /// Total frame length once the binary header has been read
    expected_len: Option<usize>,
    /// Idle bytes that did not start a frame
    skipped: Vec<u8>,
    /// Record of the last aborted frame, failing byte included
    aborted: Vec<u8>,
    /// Bytes dropped since the last call to `take_discarded`
    discarded: usize,
    logger: Logger,
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new(Logger::discard())
    }
}

impl FrameReassembler {
    /// Create reassembler in the idle state
    pub fn new(logger: Logger) -> Self {
        Self {
            state: BuildState::Idle,
            buffer: FrameBuffer::new(MAX_FRAME_LEN),
            expected_len: None,
            skipped: Vec::with_capacity(SKIP_BUFFER_LEN),
            aborted: Vec::new(),
            discarded: 0,
            logger,
        }
    }

    /// Current build state
    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Bytes held for the frame under construction
    pub fn pending(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Bytes dropped (skipped while idle, or abandoned frame markers) since the last call
    pub fn take_discarded(&mut self) -> usize {
        std::mem::take(&mut self.discarded)
    }

    /// Feed a chunk of received bytes.
    ///
    /// `on_outcome` is called for every completed line, completed frame and
    /// error, in stream order. After an error the abandoned frame's bytes
    /// (everything after its start marker) are fed again ahead of the rest of
    /// the chunk, so a frame start hidden inside a corrupt frame is not lost.
    /// A partial frame at the end of the chunk stays buffered for the next call.
    pub fn push<F>(&mut self, chunk: &[u8], mut on_outcome: F)
    where
        F: FnMut(ByteOutcome),
    {
        let mut replay: VecDeque<u8> = VecDeque::new();
        let mut input = chunk.iter().copied();

        while let Some(byte) = replay.pop_front().or_else(|| input.next()) {
            let outcome = self.process_byte(byte);
            if matches!(outcome, ByteOutcome::Error(_)) {
                let aborted = std::mem::take(&mut self.aborted);
                self.logger
                    .debug(format!("Rescan {} : {}", aborted.len(), hex_dump(&aborted)));
                for &b in aborted.iter().skip(1).rev() {
                    replay.push_front(b);
                }
                self.discarded += 1;
            }
            if outcome != ByteOutcome::Continue {
                on_outcome(outcome);
            }
        }
    }

    /// Feed a chunk and collect all outcomes
    pub fn push_collect(&mut self, chunk: &[u8]) -> Vec<ByteOutcome> {
        let mut outcomes = Vec::new();
        self.push(chunk, |outcome| outcomes.push(outcome));
        outcomes
    }

    /// Process a single byte.
    ///
    /// On [`ByteOutcome::Error`] the abandoned bytes are kept for the caller
    /// to rescan; [`FrameReassembler::push`] does that automatically.
    pub fn process_byte(&mut self, byte: u8) -> ByteOutcome {
        match self.state {
            BuildState::Idle => self.idle_byte(byte),
            BuildState::BuildingBinary => self.binary_byte(byte),
            BuildState::BuildingAscii => self.ascii_byte(byte),
        }
    }

    /// Abandon any partial frame and drop skipped bytes
    pub fn reset(&mut self) {
        self.state = BuildState::Idle;
        self.buffer.reset();
        self.expected_len = None;
        self.skipped.clear();
        self.aborted.clear();
    }

    fn idle_byte(&mut self, byte: u8) -> ByteOutcome {
        match byte {
            b'$' | b'#' => {
                self.start_frame(byte, BuildState::BuildingAscii);
            }
            PREAMBLE => {
                self.start_frame(byte, BuildState::BuildingBinary);
            }
            _ => self.add_to_skipped(byte),
        }
        ByteOutcome::Continue
    }

    fn start_frame(&mut self, marker: u8, state: BuildState) {
        self.dump_skipped();
        self.buffer.reset();
        self.expected_len = None;
        // Empty buffer always has room for the marker
        let _ = self.buffer.push(marker);
        self.state = state;
    }

    fn add_to_skipped(&mut self, byte: u8) {
        if self.skipped.len() >= SKIP_BUFFER_LEN {
            self.logger.debug("Skip buffer overflowed");
            self.skipped.clear();
        }
        self.skipped.push(byte);
        self.discarded += 1;
    }

    fn dump_skipped(&mut self) {
        if !self.skipped.is_empty() {
            self.logger.debug(format!(
                "Skipped {} : {}",
                self.skipped.len(),
                hex_dump(&self.skipped)
            ));
            self.skipped.clear();
        }
    }

    fn binary_byte(&mut self, byte: u8) -> ByteOutcome {
        if let Err(len) = self.buffer.push(byte) {
            return self.abort(FrameError::Overflow { len }, Some(byte));
        }
        let len = self.buffer.len();

        let Some(total) = self.expected_len else {
            if len < HEADER_LEN {
                return ByteOutcome::Continue;
            }
            let header = self.buffer.as_slice();
            let reserved = rtcm::reserved_bits(header);
            if reserved != 0 {
                return self.abort(FrameError::ReservedBits { reserved }, None);
            }
            let total = rtcm::payload_len(header) + rtcm::FRAME_OVERHEAD;
            if total == 0 || total >= MAX_FRAME_LEN {
                return self.abort(FrameError::InvalidLength { len: total }, None);
            }
            self.expected_len = Some(total);
            return ByteOutcome::Continue;
        };

        if len >= MAX_FRAME_LEN {
            return self.abort(FrameError::Overflow { len }, None);
        }
        if len < total {
            return ByteOutcome::Continue;
        }

        let frame = self.buffer.as_slice();
        let provided = rtcm::parity(frame);
        let calculated = rtcm::calculated_parity(frame);
        if provided != calculated {
            let error = FrameError::Checksum {
                message_type: rtcm::message_type(frame),
                provided,
                calculated,
                len,
            };
            return self.abort(error, None);
        }

        let bytes = Bytes::from(self.buffer.take());
        self.finish();
        ByteOutcome::Frame(RtcmFrame::new(bytes))
    }

    fn ascii_byte(&mut self, byte: u8) -> ByteOutcome {
        match byte {
            b'\r' => ByteOutcome::Continue,
            b'\n' => {
                let line: String = self.buffer.as_slice().iter().map(|&b| char::from(b)).collect();
                self.buffer.reset();
                self.finish();
                ByteOutcome::Line(line)
            }
            _ if self.buffer.len() > MAX_LINE_LEN => {
                let len = self.buffer.len();
                self.abort(FrameError::LineTooLong { len }, Some(byte))
            }
            _ => {
                let len = self.buffer.len();
                // Line bound is far below the buffer bound
                let _ = self.buffer.push(byte);
                if (32..=126).contains(&byte) {
                    ByteOutcome::Continue
                } else {
                    self.abort(FrameError::NonAscii { byte, len }, None)
                }
            }
        }
    }

    /// Drop the frame under construction, keeping its bytes for a rescan.
    /// `unstored` is the failing byte when it never made it into the buffer.
    fn abort(&mut self, error: FrameError, unstored: Option<u8>) -> ByteOutcome {
        self.aborted = self.buffer.take();
        self.aborted.extend(unstored);
        self.finish();
        ByteOutcome::Error(error)
    }

    fn finish(&mut self) {
        self.state = BuildState::Idle;
        self.expected_len = None;
    }
}
