//! RTCM3 transport layer
//!
//! ```text
//! +-------+--------+-----------+--------------------+----------+
//! |   D3  | 000000 |  length   |    data message    |  parity  |
//! +-------+--------+-----------+--------------------+----------+
//! |8 bits |6 bits  | 10 bits   | length x 8 bits    | 24 bits  |
//! +-------+--------+-----------+--------------------+----------+
//! ```
//!
//! Only the transport layer is understood here. Message payloads are not decoded
//! beyond the 12 bit message type.

use bytes::Bytes;

use super::checksum::crc24q;

/// Frame start byte
pub const PREAMBLE: u8 = 0xD3;

/// Upper bound on the assembled frame size, including header and parity
pub const MAX_FRAME_LEN: usize = 1200;

/// Header (3 bytes) plus parity (3 bytes)
pub const FRAME_OVERHEAD: usize = 6;

/// Bytes needed before the length field can be read
pub const HEADER_LEN: usize = 4;

/// Read `len` bits (at most 32) starting at bit offset `pos`.
///
/// Bit 0 is the most significant bit of `buf[0]`.
pub fn get_bits(buf: &[u8], pos: usize, len: usize) -> u32 {
    debug_assert!(len <= 32);
    (pos..pos + len).fold(0u32, |bits, i| {
        (bits << 1) | u32::from((buf[i / 8] >> (7 - i % 8)) & 1)
    })
}

/// Reserved bits 8-13, which must be zero
pub fn reserved_bits(header: &[u8]) -> u32 {
    get_bits(header, 8, 6)
}

/// Payload length, bits 14-23
pub fn payload_len(header: &[u8]) -> usize {
    get_bits(header, 14, 10) as usize
}

/// Message type, bits 24-35 (first 12 bits of the payload)
pub fn message_type(frame: &[u8]) -> u16 {
    get_bits(frame, 24, 12) as u16
}

/// Parity carried in the last three bytes of a complete frame
pub fn parity(frame: &[u8]) -> u32 {
    get_bits(frame, (frame.len() - 3) * 8, 24)
}

/// CRC-24Q over everything except the trailing parity
pub fn calculated_parity(frame: &[u8]) -> u32 {
    crc24q(&frame[..frame.len() - 3])
}

/// A complete, CRC-valid RTCM3 frame
///
/// Cloning shares the underlying bytes, so frames can be fanned out to any
/// number of consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcmFrame {
    /// 12 bit message number (1005, 1077, ...)
    pub message_type: u16,
    /// Raw frame including preamble and parity
    pub bytes: Bytes,
}

impl RtcmFrame {
    /// Wrap verified frame bytes
    pub fn new(bytes: Bytes) -> Self {
        Self {
            message_type: message_type(&bytes),
            bytes,
        }
    }

    /// Total size on the wire
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false for a frame built by the reassembler
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Build a frame around `payload`, appending header and CRC-24Q parity.
///
/// Used by tooling and tests; the relay itself only forwards frames it received.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() & 0x3FF;
    let mut frame = Vec::with_capacity(len + FRAME_OVERHEAD);
    frame.push(PREAMBLE);
    frame.push(((len >> 8) & 0x03) as u8);
    frame.push((len & 0xFF) as u8);
    frame.extend_from_slice(&payload[..len]);
    let crc = crc24q(&frame);
    frame.extend_from_slice(&crc.to_be_bytes()[1..]);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_bits() {
        let buf = [0b1010_0000, 0xFF, 0x00];
        assert_eq!(get_bits(&buf, 0, 1), 1);
        assert_eq!(get_bits(&buf, 1, 1), 0);
        assert_eq!(get_bits(&buf, 0, 4), 0b1010);
        assert_eq!(get_bits(&buf, 4, 8), 0x0F);
        assert_eq!(get_bits(&buf, 8, 16), 0xFF00);
    }

    #[test]
    fn test_header_fields() {
        // 1005 with 19 byte payload
        let header = [0xD3, 0x00, 0x13, 0x3E, 0xD0];
        assert_eq!(reserved_bits(&header), 0);
        assert_eq!(payload_len(&header), 19);
        assert_eq!(message_type(&header), 1005);

        let bad = [0xD3, 0x04, 0x13, 0x3E];
        assert_ne!(reserved_bits(&bad), 0);
    }

    #[test]
    fn test_encode_produces_valid_parity() {
        let frame = encode(&[0x3E, 0xD0, 0x00, 0x01]);
        assert_eq!(frame.len(), 4 + FRAME_OVERHEAD);
        assert_eq!(payload_len(&frame), 4);
        assert_eq!(parity(&frame), calculated_parity(&frame));

        let parsed = RtcmFrame::new(Bytes::from(frame));
        assert_eq!(parsed.message_type, 1005);
        assert_eq!(parsed.len(), 10);
    }

    #[test]
    fn test_empty_message_parity() {
        // Known RTCM3 empty frame: D3 00 00 47 EA 4B
        let frame = encode(&[]);
        assert_eq!(frame, vec![0xD3, 0x00, 0x00, 0x47, 0xEA, 0x4B]);
    }
}
