//! Stream builders shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use rtkrelay_core::core::clock::ManualClock;
use rtkrelay_core::core::handshake::DeviceProfile;
use rtkrelay_core::core::logger::{Logger, SessionLogger};
use rtkrelay_core::core::protocol::checksum::{crc32_unicore, frame_command, xor_checksum};
use rtkrelay_core::core::protocol::rtcm::encode;
use rtkrelay_core::core::session::{DriverTimings, StreamDriver};
use rtkrelay_core::core::transport::RecordingSink;

/// RTCM3 frame of `message_type` with `body_len` payload bytes after the type field.
///
/// Body bytes never collide with a frame start marker.
pub fn rtcm_frame(message_type: u16, body_len: usize) -> Vec<u8> {
    let mut payload = vec![(message_type >> 4) as u8, ((message_type & 0x0F) << 4) as u8];
    payload.extend((0..body_len).map(|i| (i % 0x20) as u8));
    encode(&payload)
}

/// `$text*XX\r\n` with the checksum taken over `text`
pub fn nmea(text: &str) -> String {
    frame_command(text)
}

/// Unicore `$command,<command>,response: OK*XX\r\n`, checksum including the `$`
pub fn unicore_ack(command: &str) -> String {
    let body = format!("$command,{command},response: OK");
    format!("{body}*{:02X}\r\n", xor_checksum(body.as_bytes()))
}

/// Unicore `#VERSION` report for `device_type` with a CRC-32 trailer
pub fn unicore_version(device_type: &str, serial: &str) -> String {
    let body = format!(
        "VERSION,0,GPS,UNKNOWN,0,0,0,0,0,1261;{device_type},R4.10Build11833,HRPX00-S10C-P,\
         {serial}-LR23A0225104299,ff27289609cf8600,2023/12/01"
    );
    format!("#{body}*{:08x}\r\n", crc32_unicore(body.as_bytes()))
}

/// GGA sentence with an RTK fixed solution at the given position fields
pub fn gga(lat: &str, ns: char, lon: &str, ew: char, quality: u8, height: f64) -> String {
    nmea(&format!(
        "GNGGA,020816.00,{lat},{ns},{lon},{ew},{quality},34,0.6,{height:.4},M,41.1718,M,1.0,0"
    ))
}

/// Recorded output of a driver under test
pub struct Harness {
    pub driver: StreamDriver,
    pub sink: RecordingSink,
    pub clock: Arc<ManualClock>,
    pub history: Arc<SessionLogger>,
}

/// Driver with a recording sink, manual clock and in-memory log
pub fn harness(profile: &'static DeviceProfile) -> Harness {
    let sink = RecordingSink::new();
    let clock = Arc::new(ManualClock::new(0));
    let (history, logger): (Arc<SessionLogger>, Logger) =
        SessionLogger::new(1000).with_debug_history(true).into_handle();
    let driver = StreamDriver::new(
        profile,
        Box::new(sink.clone()),
        clock.clone(),
        logger,
        DriverTimings::default(),
    );
    Harness {
        driver,
        sink,
        clock,
        history,
    }
}

impl Harness {
    /// True when any history line contains `needle`
    pub fn logged(&self, needle: &str) -> bool {
        self.history.history().iter().any(|e| e.message.contains(needle))
    }
}
