//! End-to-end runs of the stream driver over synthetic receiver output

mod common;

use common::{gga, harness, nmea, rtcm_frame, unicore_ack, unicore_version};
use rtkrelay_core::core::bridge::ChannelConsumer;
use rtkrelay_core::core::handshake::{QUECTEL, UNICORE};
use rtkrelay_core::core::location::BATCH_SIZE;

#[test]
fn quectel_stream_end_to_end() {
    let mut h = harness(&QUECTEL);
    let (consumer, frames) = ChannelConsumer::bounded("relay", 64);
    h.driver.add_consumer(Box::new(consumer));
    h.driver.initialize().unwrap();

    let mut stream = Vec::new();
    stream.extend(rtcm_frame(1005, 17));
    stream.extend(nmea("PQTMVERNO,LC29HDANR11A03S_RSA,2023/03/02,17:00:55").as_bytes());
    stream.extend(rtcm_frame(1077, 120));
    stream.extend(nmea("PQTMCFGSVIN,OK").as_bytes());
    stream.extend(nmea("PAIR001,432,0").as_bytes());
    stream.extend(rtcm_frame(1087, 90));
    stream.extend(gga("2734.21017577", 'S', "15305.98006651", 'E', 4, 34.957).as_bytes());
    stream.extend(nmea("PAIR001,434,0").as_bytes());
    stream.extend(nmea("PAIR001,436,0").as_bytes());
    stream.extend(rtcm_frame(1005, 17));

    for chunk in stream.chunks(7) {
        h.driver.process_chunk(chunk).unwrap();
        h.driver.poll().unwrap();
    }

    let status = h.driver.status();
    assert!(status.connected);
    assert_eq!(status.queue_len, 0);
    assert_eq!(status.identity.firmware, "LC29HDANR11A03S_RSA");
    assert_eq!(status.stream.frames, 4);
    assert_eq!(status.stream.frame_errors, 0);
    assert_eq!(status.stream.message_totals.get(&1005), Some(&2));
    assert_eq!(status.stream.max_chunk, 7);
    assert_eq!(status.location_samples, 1);
    assert_eq!(frames.try_iter().count(), 4);

    let expected: Vec<String> = [
        "PQTMVERNO",
        "PQTMCFGSVIN,W,1,43200,0,0,0,0",
        "PAIR432,1",
        "PAIR434,1",
        "PAIR436,1",
    ]
    .into_iter()
    .map(nmea)
    .collect();
    assert_eq!(h.sink.lines(), expected);
    assert!(h.logged("GPS Startup Commands Complete"));
}

#[test]
fn unicore_stream_end_to_end() {
    let mut h = harness(&UNICORE);
    h.driver.initialize().unwrap();

    let mut stream = Vec::new();
    stream.extend(unicore_ack("VERSION").as_bytes());
    stream.extend(unicore_version("UM982", "2310415000012").as_bytes());
    for command in UNICORE.startup.iter().skip(1) {
        stream.extend(rtcm_frame(1077, 64));
        stream.extend(unicore_ack(command).as_bytes());
    }
    stream.extend(unicore_ack("CONFIG SIGNALGROUP 3 6").as_bytes());

    for chunk in stream.chunks(31) {
        h.driver.process_chunk(chunk).unwrap();
    }

    let status = h.driver.status();
    assert_eq!(status.identity.device_type, "UM982");
    assert_eq!(status.queue_len, 0);
    assert_eq!(status.stream.message_totals.get(&1077), Some(&8));
    assert_eq!(
        h.sink.lines().last().map(String::as_str),
        Some("CONFIG SIGNALGROUP 3 6\r\n")
    );
}

#[test]
fn sixty_fixes_make_one_batch() {
    let mut h = harness(&QUECTEL);
    let mut lat_minutes = Vec::new();
    for n in 0..BATCH_SIZE {
        let minutes = 34.0 + n as f64 * 0.001;
        lat_minutes.push(minutes);
        let sentence = gga(
            &format!("27{minutes:011.8}"),
            'S',
            &format!("153{:011.8}", 5.5 + n as f64 * 0.001),
            'E',
            4,
            30.0 + n as f64 * 0.01,
        );
        h.driver.process_chunk(sentence.as_bytes()).unwrap();
    }

    assert_eq!(h.driver.averager().samples_in_batch(), 0);
    assert_eq!(h.driver.averager().batches(), 1);
    assert!(h.logged("Location 0 :"));

    let mean = h.driver.finish().unwrap();
    let expected_lat = -(27.0 + lat_minutes.iter().sum::<f64>() / BATCH_SIZE as f64 / 60.0);
    assert!((mean.latitude - expected_lat).abs() < 1e-9);
    assert!((mean.height - 30.295).abs() < 1e-9);
    assert!(mean.longitude > 153.0);
    assert!(h.logged("Location Mean 1"));
}

#[test]
fn fix_without_quality_is_rejected() {
    let mut h = harness(&QUECTEL);
    let sentence = gga("2734.21017577", 'S', "15305.98006651", 'E', 0, 34.957);
    h.driver.process_chunk(sentence.as_bytes()).unwrap();
    assert_eq!(h.driver.averager().samples_in_batch(), 0);
    assert_eq!(h.driver.averager().rejected(), 1);
    assert!(h.logged("No location data"));
}

#[test]
fn corrupt_frame_is_not_counted() {
    let mut h = harness(&QUECTEL);
    let mut corrupt = rtcm_frame(1005, 17);
    corrupt[10] ^= 0x04;
    h.driver.process_chunk(&corrupt).unwrap();
    h.driver.process_chunk(&rtcm_frame(1077, 20)).unwrap();

    let stats = h.driver.stats();
    assert_eq!(stats.message_totals.get(&1005), None);
    assert_eq!(stats.message_totals.get(&1077), Some(&1));
    assert_eq!(stats.frame_errors, 1);
    assert_eq!(stats.read_errors, 1);
    assert!(h.logged(">> E: 1 - Skipped"));
}

#[test]
fn status_serializes_to_json() {
    let mut h = harness(&QUECTEL);
    h.driver.process_chunk(&rtcm_frame(1230, 4)).unwrap();
    let json = serde_json::to_value(h.driver.status()).unwrap();
    assert_eq!(json["family"], "quectel");
    assert_eq!(json["connected"], true);
    assert_eq!(json["stream"]["message_totals"]["1230"], 1);
    assert_eq!(json["identity"]["firmware"], "UNKNOWN");
}

#[test]
fn each_error_window_reports_its_own_skipped_bytes() {
    let mut h = harness(&QUECTEL);

    let mut first = b"$ABC\x01".to_vec();
    first.extend(rtcm_frame(1005, 17));
    h.driver.process_chunk(&first).unwrap();
    assert!(h.logged(">> E: 1 - Skipped 5"));

    h.driver.process_chunk(b"$ABCDE").unwrap();
    let mut second = b"\x01".to_vec();
    second.extend(rtcm_frame(1077, 40));
    h.driver.process_chunk(&second).unwrap();
    assert!(h.logged(">> E: 2 - Skipped 7"));
    assert!(!h.logged("Skipped 12"));

    let stats = h.driver.stats();
    assert_eq!(stats.read_errors, 2);
    assert_eq!(stats.frame_errors, 2);
    assert_eq!(stats.missed_bytes, 12);
}
