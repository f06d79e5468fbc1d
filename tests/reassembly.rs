//! Reassembly of mixed RTCM3 / ASCII receiver streams

mod common;

use common::{nmea, rtcm_frame};
use rtkrelay_core::core::protocol::framing::{ByteOutcome, FrameError, FrameReassembler};
use rtkrelay_core::core::protocol::rtcm::encode;

/// Outcome reduced to something easy to compare
#[derive(Debug, PartialEq)]
enum Seen {
    Frame(u16),
    Line(String),
    Error,
}

fn feed(reassembler: &mut FrameReassembler, chunk: &[u8], seen: &mut Vec<Seen>) {
    reassembler.push(chunk, |outcome| match outcome {
        ByteOutcome::Frame(frame) => seen.push(Seen::Frame(frame.message_type)),
        ByteOutcome::Line(line) => seen.push(Seen::Line(line)),
        ByteOutcome::Error(_) => seen.push(Seen::Error),
        ByteOutcome::Continue => {}
    });
}

fn feed_in_chunks(stream: &[u8], size: usize) -> Vec<Seen> {
    let mut reassembler = FrameReassembler::default();
    let mut seen = Vec::new();
    for chunk in stream.chunks(size) {
        feed(&mut reassembler, chunk, &mut seen);
    }
    seen
}

#[test]
fn every_split_point_yields_the_same_frame() {
    let frame = rtcm_frame(1077, 40);
    for split in 0..=frame.len() {
        let mut reassembler = FrameReassembler::default();
        let mut frames = Vec::new();
        for part in [&frame[..split], &frame[split..]] {
            reassembler.push(part, |outcome| {
                if let ByteOutcome::Frame(f) = outcome {
                    frames.push(f);
                }
            });
        }
        assert_eq!(frames.len(), 1, "split at {split}");
        assert_eq!(frames[0].bytes.as_ref(), frame.as_slice());
        assert_eq!(frames[0].message_type, 1077);
    }
}

#[test]
fn mixed_stream_independent_of_read_size() {
    let gga = nmea("GNGGA,020816.00,2734.21017577,S,15305.98006651,E,4,34,0.6,34.9570,M,41.1718,M,1.0,0");
    let mut stream = vec![0x00, 0x11, 0x7F];
    stream.extend(rtcm_frame(1005, 16));
    stream.extend(gga.as_bytes());
    stream.extend(rtcm_frame(1077, 100));
    stream.extend(nmea("PAIR001,432,0").as_bytes());
    stream.extend(rtcm_frame(1230, 4));

    let expected = vec![
        Seen::Frame(1005),
        Seen::Line(gga.trim_end().to_string()),
        Seen::Frame(1077),
        Seen::Line("$PAIR001,432,0*3E".to_string()),
        Seen::Frame(1230),
    ];
    for size in 1..=13 {
        assert_eq!(feed_in_chunks(&stream, size), expected, "read size {size}");
    }
    assert_eq!(feed_in_chunks(&stream, stream.len()), expected);
}

#[test]
fn single_bit_flip_never_yields_a_frame() {
    let frame = rtcm_frame(1077, 40);
    for index in 3..frame.len() - 3 {
        for bit in 0..8 {
            let mut corrupt = frame.clone();
            corrupt[index] ^= 1 << bit;
            let seen = feed_in_chunks(&corrupt, corrupt.len());
            assert!(
                !seen.iter().any(|s| matches!(s, Seen::Frame(_))),
                "byte {index} bit {bit}: {seen:?}"
            );
            assert!(seen.contains(&Seen::Error), "byte {index} bit {bit}");
        }
    }
}

#[test]
fn truncated_frame_resyncs_on_next_chunk() {
    let mut payload = vec![0x3E, 0xD0];
    payload.extend([0u8; 17]);
    let truncated = &encode(&payload)[..10];

    let mut next = rtcm_frame(1005, 0);
    next.extend(rtcm_frame(1033, 1));

    let mut reassembler = FrameReassembler::default();
    let mut seen = Vec::new();
    feed(&mut reassembler, truncated, &mut seen);
    assert!(seen.is_empty());
    assert_eq!(reassembler.pending().len(), 10);

    feed(&mut reassembler, &next, &mut seen);
    assert_eq!(seen, vec![Seen::Error, Seen::Frame(1005), Seen::Frame(1033)]);
}

#[test]
fn line_interrupted_by_frame_start() {
    let mut stream = b"$PAIR001,4".to_vec();
    stream.extend(rtcm_frame(1005, 8));
    stream.extend(nmea("PAIR001,432,0").as_bytes());

    let mut reassembler = FrameReassembler::default();
    let outcomes = reassembler.push_collect(&stream);
    assert!(matches!(
        outcomes[0],
        ByteOutcome::Error(FrameError::NonAscii { byte: 0xD3, len: 10 })
    ));
    assert!(matches!(&outcomes[1], ByteOutcome::Frame(f) if f.message_type == 1005));
    assert_eq!(outcomes[2], ByteOutcome::Line("$PAIR001,432,0*3E".to_string()));
    assert_eq!(outcomes.len(), 3);
}

#[test]
fn oversized_line_is_dropped() {
    let mut stream = b"$".to_vec();
    stream.extend([b'A'; 300]);
    stream.extend(b"\r\n");
    stream.extend(nmea("PQTMVERNO").as_bytes());

    let mut reassembler = FrameReassembler::default();
    let outcomes = reassembler.push_collect(&stream);
    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[0], ByteOutcome::Error(FrameError::LineTooLong { len: 255 })));
    assert_eq!(outcomes[1], ByteOutcome::Line("$PQTMVERNO*58".to_string()));
}

#[test]
fn reserved_bits_reject_header() {
    let mut stream = vec![0xD3, 0x40, 0x05, 0x3E];
    stream.extend(rtcm_frame(1005, 8));

    let mut reassembler = FrameReassembler::default();
    let outcomes = reassembler.push_collect(&stream);
    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[0], ByteOutcome::Error(FrameError::ReservedBits { reserved: 0x10 })));
    assert!(matches!(&outcomes[1], ByteOutcome::Frame(f) if f.message_type == 1005));
}
