//! Throughput benchmarks

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rtkrelay_core::core::protocol::checksum::{crc24q, xor_checksum};
use rtkrelay_core::core::protocol::framing::FrameReassembler;
use rtkrelay_core::core::protocol::rtcm::encode;

/// One second of a typical base station stream: MSM frames plus NMEA
fn sample_stream() -> Vec<u8> {
    let mut stream = Vec::new();
    for n in 0..8u8 {
        let mut payload = vec![0x43, 0x50 + n];
        payload.extend((0..200).map(|i: u32| (i * 7 + u32::from(n)) as u8));
        stream.extend(encode(&payload));
        stream.extend_from_slice(b"\r\n");
    }
    stream.extend_from_slice(
        b"$GNGGA,020816.00,2734.21017577,S,15305.98006651,E,4,34,0.6,34.9570,M,41.1718,M,1.0,0*4A\r\n",
    );
    stream
}

fn checksum_benchmark(c: &mut Criterion) {
    let data: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();

    let mut group = c.benchmark_group("checksum");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("crc24q", |b| b.iter(|| black_box(crc24q(black_box(&data)))));
    group.bench_function("xor", |b| b.iter(|| black_box(xor_checksum(black_box(&data)))));

    group.finish();
}

fn reassembly_benchmark(c: &mut Criterion) {
    let stream = sample_stream();

    let mut group = c.benchmark_group("reassembly");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("whole_stream", |b| {
        let mut reassembler = FrameReassembler::default();
        b.iter(|| {
            let mut frames = 0usize;
            reassembler.push(black_box(&stream), |_| frames += 1);
            black_box(frames)
        })
    });

    group.bench_function("small_reads", |b| {
        let mut reassembler = FrameReassembler::default();
        b.iter(|| {
            let mut frames = 0usize;
            for chunk in black_box(&stream).chunks(64) {
                reassembler.push(chunk, |_| frames += 1);
            }
            black_box(frames)
        })
    });

    group.finish();
}

criterion_group!(benches, checksum_benchmark, reassembly_benchmark);
criterion_main!(benches);
