use buttonbox::protocol::parse_datagram;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

const RECEIPT_MS: u64 = 1_700_000_000_000;

fn codec_benchmark(c: &mut Criterion) {
    // 1. Prepare payloads
    let compact = b"BUTTON:ESP01:1".to_vec();
    let structured =
        br#"{"deviceId":"esp-kitchen","buttonPressed":true,"timestamp":1234,"batteryLevel":0.75}"#
            .to_vec();
    // Falls through the compact prefix check and fails JSON parsing.
    let garbage = b"GET / HTTP/1.1\r\nHost: nonsense\r\n\r\n".to_vec();
    let binary: Vec<u8> = (0u16..512).map(|i| (i % 251) as u8).collect();

    // 2. Benchmarks
    c.bench_function("parse_compact", |b| {
        b.iter(|| parse_datagram(black_box(&compact), RECEIPT_MS))
    });

    c.bench_function("parse_structured", |b| {
        b.iter(|| parse_datagram(black_box(&structured), RECEIPT_MS))
    });

    c.bench_function("reject_garbage_text", |b| {
        b.iter(|| parse_datagram(black_box(&garbage), RECEIPT_MS))
    });

    c.bench_function("reject_binary", |b| {
        b.iter(|| parse_datagram(black_box(&binary), RECEIPT_MS))
    });
}

criterion_group!(benches, codec_benchmark);
criterion_main!(benches);
