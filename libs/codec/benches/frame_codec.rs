//! Frame codec throughput
//!
//! The decode loop runs once per frame on every connection, including the
//! incomplete-frame path that fires whenever a read ends mid-frame. Both
//! paths are measured here.

use codec::{
    BasicProperties, BasicPublish, ByteCursor, ContentBody, Frame, FrameCodec, HeaderBody,
    MethodRegistry,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

fn publish_sequence(payload_len: usize) -> Vec<u8> {
    let frames = [
        Frame::new(
            1,
            BasicPublish {
                exchange: "amq.topic".into(),
                routing_key: "usd.stock.quote".into(),
                ..Default::default()
            },
        ),
        Frame::new(
            1,
            HeaderBody::basic(
                payload_len as u64,
                BasicProperties {
                    content_type: Some("application/octet-stream".into()),
                    delivery_mode: Some(1),
                    ..Default::default()
                },
            ),
        ),
        Frame::new(1, ContentBody::new(vec![0xAB; payload_len])),
    ];

    let mut cursor = ByteCursor::new();
    for frame in &frames {
        frame.encode(&mut cursor).unwrap();
    }
    cursor.as_slice().to_vec()
}

fn bench_decode(c: &mut Criterion) {
    let codec = FrameCodec::new(Arc::new(MethodRegistry::new()));
    let mut group = c.benchmark_group("decode");

    for payload_len in [64usize, 4096] {
        let bytes = publish_sequence(payload_len);
        group.bench_function(format!("publish_sequence_{}b", payload_len), |b| {
            b.iter(|| {
                let mut cursor = ByteCursor::from(black_box(&bytes[..]));
                while let Some(frame) = codec.decode(&mut cursor).unwrap() {
                    black_box(frame);
                }
            });
        });
    }

    let bytes = publish_sequence(4096);
    let partial = &bytes[..bytes.len() - 1];
    group.bench_function("incomplete_frame", |b| {
        b.iter(|| {
            let mut cursor = ByteCursor::from(black_box(partial));
            // first two frames decode, the truncated content frame does not
            let mut decoded = 0;
            while let Some(frame) = codec.decode(&mut cursor).unwrap() {
                black_box(frame);
                decoded += 1;
            }
            black_box(decoded);
        });
    });

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let frame = Frame::new(1, ContentBody::new(vec![0xCD; 4096]));
    c.bench_function("encode_content_4k", |b| {
        b.iter(|| {
            let mut cursor = ByteCursor::with_capacity(4200);
            black_box(&frame).encode(&mut cursor).unwrap();
            black_box(cursor);
        });
    });
}

criterion_group!(benches, bench_decode, bench_encode);
criterion_main!(benches);
