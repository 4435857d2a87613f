//! Benchmarks for binary numeric and scalar codecs.

#![allow(clippy::unwrap_used, missing_docs)]

use bytes::{Bytes, BytesMut};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use pg_protocol::Oid;
use pg_types::{PgProtocol, decode_numeric, encode_numeric, registry};
use rust_decimal::Decimal;
use std::hint::black_box;
use std::str::FromStr;

fn encoded(value: &Decimal) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_numeric(value, &mut buf);
    buf.to_vec()
}

/// Benchmark numeric encoding across magnitudes and scales.
fn bench_numeric_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("numeric_encode");

    for (name, text) in [
        ("small", "1.5"),
        ("money", "12345.67"),
        ("wide", "79228162514264337593543950335"),
        ("fraction", "0.0000000000000000000000000001"),
    ] {
        let value = Decimal::from_str(text).unwrap();
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut buf = BytesMut::with_capacity(32);
                encode_numeric(black_box(&value), &mut buf);
                black_box(buf)
            })
        });
    }

    group.finish();
}

/// Benchmark numeric decoding.
fn bench_numeric_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("numeric_decode");

    for (name, text) in [("small", "1.5"), ("wide", "-7922816251426433759354395.0335")] {
        let raw = encoded(&Decimal::from_str(text).unwrap());
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_function(name, |b| b.iter(|| black_box(decode_numeric(black_box(&raw)))));
    }

    group.finish();
}

/// Benchmark typed versus dynamic scalar decoding.
fn bench_scalar_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("scalar_decode");
    let raw = Bytes::from_static(&[0, 0, 0, 0, 0, 0, 0x30, 0x39]);

    group.bench_function("typed_i64", |b| {
        b.iter(|| {
            let mut src = raw.clone();
            black_box(i64::decode_element(Oid::INT8, 8, &mut src))
        })
    });
    group.bench_function("narrowed_i16", |b| {
        b.iter(|| {
            let mut src = raw.clone();
            black_box(i16::decode_element(Oid::INT8, 8, &mut src))
        })
    });
    group.bench_function("dynamic", |b| {
        b.iter(|| black_box(registry::decode_value(Oid::INT8, &raw)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_numeric_encode,
    bench_numeric_decode,
    bench_scalar_decode
);
criterion_main!(benches);
