//! Benchmarks for row decoding and JSON projection.

#![allow(missing_docs, clippy::unwrap_used)]

use bytes::Bytes;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use pg_client::{DataRow, Oid, PgValue, RowDescription, json};
use pg_testing::fixtures;
use rust_decimal::Decimal;
use std::hint::black_box;
use std::str::FromStr;

fn description() -> RowDescription {
    let mut frame = fixtures::to_frame(&fixtures::row_description(&[
        ("id", Oid::INT8),
        ("name", Oid::TEXT),
        ("price", Oid::NUMERIC),
        ("active", Oid::BOOL),
        ("score", Oid::FLOAT8),
    ]));
    let mut desc = RowDescription::new();
    desc.decode(&mut frame.body).unwrap();
    desc
}

fn row_body() -> Bytes {
    let values = [
        PgValue::Int8(9_876_543_210),
        PgValue::Text("a reasonably long product name".into()),
        PgValue::Numeric(Decimal::from_str("12345.6789").unwrap()),
        PgValue::Bool(true),
        PgValue::Float8(0.75),
    ];
    fixtures::to_frame(&fixtures::data_row_values(&values).unwrap()).body
}

fn bench_row_decode(c: &mut Criterion) {
    let desc = description();
    let body = row_body();
    let mut group = c.benchmark_group("data_row");
    group.throughput(Throughput::Bytes(body.len() as u64));

    group.bench_function("typed_get", |b| {
        b.iter(|| {
            let mut row = DataRow::new(&desc, body.clone()).unwrap();
            row.move_next().unwrap();
            let id: Option<i64> = row.get();
            row.move_next().unwrap();
            let name: Option<String> = row.get();
            row.move_next().unwrap();
            let price: Option<Decimal> = row.get();
            black_box((id, name, price))
        })
    });

    group.bench_function("skip_all", |b| {
        b.iter(|| {
            let mut row = DataRow::new(&desc, body.clone()).unwrap();
            while row.move_next().unwrap() {}
            black_box(row.remaining())
        })
    });

    group.bench_function("dynamic_values", |b| {
        b.iter(|| {
            let mut row = DataRow::new(&desc, body.clone()).unwrap();
            let mut values = Vec::with_capacity(row.len());
            while row.move_next().unwrap() {
                values.push(row.value().unwrap());
            }
            black_box(values)
        })
    });

    group.finish();
}

fn bench_json(c: &mut Criterion) {
    let desc = description();
    let body = row_body();
    let mut group = c.benchmark_group("json");
    group.throughput(Throughput::Bytes(body.len() as u64));

    group.bench_function("to_value", |b| {
        b.iter(|| {
            let mut row = DataRow::new(&desc, body.clone()).unwrap();
            black_box(json::to_json(&mut row).unwrap())
        })
    });

    group.bench_function("to_writer", |b| {
        let mut out = Vec::with_capacity(256);
        b.iter(|| {
            out.clear();
            let mut row = DataRow::new(&desc, body.clone()).unwrap();
            json::write_json_to(&mut row, &mut out).unwrap();
            black_box(out.len())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_row_decode, bench_json);
criterion_main!(benches);
