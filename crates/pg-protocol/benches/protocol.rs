//! Benchmarks for backend message dispatch and frontend encoding.

#![allow(clippy::unwrap_used, missing_docs)]

use bytes::{BufMut, Bytes, BytesMut};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use pg_protocol::{
    FormatCode, Frame, FrontendMessage, MessageDispatcher, MessageScratch, Oid, RowDescription,
    Target,
};

fn row_description_body(columns: usize) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_i16(columns as i16);
    for i in 0..columns {
        buf.put_slice(format!("column_{i}").as_bytes());
        buf.put_u8(0);
        buf.put_u32(16384);
        buf.put_i16(i as i16 + 1);
        buf.put_u32(23);
        buf.put_i16(4);
        buf.put_i32(-1);
        buf.put_i16(1);
    }
    buf.freeze()
}

/// Decode a wide RowDescription into a reused description.
fn bench_row_description(c: &mut Criterion) {
    let body = row_description_body(32);
    let mut group = c.benchmark_group("row_description");
    group.throughput(Throughput::Bytes(body.len() as u64));

    group.bench_function("decode_reused", |b| {
        let mut desc = RowDescription::new();
        b.iter(|| {
            let mut src = body.clone();
            desc.decode(&mut src).unwrap();
            black_box(desc.len())
        })
    });

    group.finish();
}

/// Dispatch the messages that close out a statement.
fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let mut dispatcher = MessageDispatcher::new();
    let mut scratch = MessageScratch::default();

    group.bench_function("command_complete_cached", |b| {
        b.iter(|| {
            let mut frame = Frame::new(b'C', Bytes::from_static(b"UPDATE 1\0"));
            black_box(dispatcher.dispatch(&mut frame, &mut scratch).unwrap())
        })
    });

    group.bench_function("command_complete_large", |b| {
        b.iter(|| {
            let mut frame = Frame::new(b'C', Bytes::from_static(b"INSERT 0 1048576\0"));
            dispatcher.dispatch(&mut frame, &mut scratch).unwrap();
            black_box(scratch.command_complete().rows)
        })
    });

    group.bench_function("data_row_passthrough", |b| {
        let body = Bytes::from_static(&[0, 1, 0, 0, 0, 4, 0, 0, 0, 7]);
        b.iter(|| {
            let mut frame = Frame::new(b'D', body.clone());
            black_box(dispatcher.dispatch(&mut frame, &mut scratch).unwrap())
        })
    });

    group.finish();
}

/// Encode one extended-query cycle.
fn bench_extended_query_encode(c: &mut Criterion) {
    let params = [Some(Bytes::from_static(&42i32.to_be_bytes())), None];
    let types = [Oid::INT4, Oid::TEXT];
    let messages = [
        FrontendMessage::Parse {
            name: "",
            query: "SELECT id, name FROM users WHERE id = $1 OR name = $2",
            param_types: &types,
        },
        FrontendMessage::Bind {
            portal: "",
            statement: "",
            params: &params,
            result_format: FormatCode::Binary,
        },
        FrontendMessage::Describe {
            target: Target::Portal,
            name: "",
        },
        FrontendMessage::Execute {
            portal: "",
            max_rows: 0,
        },
        FrontendMessage::Sync,
    ];

    c.bench_function("extended_query_encode", |b| {
        let mut buf = BytesMut::with_capacity(256);
        b.iter(|| {
            buf.clear();
            for message in &messages {
                message.encode(&mut buf).unwrap();
            }
            black_box(buf.len())
        })
    });
}

criterion_group!(
    benches,
    bench_row_description,
    bench_dispatch,
    bench_extended_query_encode,
);
criterion_main!(benches);
