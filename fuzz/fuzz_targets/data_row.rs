#![no_main]

use arbitrary::Arbitrary;
use bytes::{BufMut, Bytes, BytesMut};
use libfuzzer_sys::fuzz_target;
use pg_client::{DataRow, Oid, RowDescription};

/// Column types plus a raw DataRow body.
#[derive(Debug, Arbitrary)]
struct FuzzInput {
    oids: Vec<u32>,
    body: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let mut description = BytesMut::new();
    let columns = input.oids.len().min(64);
    description.put_u16(columns as u16);
    for (i, oid) in input.oids.iter().take(columns).enumerate() {
        description.put_slice(format!("c{i}").as_bytes());
        description.put_u8(0);
        description.put_u32(0);
        description.put_i16(0);
        description.put_u32(*oid);
        description.put_i16(-1);
        description.put_i32(-1);
        description.put_i16(1);
    }

    let mut desc = RowDescription::new();
    if desc.decode(&mut description.freeze()).is_err() {
        return;
    }
    let Ok(mut row) = DataRow::new(&desc, Bytes::from(input.body)) else {
        return;
    };
    while let Ok(true) = row.move_next() {
        if row.column().type_oid() == Oid::NUMERIC {
            let _ = row.get::<rust_decimal::Decimal>();
        } else {
            let _ = row.value();
        }
    }
});
