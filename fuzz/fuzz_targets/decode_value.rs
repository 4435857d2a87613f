#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pg_protocol::Oid;

/// Type code plus raw column bytes.
#[derive(Debug, Arbitrary)]
struct FuzzInput {
    oid: u32,
    data: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let _ = pg_types::registry::decode_value(Oid(input.oid), &input.data);
});
