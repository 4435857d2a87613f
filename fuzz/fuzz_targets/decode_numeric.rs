#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Some(value) = pg_types::decode_numeric(data) {
        // anything decoded must encode again
        let mut buf = bytes::BytesMut::new();
        pg_types::encode_numeric(&value, &mut buf);
    }
});
