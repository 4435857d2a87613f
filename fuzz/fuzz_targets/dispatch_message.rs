#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use pg_protocol::{Frame, MessageDispatcher, MessageScratch};

fuzz_target!(|data: &[u8]| {
    let Some((&tag, body)) = data.split_first() else {
        return;
    };
    let mut dispatcher = MessageDispatcher::new();
    let mut scratch = MessageScratch::default();
    let mut frame = Frame::new(tag, Bytes::copy_from_slice(body));
    let _ = dispatcher.dispatch(&mut frame, &mut scratch);
});
