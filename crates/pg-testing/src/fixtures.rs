//! Backend message fixtures.
//!
//! Each builder returns one complete backend message (tag, length and body)
//! as the server would send it. Concatenate them to script a session.

use bytes::{BufMut, Bytes, BytesMut};
use pg_protocol::{Frame, Oid};
use pg_types::{PgValue, TypeError};

/// Build a message from a tag and a body writer.
pub fn message(tag: u8, body: impl FnOnce(&mut BytesMut)) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(tag);
    buf.put_i32(0);
    body(&mut buf);
    let len = (buf.len() - 1) as i32;
    buf[1..5].copy_from_slice(&len.to_be_bytes());
    buf.freeze()
}

/// Strip the header of a message built here, producing the frame the codec
/// would yield.
///
/// # Panics
///
/// Panics if `raw` is shorter than a frame header.
#[must_use]
pub fn to_frame(raw: &Bytes) -> Frame {
    assert!(raw.len() >= 5, "message shorter than its header");
    Frame::new(raw[0], raw.slice(5..))
}

fn put_cstr(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

/// RowDescription with binary-format columns.
#[must_use]
pub fn row_description(columns: &[(&str, Oid)]) -> Bytes {
    message(b'T', |buf| {
        buf.put_u16(columns.len() as u16);
        for (i, (name, oid)) in columns.iter().enumerate() {
            put_cstr(buf, name);
            buf.put_u32(0); // table oid
            buf.put_i16(i as i16 + 1); // attribute number
            buf.put_u32(oid.0);
            buf.put_i16(-1); // type size
            buf.put_i32(-1); // type modifier
            buf.put_i16(1); // binary format
        }
    })
}

/// DataRow from raw column values; `None` is NULL.
#[must_use]
pub fn data_row(values: &[Option<&[u8]>]) -> Bytes {
    message(b'D', |buf| {
        buf.put_u16(values.len() as u16);
        for value in values {
            match value {
                Some(v) => {
                    buf.put_i32(v.len() as i32);
                    buf.put_slice(v);
                }
                None => buf.put_i32(-1),
            }
        }
    })
}

/// DataRow from dynamic values in their binary encoding.
pub fn data_row_values(values: &[PgValue]) -> Result<Bytes, TypeError> {
    let encoded = values
        .iter()
        .map(PgValue::to_param)
        .collect::<Result<Vec<_>, _>>()?;
    let refs: Vec<Option<&[u8]>> = encoded.iter().map(|v| v.as_deref()).collect();
    Ok(data_row(&refs))
}

/// CommandComplete with the given tag, e.g. `"UPDATE 3"`.
#[must_use]
pub fn command_complete(tag: &str) -> Bytes {
    message(b'C', |buf| put_cstr(buf, tag))
}

/// ReadyForQuery with a transaction status byte (`I`, `T` or `E`).
#[must_use]
pub fn ready_for_query(status: u8) -> Bytes {
    message(b'Z', |buf| buf.put_u8(status))
}

fn notice_body(buf: &mut BytesMut, severity: &str, code: &str, text: &str) {
    for (field, value) in [(b'S', severity), (b'V', severity), (b'C', code), (b'M', text)] {
        buf.put_u8(field);
        put_cstr(buf, value);
    }
    buf.put_u8(0);
}

/// ErrorResponse with severity, SQLSTATE and message.
#[must_use]
pub fn error_response(severity: &str, code: &str, text: &str) -> Bytes {
    message(b'E', |buf| notice_body(buf, severity, code, text))
}

/// NoticeResponse with severity, SQLSTATE and message.
#[must_use]
pub fn notice_response(severity: &str, code: &str, text: &str) -> Bytes {
    message(b'N', |buf| notice_body(buf, severity, code, text))
}

/// ParameterStatus report.
#[must_use]
pub fn parameter_status(name: &str, value: &str) -> Bytes {
    message(b'S', |buf| {
        put_cstr(buf, name);
        put_cstr(buf, value);
    })
}

/// BackendKeyData.
#[must_use]
pub fn backend_key_data(process_id: i32, secret_key: i32) -> Bytes {
    message(b'K', |buf| {
        buf.put_i32(process_id);
        buf.put_i32(secret_key);
    })
}

/// NotificationResponse.
#[must_use]
pub fn notification_response(process_id: i32, channel: &str, payload: &str) -> Bytes {
    message(b'A', |buf| {
        buf.put_i32(process_id);
        put_cstr(buf, channel);
        put_cstr(buf, payload);
    })
}

/// ParseComplete.
#[must_use]
pub fn parse_complete() -> Bytes {
    message(b'1', |_| {})
}

/// BindComplete.
#[must_use]
pub fn bind_complete() -> Bytes {
    message(b'2', |_| {})
}

/// CloseComplete.
#[must_use]
pub fn close_complete() -> Bytes {
    message(b'3', |_| {})
}

/// NoData.
#[must_use]
pub fn no_data() -> Bytes {
    message(b'n', |_| {})
}

/// EmptyQueryResponse.
#[must_use]
pub fn empty_query_response() -> Bytes {
    message(b'I', |_| {})
}

/// Concatenate messages into one buffer.
#[must_use]
pub fn concat(messages: &[Bytes]) -> Bytes {
    let mut buf = BytesMut::with_capacity(messages.iter().map(Bytes::len).sum());
    for m in messages {
        buf.put_slice(m);
    }
    buf.freeze()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pg_protocol::{BackendMessage, MessageDispatcher, MessageScratch};

    #[test]
    fn test_fixtures_dispatch_cleanly() {
        let mut dispatcher = MessageDispatcher::new();
        let mut scratch = MessageScratch::default();

        let raw = row_description(&[("id", Oid::INT4), ("name", Oid::TEXT)]);
        let kind = dispatcher.dispatch(&mut to_frame(&raw), &mut scratch).unwrap();
        assert_eq!(kind, Some(BackendMessage::RowDescription));
        assert_eq!(scratch.row_description.len(), 2);
        assert_eq!(scratch.row_description.columns()[1].name(), "name");

        let raw = error_response("ERROR", "42P01", "relation does not exist");
        dispatcher.dispatch(&mut to_frame(&raw), &mut scratch).unwrap();
        assert_eq!(scratch.notice.code, "42P01");

        let raw = command_complete("INSERT 0 7");
        dispatcher.dispatch(&mut to_frame(&raw), &mut scratch).unwrap();
        assert_eq!(scratch.command_complete().rows, 7);
    }

    #[test]
    fn test_data_row_values() {
        let raw = data_row_values(&[PgValue::Int4(1), PgValue::Null]).unwrap();
        let frame = to_frame(&raw);
        assert_eq!(frame.tag, b'D');
        assert_eq!(&frame.body[..], &[0, 2, 0, 0, 0, 4, 0, 0, 0, 1, 0xFF, 0xFF, 0xFF, 0xFF]);
    }
}
