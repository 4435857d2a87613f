//! Low-level encoding and decoding helpers.
//!
//! Strings on the wire are NUL-terminated byte sequences; integers are
//! big-endian. Every message is framed as a 1-byte tag followed by a 4-byte
//! length that counts itself but not the tag.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;

/// Size of a message header: tag (1) + length (4).
pub const FRAME_HEADER_SIZE: usize = 5;

/// Size of the length field that follows the tag.
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Ensure at least `n` bytes remain in `src`.
#[inline]
pub fn ensure(src: &impl Buf, n: usize) -> Result<(), ProtocolError> {
    if src.remaining() < n {
        Err(ProtocolError::UnexpectedEof)
    } else {
        Ok(())
    }
}

/// Discard `n` bytes from `src`.
pub fn skip(src: &mut impl Buf, n: usize) -> Result<(), ProtocolError> {
    ensure(src, n)?;
    src.advance(n);
    Ok(())
}

/// Read a NUL-terminated string.
///
/// Invalid UTF-8 is replaced rather than rejected; server text is
/// informational and must never fail a read.
pub fn read_cstring(src: &mut impl Buf) -> Result<String, ProtocolError> {
    let mut bytes = Vec::new();
    while src.has_remaining() {
        let b = src.get_u8();
        if b == 0 {
            return Ok(String::from_utf8(bytes)
                .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()));
        }
        bytes.push(b);
    }
    Err(ProtocolError::MissingTerminator)
}

/// Read a NUL-terminated string into `dst`, reusing its allocation.
///
/// Same replacement rule as [`read_cstring`]. On error `dst` is left empty.
pub fn read_cstring_into(src: &mut impl Buf, dst: &mut String) -> Result<(), ProtocolError> {
    let mut bytes = std::mem::take(dst).into_bytes();
    bytes.clear();
    while src.has_remaining() {
        let b = src.get_u8();
        if b == 0 {
            *dst = String::from_utf8(bytes)
                .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
            return Ok(());
        }
        bytes.push(b);
    }
    Err(ProtocolError::MissingTerminator)
}

/// Read a NUL-terminated string into `dst`, keeping at most `capacity` bytes.
///
/// The whole string is consumed from `src`; anything past `capacity` is
/// dropped, cut back to the nearest character boundary. `dst` is cleared
/// first so its allocation can be reused across calls.
pub fn read_cstring_truncated(
    src: &mut impl Buf,
    dst: &mut String,
    capacity: usize,
) -> Result<(), ProtocolError> {
    dst.clear();
    let mut raw = Vec::with_capacity(capacity);
    let mut terminated = false;
    while src.has_remaining() {
        let b = src.get_u8();
        if b == 0 {
            terminated = true;
            break;
        }
        if raw.len() < capacity {
            raw.push(b);
        }
    }
    if !terminated {
        return Err(ProtocolError::MissingTerminator);
    }
    let text = String::from_utf8_lossy(&raw);
    let mut end = text.len().min(capacity);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    dst.push_str(&text[..end]);
    Ok(())
}

/// Write a NUL-terminated string.
pub fn write_cstring(dst: &mut impl BufMut, s: &str) {
    dst.put_slice(s.as_bytes());
    dst.put_u8(0);
}

/// Start a frontend message: write the tag and a placeholder length.
///
/// Returns the offset of the length field, to be passed to [`finish_message`].
pub fn begin_message(dst: &mut BytesMut, tag: u8) -> usize {
    dst.put_u8(tag);
    let start = dst.len();
    dst.put_i32(0);
    start
}

/// Back-patch the length of a message started with [`begin_message`].
pub fn finish_message(dst: &mut BytesMut, start: usize) -> Result<(), ProtocolError> {
    let len = dst.len() - start;
    let len = i32::try_from(len).map_err(|_| ProtocolError::InvalidLength {
        tag: char::from(dst[start - 1]),
        length: len as i64,
    })?;
    dst[start..start + LENGTH_FIELD_SIZE].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_cstring_roundtrip() {
        let mut buf = BytesMut::new();
        write_cstring(&mut buf, "client_encoding");
        write_cstring(&mut buf, "UTF8");

        let mut cursor = buf.freeze();
        assert_eq!(read_cstring(&mut cursor).unwrap(), "client_encoding");
        assert_eq!(read_cstring(&mut cursor).unwrap(), "UTF8");
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn test_cstring_missing_terminator() {
        let mut cursor = Bytes::from_static(b"abc");
        assert_eq!(
            read_cstring(&mut cursor),
            Err(ProtocolError::MissingTerminator)
        );
    }

    #[test]
    fn test_read_into_reuses_buffer() {
        let mut cursor = Bytes::from_static(b"a fairly long first value\0short\0tail");
        let mut text = String::new();
        read_cstring_into(&mut cursor, &mut text).unwrap();
        assert_eq!(text, "a fairly long first value");
        let ptr = text.as_ptr();

        read_cstring_into(&mut cursor, &mut text).unwrap();
        assert_eq!(text, "short");
        assert_eq!(text.as_ptr(), ptr);

        assert_eq!(
            read_cstring_into(&mut cursor, &mut text),
            Err(ProtocolError::MissingTerminator)
        );
        assert!(text.is_empty());
    }

    #[test]
    fn test_truncated_read_consumes_whole_string() {
        let mut cursor = Bytes::from_static(b"abcdefgh\0rest");
        let mut name = String::new();
        read_cstring_truncated(&mut cursor, &mut name, 4).unwrap();
        assert_eq!(name, "abcd");
        assert_eq!(&cursor[..], b"rest");
    }

    #[test]
    fn test_truncated_read_respects_char_boundary() {
        // "aé" is 3 bytes; a 2-byte cap would split 'é'.
        let mut cursor = Bytes::from_static("aé\0".as_bytes());
        let mut name = String::from("stale");
        read_cstring_truncated(&mut cursor, &mut name, 2).unwrap();
        assert_eq!(name, "a");
    }

    #[test]
    fn test_message_length_backpatch() {
        let mut buf = BytesMut::new();
        let start = begin_message(&mut buf, b'Q');
        write_cstring(&mut buf, "SELECT 1");
        finish_message(&mut buf, start).unwrap();

        assert_eq!(buf[0], b'Q');
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len as usize, buf.len() - 1);
    }
}
