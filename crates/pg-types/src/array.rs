//! Binary array layout.
//!
//! An array value starts with a header: dimension count, a has-null flag and
//! the element type code, then a `(length, lower bound)` pair per dimension.
//! Elements follow, each as a 4-byte length (`-1` for NULL) and payload.
//! Only one-dimensional arrays are produced or consumed.

use bytes::{Buf, BufMut, BytesMut};
use pg_protocol::{Oid, ProtocolError};

use crate::error::TypeError;
use crate::protocol::PgProtocol;

/// Size of the fixed part of the header.
pub const ARRAY_HEADER_SIZE: usize = 12;

/// Size of one dimension descriptor.
pub const DIMENSION_SIZE: usize = 8;

/// Parsed array header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayHeader {
    /// Number of dimensions; 0 for an empty array.
    pub dimensions: i32,
    /// Has-null flag as sent. Not checked against the element lengths.
    pub has_null: bool,
    /// Element type code.
    pub element_oid: Oid,
    /// Element count for one-dimensional arrays, 0 for empty arrays, and
    /// -1 when the array has more than one dimension.
    pub length: i32,
    /// Lower bound of the first dimension.
    pub lower_bound: i32,
}

impl ArrayHeader {
    /// Read the header of a value.
    ///
    /// Multi-dimensional headers are only partially consumed; callers treat
    /// such values as unsupported and discard the remainder.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < ARRAY_HEADER_SIZE {
            return Err(ProtocolError::UnexpectedEof);
        }
        let dimensions = src.get_i32();
        let has_null = src.get_i32() != 0;
        let element_oid = Oid(src.get_u32());

        let (length, lower_bound) = match dimensions {
            0 => (0, 1),
            1 => {
                if src.remaining() < DIMENSION_SIZE {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let length = src.get_i32();
                if length < 0 {
                    return Err(ProtocolError::InvalidField {
                        field: "array length",
                        value: i64::from(length),
                    });
                }
                (length, src.get_i32())
            }
            d if d < 0 => {
                return Err(ProtocolError::InvalidField {
                    field: "array dimensions",
                    value: i64::from(d),
                });
            }
            _ => (-1, 1),
        };

        Ok(Self {
            dimensions,
            has_null,
            element_oid,
            length,
            lower_bound,
        })
    }

    /// Check if the array shape can be read element by element.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.dimensions <= 1
    }

    /// Size of the header as encoded.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        ARRAY_HEADER_SIZE + DIMENSION_SIZE * self.dimensions.clamp(0, 1) as usize
    }
}

/// Write a one-dimensional array header with lower bound 1.
///
/// An empty array is written with zero dimensions.
pub fn write_array_header(
    dst: &mut BytesMut,
    element_oid: Oid,
    len: usize,
    has_null: bool,
) -> Result<(), TypeError> {
    let count = i32::try_from(len).map_err(|_| TypeError::ValueTooLarge { len })?;
    dst.put_i32(i32::from(count > 0));
    dst.put_i32(i32::from(has_null));
    dst.put_u32(element_oid.0);
    if count > 0 {
        dst.put_i32(count);
        dst.put_i32(1);
    }
    Ok(())
}

/// Write a length-prefixed element produced by `write`.
pub fn write_length_prefixed(
    dst: &mut BytesMut,
    write: impl FnOnce(&mut BytesMut) -> Result<(), TypeError>,
) -> Result<(), TypeError> {
    let start = dst.len();
    dst.put_i32(0);
    write(dst)?;
    let len = dst.len() - start - 4;
    let len32 = i32::try_from(len).map_err(|_| TypeError::ValueTooLarge { len })?;
    dst[start..start + 4].copy_from_slice(&len32.to_be_bytes());
    Ok(())
}

/// Encode a one-dimensional array of nullable elements.
pub fn encode_array<T: PgProtocol>(items: &[Option<T>], dst: &mut BytesMut) -> Result<(), TypeError> {
    let has_null = items.iter().any(Option::is_none);
    write_array_header(dst, T::ELEMENT_OID, items.len(), has_null)?;
    for item in items {
        match item {
            Some(value) => write_length_prefixed(dst, |buf| {
                value.encode_element(buf);
                Ok(())
            })?,
            None => dst.put_i32(-1),
        }
    }
    Ok(())
}

/// Encoded size of an array written by [`encode_array`].
#[must_use]
pub fn array_binary_length<T: PgProtocol>(items: &[Option<T>]) -> usize {
    let header = if items.is_empty() {
        ARRAY_HEADER_SIZE
    } else {
        ARRAY_HEADER_SIZE + DIMENSION_SIZE
    };
    header
        + items
            .iter()
            .map(|item| 4 + item.as_ref().map_or(0, PgProtocol::element_binary_length))
            .sum::<usize>()
}
