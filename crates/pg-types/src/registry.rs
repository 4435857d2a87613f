//! Type code registry.
//!
//! One [`TypeDescriptor`] per supported scalar type, pairing it with its
//! array type and a dynamic decoder. Lookups by scalar or array type code
//! drive the scalar/array mapping used by [`PgProtocol`] and dynamic decoding
//! into [`PgValue`].

use bytes::{Buf, Bytes};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use pg_protocol::Oid;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::array::ArrayHeader;
use crate::protocol::PgProtocol;
use crate::value::PgValue;

/// Registry entry for one scalar type and its array type.
#[derive(Debug)]
pub struct TypeDescriptor {
    /// Scalar type code.
    pub element: Oid,
    /// Array type code.
    pub array: Oid,
    /// Server type name.
    pub name: &'static str,
    /// Binary length for fixed-width types.
    pub fixed_length: Option<usize>,
    decode: fn(Oid, &[u8]) -> Option<PgValue>,
}

impl TypeDescriptor {
    /// Decode a binary scalar value of this type.
    #[must_use]
    pub fn decode(&self, raw: &[u8]) -> Option<PgValue> {
        (self.decode)(self.element, raw)
    }

    /// Check if values of this type have a fixed binary length.
    #[must_use]
    pub fn is_fixed_length(&self) -> bool {
        self.fixed_length.is_some()
    }
}

fn via<T: PgProtocol + Into<PgValue>>(oid: Oid, raw: &[u8]) -> Option<PgValue> {
    T::from_binary(oid, raw).map(Into::into)
}

const fn entry(
    element: Oid,
    array: Oid,
    name: &'static str,
    fixed_length: Option<usize>,
    decode: fn(Oid, &[u8]) -> Option<PgValue>,
) -> TypeDescriptor {
    TypeDescriptor {
        element,
        array,
        name,
        fixed_length,
        decode,
    }
}

static TYPES: [TypeDescriptor; 21] = [
    entry(Oid::BOOL, Oid::BOOL_ARRAY, "bool", Some(1), via::<bool>),
    entry(Oid::BYTEA, Oid::BYTEA_ARRAY, "bytea", None, via::<Bytes>),
    entry(Oid::CHAR, Oid::CHAR_ARRAY, "char", Some(1), via::<String>),
    entry(Oid::NAME, Oid::NAME_ARRAY, "name", None, via::<String>),
    entry(Oid::INT8, Oid::INT8_ARRAY, "int8", Some(8), via::<i64>),
    entry(Oid::INT2, Oid::INT2_ARRAY, "int2", Some(2), via::<i16>),
    entry(Oid::INT4, Oid::INT4_ARRAY, "int4", Some(4), via::<i32>),
    entry(Oid::TEXT, Oid::TEXT_ARRAY, "text", None, via::<String>),
    entry(Oid::OID, Oid::OID_ARRAY, "oid", Some(4), via::<u32>),
    entry(Oid::JSON, Oid::JSON_ARRAY, "json", None, via::<serde_json::Value>),
    entry(Oid::FLOAT4, Oid::FLOAT4_ARRAY, "float4", Some(4), via::<f32>),
    entry(Oid::FLOAT8, Oid::FLOAT8_ARRAY, "float8", Some(8), via::<f64>),
    entry(Oid::BPCHAR, Oid::BPCHAR_ARRAY, "bpchar", None, via::<String>),
    entry(Oid::VARCHAR, Oid::VARCHAR_ARRAY, "varchar", None, via::<String>),
    entry(Oid::DATE, Oid::DATE_ARRAY, "date", Some(4), via::<NaiveDate>),
    entry(Oid::TIME, Oid::TIME_ARRAY, "time", Some(8), via::<NaiveTime>),
    entry(Oid::TIMESTAMP, Oid::TIMESTAMP_ARRAY, "timestamp", Some(8), via::<NaiveDateTime>),
    entry(Oid::TIMESTAMPTZ, Oid::TIMESTAMPTZ_ARRAY, "timestamptz", Some(8), via::<DateTime<Utc>>),
    entry(Oid::NUMERIC, Oid::NUMERIC_ARRAY, "numeric", None, via::<Decimal>),
    entry(Oid::UUID, Oid::UUID_ARRAY, "uuid", Some(16), via::<Uuid>),
    entry(Oid::JSONB, Oid::JSONB_ARRAY, "jsonb", None, via::<serde_json::Value>),
];

/// All registered types.
#[must_use]
pub fn descriptors() -> &'static [TypeDescriptor] {
    &TYPES
}

/// Find the descriptor of a scalar type code.
#[must_use]
pub fn lookup(oid: Oid) -> Option<&'static TypeDescriptor> {
    TYPES.iter().find(|d| d.element == oid)
}

/// Find the descriptor whose array type code is `array_oid`.
#[must_use]
pub fn lookup_array(array_oid: Oid) -> Option<&'static TypeDescriptor> {
    TYPES.iter().find(|d| d.array == array_oid)
}

/// Check if `oid` is a registered array type code.
#[must_use]
pub fn is_array(oid: Oid) -> bool {
    lookup_array(oid).is_some()
}

/// Element type code of an array type code.
#[must_use]
pub fn element_type_of_array(array_oid: Oid) -> Option<Oid> {
    lookup_array(array_oid).map(|d| d.element)
}

/// Array type code of a scalar type code.
#[must_use]
pub fn array_type_of_element(oid: Oid) -> Option<Oid> {
    lookup(oid).map(|d| d.array)
}

/// Decode a complete binary value of declared type `oid`.
///
/// Arrays decode to [`PgValue::Array`]; multi-dimensional arrays and
/// unregistered types yield `None`.
#[must_use]
pub fn decode_value(oid: Oid, raw: &[u8]) -> Option<PgValue> {
    if let Some(descriptor) = lookup(oid) {
        return descriptor.decode(raw);
    }
    let descriptor = lookup_array(oid)?;
    let mut src = raw;
    let header = ArrayHeader::decode(&mut src).ok()?;
    if !header.is_supported() || header.element_oid != descriptor.element {
        return None;
    }

    let mut items = Vec::with_capacity(header.length as usize);
    for _ in 0..header.length {
        if src.remaining() < 4 {
            return None;
        }
        let len = src.get_i32();
        if len < 0 {
            items.push(PgValue::Null);
            continue;
        }
        let len = len as usize;
        if src.remaining() < len {
            return None;
        }
        items.push(descriptor.decode(&src[..len])?);
        src.advance(len);
    }
    Some(PgValue::Array {
        element: descriptor.element,
        items,
    })
}
