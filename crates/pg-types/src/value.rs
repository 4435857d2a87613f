//! Dynamically typed values.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use pg_protocol::Oid;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::array::{write_array_header, write_length_prefixed};
use crate::error::TypeError;
use crate::protocol::PgProtocol;
use crate::registry;

/// A value of any supported server type, including NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue {
    /// NULL value.
    Null,
    /// `bool`
    Bool(bool),
    /// `int2`
    Int2(i16),
    /// `int4`
    Int4(i32),
    /// `int8`
    Int8(i64),
    /// `oid`
    Oid(u32),
    /// `float4`
    Float4(f32),
    /// `float8`
    Float8(f64),
    /// `numeric`
    Numeric(Decimal),
    /// Character types (`text`, `varchar`, `bpchar`, `name`, `"char"`).
    Text(String),
    /// `bytea`
    Bytea(Bytes),
    /// `uuid`
    Uuid(Uuid),
    /// `date`
    Date(NaiveDate),
    /// `time`
    Time(NaiveTime),
    /// `timestamp`
    Timestamp(NaiveDateTime),
    /// `timestamptz`
    TimestampTz(DateTime<Utc>),
    /// `json` or `jsonb`
    Json(serde_json::Value),
    /// One-dimensional array.
    Array {
        /// Element type code.
        element: Oid,
        /// Elements in order; NULL elements are [`PgValue::Null`].
        items: Vec<PgValue>,
    },
}

impl PgValue {
    /// Check if the value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Type code the value is sent as.
    ///
    /// NULL is sent untyped so the server infers the parameter type.
    #[must_use]
    pub fn oid(&self) -> Oid {
        match self {
            Self::Null => Oid::UNSPECIFIED,
            Self::Bool(_) => Oid::BOOL,
            Self::Int2(_) => Oid::INT2,
            Self::Int4(_) => Oid::INT4,
            Self::Int8(_) => Oid::INT8,
            Self::Oid(_) => Oid::OID,
            Self::Float4(_) => Oid::FLOAT4,
            Self::Float8(_) => Oid::FLOAT8,
            Self::Numeric(_) => Oid::NUMERIC,
            Self::Text(_) => Oid::TEXT,
            Self::Bytea(_) => Oid::BYTEA,
            Self::Uuid(_) => Oid::UUID,
            Self::Date(_) => Oid::DATE,
            Self::Time(_) => Oid::TIME,
            Self::Timestamp(_) => Oid::TIMESTAMP,
            Self::TimestampTz(_) => Oid::TIMESTAMPTZ,
            Self::Json(_) => Oid::JSONB,
            Self::Array { element, .. } => {
                registry::array_type_of_element(*element).unwrap_or(Oid::UNSPECIFIED)
            }
        }
    }

    /// Name of the value's type, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Array { .. } => "array",
            other => registry::lookup(other.oid()).map_or("unknown", |d| d.name),
        }
    }

    /// Write the binary form of a non-NULL value, without a length prefix.
    ///
    /// NULL writes nothing.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), TypeError> {
        match self {
            Self::Null => {}
            Self::Bool(v) => v.encode_element(dst),
            Self::Int2(v) => v.encode_element(dst),
            Self::Int4(v) => v.encode_element(dst),
            Self::Int8(v) => v.encode_element(dst),
            Self::Oid(v) => v.encode_element(dst),
            Self::Float4(v) => v.encode_element(dst),
            Self::Float8(v) => v.encode_element(dst),
            Self::Numeric(v) => v.encode_element(dst),
            Self::Text(v) => dst.put_slice(v.as_bytes()),
            Self::Bytea(v) => v.encode_element(dst),
            Self::Uuid(v) => v.encode_element(dst),
            Self::Date(v) => v.encode_element(dst),
            Self::Time(v) => v.encode_element(dst),
            Self::Timestamp(v) => v.encode_element(dst),
            Self::TimestampTz(v) => v.encode_element(dst),
            Self::Json(v) => v.encode_element(dst),
            Self::Array { element, items } => {
                if registry::array_type_of_element(*element).is_none() {
                    return Err(TypeError::UnsupportedType(*element));
                }
                let has_null = items.iter().any(PgValue::is_null);
                write_array_header(dst, *element, items.len(), has_null)?;
                for item in items {
                    if item.is_null() {
                        dst.put_i32(-1);
                        continue;
                    }
                    if item.oid() != *element {
                        return Err(TypeError::MixedArray {
                            expected: *element,
                            actual: item.oid(),
                        });
                    }
                    write_length_prefixed(dst, |buf| item.encode(buf))?;
                }
            }
        }
        Ok(())
    }

    /// Encode as a bind parameter; NULL becomes `None`.
    pub fn to_param(&self) -> Result<Option<Bytes>, TypeError> {
        if self.is_null() {
            return Ok(None);
        }
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(Some(buf.freeze()))
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PgValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i16 => Int2,
    i32 => Int4,
    i64 => Int8,
    u32 => Oid,
    f32 => Float4,
    f64 => Float8,
    Decimal => Numeric,
    String => Text,
    Bytes => Bytea,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    serde_json::Value => Json,
}

impl From<&str> for PgValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for PgValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytea(Bytes::from(v))
    }
}

impl<T: Into<PgValue>> From<Option<T>> for PgValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<T: PgProtocol + Into<PgValue>> From<Vec<T>> for PgValue {
    fn from(v: Vec<T>) -> Self {
        Self::Array {
            element: T::ELEMENT_OID,
            items: v.into_iter().map(Into::into).collect(),
        }
    }
}
