//! JSON projection of data rows.
//!
//! Rows are written as a map of column name to value straight into any
//! [`serde::Serializer`]. Each column is read through the typed accessor
//! matching its declared type code, so no intermediate row value is built.
//!
//! | Server Type | JSON |
//! |-------------|------|
//! | `bool` | boolean |
//! | integers, `oid` | number |
//! | `float4`/`float8` | number (`null` for NaN and infinities) |
//! | `numeric` | string, full precision |
//! | text types | string |
//! | `bytea` | string, `\x` followed by hex digits |
//! | `uuid` | string |
//! | `date`/`time`/`timestamp`/`timestamptz` | ISO-8601 string |
//! | `json`/`jsonb` | embedded JSON |
//! | arrays of the above | array |
//!
//! SQL NULL, multi-dimensional arrays and unsupported types are written as
//! `null`.

use std::fmt::Write as _;
use std::io;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use pg_protocol::{Oid, ProtocolError};
use pg_types::PgProtocol;
use rust_decimal::Decimal;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::error::Result;
use crate::row::DataRow;

/// One projected column value.
#[derive(Debug, Clone, PartialEq)]
enum JsonCell {
    Null,
    Bool(bool),
    Int(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Json(serde_json::Value),
    Array(Vec<JsonCell>),
}

impl Serialize for JsonCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::F32(v) => serializer.serialize_f32(*v),
            Self::F64(v) => serializer.serialize_f64(*v),
            Self::Str(v) => serializer.serialize_str(v),
            Self::Json(v) => v.serialize(serializer),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// Whether a column is read as one value or as array elements.
trait Shape {
    fn read<T: PgProtocol>(
        row: &mut DataRow<'_>,
        convert: fn(T) -> JsonCell,
    ) -> std::result::Result<JsonCell, ProtocolError>;
}

struct Scalar;

impl Shape for Scalar {
    fn read<T: PgProtocol>(
        row: &mut DataRow<'_>,
        convert: fn(T) -> JsonCell,
    ) -> std::result::Result<JsonCell, ProtocolError> {
        Ok(row.get::<T>().map_or(JsonCell::Null, convert))
    }
}

struct Elements;

impl Shape for Elements {
    fn read<T: PgProtocol>(
        row: &mut DataRow<'_>,
        convert: fn(T) -> JsonCell,
    ) -> std::result::Result<JsonCell, ProtocolError> {
        let Some(elements) = row.get_array::<T>() else {
            return Ok(JsonCell::Null);
        };
        let mut items = Vec::with_capacity(elements.len());
        for element in elements {
            items.push(element?.map_or(JsonCell::Null, convert));
        }
        Ok(JsonCell::Array(items))
    }
}

fn hex(bytes: Bytes) -> JsonCell {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in &bytes {
        let _ = write!(out, "{b:02x}");
    }
    JsonCell::Str(out)
}

fn project<S: Shape>(row: &mut DataRow<'_>, oid: Oid) -> std::result::Result<JsonCell, ProtocolError> {
    match oid {
        Oid::BOOL => S::read::<bool>(row, JsonCell::Bool),
        Oid::INT2 | Oid::INT4 | Oid::INT8 | Oid::OID => S::read::<i64>(row, JsonCell::Int),
        Oid::FLOAT4 => S::read::<f32>(row, JsonCell::F32),
        Oid::FLOAT8 => S::read::<f64>(row, JsonCell::F64),
        Oid::NUMERIC => S::read::<Decimal>(row, |v| JsonCell::Str(v.to_string())),
        Oid::BYTEA => S::read::<Bytes>(row, hex),
        Oid::UUID => S::read::<Uuid>(row, |v| JsonCell::Str(v.to_string())),
        Oid::DATE => S::read::<NaiveDate>(row, |v| JsonCell::Str(v.format("%Y-%m-%d").to_string())),
        Oid::TIME => S::read::<NaiveTime>(row, |v| JsonCell::Str(v.format("%H:%M:%S%.f").to_string())),
        Oid::TIMESTAMP => S::read::<NaiveDateTime>(row, |v| {
            JsonCell::Str(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }),
        Oid::TIMESTAMPTZ => S::read::<DateTime<Utc>>(row, |v| JsonCell::Str(v.to_rfc3339())),
        Oid::JSON | Oid::JSONB => S::read::<serde_json::Value>(row, JsonCell::Json),
        oid if oid.is_text() => S::read::<String>(row, JsonCell::Str),
        _ => {
            row.skip();
            Ok(JsonCell::Null)
        }
    }
}

fn read_cell(row: &mut DataRow<'_>) -> std::result::Result<JsonCell, ProtocolError> {
    let column = *row.column();
    if column.is_null() {
        return Ok(JsonCell::Null);
    }
    if column.is_array() {
        return project::<Elements>(row, column.element_oid());
    }
    project::<Scalar>(row, column.type_oid())
}

/// Serialize the remaining columns of `row` as a map of name to value.
///
/// The row should be positioned before its first column. Protocol errors
/// surface as serializer errors.
pub fn write_json<S: Serializer>(
    row: &mut DataRow<'_>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(row.len()))?;
    while row.move_next().map_err(S::Error::custom)? {
        let name = row.name();
        let cell = read_cell(row).map_err(S::Error::custom)?;
        map.serialize_entry(name, &cell)?;
    }
    map.end()
}

/// Project a row into a JSON object.
pub fn to_json(row: &mut DataRow<'_>) -> Result<serde_json::Value> {
    Ok(write_json(row, serde_json::value::Serializer)?)
}

/// Write a row as JSON text to `writer`.
pub fn write_json_to<W: io::Write>(row: &mut DataRow<'_>, writer: W) -> Result<()> {
    let mut serializer = serde_json::Serializer::new(writer);
    write_json(row, &mut serializer)?;
    Ok(())
}

/// Project a row into JSON text.
pub fn to_json_string(row: &mut DataRow<'_>) -> Result<String> {
    Ok(to_json(row)?.to_string())
}
