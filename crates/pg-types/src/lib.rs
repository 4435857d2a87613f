//! # pg-types
//!
//! Binary codecs between PostgreSQL values and Rust types.
//!
//! This crate provides the [`PgProtocol`] trait implemented for each
//! supported Rust type, the type code [`registry`] that pairs scalar types
//! with their array types, the base-10000 `numeric` codec, and the dynamic
//! [`PgValue`] used for parameters and untyped reads.
//!
//! ## Type Mappings
//!
//! | Server Type | Rust Type |
//! |-------------|-----------|
//! | `bool` | `bool` |
//! | `int2` | `i16` |
//! | `int4` | `i32` |
//! | `int8` | `i64` |
//! | `oid` | `u32` |
//! | `float4` | `f32` |
//! | `float8` | `f64` |
//! | `numeric` | `rust_decimal::Decimal` |
//! | `text`/`varchar`/`bpchar`/`name`/`"char"` | `String` |
//! | `bytea` | `Vec<u8>`, `bytes::Bytes` |
//! | `uuid` | `uuid::Uuid` |
//! | `date` | `chrono::NaiveDate` |
//! | `time` | `chrono::NaiveTime` |
//! | `timestamp` | `chrono::NaiveDateTime` |
//! | `timestamptz` | `chrono::DateTime<Utc>` |
//! | `json`/`jsonb` | `serde_json::Value`, `String` |
//!
//! Integer, float and decimal targets accept any numeric source column,
//! truncating toward zero and wrapping to the target width.
//!
//! ## Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use pg_types::{decode_numeric, encode_numeric};
//! use rust_decimal::Decimal;
//!
//! let value = Decimal::new(12345678, 3);
//! let mut buf = BytesMut::new();
//! encode_numeric(&value, &mut buf);
//! assert_eq!(decode_numeric(&buf), Some(value));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod array;
pub mod error;
pub mod numeric;
pub mod protocol;
pub mod registry;
pub mod value;

pub use array::{ArrayHeader, array_binary_length, encode_array};
pub use error::TypeError;
pub use numeric::{NumericDigits, decode_numeric, encode_numeric, numeric_binary_length};
pub use protocol::PgProtocol;
pub use registry::TypeDescriptor;
pub use value::PgValue;
