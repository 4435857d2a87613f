//! Typed binary codecs for Rust target types.
//!
//! [`PgProtocol`] ties a Rust type to the scalar and array type codes it is
//! sent as, and describes which declared column types it can be read from.
//! Numeric targets read from any integer, float or `numeric` column; the
//! conversion truncates toward zero and then wraps to the target width, so a
//! read never fails once the declared type is accepted.

// Allow expect() for chrono construction of the fixed 2000-01-01 epoch
#![allow(clippy::expect_used)]

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use pg_protocol::Oid;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use uuid::Uuid;

use crate::numeric::{decode_numeric, encode_numeric, numeric_binary_length};
use crate::registry;

/// Version byte that prefixes binary `jsonb` values.
pub const JSONB_VERSION: u8 = 1;

/// Binary codec between a Rust type and server values.
pub trait PgProtocol: Sized {
    /// Scalar type code this type is sent as.
    const ELEMENT_OID: Oid;

    /// Array type code for arrays of this type.
    const ARRAY_OID: Oid;

    /// Check if a value declared as `oid` can be read as this type.
    fn can_convert_element(oid: Oid) -> bool {
        oid == Self::ELEMENT_OID
    }

    /// Check if an array declared as `array_oid` can be read as elements of
    /// this type.
    fn can_convert_array(array_oid: Oid) -> bool {
        Self::element_type_of_array(array_oid).is_some_and(Self::can_convert_element)
    }

    /// Element type code of an array type code.
    fn element_type_of_array(array_oid: Oid) -> Option<Oid> {
        registry::element_type_of_array(array_oid)
    }

    /// Read one value of declared type `oid` and binary length `len`.
    ///
    /// Exactly `len` bytes are consumed from `buf` whether or not a value is
    /// produced.
    fn decode_element(oid: Oid, len: usize, buf: &mut Bytes) -> Option<Self> {
        let take = len.min(buf.len());
        let raw = buf.split_to(take);
        if take < len {
            return None;
        }
        Self::from_binary(oid, &raw)
    }

    /// Convert a complete binary value of declared type `oid`.
    fn from_binary(oid: Oid, raw: &[u8]) -> Option<Self>;

    /// Write the binary form of this value, without a length prefix.
    fn encode_element(&self, dst: &mut BytesMut);

    /// Length of the binary form written by [`encode_element`](Self::encode_element).
    fn element_binary_length(&self) -> usize;
}

fn fixed<const N: usize>(raw: &[u8]) -> Option<[u8; N]> {
    raw.try_into().ok()
}

/// Read any integer, float or numeric value as a wide integer.
///
/// Floats and numerics truncate toward zero; NaN reads as 0.
fn integer_source(oid: Oid, raw: &[u8]) -> Option<i128> {
    match oid {
        Oid::INT2 => fixed(raw).map(|b| i128::from(i16::from_be_bytes(b))),
        Oid::INT4 => fixed(raw).map(|b| i128::from(i32::from_be_bytes(b))),
        Oid::INT8 => fixed(raw).map(|b| i128::from(i64::from_be_bytes(b))),
        Oid::OID => fixed(raw).map(|b| i128::from(u32::from_be_bytes(b))),
        Oid::FLOAT4 => fixed(raw).map(|b| f32::from_be_bytes(b).trunc() as i128),
        Oid::FLOAT8 => fixed(raw).map(|b| f64::from_be_bytes(b).trunc() as i128),
        Oid::NUMERIC => decode_numeric(raw).map(|d| d.trunc().normalize().mantissa()),
        _ => None,
    }
}

fn float_source(oid: Oid, raw: &[u8]) -> Option<f64> {
    match oid {
        Oid::FLOAT4 => fixed(raw).map(|b| f64::from(f32::from_be_bytes(b))),
        Oid::FLOAT8 => fixed(raw).map(f64::from_be_bytes),
        Oid::NUMERIC => decode_numeric(raw).and_then(|d| d.to_f64()),
        _ => integer_source(oid, raw).map(|v| v as f64),
    }
}

fn decimal_source(oid: Oid, raw: &[u8]) -> Option<Decimal> {
    match oid {
        Oid::NUMERIC => decode_numeric(raw),
        Oid::FLOAT4 => fixed(raw).and_then(|b| Decimal::from_f32(f32::from_be_bytes(b))),
        Oid::FLOAT8 => fixed(raw).and_then(|b| Decimal::from_f64(f64::from_be_bytes(b))),
        _ => integer_source(oid, raw).and_then(Decimal::from_i128),
    }
}

macro_rules! impl_integer {
    ($ty:ty, $elem:expr, $array:expr) => {
        impl PgProtocol for $ty {
            const ELEMENT_OID: Oid = $elem;
            const ARRAY_OID: Oid = $array;

            fn can_convert_element(oid: Oid) -> bool {
                oid.is_numeric_family()
            }

            fn from_binary(oid: Oid, raw: &[u8]) -> Option<Self> {
                // wraps like a two's-complement narrowing cast
                integer_source(oid, raw).map(|v| v as $ty)
            }

            fn encode_element(&self, dst: &mut BytesMut) {
                dst.put_slice(&self.to_be_bytes());
            }

            fn element_binary_length(&self) -> usize {
                std::mem::size_of::<$ty>()
            }
        }
    };
}

impl_integer!(i16, Oid::INT2, Oid::INT2_ARRAY);
impl_integer!(i32, Oid::INT4, Oid::INT4_ARRAY);
impl_integer!(i64, Oid::INT8, Oid::INT8_ARRAY);
impl_integer!(u32, Oid::OID, Oid::OID_ARRAY);

impl PgProtocol for f32 {
    const ELEMENT_OID: Oid = Oid::FLOAT4;
    const ARRAY_OID: Oid = Oid::FLOAT4_ARRAY;

    fn can_convert_element(oid: Oid) -> bool {
        oid.is_numeric_family()
    }

    fn from_binary(oid: Oid, raw: &[u8]) -> Option<Self> {
        match oid {
            Oid::FLOAT4 => fixed(raw).map(f32::from_be_bytes),
            _ => float_source(oid, raw).map(|v| v as f32),
        }
    }

    fn encode_element(&self, dst: &mut BytesMut) {
        dst.put_f32(*self);
    }

    fn element_binary_length(&self) -> usize {
        4
    }
}

impl PgProtocol for f64 {
    const ELEMENT_OID: Oid = Oid::FLOAT8;
    const ARRAY_OID: Oid = Oid::FLOAT8_ARRAY;

    fn can_convert_element(oid: Oid) -> bool {
        oid.is_numeric_family()
    }

    fn from_binary(oid: Oid, raw: &[u8]) -> Option<Self> {
        float_source(oid, raw)
    }

    fn encode_element(&self, dst: &mut BytesMut) {
        dst.put_f64(*self);
    }

    fn element_binary_length(&self) -> usize {
        8
    }
}

impl PgProtocol for Decimal {
    const ELEMENT_OID: Oid = Oid::NUMERIC;
    const ARRAY_OID: Oid = Oid::NUMERIC_ARRAY;

    fn can_convert_element(oid: Oid) -> bool {
        oid.is_numeric_family()
    }

    fn from_binary(oid: Oid, raw: &[u8]) -> Option<Self> {
        decimal_source(oid, raw)
    }

    fn encode_element(&self, dst: &mut BytesMut) {
        encode_numeric(self, dst);
    }

    fn element_binary_length(&self) -> usize {
        numeric_binary_length(self)
    }
}

impl PgProtocol for bool {
    const ELEMENT_OID: Oid = Oid::BOOL;
    const ARRAY_OID: Oid = Oid::BOOL_ARRAY;

    fn from_binary(oid: Oid, raw: &[u8]) -> Option<Self> {
        match (oid, raw) {
            (Oid::BOOL, [b]) => Some(*b != 0),
            _ => None,
        }
    }

    fn encode_element(&self, dst: &mut BytesMut) {
        dst.put_u8(u8::from(*self));
    }

    fn element_binary_length(&self) -> usize {
        1
    }
}

impl PgProtocol for String {
    const ELEMENT_OID: Oid = Oid::TEXT;
    const ARRAY_OID: Oid = Oid::TEXT_ARRAY;

    fn can_convert_element(oid: Oid) -> bool {
        oid.is_text() || matches!(oid, Oid::JSON | Oid::JSONB)
    }

    fn from_binary(oid: Oid, raw: &[u8]) -> Option<Self> {
        let text = match (oid, raw) {
            (Oid::JSONB, [JSONB_VERSION, rest @ ..]) => rest,
            (Oid::JSONB, _) => return None,
            _ => raw,
        };
        String::from_utf8(text.to_vec()).ok()
    }

    fn encode_element(&self, dst: &mut BytesMut) {
        dst.put_slice(self.as_bytes());
    }

    fn element_binary_length(&self) -> usize {
        self.len()
    }
}

impl PgProtocol for Vec<u8> {
    const ELEMENT_OID: Oid = Oid::BYTEA;
    const ARRAY_OID: Oid = Oid::BYTEA_ARRAY;

    fn from_binary(oid: Oid, raw: &[u8]) -> Option<Self> {
        (oid == Oid::BYTEA).then(|| raw.to_vec())
    }

    fn encode_element(&self, dst: &mut BytesMut) {
        dst.put_slice(self);
    }

    fn element_binary_length(&self) -> usize {
        self.len()
    }
}

impl PgProtocol for Bytes {
    const ELEMENT_OID: Oid = Oid::BYTEA;
    const ARRAY_OID: Oid = Oid::BYTEA_ARRAY;

    fn decode_element(oid: Oid, len: usize, buf: &mut Bytes) -> Option<Self> {
        let take = len.min(buf.len());
        let raw = buf.split_to(take);
        (take == len && oid == Oid::BYTEA).then_some(raw)
    }

    fn from_binary(oid: Oid, raw: &[u8]) -> Option<Self> {
        (oid == Oid::BYTEA).then(|| Bytes::copy_from_slice(raw))
    }

    fn encode_element(&self, dst: &mut BytesMut) {
        dst.put_slice(self);
    }

    fn element_binary_length(&self) -> usize {
        self.len()
    }
}

impl PgProtocol for Uuid {
    const ELEMENT_OID: Oid = Oid::UUID;
    const ARRAY_OID: Oid = Oid::UUID_ARRAY;

    fn from_binary(oid: Oid, raw: &[u8]) -> Option<Self> {
        if oid != Oid::UUID {
            return None;
        }
        fixed(raw).map(Uuid::from_bytes)
    }

    fn encode_element(&self, dst: &mut BytesMut) {
        dst.put_slice(self.as_bytes());
    }

    fn element_binary_length(&self) -> usize {
        16
    }
}

impl PgProtocol for serde_json::Value {
    const ELEMENT_OID: Oid = Oid::JSONB;
    const ARRAY_OID: Oid = Oid::JSONB_ARRAY;

    fn can_convert_element(oid: Oid) -> bool {
        matches!(oid, Oid::JSON | Oid::JSONB)
    }

    fn from_binary(oid: Oid, raw: &[u8]) -> Option<Self> {
        let text = match (oid, raw) {
            (Oid::JSONB, [JSONB_VERSION, rest @ ..]) => rest,
            (Oid::JSON, _) => raw,
            _ => return None,
        };
        serde_json::from_slice(text).ok()
    }

    fn encode_element(&self, dst: &mut BytesMut) {
        dst.put_u8(JSONB_VERSION);
        // Value serialization into a Vec cannot fail
        let text = serde_json::to_vec(self).unwrap_or_default();
        dst.put_slice(&text);
    }

    fn element_binary_length(&self) -> usize {
        1 + serde_json::to_vec(self).map_or(0, |v| v.len())
    }
}

// Date and time values count from 2000-01-01; the extreme values of the
// underlying integer stand for +/- infinity and have no chrono equivalent.

fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).expect("valid epoch date")
}

fn epoch() -> NaiveDateTime {
    epoch_date().and_hms_opt(0, 0, 0).expect("valid epoch time")
}

fn timestamp_from_micros(raw: &[u8]) -> Option<NaiveDateTime> {
    let micros = i64::from_be_bytes(fixed(raw)?);
    if micros == i64::MAX || micros == i64::MIN {
        return None;
    }
    epoch().checked_add_signed(Duration::microseconds(micros))
}

fn timestamp_to_micros(value: &NaiveDateTime) -> i64 {
    let micros = value.signed_duration_since(epoch()).num_microseconds();
    // beyond the i64 range reads back as infinity
    micros.unwrap_or(if *value > epoch() { i64::MAX } else { i64::MIN })
}

impl PgProtocol for NaiveDate {
    const ELEMENT_OID: Oid = Oid::DATE;
    const ARRAY_OID: Oid = Oid::DATE_ARRAY;

    fn from_binary(oid: Oid, raw: &[u8]) -> Option<Self> {
        if oid != Oid::DATE {
            return None;
        }
        let days = i32::from_be_bytes(fixed(raw)?);
        if days == i32::MAX || days == i32::MIN {
            return None;
        }
        epoch_date().checked_add_signed(Duration::days(i64::from(days)))
    }

    fn encode_element(&self, dst: &mut BytesMut) {
        let days = self.signed_duration_since(epoch_date()).num_days();
        dst.put_i32(days.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32);
    }

    fn element_binary_length(&self) -> usize {
        4
    }
}

impl PgProtocol for NaiveTime {
    const ELEMENT_OID: Oid = Oid::TIME;
    const ARRAY_OID: Oid = Oid::TIME_ARRAY;

    fn from_binary(oid: Oid, raw: &[u8]) -> Option<Self> {
        if oid != Oid::TIME {
            return None;
        }
        let micros = i64::from_be_bytes(fixed(raw)?);
        let secs = u32::try_from(micros.div_euclid(1_000_000)).ok()?;
        let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
        NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
    }

    fn encode_element(&self, dst: &mut BytesMut) {
        let micros = i64::from(self.num_seconds_from_midnight()) * 1_000_000
            + i64::from(self.nanosecond() / 1_000);
        dst.put_i64(micros);
    }

    fn element_binary_length(&self) -> usize {
        8
    }
}

impl PgProtocol for NaiveDateTime {
    const ELEMENT_OID: Oid = Oid::TIMESTAMP;
    const ARRAY_OID: Oid = Oid::TIMESTAMP_ARRAY;

    fn can_convert_element(oid: Oid) -> bool {
        matches!(oid, Oid::TIMESTAMP | Oid::TIMESTAMPTZ)
    }

    fn from_binary(oid: Oid, raw: &[u8]) -> Option<Self> {
        Self::can_convert_element(oid)
            .then(|| timestamp_from_micros(raw))
            .flatten()
    }

    fn encode_element(&self, dst: &mut BytesMut) {
        dst.put_i64(timestamp_to_micros(self));
    }

    fn element_binary_length(&self) -> usize {
        8
    }
}

impl PgProtocol for DateTime<Utc> {
    const ELEMENT_OID: Oid = Oid::TIMESTAMPTZ;
    const ARRAY_OID: Oid = Oid::TIMESTAMPTZ_ARRAY;

    fn can_convert_element(oid: Oid) -> bool {
        matches!(oid, Oid::TIMESTAMP | Oid::TIMESTAMPTZ)
    }

    fn from_binary(oid: Oid, raw: &[u8]) -> Option<Self> {
        NaiveDateTime::from_binary(oid, raw).map(|naive| naive.and_utc())
    }

    fn encode_element(&self, dst: &mut BytesMut) {
        dst.put_i64(timestamp_to_micros(&self.naive_utc()));
    }

    fn element_binary_length(&self) -> usize {
        8
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::approx_constant)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn roundtrip<T: PgProtocol + PartialEq + std::fmt::Debug>(value: T) {
        let mut buf = BytesMut::new();
        value.encode_element(&mut buf);
        assert_eq!(buf.len(), value.element_binary_length());
        let len = buf.len();
        let mut bytes = buf.freeze();
        let decoded = T::decode_element(T::ELEMENT_OID, len, &mut bytes).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(decoded, value);
    }

    fn be<T: PgProtocol>(value: T) -> Vec<u8> {
        let mut buf = BytesMut::new();
        value.encode_element(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn test_scalar_roundtrips() {
        roundtrip(true);
        roundtrip(-12i16);
        roundtrip(i32::MIN);
        roundtrip(i64::MAX);
        roundtrip(4_000_000_000u32);
        roundtrip(1.5f32);
        roundtrip(-2.25f64);
        roundtrip(Decimal::from_str("-12345.678").unwrap());
        roundtrip(String::from("héllo"));
        roundtrip(vec![0u8, 1, 255]);
        roundtrip(Bytes::from_static(b"\x00\xff"));
        roundtrip(Uuid::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0));
        roundtrip(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap());
        roundtrip(NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap());
        roundtrip(
            NaiveDate::from_ymd_opt(2024, 2, 29)
                .unwrap()
                .and_hms_micro_opt(12, 30, 0, 5)
                .unwrap(),
        );
        roundtrip(DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap());
        roundtrip(serde_json::json!({"a": [1, 2, null]}));
    }

    #[test]
    fn test_integer_narrowing_wraps() {
        let raw = be(70_000i32);
        assert_eq!(i16::from_binary(Oid::INT4, &raw), Some(70_000i32 as i16));

        let raw = be(-1i64);
        assert_eq!(u32::from_binary(Oid::INT8, &raw), Some(u32::MAX));
    }

    #[test]
    fn test_float_to_integer_truncates() {
        assert_eq!(i32::from_binary(Oid::FLOAT8, &be(-2.9f64)), Some(-2));
        assert_eq!(i64::from_binary(Oid::FLOAT4, &be(7.99f32)), Some(7));
        assert_eq!(i32::from_binary(Oid::FLOAT8, &be(f64::NAN)), Some(0));
        // truncated then wrapped to 16 bits
        assert_eq!(i16::from_binary(Oid::FLOAT8, &be(65_537.5f64)), Some(1));
    }

    #[test]
    fn test_numeric_to_integer_truncates() {
        let d = Decimal::from_str("-123.99").unwrap();
        assert_eq!(i32::from_binary(Oid::NUMERIC, &be(d)), Some(-123));
        let d = Decimal::from_str("100000.00").unwrap();
        assert_eq!(i16::from_binary(Oid::NUMERIC, &be(d)), Some(100_000i32 as i16));
    }

    #[test]
    fn test_cross_type_numeric_reads() {
        assert_eq!(f64::from_binary(Oid::INT2, &be(3i16)), Some(3.0));
        assert_eq!(
            f64::from_binary(Oid::NUMERIC, &be(Decimal::from_str("2.5").unwrap())),
            Some(2.5)
        );
        assert_eq!(
            Decimal::from_binary(Oid::INT8, &be(42i64)),
            Some(Decimal::from(42))
        );
        assert_eq!(
            Decimal::from_binary(Oid::FLOAT8, &be(0.25f64)),
            Some(Decimal::from_str("0.25").unwrap())
        );
        assert_eq!(Decimal::from_binary(Oid::FLOAT8, &be(f64::INFINITY)), None);
    }

    #[test]
    fn test_can_convert() {
        assert!(i16::can_convert_element(Oid::NUMERIC));
        assert!(f32::can_convert_element(Oid::INT8));
        assert!(!i32::can_convert_element(Oid::TEXT));
        assert!(String::can_convert_element(Oid::VARCHAR));
        assert!(String::can_convert_element(Oid::JSONB));
        assert!(!bool::can_convert_element(Oid::INT4));
        assert!(i64::can_convert_array(Oid::INT4_ARRAY));
        assert!(String::can_convert_array(Oid::BPCHAR_ARRAY));
        assert!(!String::can_convert_array(Oid::INT4_ARRAY));
        assert!(!i32::can_convert_array(Oid::INT4));
    }

    #[test]
    fn test_jsonb_version_prefix() {
        let raw = b"\x01{\"k\":1}";
        assert_eq!(String::from_binary(Oid::JSONB, raw).unwrap(), "{\"k\":1}");
        assert_eq!(
            serde_json::Value::from_binary(Oid::JSONB, raw).unwrap(),
            serde_json::json!({"k": 1})
        );
        assert_eq!(String::from_binary(Oid::JSONB, b"\x02{}"), None);
        assert_eq!(String::from_binary(Oid::JSON, b"{}").unwrap(), "{}");
    }

    #[test]
    fn test_temporal_infinity() {
        assert_eq!(NaiveDate::from_binary(Oid::DATE, &i32::MAX.to_be_bytes()), None);
        assert_eq!(
            NaiveDateTime::from_binary(Oid::TIMESTAMP, &i64::MIN.to_be_bytes()),
            None
        );
        assert_eq!(
            NaiveDate::from_binary(Oid::DATE, &0i32.to_be_bytes()),
            NaiveDate::from_ymd_opt(2000, 1, 1)
        );
    }

    #[test]
    fn test_decode_consumes_declared_length() {
        let mut buf = Bytes::from_static(b"\x00\x00\x00\x07tail");
        // wrong declared type: no value, bytes still consumed
        assert_eq!(bool::decode_element(Oid::INT4, 4, &mut buf), None);
        assert_eq!(&buf[..], b"tail");

        // declared length beyond the buffer
        let mut short = Bytes::from_static(b"\x00\x01");
        assert_eq!(i32::decode_element(Oid::INT4, 4, &mut short), None);
        assert!(short.is_empty());
    }
}
