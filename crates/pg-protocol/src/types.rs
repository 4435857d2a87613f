//! Type codes as they appear in row descriptions and array headers.

use std::fmt;

/// A server type code (object identifier).
///
/// Type codes are 32-bit unsigned values assigned by the server catalog.
/// Only the built-in codes the driver understands are named here; any
/// other value is still representable and simply unsupported downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Oid(pub u32);

impl Oid {
    /// Unspecified type; lets the server infer a parameter type.
    pub const UNSPECIFIED: Oid = Oid(0);

    /// `bool`
    pub const BOOL: Oid = Oid(16);
    /// `bytea`
    pub const BYTEA: Oid = Oid(17);
    /// `"char"` (single byte)
    pub const CHAR: Oid = Oid(18);
    /// `name` (identifier)
    pub const NAME: Oid = Oid(19);
    /// `int8`
    pub const INT8: Oid = Oid(20);
    /// `int2`
    pub const INT2: Oid = Oid(21);
    /// `int4`
    pub const INT4: Oid = Oid(23);
    /// `text`
    pub const TEXT: Oid = Oid(25);
    /// `oid`
    pub const OID: Oid = Oid(26);
    /// `json`
    pub const JSON: Oid = Oid(114);
    /// `float4`
    pub const FLOAT4: Oid = Oid(700);
    /// `float8`
    pub const FLOAT8: Oid = Oid(701);
    /// `bpchar` (blank-padded char(n))
    pub const BPCHAR: Oid = Oid(1042);
    /// `varchar`
    pub const VARCHAR: Oid = Oid(1043);
    /// `date`
    pub const DATE: Oid = Oid(1082);
    /// `time`
    pub const TIME: Oid = Oid(1083);
    /// `timestamp`
    pub const TIMESTAMP: Oid = Oid(1114);
    /// `timestamptz`
    pub const TIMESTAMPTZ: Oid = Oid(1184);
    /// `numeric`
    pub const NUMERIC: Oid = Oid(1700);
    /// `uuid`
    pub const UUID: Oid = Oid(2950);
    /// `jsonb`
    pub const JSONB: Oid = Oid(3802);

    /// `json[]`
    pub const JSON_ARRAY: Oid = Oid(199);
    /// `bool[]`
    pub const BOOL_ARRAY: Oid = Oid(1000);
    /// `bytea[]`
    pub const BYTEA_ARRAY: Oid = Oid(1001);
    /// `"char"[]`
    pub const CHAR_ARRAY: Oid = Oid(1002);
    /// `name[]`
    pub const NAME_ARRAY: Oid = Oid(1003);
    /// `int2[]`
    pub const INT2_ARRAY: Oid = Oid(1005);
    /// `int4[]`
    pub const INT4_ARRAY: Oid = Oid(1007);
    /// `text[]`
    pub const TEXT_ARRAY: Oid = Oid(1009);
    /// `bpchar[]`
    pub const BPCHAR_ARRAY: Oid = Oid(1014);
    /// `varchar[]`
    pub const VARCHAR_ARRAY: Oid = Oid(1015);
    /// `int8[]`
    pub const INT8_ARRAY: Oid = Oid(1016);
    /// `float4[]`
    pub const FLOAT4_ARRAY: Oid = Oid(1021);
    /// `float8[]`
    pub const FLOAT8_ARRAY: Oid = Oid(1022);
    /// `oid[]`
    pub const OID_ARRAY: Oid = Oid(1028);
    /// `timestamp[]`
    pub const TIMESTAMP_ARRAY: Oid = Oid(1115);
    /// `date[]`
    pub const DATE_ARRAY: Oid = Oid(1182);
    /// `time[]`
    pub const TIME_ARRAY: Oid = Oid(1183);
    /// `timestamptz[]`
    pub const TIMESTAMPTZ_ARRAY: Oid = Oid(1185);
    /// `numeric[]`
    pub const NUMERIC_ARRAY: Oid = Oid(1231);
    /// `uuid[]`
    pub const UUID_ARRAY: Oid = Oid(2951);
    /// `jsonb[]`
    pub const JSONB_ARRAY: Oid = Oid(3807);

    /// Raw numeric value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Check if this is an integer type.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::INT2 | Self::INT4 | Self::INT8 | Self::OID)
    }

    /// Check if this is a floating point type.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::FLOAT4 | Self::FLOAT8)
    }

    /// Check if this type is a character string on the wire.
    #[must_use]
    pub const fn is_text(self) -> bool {
        matches!(
            self,
            Self::TEXT | Self::VARCHAR | Self::BPCHAR | Self::NAME | Self::CHAR
        )
    }

    /// Check if this is an integer, float or numeric type.
    #[must_use]
    pub const fn is_numeric_family(self) -> bool {
        self.is_integer() || self.is_float() || matches!(self, Self::NUMERIC)
    }
}

impl From<u32> for Oid {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value format code used in Bind and RowDescription messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum FormatCode {
    /// Text representation.
    Text = 0,
    /// Binary representation.
    Binary = 1,
}
