//! Binary `numeric` codec.
//!
//! The wire form is a header of four 16-bit fields followed by base-10000
//! digit groups, most significant first:
//!
//! | Field | Type | Meaning |
//! |-------|------|---------|
//! | ndigits | i16 | number of groups that follow |
//! | weight | i16 | power of 10000 of the first group |
//! | sign | u16 | `0x0000`, `0x4000`, or a special value |
//! | dscale | u16 | decimal digits after the point |
//!
//! The value is `sum(group[i] * 10000^(weight - i))`. NaN and infinities have
//! no [`Decimal`] equivalent and decode to `None`.

use bytes::{BufMut, BytesMut};
use rust_decimal::Decimal;
use smallvec::SmallVec;

/// Sign of a positive value.
pub const NUMERIC_POS: u16 = 0x0000;
/// Sign of a negative value.
pub const NUMERIC_NEG: u16 = 0x4000;
/// Not-a-number.
pub const NUMERIC_NAN: u16 = 0xC000;
/// Positive infinity.
pub const NUMERIC_PINF: u16 = 0xD000;
/// Negative infinity.
pub const NUMERIC_NINF: u16 = 0xF000;

/// Header size in bytes.
pub const NUMERIC_HEADER_SIZE: usize = 8;

/// Largest scale a [`Decimal`] can carry.
pub const MAX_SCALE: u32 = 28;

/// Most groups that can contribute to a 96-bit mantissa.
const MAX_GROUPS: usize = 8;

const NBASE: u128 = 10_000;

/// Largest 96-bit mantissa.
const MAX_MANTISSA: u128 = (1 << 96) - 1;

/// A numeric value split into its wire fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericDigits {
    /// Power of 10000 of the first group.
    pub weight: i16,
    /// Sign flag.
    pub sign: u16,
    /// Display scale.
    pub dscale: u16,
    /// Base-10000 groups, most significant first, without leading or
    /// trailing zero groups.
    pub groups: SmallVec<[i16; MAX_GROUPS]>,
}

impl NumericDigits {
    /// Split a decimal into wire groups.
    #[must_use]
    pub fn from_decimal(value: &Decimal) -> Self {
        let scale = value.scale();
        let mut mantissa = value.mantissa().unsigned_abs();
        let sign = if value.is_sign_negative() && mantissa != 0 {
            NUMERIC_NEG
        } else {
            NUMERIC_POS
        };

        // collected least significant first
        let mut groups: SmallVec<[i16; MAX_GROUPS]> = SmallVec::new();
        let partial = scale % 4;
        if partial != 0 {
            let divisor = 10u128.pow(partial);
            let rest = mantissa % divisor;
            mantissa /= divisor;
            groups.push((rest * 10u128.pow(4 - partial)) as i16);
        }
        while mantissa > 0 {
            groups.push((mantissa % NBASE) as i16);
            mantissa /= NBASE;
        }

        let fraction_groups = scale.div_ceil(4) as i16;
        let mut weight = groups.len() as i16 - fraction_groups - 1;
        groups.reverse();

        while groups.last() == Some(&0) {
            groups.pop();
        }
        let leading = groups.iter().take_while(|g| **g == 0).count();
        if leading > 0 {
            groups.drain(..leading);
            weight -= leading as i16;
        }
        if groups.is_empty() {
            weight = 0;
        }

        Self {
            weight,
            sign,
            dscale: scale as u16,
            groups,
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn binary_length(&self) -> usize {
        NUMERIC_HEADER_SIZE + 2 * self.groups.len()
    }

    /// Write the wire form.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_i16(self.groups.len() as i16);
        dst.put_i16(self.weight);
        dst.put_u16(self.sign);
        dst.put_u16(self.dscale);
        for group in &self.groups {
            dst.put_i16(*group);
        }
    }
}

/// Encode a decimal in binary `numeric` form.
pub fn encode_numeric(value: &Decimal, dst: &mut BytesMut) {
    NumericDigits::from_decimal(value).encode(dst);
}

/// Encoded size of a decimal in binary `numeric` form.
#[must_use]
pub fn numeric_binary_length(value: &Decimal) -> usize {
    NumericDigits::from_decimal(value).binary_length()
}

/// Decode a binary `numeric` value.
///
/// Returns `None` for NaN, infinities, malformed input, and values with
/// more significant groups than a 96-bit mantissa can hold. The scale is
/// capped at 28; extra fractional digits are truncated. Magnitudes beyond
/// the 96-bit mantissa clamp to [`Decimal::MAX`] or [`Decimal::MIN`].
#[must_use]
pub fn decode_numeric(raw: &[u8]) -> Option<Decimal> {
    if raw.len() < NUMERIC_HEADER_SIZE {
        return None;
    }
    let field = |i: usize| [raw[i], raw[i + 1]];
    let ndigits = i16::from_be_bytes(field(0));
    let weight = i32::from(i16::from_be_bytes(field(2)));
    let sign = u16::from_be_bytes(field(4));
    let dscale = u16::from_be_bytes(field(6));

    let negative = match sign {
        NUMERIC_POS => false,
        NUMERIC_NEG => true,
        _ => return None,
    };
    let ndigits = usize::try_from(ndigits).ok()?;
    if raw.len() != NUMERIC_HEADER_SIZE + 2 * ndigits {
        return None;
    }

    let mut groups = raw[NUMERIC_HEADER_SIZE..]
        .chunks_exact(2)
        .map(|c| i16::from_be_bytes([c[0], c[1]]));

    let kept = ndigits.min(MAX_GROUPS);
    let mut mantissa: u128 = 0;
    for group in groups.by_ref().take(kept) {
        if !(0..10_000).contains(&group) {
            return None;
        }
        mantissa = mantissa * NBASE + group as u128;
    }
    let excess = ndigits > MAX_GROUPS;
    if excess && groups.any(|g| g != 0) {
        return None;
    }

    let scale = u32::from(dscale).min(MAX_SCALE);
    if mantissa == 0 {
        return Decimal::try_from_i128_with_scale(0, scale).ok();
    }
    // value = mantissa * 10^exponent
    let exponent = 4 * (weight - kept as i32 + 1);
    let shift = exponent + scale as i32;

    let clamped = if negative { Decimal::MIN } else { Decimal::MAX };
    if shift >= 0 {
        let factor = 10u128.checked_pow(shift as u32);
        match factor.and_then(|f| mantissa.checked_mul(f)) {
            Some(m) if m <= MAX_MANTISSA => mantissa = m,
            _ => return Some(clamped),
        }
    } else {
        let divisor = 10u128.checked_pow(shift.unsigned_abs());
        match divisor {
            Some(d) => {
                if excess && mantissa % d != 0 {
                    return None;
                }
                mantissa /= d;
            }
            None => {
                if excess && mantissa != 0 {
                    return None;
                }
                mantissa = 0;
            }
        }
        if mantissa > MAX_MANTISSA {
            return Some(clamped);
        }
    }

    let signed = if negative {
        -(mantissa as i128)
    } else {
        mantissa as i128
    };
    Decimal::try_from_i128_with_scale(signed, scale).ok()
}
