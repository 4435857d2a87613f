//! Type conversion error types.

use pg_protocol::Oid;
use thiserror::Error;

/// Errors that can occur while encoding values for the wire.
///
/// Decoding never produces these: a value that cannot be read as the
/// requested type yields no value instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TypeError {
    /// Value does not fit the wire length field.
    #[error("value too large: {len} bytes")]
    ValueTooLarge {
        /// Encoded length in bytes.
        len: usize,
    },

    /// Value is out of range for target type.
    #[error("value out of range for {target_type}")]
    OutOfRange {
        /// Target type name.
        target_type: &'static str,
    },

    /// Type code has no registered descriptor.
    #[error("unsupported type code {0}")]
    UnsupportedType(Oid),

    /// Array elements do not share one type.
    #[error("array element type mismatch: expected {expected}, got {actual}")]
    MixedArray {
        /// Element type of the array.
        expected: Oid,
        /// Type of the offending element.
        actual: Oid,
    },
}
