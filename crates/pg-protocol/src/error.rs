//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding or encoding wire messages.
///
/// Every variant is a protocol violation: the byte stream no longer matches
/// the framing rules and the connection it came from must not be reused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Input ended before a complete structure could be read.
    #[error("unexpected end of message")]
    UnexpectedEof,

    /// A message declared a length that cannot be valid.
    #[error("invalid message length {length} for '{tag}'")]
    InvalidLength {
        /// Message tag as a character.
        tag: char,
        /// Declared length, including the length field itself.
        length: i64,
    },

    /// A message body was not fully consumed, or was too short.
    #[error("message '{tag}' length mismatch: {remaining} bytes left over")]
    LengthMismatch {
        /// Message tag as a character.
        tag: char,
        /// Unconsumed bytes.
        remaining: usize,
    },

    /// A row description announced more columns than the wire allows.
    #[error("too many columns: {count} (max {max})")]
    TooManyColumns {
        /// Announced column count.
        count: usize,
        /// Wire limit.
        max: usize,
    },

    /// A data row disagrees with its row description.
    #[error("column count mismatch: description has {expected}, row has {actual}")]
    ColumnCountMismatch {
        /// Columns in the row description.
        expected: usize,
        /// Columns announced by the data row.
        actual: usize,
    },

    /// A column value declared an impossible length.
    #[error("invalid column length {length} ({remaining} bytes remaining in row)")]
    InvalidColumnLength {
        /// Declared length.
        length: i32,
        /// Bytes left in the row when the length was read.
        remaining: usize,
    },

    /// A data row still had bytes after its last column.
    #[error("data row has {0} trailing bytes")]
    TrailingRowData(usize),

    /// A string field was not NUL-terminated.
    #[error("missing string terminator")]
    MissingTerminator,

    /// A field held a value outside its legal range.
    #[error("invalid {field}: {value}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: i64,
    },

    /// A message was received that is not legal in the current state.
    #[error("unexpected message '{0}'")]
    UnexpectedMessage(char),
}
