//! Client error types.

use pg_protocol::ErrorNotice;
use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Protocol violation in a backend message.
    #[error("protocol error: {0}")]
    Protocol(#[from] pg_protocol::ProtocolError),

    /// Framing or transport error.
    #[error("codec error: {0}")]
    Codec(#[from] pg_codec::CodecError),

    /// Parameter encoding error.
    #[error("type error: {0}")]
    Type(#[from] pg_types::TypeError),

    /// Server returned an error.
    #[error("server error {}: {}", .0.code, .0.message)]
    Server(Box<ErrorNotice>),

    /// The command was cancelled before its result was delivered.
    #[error("command cancelled")]
    Cancelled,

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection was left in an unknown wire state and cannot be used.
    #[error("connection is poisoned")]
    Poisoned,

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Invalid identifier passed where SQL text is built.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON projection failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if the connection that produced this error can no longer be used.
    ///
    /// Server errors are unrecoverable when the notice says so (fatal
    /// severity, shutdown codes, connection or system classes).
    #[must_use]
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            Self::Server(notice) => notice.is_unrecoverable(),
            Self::Poisoned
            | Self::ConnectionClosed
            | Self::Codec(_)
            | Self::Protocol(_)
            | Self::Io(_) => true,
            _ => false,
        }
    }

    /// Check if this error is transient and may succeed on retry.
    ///
    /// Transient errors include connection loss, serialization failures,
    /// deadlocks and insufficient resources.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionClosed | Self::Io(_) => true,
            Self::Server(notice) => {
                matches!(notice.code.as_str(), "40001" | "40P01") || notice.class() == "53"
            }
            _ => false,
        }
    }

    /// Check if this error indicates a protocol/driver bug.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_) | Self::Codec(pg_codec::CodecError::Protocol(_))
        )
    }

    /// SQLSTATE code if this is a server error.
    #[must_use]
    pub fn sqlstate(&self) -> Option<&str> {
        self.notice().map(|n| n.code.as_str())
    }

    /// Full server notice if this is a server error.
    #[must_use]
    pub fn notice(&self) -> Option<&ErrorNotice> {
        match self {
            Self::Server(notice) => Some(notice),
            _ => None,
        }
    }
}

impl From<ErrorNotice> for Error {
    fn from(notice: ErrorNotice) -> Self {
        Self::Server(Box::new(notice))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn server(code: &str, severity: &str) -> Error {
        let notice = ErrorNotice {
            code: code.into(),
            message: "boom".into(),
            severity: severity.into(),
            localized_severity: severity.into(),
            ..Default::default()
        };
        notice.into()
    }

    #[test]
    fn test_server_error_display() {
        let err = server("42P01", "ERROR");
        assert_eq!(err.to_string(), "server error 42P01: boom");
        assert_eq!(err.sqlstate(), Some("42P01"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(server("40001", "ERROR").is_transient());
        assert!(server("40P01", "ERROR").is_transient());
        assert!(server("53200", "ERROR").is_transient());
        assert!(!server("23505", "ERROR").is_transient());
        assert!(Error::ConnectionClosed.is_transient());
        assert!(!Error::Cancelled.is_transient());
    }

    #[test]
    fn test_unrecoverable_classification() {
        assert!(server("57P01", "FATAL").is_unrecoverable());
        assert!(server("08006", "ERROR").is_unrecoverable());
        assert!(!server("22012", "ERROR").is_unrecoverable());
        assert!(Error::Poisoned.is_unrecoverable());
        assert!(!Error::Cancelled.is_unrecoverable());
        assert!(Error::Cancelled.is_cancelled());
    }
}
