//! Codec error types.

use pg_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while framing backend messages.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// IO error on the underlying transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame exceeded the configured size limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Size of the frame, including its header.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Malformed frame or message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
