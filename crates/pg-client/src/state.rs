//! Connection wire state.
//!
//! A connection is only ever driven by one task at a time, but a result
//! stream or transaction can be abandoned part way through. The wire state
//! records how far the last exchange got so the next user can bring the
//! session back to a ReadyForQuery boundary before writing.
//!
//! ## State Transitions
//!
//! ```text
//! Ready -> Poisoned (request is being written)
//! Poisoned -> AwaitingResponse (request fully flushed)
//! AwaitingResponse -> Ready (ReadyForQuery received)
//! AwaitingResponse -> Draining (result stream dropped before completion)
//! Draining -> Ready (remaining messages discarded up to ReadyForQuery)
//! any -> Poisoned (transport or protocol failure)
//! ```

/// Wire state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolState {
    /// At a ReadyForQuery boundary; a new request may be written.
    #[default]
    Ready,
    /// A request was sent and its response has not been fully read.
    AwaitingResponse,
    /// The consumer of a response went away; the rest must be discarded.
    Draining,
    /// A write was interrupted or the stream is desynchronized.
    ///
    /// No further requests can be sent on this connection.
    Poisoned,
}

impl ProtocolState {
    /// Check if the connection can still be used, possibly after a drain.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Poisoned)
    }

    /// Check if a response is still pending on the wire.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::AwaitingResponse | Self::Draining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_flags() {
        assert!(ProtocolState::Ready.is_usable());
        assert!(!ProtocolState::Ready.is_busy());
        assert!(ProtocolState::Draining.is_usable());
        assert!(ProtocolState::Draining.is_busy());
        assert!(ProtocolState::AwaitingResponse.is_busy());
        assert!(!ProtocolState::Poisoned.is_usable());
        assert!(!ProtocolState::Poisoned.is_busy());
    }

    #[test]
    fn test_default_is_ready() {
        assert_eq!(ProtocolState::default(), ProtocolState::Ready);
    }
}
