//! Connection lifecycle management.
//!
//! This module defines the trait workers use to learn when a connection can
//! take its next command, and the per-connection bookkeeping the pool
//! reports through [`PoolStatus`](crate::pool::PoolStatus).

use std::time::Instant;

use pg_client::SharedConnection;

/// Trait for connection lifecycle management.
///
/// Uses native async traits (Rust 2024 Edition).
#[allow(async_fn_in_trait)]
pub trait ConnectionLifecycle: Send + Sync {
    /// Wait until no outcome holds the connection any more.
    async fn wait_released(&self);

    /// Check if the connection is free right now.
    fn is_released(&self) -> bool;

    /// Check if the connection is still valid for use.
    ///
    /// A connection that failed at the protocol or transport level is not.
    fn is_valid(&self) -> bool;
}

impl<T: Send> ConnectionLifecycle for SharedConnection<T> {
    async fn wait_released(&self) {
        SharedConnection::wait_released(self).await;
    }

    fn is_released(&self) -> bool {
        SharedConnection::is_released(self)
    }

    fn is_valid(&self) -> bool {
        SharedConnection::is_valid(self)
    }
}

/// Connection state tracked by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for a command.
    Idle,
    /// Running a command.
    Busy,
    /// A row stream or transaction handed out by the last command still
    /// holds the connection.
    Held,
    /// The connection failed and its worker stopped.
    Closed,
}

impl ConnectionState {
    /// Check if the connection can take a command.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Check if the connection is currently occupied.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy | Self::Held)
    }
}

/// Metadata about a pooled connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Unique identifier for this connection.
    pub id: usize,
    /// When the worker started.
    pub created_at: Instant,
    /// When the connection last started or finished a command.
    pub last_used_at: Instant,
    /// Commands run on this connection.
    pub command_count: u64,
    /// Current state of the connection.
    pub state: ConnectionState,
}

impl ConnectionMetadata {
    /// Create metadata for a new connection.
    pub fn new(id: usize) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_used_at: now,
            command_count: 0,
            state: ConnectionState::Idle,
        }
    }

    /// Mark the start of a command.
    pub fn mark_busy(&mut self) {
        self.last_used_at = Instant::now();
        self.command_count += 1;
        self.state = ConnectionState::Busy;
    }

    /// Mark the connection as held by a handed-out outcome.
    pub fn mark_held(&mut self) {
        self.state = ConnectionState::Held;
    }

    /// Mark the connection as waiting for work.
    pub fn mark_idle(&mut self) {
        self.last_used_at = Instant::now();
        self.state = ConnectionState::Idle;
    }

    /// Mark the connection as failed.
    pub fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_availability() {
        assert!(ConnectionState::Idle.is_available());
        assert!(!ConnectionState::Busy.is_available());
        assert!(!ConnectionState::Held.is_available());
        assert!(!ConnectionState::Closed.is_available());
    }

    #[test]
    fn test_connection_state_busy() {
        assert!(!ConnectionState::Idle.is_busy());
        assert!(ConnectionState::Busy.is_busy());
        assert!(ConnectionState::Held.is_busy());
        assert!(!ConnectionState::Closed.is_busy());
    }

    #[test]
    fn test_connection_metadata_transitions() {
        let mut meta = ConnectionMetadata::new(3);
        assert_eq!(meta.id, 3);
        assert_eq!(meta.state, ConnectionState::Idle);

        meta.mark_busy();
        assert_eq!(meta.command_count, 1);
        assert_eq!(meta.state, ConnectionState::Busy);

        meta.mark_held();
        assert_eq!(meta.state, ConnectionState::Held);

        meta.mark_idle();
        assert_eq!(meta.state, ConnectionState::Idle);
        assert_eq!(meta.command_count, 1);
    }
}
