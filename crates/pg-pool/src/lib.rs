//! # pg-driver-pool
//!
//! Command dispatch over a fixed set of PostgreSQL connections.
//!
//! Each connection gets a worker. Workers share one FIFO queue of
//! [`Command`](pg_client::Command)s and honour the release state every
//! command reports: after handing out a row stream or a transaction, a
//! worker waits until the consumer drops or finishes it before running
//! anything else on that connection.
//!
//! ## Features
//!
//! - FIFO submission with a bounded queue
//! - Cancellation of queued and running commands, resolved exactly once
//! - Workers stop on connections that failed at the protocol level
//! - Completion slots recycled across commands
//!
//! ## Example
//!
//! ```rust,ignore
//! use pg_client::{CancellationToken, Request};
//! use pg_driver_pool::{Pool, PoolConfig};
//!
//! let pool = Pool::new(connections, PoolConfig::new())?;
//!
//! let token = CancellationToken::new();
//! let handle = pool.submit(Request::query("SELECT id FROM jobs", vec![]), token.clone()).await?;
//! let mut rows = handle.await?.into_rows().expect("query outcome");
//! while let Some(mut row) = rows.next_row().await? {
//!     // ...
//! }
//! // connection goes back to its worker when `rows` is dropped
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;

pub use config::PoolConfig;
pub use error::PoolError;
pub use lifecycle::{ConnectionLifecycle, ConnectionMetadata, ConnectionState};
pub use pool::{Pool, PoolHandle, PoolStatus};
