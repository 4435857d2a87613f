//! # pg-client
//!
//! Async PostgreSQL wire client core.
//!
//! This crate drives an already-authenticated connection through the
//! extended query protocol, streams result rows without buffering them, and
//! runs submitted commands under a release protocol that a pool can
//! schedule around.
//!
//! ## Features
//!
//! - **Streaming rows**: [`RowStream`] hands out one [`DataRow`] at a time
//!   and decodes columns lazily, including one-dimensional arrays
//! - **Binary results**: every column arrives in the binary format and is
//!   read through the typed accessors in `pg-types`
//! - **JSON projection**: rows serialize straight into any serde
//!   serializer, see [`json`]
//! - **Transactions**: isolation levels, savepoints and rollback of
//!   abandoned transactions
//! - **Commands**: [`Command`] pairs a request with a cancellation token;
//!   exactly one of its result and its cancellation reaches the submitter
//!
//! ## Connection lifecycle
//!
//! ```text
//! Ready -> AwaitingResponse (request written)
//! AwaitingResponse -> Ready (ReadyForQuery read)
//! AwaitingResponse -> Draining (row stream dropped early)
//! Draining -> Ready (remaining messages skipped)
//! any -> Poisoned (framing or I/O failure)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use pg_client::{Connection, PgValue};
//!
//! let mut conn = Connection::new(authenticated_stream);
//!
//! let updated = conn
//!     .execute("UPDATE users SET active = $1 WHERE id = $2", &[true.into(), 7i32.into()])
//!     .await?;
//!
//! let mut rows = conn.query("SELECT id, name FROM users", &[]).await?;
//! while let Some(mut row) = rows.next_row().await? {
//!     println!("{}", pg_client::json::to_json_string(&mut row)?);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod command;
pub mod completion;
pub mod config;
pub mod connection;
pub mod error;
pub mod json;
pub mod row;
pub mod state;
pub mod stream;
pub mod transaction;

pub use command::{
    Command, CommandHandle, CommandTarget, Outcome, OutcomeSlots, ReleaseState, Request,
};
pub use completion::{CompletionFuture, CompletionPool, CompletionSource};
pub use config::Config;
pub use connection::{Connection, SharedConnection};
pub use error::{Error, Result};
pub use pg_protocol::{Oid, RowDescription, TransactionStatus};
pub use pg_types::{PgProtocol, PgValue};
pub use row::{ArrayElements, DataColumn, DataRow};
pub use state::ProtocolState;
pub use stream::RowStream;
pub use tokio_util::sync::CancellationToken;
pub use transaction::{IsolationLevel, SavePoint, Transaction};
