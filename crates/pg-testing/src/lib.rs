//! # pg-testing
//!
//! Test infrastructure for PostgreSQL driver development.
//!
//! This crate provides backend message fixtures and a scripted mock backend
//! so that the driver can be exercised without a database server.
//!
//! ## Features
//!
//! - Builders for every backend message the driver consumes
//! - Mock backend over TCP or an in-memory duplex pipe
//! - Simple and extended query protocol support
//! - Query log for asserting what the client sent
//!
//! ## Fixture Example
//!
//! ```rust
//! use pg_protocol::Oid;
//! use pg_testing::fixtures;
//!
//! let script = fixtures::concat(&[
//!     fixtures::row_description(&[("id", Oid::INT4)]),
//!     fixtures::data_row(&[Some(&1i32.to_be_bytes()[..])]),
//!     fixtures::command_complete("SELECT 1"),
//!     fixtures::ready_for_query(b'I'),
//! ]);
//! assert_eq!(script[0], b'T');
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_server;

pub use mock_server::{
    MockColumn, MockPgServer, MockResponse, MockServerBuilder, MockServerConfig, MockServerError,
    QueryLog,
};
