//! # pg-protocol
//!
//! IO-agnostic implementation of the PostgreSQL v3 message protocol as seen
//! by a client on an established session.
//!
//! This crate provides backend message classification, decoding of the
//! messages the client acts on (row descriptions, command completion,
//! errors and notices, session status), and encoding of the frontend
//! messages used by the simple and extended query flows.
//!
//! ## Design Philosophy
//!
//! This crate contains no networking logic and makes no assumptions about
//! the async runtime. Data rows are not decoded here: their bodies are handed
//! to the streaming row decoder in higher-level crates, which reads column
//! values lazily against the cached [`RowDescription`].
//!
//! ## Example
//!
//! ```rust
//! use bytes::Bytes;
//! use pg_protocol::{BackendMessage, Frame, MessageDispatcher, MessageScratch};
//!
//! let mut dispatcher = MessageDispatcher::new();
//! let mut scratch = MessageScratch::default();
//! let mut frame = Frame::new(b'C', Bytes::from_static(b"UPDATE 42\0"));
//!
//! let kind = dispatcher.dispatch(&mut frame, &mut scratch).unwrap();
//! assert_eq!(kind, Some(BackendMessage::CommandComplete));
//! assert_eq!(scratch.command_complete().rows, 42);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod command_complete;
pub mod error;
pub mod frontend;
pub mod message;
pub mod notice;
pub mod row_description;
pub mod types;

pub use codec::FRAME_HEADER_SIZE;
pub use command_complete::CommandComplete;
pub use error::ProtocolError;
pub use frontend::{FrontendMessage, Target};
pub use message::{
    BackendKeyData, BackendMessage, Frame, MessageDispatcher, MessageScratch, TransactionStatus,
};
pub use notice::{ErrorNotice, Severity};
pub use row_description::{ColumnDescription, MAX_COLUMNS, RowDescription};
pub use types::{FormatCode, Oid};
