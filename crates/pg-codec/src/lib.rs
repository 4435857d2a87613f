//! # pg-codec
//!
//! Async framing layer for the PostgreSQL wire protocol.
//!
//! This crate turns a raw byte stream into backend [`Frame`]s and writes
//! frontend messages, handling frames split across TCP segments and several
//! frames arriving in one read.
//!
//! ## Features
//!
//! - Frame reassembly across reads without copying message bodies
//! - Configurable frame size limit
//! - Buffered writes so an extended-query cycle is flushed once
//! - Integration with tokio-util's codec framework
//!
//! ## Architecture
//!
//! ```text
//! TCP Stream → PgCodec (frame decoding) → Transport → MessageDispatcher
//! ```
//!
//! [`Frame`]: pg_protocol::Frame

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod frame_codec;
pub mod framed;

pub use connection::Transport;
pub use error::CodecError;
pub use frame_codec::{CodecConfig, DEFAULT_MAX_FRAME_SIZE, PgCodec};
pub use framed::FrameStream;
