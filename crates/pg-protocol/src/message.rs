//! Backend message dispatch.
//!
//! Each backend message arrives as a [`Frame`]: a tag byte plus the body that
//! followed the length header. The [`MessageDispatcher`] maps the tag to a
//! [`BackendMessage`] discriminant. Messages that carry data the client acts
//! on are decoded into a caller-owned [`MessageScratch`] so that no allocation
//! happens per message once the scratch buffers are warm.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pg_protocol::{BackendMessage, MessageDispatcher, MessageScratch};
//!
//! let mut dispatcher = MessageDispatcher::new();
//! let mut scratch = MessageScratch::default();
//!
//! match dispatcher.dispatch(&mut frame, &mut scratch)? {
//!     Some(BackendMessage::RowDescription) => { /* scratch.row_description */ }
//!     Some(BackendMessage::DataRow) => { /* frame.body holds the row */ }
//!     Some(BackendMessage::ReadyForQuery) => break,
//!     _ => {}
//! }
//! ```

use bytes::{Buf, Bytes};

use crate::codec::{ensure, read_cstring_into, FRAME_HEADER_SIZE, LENGTH_FIELD_SIZE};
use crate::command_complete::CommandComplete;
use crate::error::ProtocolError;
use crate::notice::ErrorNotice;
use crate::row_description::RowDescription;

/// Backend message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BackendMessage {
    /// Authentication request or confirmation (`R`).
    Authentication = b'R',
    /// Cancellation key data (`K`).
    BackendKeyData = b'K',
    /// Bind completed (`2`).
    BindComplete = b'2',
    /// Close completed (`3`).
    CloseComplete = b'3',
    /// Statement completed (`C`).
    CommandComplete = b'C',
    /// Copy stream payload (`d`).
    CopyData = b'd',
    /// Copy stream finished (`c`).
    CopyDone = b'c',
    /// Copy-in started (`G`).
    CopyInResponse = b'G',
    /// Copy-out started (`H`).
    CopyOutResponse = b'H',
    /// Bidirectional copy started (`W`).
    CopyBothResponse = b'W',
    /// One result row (`D`).
    DataRow = b'D',
    /// Empty query string (`I`).
    EmptyQueryResponse = b'I',
    /// Error (`E`).
    ErrorResponse = b'E',
    /// Function call result (`V`).
    FunctionCallResponse = b'V',
    /// Protocol version negotiation (`v`).
    NegotiateProtocolVersion = b'v',
    /// Statement returns no rows (`n`).
    NoData = b'n',
    /// Warning or informational notice (`N`).
    NoticeResponse = b'N',
    /// Asynchronous notification (`A`).
    NotificationResponse = b'A',
    /// Parameter types of a prepared statement (`t`).
    ParameterDescription = b't',
    /// Run-time parameter report (`S`).
    ParameterStatus = b'S',
    /// Parse completed (`1`).
    ParseComplete = b'1',
    /// Execute row limit reached (`s`).
    PortalSuspended = b's',
    /// Ready for a new query (`Z`).
    ReadyForQuery = b'Z',
    /// Result set column metadata (`T`).
    RowDescription = b'T',
}

impl BackendMessage {
    /// Map a tag byte to a message kind.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'R' => Some(Self::Authentication),
            b'K' => Some(Self::BackendKeyData),
            b'2' => Some(Self::BindComplete),
            b'3' => Some(Self::CloseComplete),
            b'C' => Some(Self::CommandComplete),
            b'd' => Some(Self::CopyData),
            b'c' => Some(Self::CopyDone),
            b'G' => Some(Self::CopyInResponse),
            b'H' => Some(Self::CopyOutResponse),
            b'W' => Some(Self::CopyBothResponse),
            b'D' => Some(Self::DataRow),
            b'I' => Some(Self::EmptyQueryResponse),
            b'E' => Some(Self::ErrorResponse),
            b'V' => Some(Self::FunctionCallResponse),
            b'v' => Some(Self::NegotiateProtocolVersion),
            b'n' => Some(Self::NoData),
            b'N' => Some(Self::NoticeResponse),
            b'A' => Some(Self::NotificationResponse),
            b't' => Some(Self::ParameterDescription),
            b'S' => Some(Self::ParameterStatus),
            b'1' => Some(Self::ParseComplete),
            b's' => Some(Self::PortalSuspended),
            b'Z' => Some(Self::ReadyForQuery),
            b'T' => Some(Self::RowDescription),
            _ => None,
        }
    }

    /// Tag byte of this message kind.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Check if the body of this kind is decoded into [`MessageScratch`].
    #[must_use]
    pub const fn carries_data(self) -> bool {
        matches!(
            self,
            Self::Authentication
                | Self::BackendKeyData
                | Self::CommandComplete
                | Self::ErrorResponse
                | Self::NoticeResponse
                | Self::ParameterStatus
                | Self::ReadyForQuery
                | Self::RowDescription
        )
    }
}

/// One undecoded backend message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message tag.
    pub tag: u8,
    /// Message body, excluding tag and length.
    pub body: Bytes,
}

impl Frame {
    /// Create a frame from a tag and body.
    #[must_use]
    pub fn new(tag: u8, body: Bytes) -> Self {
        Self { tag, body }
    }

    /// Parse a frame header, returning the tag and body length.
    ///
    /// Returns `Ok(None)` if fewer than [`FRAME_HEADER_SIZE`] bytes are given.
    pub fn parse_header(src: &[u8]) -> Result<Option<(u8, usize)>, ProtocolError> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let tag = src[0];
        let length = i32::from_be_bytes([src[1], src[2], src[3], src[4]]);
        if length < LENGTH_FIELD_SIZE as i32 {
            return Err(ProtocolError::InvalidLength {
                tag: char::from(tag),
                length: i64::from(length),
            });
        }
        Ok(Some((tag, length as usize - LENGTH_FIELD_SIZE)))
    }
}

/// Transaction state reported by ReadyForQuery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionStatus {
    /// Not in a transaction block (`I`).
    #[default]
    Idle,
    /// In a transaction block (`T`).
    InTransaction,
    /// In a failed transaction block (`E`).
    Failed,
}

impl TransactionStatus {
    fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            b'I' => Ok(Self::Idle),
            b'T' => Ok(Self::InTransaction),
            b'E' => Ok(Self::Failed),
            other => Err(ProtocolError::InvalidField {
                field: "transaction status",
                value: i64::from(other),
            }),
        }
    }
}

/// Cancellation key for the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendKeyData {
    /// Backend process id.
    pub process_id: i32,
    /// Secret key.
    pub secret_key: i32,
}

/// Reusable destination for data-bearing backend messages.
#[derive(Debug, Clone, Default)]
pub struct MessageScratch {
    /// Last RowDescription.
    pub row_description: RowDescription,
    /// Last ErrorResponse or NoticeResponse.
    pub notice: ErrorNotice,
    /// Last ParameterStatus name.
    pub parameter_name: String,
    /// Last ParameterStatus value.
    pub parameter_value: String,
    /// Last BackendKeyData.
    pub backend_key: BackendKeyData,
    /// Last ReadyForQuery status.
    pub transaction_status: TransactionStatus,
    /// Last Authentication request code.
    pub authentication: i32,
    command_complete: CommandComplete,
}

impl MessageScratch {
    /// Last CommandComplete.
    ///
    /// Small row counts resolve to the shared static instance.
    #[must_use]
    pub fn command_complete(&self) -> &CommandComplete {
        CommandComplete::cached(self.command_complete.rows).unwrap_or(&self.command_complete)
    }
}

/// Routes backend frames to their decoders.
#[derive(Debug, Default)]
pub struct MessageDispatcher {
    discarded: u64,
}

impl MessageDispatcher {
    /// Create a new dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames discarded because their tag was not recognized.
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Classify a frame and decode its body if it carries client state.
    ///
    /// Data-bearing kinds are decoded into `scratch` and must consume their
    /// body exactly. A `DataRow` body is left in `frame` for the row decoder.
    /// Other recognized kinds are returned without decoding. Unrecognized
    /// tags are discarded and yield `None`.
    pub fn dispatch(
        &mut self,
        frame: &mut Frame,
        scratch: &mut MessageScratch,
    ) -> Result<Option<BackendMessage>, ProtocolError> {
        let Some(kind) = BackendMessage::from_tag(frame.tag) else {
            self.discarded += 1;
            tracing::debug!(
                tag = %char::from(frame.tag),
                length = frame.body.len(),
                "discarding unrecognized message"
            );
            frame.body.clear();
            return Ok(None);
        };

        if !kind.carries_data() {
            if kind != BackendMessage::DataRow && frame.body.has_remaining() {
                tracing::trace!(kind = ?kind, length = frame.body.len(), "skipping message body");
                frame.body.clear();
            }
            return Ok(Some(kind));
        }

        let body = &mut frame.body;
        match kind {
            BackendMessage::Authentication => {
                ensure(body, 4)?;
                scratch.authentication = body.get_i32();
                // SASL continuation payloads are not interpreted here
                body.clear();
            }
            BackendMessage::BackendKeyData => {
                ensure(body, 8)?;
                scratch.backend_key = BackendKeyData {
                    process_id: body.get_i32(),
                    secret_key: body.get_i32(),
                };
            }
            BackendMessage::CommandComplete => {
                let cc = *CommandComplete::decode(body, &mut scratch.command_complete)?;
                scratch.command_complete = cc;
            }
            BackendMessage::ErrorResponse | BackendMessage::NoticeResponse => {
                scratch.notice.decode(body)?;
            }
            BackendMessage::ParameterStatus => {
                read_cstring_into(body, &mut scratch.parameter_name)?;
                read_cstring_into(body, &mut scratch.parameter_value)?;
            }
            BackendMessage::ReadyForQuery => {
                ensure(body, 1)?;
                scratch.transaction_status = TransactionStatus::from_u8(body.get_u8())?;
            }
            BackendMessage::RowDescription => {
                scratch.row_description.decode(body)?;
            }
            _ => {}
        }

        if body.has_remaining() {
            return Err(ProtocolError::LengthMismatch {
                tag: char::from(frame.tag),
                remaining: body.remaining(),
            });
        }
        tracing::trace!(kind = ?kind, "dispatched backend message");
        Ok(Some(kind))
    }
}
