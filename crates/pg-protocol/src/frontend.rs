//! Frontend (client to server) messages.
//!
//! Only the messages needed to run simple and extended queries on an already
//! authenticated session are modeled.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{begin_message, finish_message, write_cstring};
use crate::error::ProtocolError;
use crate::types::{FormatCode, Oid};

/// Target of a Describe or Close message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A prepared statement (`S`).
    Statement,
    /// A portal (`P`).
    Portal,
}

impl Target {
    const fn code(self) -> u8 {
        match self {
            Self::Statement => b'S',
            Self::Portal => b'P',
        }
    }
}

/// A message sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendMessage<'a> {
    /// Simple query; may contain several statements.
    Query(&'a str),
    /// Prepare a statement.
    Parse {
        /// Statement name; empty for the unnamed statement.
        name: &'a str,
        /// SQL text.
        query: &'a str,
        /// Parameter type codes; [`Oid::UNSPECIFIED`] lets the server infer.
        param_types: &'a [Oid],
    },
    /// Bind parameters to a statement, creating a portal.
    Bind {
        /// Portal name; empty for the unnamed portal.
        portal: &'a str,
        /// Statement name.
        statement: &'a str,
        /// Binary-encoded parameter values; `None` is SQL NULL.
        params: &'a [Option<Bytes>],
        /// Format requested for every result column.
        result_format: FormatCode,
    },
    /// Request a description of a statement or portal.
    Describe {
        /// What to describe.
        target: Target,
        /// Name of the statement or portal.
        name: &'a str,
    },
    /// Run a portal.
    Execute {
        /// Portal name.
        portal: &'a str,
        /// Row limit; 0 means no limit.
        max_rows: i32,
    },
    /// Close a statement or portal.
    Close {
        /// What to close.
        target: Target,
        /// Name of the statement or portal.
        name: &'a str,
    },
    /// End of an extended-query cycle.
    Sync,
    /// Ask the server to flush pending output.
    Flush,
    /// End the session.
    Terminate,
}

impl FrontendMessage<'_> {
    /// Encode the message, including its tag and length.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match self {
            Self::Query(sql) => {
                let start = begin_message(dst, b'Q');
                write_cstring(dst, sql);
                finish_message(dst, start)
            }
            Self::Parse {
                name,
                query,
                param_types,
            } => {
                let start = begin_message(dst, b'P');
                write_cstring(dst, name);
                write_cstring(dst, query);
                dst.put_i16(count_i16(param_types.len(), "parameter count")?);
                for oid in *param_types {
                    dst.put_u32(oid.0);
                }
                finish_message(dst, start)
            }
            Self::Bind {
                portal,
                statement,
                params,
                result_format,
            } => {
                let start = begin_message(dst, b'B');
                write_cstring(dst, portal);
                write_cstring(dst, statement);
                // one format code applies to every parameter
                dst.put_i16(1);
                dst.put_i16(FormatCode::Binary as i16);
                dst.put_i16(count_i16(params.len(), "parameter count")?);
                for param in *params {
                    match param {
                        Some(value) => {
                            let len = i32::try_from(value.len()).map_err(|_| {
                                ProtocolError::InvalidField {
                                    field: "parameter length",
                                    value: value.len() as i64,
                                }
                            })?;
                            dst.put_i32(len);
                            dst.put_slice(value);
                        }
                        None => dst.put_i32(-1),
                    }
                }
                dst.put_i16(1);
                dst.put_i16(*result_format as i16);
                finish_message(dst, start)
            }
            Self::Describe { target, name } => {
                let start = begin_message(dst, b'D');
                dst.put_u8(target.code());
                write_cstring(dst, name);
                finish_message(dst, start)
            }
            Self::Execute { portal, max_rows } => {
                let start = begin_message(dst, b'E');
                write_cstring(dst, portal);
                dst.put_i32(*max_rows);
                finish_message(dst, start)
            }
            Self::Close { target, name } => {
                let start = begin_message(dst, b'C');
                dst.put_u8(target.code());
                write_cstring(dst, name);
                finish_message(dst, start)
            }
            Self::Sync => empty_message(dst, b'S'),
            Self::Flush => empty_message(dst, b'H'),
            Self::Terminate => empty_message(dst, b'X'),
        }
    }
}

fn empty_message(dst: &mut BytesMut, tag: u8) -> Result<(), ProtocolError> {
    let start = begin_message(dst, tag);
    finish_message(dst, start)
}

fn count_i16(count: usize, field: &'static str) -> Result<i16, ProtocolError> {
    i16::try_from(count).map_err(|_| ProtocolError::InvalidField {
        field,
        value: count as i64,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encode(msg: FrontendMessage<'_>) -> BytesMut {
        let mut buf = BytesMut::new();
        msg.encode(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_sync_encoding() {
        assert_eq!(&encode(FrontendMessage::Sync)[..], &[b'S', 0, 0, 0, 4]);
        assert_eq!(&encode(FrontendMessage::Terminate)[..], &[b'X', 0, 0, 0, 4]);
    }

    #[test]
    fn test_query_encoding() {
        let buf = encode(FrontendMessage::Query("BEGIN"));
        assert_eq!(&buf[..], b"Q\x00\x00\x00\x0aBEGIN\0");
    }

    #[test]
    fn test_bind_encoding() {
        let params = [Some(Bytes::from_static(&[0, 0, 0, 7])), None];
        let buf = encode(FrontendMessage::Bind {
            portal: "",
            statement: "",
            params: &params,
            result_format: FormatCode::Binary,
        });

        let expected: &[u8] = &[
            b'B', 0, 0, 0, 28, // tag + length
            0, // portal
            0, // statement
            0, 1, 0, 1, // one binary parameter format
            0, 2, // two parameters
            0, 0, 0, 4, 0, 0, 0, 7, // int4 7
            0xFF, 0xFF, 0xFF, 0xFF, // NULL
            0, 1, 0, 1, // one binary result format
        ];
        assert_eq!(&buf[..], expected);
    }

    #[test]
    fn test_parse_encoding() {
        let buf = encode(FrontendMessage::Parse {
            name: "",
            query: "SELECT $1",
            param_types: &[Oid::INT4],
        });
        assert_eq!(buf[0], b'P');
        assert_eq!(&buf[buf.len() - 6..], &[0, 1, 0, 0, 0, 23]);
    }
}
