//! Backend frame codec implementation.

use bytes::{Buf, BytesMut};
use pg_protocol::{FRAME_HEADER_SIZE, Frame, FrontendMessage};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// Largest frame the server will ever produce.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1 << 30;

/// Codec settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct CodecConfig {
    /// Maximum frame size accepted or produced, including the header.
    pub max_frame_size: usize,
}

impl CodecConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum frame size.
    #[must_use]
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.max(FRAME_HEADER_SIZE);
        self
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Wire codec for tokio-util framing.
///
/// Decodes backend bytes into [`Frame`]s and encodes [`FrontendMessage`]s.
/// Message bodies are split off the read buffer without copying.
#[derive(Debug, Clone)]
pub struct PgCodec {
    max_frame_size: usize,
}

impl PgCodec {
    /// Create a codec with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(CodecConfig::default())
    }

    /// Create a codec from a configuration.
    #[must_use]
    pub fn from_config(config: CodecConfig) -> Self {
        Self {
            max_frame_size: config.max_frame_size,
        }
    }

    /// Create a codec with a custom maximum frame size.
    #[must_use]
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.max(FRAME_HEADER_SIZE);
        self
    }

    /// Maximum frame size, including the header.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for PgCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PgCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((tag, body_len)) = Frame::parse_header(src)? else {
            return Ok(None);
        };

        let frame_len = FRAME_HEADER_SIZE + body_len;
        if frame_len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size: frame_len,
                max: self.max_frame_size,
            });
        }

        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        let body = src.split_to(body_len).freeze();

        tracing::trace!(
            tag = %char::from(tag),
            length = body_len,
            "decoded backend frame"
        );

        Ok(Some(Frame::new(tag, body)))
    }
}

impl Encoder<FrontendMessage<'_>> for PgCodec {
    type Error = CodecError;

    fn encode(&mut self, item: FrontendMessage<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();
        if let Err(e) = item.encode(dst) {
            dst.truncate(start);
            return Err(e.into());
        }

        let size = dst.len() - start;
        if size > self.max_frame_size {
            dst.truncate(start);
            return Err(CodecError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }

        tracing::trace!(tag = %char::from(dst[start]), length = size, "encoded frontend message");
        Ok(())
    }
}
