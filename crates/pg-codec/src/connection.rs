//! Frame transport over an established session.

use futures_util::{SinkExt, StreamExt};
use pg_protocol::{Frame, FrontendMessage};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::CodecError;
use crate::frame_codec::{CodecConfig, PgCodec};
use crate::framed::FrameStream;

/// Reads backend frames and writes frontend messages on one connection.
///
/// Reads are strictly sequential. Writes are buffered by [`Transport::feed`]
/// until [`Transport::flush`], so a whole extended-query cycle goes out in a
/// single write.
///
/// # Example
///
/// ```rust,ignore
/// use pg_codec::Transport;
/// use pg_protocol::FrontendMessage;
///
/// let mut transport = Transport::new(tcp_stream);
/// transport.send(FrontendMessage::Query("SELECT 1")).await?;
/// let frame = transport.read_frame().await?;
/// ```
pub struct Transport<T> {
    stream: FrameStream<T>,
    frames_read: u64,
}

impl<T> Transport<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a transport with the default codec settings.
    pub fn new(io: T) -> Self {
        Self::with_config(io, CodecConfig::default())
    }

    /// Create a transport with custom codec settings.
    pub fn with_config(io: T, config: CodecConfig) -> Self {
        Self {
            stream: FrameStream::with_codec(io, PgCodec::from_config(config)),
            frames_read: 0,
        }
    }

    /// Read the next backend frame.
    ///
    /// End of stream is reported as [`CodecError::ConnectionClosed`].
    pub async fn read_frame(&mut self) -> Result<Frame, CodecError> {
        self.try_read_frame()
            .await?
            .ok_or(CodecError::ConnectionClosed)
    }

    /// Read the next backend frame, or `None` at a clean end of stream.
    pub async fn try_read_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        match self.stream.next().await {
            Some(Ok(frame)) => {
                self.frames_read += 1;
                Ok(Some(frame))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Buffer a message without flushing.
    pub async fn feed(&mut self, message: FrontendMessage<'_>) -> Result<(), CodecError> {
        self.stream.feed(message).await
    }

    /// Write a message and flush.
    pub async fn send(&mut self, message: FrontendMessage<'_>) -> Result<(), CodecError> {
        self.stream.send(message).await
    }

    /// Write a sequence of messages with a single flush.
    pub async fn send_all(&mut self, messages: &[FrontendMessage<'_>]) -> Result<(), CodecError> {
        for message in messages {
            self.stream.feed(message.clone()).await?;
        }
        self.flush().await
    }

    /// Flush buffered messages.
    pub async fn flush(&mut self) -> Result<(), CodecError> {
        SinkExt::<FrontendMessage<'_>>::flush(&mut self.stream).await
    }

    /// Send Terminate and close the write side.
    pub async fn terminate(&mut self) -> Result<(), CodecError> {
        tracing::debug!(frames_read = self.frames_read, "terminating session");
        self.stream.feed(FrontendMessage::Terminate).await?;
        SinkExt::<FrontendMessage<'_>>::close(&mut self.stream).await
    }

    /// Number of frames read so far.
    #[must_use]
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Get a reference to the codec.
    #[must_use]
    pub fn codec(&self) -> &PgCodec {
        self.stream.codec()
    }

    /// Consume the transport and return the underlying I/O object.
    pub fn into_inner(self) -> T {
        self.stream.into_inner()
    }
}

impl<T> std::fmt::Debug for Transport<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("frames_read", &self.frames_read)
            .finish_non_exhaustive()
    }
}
