//! Length-prefixed frames on the game socket.
//!
//! `[len: u16 LE][opcode: u8][payload: len - 1 bytes]`. `len` counts the
//! opcode and payload. A length above [`MAX_FRAME_LEN`] closes the
//! connection; a zero length carries no opcode and is dropped.

use bytes::{Buf, Bytes, BytesMut};
use realm_core::constants::{FRAME_HEADER_LEN, MAX_FRAME_LEN};
use realm_core::protocol::ServerMessage;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
    #[error("empty frame")]
    EmptyFrame,
    #[error("connection closed mid-frame")]
    Truncated,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the connection must be closed after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProtocolError::EmptyFrame)
    }
}

/// One client packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub payload: Bytes,
}

#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4 * MAX_FRAME_LEN),
        }
    }

    /// Read the next frame.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(frame))` for a complete frame.
    /// * `Ok(None)` on a clean end of stream between frames.
    /// * `Err(ProtocolError::EmptyFrame)` for a zero-length frame; reading
    ///   may continue.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        loop {
            if self.buf.len() >= FRAME_HEADER_LEN {
                let len = u16::from_le_bytes([self.buf[0], self.buf[1]]) as usize;
                if len > MAX_FRAME_LEN {
                    return Err(ProtocolError::FrameTooLarge(len));
                }
                if len == 0 {
                    self.buf.advance(FRAME_HEADER_LEN);
                    return Err(ProtocolError::EmptyFrame);
                }
                if self.buf.len() >= FRAME_HEADER_LEN + len {
                    self.buf.advance(FRAME_HEADER_LEN);
                    let mut body = self.buf.split_to(len).freeze();
                    let opcode = body.get_u8();
                    return Ok(Some(Frame {
                        opcode,
                        payload: body,
                    }));
                }
            }

            if self.inner.read_buf(&mut self.buf).await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(ProtocolError::Truncated);
            }
        }
    }
}

#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one encoded message (opcode included) as a frame.
    pub async fn write_body(&mut self, body: &[u8]) -> Result<(), ProtocolError> {
        if body.len() > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge(body.len()));
        }
        self.inner
            .write_all(&(body.len() as u16).to_le_bytes())
            .await?;
        self.inner.write_all(body).await?;
        Ok(())
    }

    pub async fn write_message(&mut self, message: &ServerMessage) -> Result<(), ProtocolError> {
        self.write_body(&message.encode()).await
    }

    pub async fn flush(&mut self) -> Result<(), ProtocolError> {
        self.inner.flush().await?;
        Ok(())
    }
}
