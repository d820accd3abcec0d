//! Line-oriented text adapters over raw byte streams.

use std::io::ErrorKind;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::codec::{LineEnding, DEFAULT_MAX_LINE_LENGTH};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Buffered line writer over any `AsyncWrite`.
///
/// Bytes are staged in an internal buffer and drained as the inner stream
/// accepts them. If a write is interrupted (for example by cancellation) the
/// unwritten tail stays buffered and goes out on the next [`flush`].
///
/// [`flush`]: TextWriter::flush
pub struct TextWriter<W> {
    inner: W,
    buf: BytesMut,
    line_ending: LineEnding,
}

impl<W: AsyncWrite + Unpin> TextWriter<W> {
    /// Create a text writer that terminates lines with `\n`.
    pub fn new(inner: W) -> Self {
        Self::with_line_ending(inner, LineEnding::Lf)
    }

    /// Create a text writer with an explicit line terminator.
    pub fn with_line_ending(inner: W, line_ending: LineEnding) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            line_ending,
        }
    }

    /// Write one line followed by the line terminator.
    ///
    /// The text is written as-is; embedded line breaks are not checked.
    pub async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.buf.extend_from_slice(line.as_bytes());
        self.buf.extend_from_slice(self.line_ending.as_bytes());
        self.drain().await
    }

    /// Write pre-encoded bytes.
    pub async fn write_encoded(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.buf.extend_from_slice(bytes);
        self.drain().await
    }

    /// Write any buffered bytes and flush the inner stream.
    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.drain().await?;
        loop {
            match self.inner.flush().await {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Flush and shut down the inner stream.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.flush().await?;
        self.inner.shutdown().await
    }

    async fn drain(&mut self) -> std::io::Result<()> {
        while !self.buf.is_empty() {
            match self.inner.write(&self.buf).await {
                Ok(0) => return Err(std::io::Error::from(ErrorKind::WriteZero)),
                Ok(n) => self.buf.advance(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

impl<W> TextWriter<W> {
    /// Bytes accepted by this adapter but not yet written to the stream.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop buffered bytes beyond the first `len`.
    pub(crate) fn truncate_pending(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    /// The line terminator this writer emits.
    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Consume the adapter and return the inner stream.
    ///
    /// Pending bytes are dropped; call [`flush`](TextWriter::flush) first.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W> std::fmt::Debug for TextWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextWriter")
            .field("pending", &self.buf.len())
            .field("line_ending", &self.line_ending)
            .finish()
    }
}

/// Buffered line reader over any `AsyncRead`.
///
/// Accepts `\n` and `\r\n` terminators. A line that is too long or not valid
/// UTF-8 is reported once and skipped up to its terminator, so the next call
/// starts on a clean line boundary. `read_line` is cancel safe.
pub struct TextReader<R> {
    inner: R,
    buf: BytesMut,
    codec: LinesCodec,
    max_line_length: usize,
    eof: bool,
}

impl<R: AsyncRead + Unpin> TextReader<R> {
    /// Create a text reader with the default line length limit.
    pub fn new(inner: R) -> Self {
        Self::with_max_line_length(inner, DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a text reader with an explicit line length limit.
    pub fn with_max_line_length(inner: R, max_line_length: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            codec: LinesCodec::new_with_max_length(max_line_length),
            max_line_length,
            eof: false,
        }
    }

    /// Read the next line without its terminator.
    ///
    /// Returns `Ok(None)` once the stream is exhausted. A final line without
    /// a terminator is still returned.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            let decoded = if self.eof {
                self.codec.decode_eof(&mut self.buf)
            } else {
                self.codec.decode(&mut self.buf)
            };
            match decoded {
                Ok(Some(line)) => return Ok(Some(line)),
                Ok(None) if self.eof => return Ok(None),
                Ok(None) => {}
                Err(err) => return Err(self.line_error(err)),
            }

            self.buf.reserve(READ_CHUNK_SIZE);
            match self.inner.read_buf(&mut self.buf).await {
                Ok(0) => self.eof = true,
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}

impl<R> TextReader<R> {
    fn line_error(&self, err: LinesCodecError) -> FrameError {
        match err {
            LinesCodecError::MaxLineLengthExceeded => FrameError::LineTooLong {
                max: self.max_line_length,
            },
            // The codec only does I/O-free decoding here; its one I/O error
            // is the UTF-8 check.
            LinesCodecError::Io(err) if err.kind() == ErrorKind::InvalidData => {
                FrameError::InvalidText
            }
            LinesCodecError::Io(err) => FrameError::Io(err),
        }
    }

    /// Returns true once the underlying stream reported end of input.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Maximum accepted line length in bytes.
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the adapter, returning the inner stream and any bytes that
    /// were read from it but not yet consumed as lines.
    pub fn into_parts(self) -> (R, Bytes) {
        (self.inner, self.buf.freeze())
    }

    /// Consume the adapter and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R> std::fmt::Debug for TextReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextReader")
            .field("buffered", &self.buf.len())
            .field("max_line_length", &self.max_line_length)
            .field("eof", &self.eof)
            .finish()
    }
}
