use crate::message::MessageError;

/// Coarse classification of a [`FrameError`].
///
/// Callers that only need to distinguish "I asked for this" from genuine
/// faults can match on this instead of the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid input, detected before any I/O or locking.
    InvalidArgument,
    /// The endpoint has been disposed.
    Disposed,
    /// The caller's token fired, or disposal raced the operation.
    Cancelled,
    /// Any other I/O or framing failure.
    Faulted,
}

/// Errors that can occur while writing or reading frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The message or configuration cannot be framed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The endpoint was disposed before the operation started.
    #[error("endpoint disposed")]
    Disposed,

    /// The operation was cancelled by the caller or by disposal.
    #[error("operation cancelled")]
    Cancelled,

    /// An I/O error occurred on the underlying stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An earlier write failed part-way through a frame, so the sink can no
    /// longer be trusted to carry whole frames.
    #[error("sink faulted mid-frame; no further frames can be written")]
    SinkFaulted,

    /// A line exceeded the configured maximum length and was discarded.
    #[error("line too long (max {max} bytes)")]
    LineTooLong { max: usize },

    /// A line was not valid UTF-8 and was discarded.
    #[error("line is not valid UTF-8")]
    InvalidText,

    /// The source ended in the middle of a delimited frame.
    #[error("stream ended mid-frame ({lines} lines without delimiter)")]
    TruncatedFrame { lines: usize },

    /// The frame content could not be decoded into a message.
    #[error("failed to decode message: {0}")]
    Decode(#[source] MessageError),
}

impl FrameError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            FrameError::Disposed => ErrorKind::Disposed,
            FrameError::Cancelled => ErrorKind::Cancelled,
            FrameError::Io(_)
            | FrameError::SinkFaulted
            | FrameError::LineTooLong { .. }
            | FrameError::InvalidText
            | FrameError::TruncatedFrame { .. }
            | FrameError::Decode(_) => ErrorKind::Faulted,
        }
    }

    /// Returns true if this error reports cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Returns true for framing faults after which the reader has already
    /// resynchronized and the next read can proceed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FrameError::LineTooLong { .. } | FrameError::InvalidText | FrameError::Decode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
