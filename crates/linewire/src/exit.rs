use std::fmt;
use std::io;

use linewire_frame::{ErrorKind, FrameError};
use linewire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;
/// Conventional 128 + SIGINT.
pub const CANCELLED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err.kind() {
        ErrorKind::InvalidArgument => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ErrorKind::Disposed => CliError::new(FAILURE, format!("{context}: {err}")),
        ErrorKind::Cancelled => CliError::new(CANCELLED, format!("{context}: {err}")),
        ErrorKind::Faulted => match err {
            FrameError::Io(source) => io_error(context, source),
            FrameError::LineTooLong { .. }
            | FrameError::InvalidText
            | FrameError::TruncatedFrame { .. }
            | FrameError::Decode(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
            other => CliError::new(INTERNAL, format!("{context}: {other}")),
        },
    }
}
