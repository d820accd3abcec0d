//! Local socket transport for linewire.
//!
//! Supplies the raw byte streams endpoints are built over:
//! - Unix domain sockets (Linux/macOS)
//!
//! Everything here is async and must run inside a Tokio runtime.

pub mod error;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};

#[cfg(unix)]
pub use uds::UnixDomainSocket;

#[cfg(unix)]
pub use tokio::net::UnixStream;
