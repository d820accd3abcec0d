//! Line-based message framing for RPC over text streams.
//!
//! This is the core layer of linewire. A message is carried as:
//! - one non-empty line (line mode), or
//! - one or more content lines closed by a sentinel line (delimiter mode).
//!
//! Writers share one sink safely across tasks; every endpoint carries a
//! single-fire disposal signal that all in-flight operations observe.

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod message;
pub mod reader;
pub mod text;
pub mod writer;

pub use codec::{
    encode_frame, validate_content, FrameAssembler, Framing, LineEnding, DEFAULT_MAX_LINE_LENGTH,
};
pub use endpoint::{
    Endpoint, EndpointConfig, ReadEndpoint, Released, WriteEndpoint, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use error::{ErrorKind, FrameError, Result};
pub use gate::ExclusiveGate;
pub use lifecycle::{JointSignal, Lifecycle};
pub use message::{Json, Message, MessageError};
pub use reader::{FrameReader, ReleasedSource, SourceOrigin};
pub use text::{TextReader, TextWriter};
pub use writer::{FrameWriter, ReleasedSink, SinkOrigin};

pub use tokio_util::sync::CancellationToken;
