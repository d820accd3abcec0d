use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, Empty, ReadHalf, Sink, WriteHalf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::codec::{Framing, LineEnding, DEFAULT_MAX_LINE_LENGTH};
use crate::error::{FrameError, Result};
use crate::lifecycle::Lifecycle;
use crate::message::Message;
use crate::reader::{FrameReader, ReleasedSource, SourceOrigin};
use crate::text::{TextReader, TextWriter};
use crate::writer::{FrameWriter, ReleasedSink, SinkOrigin};

/// Default time disposal spends flushing or shutting down a sink.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Construction-time endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Line or delimiter framing. Fixed for the endpoint's lifetime.
    pub framing: Framing,
    /// When true, disposal hands the underlying streams back instead of
    /// shutting them down.
    pub leave_open: bool,
    /// Terminator for written lines (raw sinks only).
    pub line_ending: LineEnding,
    /// Maximum accepted line length (raw sources only).
    pub max_line_length: usize,
    /// Upper bound on the flush/shutdown performed by disposal.
    pub shutdown_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            framing: Framing::Line,
            leave_open: false,
            line_ending: LineEnding::Lf,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl EndpointConfig {
    /// Line-mode configuration.
    pub fn line() -> Self {
        Self::default()
    }

    /// Delimiter-mode configuration.
    pub fn delimited(sentinel: impl Into<String>) -> Self {
        Self {
            framing: Framing::Delimiter(sentinel.into()),
            ..Self::default()
        }
    }

    pub fn with_leave_open(mut self, leave_open: bool) -> Self {
        self.leave_open = leave_open;
        self
    }

    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.framing.validate()?;
        if self.max_line_length == 0 {
            return Err(FrameError::InvalidArgument(
                "max_line_length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Streams handed back by [`Endpoint::dispose`] when `leave_open` is set.
#[derive(Debug)]
pub struct Released<R, W> {
    pub source: Option<ReleasedSource<R>>,
    pub sink: Option<ReleasedSink<W>>,
}

/// A frame writer and/or reader over one physical stream, plus its
/// lifecycle.
///
/// All operations take `&self`; share the endpoint (for example in an
/// `Arc`) to write from many tasks. Once disposed, every operation fails
/// with [`FrameError::Disposed`] without waiting.
pub struct Endpoint<R, W> {
    reader: Option<FrameReader<R>>,
    writer: Option<FrameWriter<W>>,
    lifecycle: Lifecycle,
    config: EndpointConfig,
}

/// An endpoint that only writes.
pub type WriteEndpoint<W> = Endpoint<Empty, W>;

/// An endpoint that only reads.
pub type ReadEndpoint<R> = Endpoint<R, Sink>;

impl<R, W> Endpoint<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Build an endpoint from an optional source and an optional sink.
    pub fn new(
        source: Option<SourceOrigin<R>>,
        sink: Option<SinkOrigin<W>>,
        config: EndpointConfig,
    ) -> Result<Self> {
        config.validate()?;
        let lifecycle = Lifecycle::new();

        let reader = source
            .map(|origin| {
                FrameReader::with_lifecycle(
                    origin,
                    config.framing.clone(),
                    config.max_line_length,
                    lifecycle.clone(),
                )
            })
            .transpose()?;
        let writer = sink
            .map(|origin| {
                FrameWriter::with_lifecycle(
                    origin,
                    config.framing.clone(),
                    config.line_ending,
                    lifecycle.clone(),
                )
            })
            .transpose()?;

        debug!(
            framing = ?config.framing,
            leave_open = config.leave_open,
            readable = reader.is_some(),
            writable = writer.is_some(),
            "endpoint created"
        );

        Ok(Self {
            reader,
            writer,
            lifecycle,
            config,
        })
    }

    /// Build a duplex endpoint over raw byte streams.
    pub fn duplex(source: R, sink: W, config: EndpointConfig) -> Result<Self> {
        Self::new(
            Some(SourceOrigin::Raw(source)),
            Some(SinkOrigin::Raw(sink)),
            config,
        )
    }

    /// Build a duplex endpoint over caller-supplied text adapters.
    pub fn from_text(
        source: TextReader<R>,
        sink: TextWriter<W>,
        config: EndpointConfig,
    ) -> Result<Self> {
        Self::new(
            Some(SourceOrigin::Text(source)),
            Some(SinkOrigin::Text(sink)),
            config,
        )
    }

    /// Render `message` and write it as one frame.
    pub async fn write<M: Message>(&self, message: &M, cancel: &CancellationToken) -> Result<()> {
        self.writer()?.write(message, cancel).await
    }

    /// Write already-rendered content as one frame.
    pub async fn write_text(&self, content: &str, cancel: &CancellationToken) -> Result<()> {
        self.writer()?.write_text(content, cancel).await
    }

    /// Read and decode the next frame. `Ok(None)` means end of stream.
    pub async fn read<M: Message>(&self, cancel: &CancellationToken) -> Result<Option<M>> {
        self.reader()?.read(cancel).await
    }

    /// Read the next frame's raw content. `Ok(None)` means end of stream.
    pub async fn read_text(&self, cancel: &CancellationToken) -> Result<Option<String>> {
        self.reader()?.read_text(cancel).await
    }

    /// Dispose the endpoint.
    ///
    /// Fires the disposal signal, lets in-flight operations observe it, then
    /// tears down the sink and source per `leave_open`. Returns the streams
    /// kept open, or `None` if the endpoint was already disposed.
    pub async fn dispose(&self) -> Option<Released<R, W>> {
        if !self.lifecycle.dispose() {
            return None;
        }
        debug!(leave_open = self.config.leave_open, "disposing endpoint");

        let sink = match &self.writer {
            Some(writer) => {
                writer
                    .close(self.config.leave_open, self.config.shutdown_timeout)
                    .await
            }
            None => None,
        };
        let source = match &self.reader {
            Some(reader) => reader.close(self.config.leave_open).await,
            None => None,
        };

        Some(Released { source, sink })
    }

    fn writer(&self) -> Result<&FrameWriter<W>> {
        self.writer
            .as_ref()
            .ok_or_else(|| FrameError::InvalidArgument("endpoint has no sink".to_string()))
    }

    fn reader(&self) -> Result<&FrameReader<R>> {
        self.reader
            .as_ref()
            .ok_or_else(|| FrameError::InvalidArgument("endpoint has no source".to_string()))
    }
}

impl<R, W> Endpoint<R, W> {
    pub fn is_disposed(&self) -> bool {
        self.lifecycle.is_disposed()
    }

    /// The endpoint's disposal signal, for hosts that want to stop their own
    /// loops when the endpoint goes away.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn is_readable(&self) -> bool {
        self.reader.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.writer.is_some()
    }
}

impl<S> Endpoint<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite,
{
    /// Build a duplex endpoint over one bidirectional stream.
    ///
    /// Released halves can be rejoined with [`ReadHalf::unsplit`].
    pub fn from_stream(stream: S, config: EndpointConfig) -> Result<Self> {
        let (source, sink) = tokio::io::split(stream);
        Self::duplex(source, sink, config)
    }
}

impl<W: AsyncWrite + Unpin> Endpoint<Empty, W> {
    /// Build a write-only endpoint.
    pub fn sink_only(sink: SinkOrigin<W>, config: EndpointConfig) -> Result<Self> {
        Self::new(None, Some(sink), config)
    }
}

impl<R: AsyncRead + Unpin> Endpoint<R, Sink> {
    /// Build a read-only endpoint.
    pub fn source_only(source: SourceOrigin<R>, config: EndpointConfig) -> Result<Self> {
        Self::new(Some(source), None, config)
    }
}

impl<R, W> Drop for Endpoint<R, W> {
    fn drop(&mut self) {
        self.lifecycle.dispose();
    }
}

impl<R, W> std::fmt::Debug for Endpoint<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("config", &self.config)
            .field("readable", &self.reader.is_some())
            .field("writable", &self.writer.is_some())
            .field("disposed", &self.lifecycle.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, DuplexStream};

    use super::*;
    use crate::error::ErrorKind;
    use crate::message::Json;

    type Duplex = Endpoint<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    fn pair(config: EndpointConfig) -> (Duplex, Duplex) {
        let (a, b) = tokio::io::duplex(4096);
        (
            Endpoint::from_stream(a, config.clone()).unwrap(),
            Endpoint::from_stream(b, config).unwrap(),
        )
    }

    #[tokio::test]
    async fn roundtrip_both_framings() {
        for config in [EndpointConfig::line(), EndpointConfig::delimited("--END--")] {
            let (left, right) = pair(config);
            let cancel = CancellationToken::new();

            let request = Json(serde_json::json!({"jsonrpc":"2.0","id":1,"method":"sum","params":[1,2]}));
            left.write(&request, &cancel).await.unwrap();
            let got: Json<serde_json::Value> = right.read(&cancel).await.unwrap().unwrap();
            assert_eq!(got, request);

            let reply = Json(serde_json::json!({"jsonrpc":"2.0","id":1,"result":3}));
            right.write(&reply, &cancel).await.unwrap();
            let got: Json<serde_json::Value> = left.read(&cancel).await.unwrap().unwrap();
            assert_eq!(got, reply);
        }
    }

    #[tokio::test]
    async fn delimited_multi_line_roundtrip() {
        let (left, right) = pair(EndpointConfig::delimited("--END--"));
        let cancel = CancellationToken::new();
        left.write(&"line1\nline2".to_string(), &cancel).await.unwrap();
        let got: String = right.read(&cancel).await.unwrap().unwrap();
        assert_eq!(got, "line1\nline2");
    }

    #[tokio::test]
    async fn line_mode_skip_empty_over_text_source() {
        let endpoint = Endpoint::source_only(
            SourceOrigin::Text(TextReader::new(&b"\n\nfoo\n\n"[..])),
            EndpointConfig::line(),
        )
        .unwrap();
        let cancel = CancellationToken::new();
        assert_eq!(endpoint.read_text(&cancel).await.unwrap().as_deref(), Some("foo"));
        assert!(endpoint.read_text(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_writes_produce_intact_frames() {
        let (left, right) = pair(EndpointConfig::delimited("--END--"));
        let left = Arc::new(left);

        let mut tasks = Vec::new();
        for i in 0..50 {
            let left = Arc::clone(&left);
            tasks.push(tokio::spawn(async move {
                let body = format!("{i}\n{}", "x".repeat(i * 7));
                left.write_text(&body, &CancellationToken::new()).await
            }));
        }

        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        for _ in 0..50 {
            let content = right.read_text(&cancel).await.unwrap().unwrap();
            let (id, body) = content.split_once('\n').unwrap();
            let id: usize = id.parse().unwrap();
            assert_eq!(body, "x".repeat(id * 7));
            seen.push(id);
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let (left, _right) = pair(EndpointConfig::line());
        assert!(left.dispose().await.is_some());
        assert!(left.dispose().await.is_none());
        assert!(left.is_disposed());
    }

    #[tokio::test]
    async fn disposed_endpoint_rejects_immediately() {
        let (left, _right) = pair(EndpointConfig::line());
        left.dispose().await;
        let cancel = CancellationToken::new();

        let err = left.write_text("late", &cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Disposed);
        let err = left.read_text(&cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Disposed);
    }

    #[tokio::test]
    async fn pre_cancelled_operations_fail_fast() {
        let (left, right) = pair(EndpointConfig::line());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(left.write_text("x", &cancel).await.unwrap_err().is_cancelled());
        assert!(right.read_text(&cancel).await.unwrap_err().is_cancelled());

        // Nothing reached the wire.
        left.dispose().await;
        assert!(right
            .read_text(&CancellationToken::new())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn leave_open_keeps_caller_text_sink_usable() {
        let (near, far) = tokio::io::duplex(4096);
        let endpoint = Endpoint::sink_only(
            SinkOrigin::Text(TextWriter::new(near)),
            EndpointConfig::line().with_leave_open(true),
        )
        .unwrap();
        endpoint
            .write_text("framed", &CancellationToken::new())
            .await
            .unwrap();

        let released = endpoint.dispose().await.unwrap();
        let Some(ReleasedSink::Text(mut sink)) = released.sink else {
            panic!("text sink should be handed back");
        };
        sink.write_line("by-caller").await.unwrap();
        sink.flush().await.unwrap();
        drop(sink);

        let mut reader = TextReader::new(far);
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("framed"));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("by-caller"));
    }

    #[tokio::test]
    async fn text_sink_closed_without_leave_open() {
        let (near, mut far) = tokio::io::duplex(4096);
        let endpoint = Endpoint::sink_only(
            SinkOrigin::Text(TextWriter::new(near)),
            EndpointConfig::line(),
        )
        .unwrap();
        endpoint
            .write_text("only", &CancellationToken::new())
            .await
            .unwrap();

        let released = endpoint.dispose().await.unwrap();
        assert!(released.sink.is_none());

        let mut rest = Vec::new();
        far.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"only\n");
    }

    #[tokio::test]
    async fn raw_stream_left_open_drops_adapter_only() {
        let (left, right) = pair(EndpointConfig::line().with_leave_open(true));
        let cancel = CancellationToken::new();
        left.write_text("before", &cancel).await.unwrap();

        let released = left.dispose().await.unwrap();
        let Some(ReleasedSink::Raw(raw_sink)) = released.sink else {
            panic!("raw sink should be handed back");
        };
        let Some(ReleasedSource::Raw { stream, unread }) = released.source else {
            panic!("raw source should be handed back");
        };
        assert!(unread.is_empty());

        // The raw stream keeps working without the old adapter.
        let rejoined = stream.unsplit(raw_sink);
        let again = Endpoint::from_stream(rejoined, EndpointConfig::line()).unwrap();
        again.write_text("after", &cancel).await.unwrap();

        assert_eq!(right.read_text(&cancel).await.unwrap().as_deref(), Some("before"));
        assert_eq!(right.read_text(&cancel).await.unwrap().as_deref(), Some("after"));
    }

    #[tokio::test]
    async fn raw_stream_shut_down_without_leave_open() {
        let (left, right) = pair(EndpointConfig::line());
        let cancel = CancellationToken::new();
        left.write_text("last", &cancel).await.unwrap();

        let released = left.dispose().await.unwrap();
        assert!(released.sink.is_none());
        assert!(released.source.is_none());

        assert_eq!(right.read_text(&cancel).await.unwrap().as_deref(), Some("last"));
        assert!(right.read_text(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_half_is_invalid_argument() {
        let endpoint =
            Endpoint::sink_only(SinkOrigin::Raw(Vec::new()), EndpointConfig::line()).unwrap();
        let err = endpoint
            .read_text(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!endpoint.is_readable());
        assert!(endpoint.is_writable());
    }

    #[test]
    fn invalid_config_rejected() {
        let err = Endpoint::sink_only(SinkOrigin::Raw(Vec::new()), EndpointConfig::delimited(""))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn config_from_json_fills_defaults() {
        let config: EndpointConfig =
            serde_json::from_str(r#"{"framing":{"delimiter":"--END--"},"leave_open":true}"#)
                .unwrap();
        assert_eq!(config.framing, Framing::Delimiter("--END--".to_string()));
        assert!(config.leave_open);
        assert_eq!(config.line_ending, LineEnding::Lf);
        assert_eq!(config.max_line_length, DEFAULT_MAX_LINE_LENGTH);
        assert_eq!(config.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
    }
}
