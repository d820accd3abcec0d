use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::{encode_frame, Framing, LineEnding};
use crate::error::{FrameError, Result};
use crate::gate::ExclusiveGate;
use crate::lifecycle::Lifecycle;
use crate::message::Message;
use crate::text::TextWriter;

/// Where a writer's sink came from. Decides what disposal tears down.
pub enum SinkOrigin<W> {
    /// A raw byte stream. The writer wraps it in a text adapter it owns.
    Raw(W),
    /// A text adapter supplied by the caller.
    Text(TextWriter<W>),
}

/// A sink handed back by disposal with `leave_open` set.
#[derive(Debug)]
pub enum ReleasedSink<W> {
    /// The raw stream. Its adapter was flushed and discarded.
    Raw(W),
    /// The caller's text adapter, untouched.
    Text(TextWriter<W>),
}

impl<W> ReleasedSink<W> {
    /// The underlying stream, discarding a returned text adapter.
    pub fn into_stream(self) -> W {
        match self {
            ReleasedSink::Raw(stream) => stream,
            ReleasedSink::Text(text) => text.into_inner(),
        }
    }
}

struct SinkSlot<W> {
    text: TextWriter<W>,
    raw: bool,
    /// Set when a failed write left part of a frame on the stream.
    torn: bool,
}

/// Writes complete frames to a shared sink.
///
/// `write` takes `&self`: any number of tasks may write concurrently through
/// a shared reference. Each frame is emitted whole, in the order writers get
/// through the gate.
pub struct FrameWriter<W> {
    gate: ExclusiveGate<Option<SinkSlot<W>>>,
    framing: Framing,
    line_ending: LineEnding,
    lifecycle: Lifecycle,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Create a frame writer with its own lifecycle and `\n` line endings.
    pub fn new(origin: SinkOrigin<W>, framing: Framing) -> Result<Self> {
        Self::with_lifecycle(origin, framing, LineEnding::Lf, Lifecycle::new())
    }

    /// Create a frame writer sharing `lifecycle` with other components.
    ///
    /// `line_ending` applies to raw sinks; a caller-supplied text adapter
    /// keeps its own.
    pub fn with_lifecycle(
        origin: SinkOrigin<W>,
        framing: Framing,
        line_ending: LineEnding,
        lifecycle: Lifecycle,
    ) -> Result<Self> {
        framing.validate()?;
        let slot = match origin {
            SinkOrigin::Raw(stream) => SinkSlot {
                text: TextWriter::with_line_ending(stream, line_ending),
                raw: true,
                torn: false,
            },
            SinkOrigin::Text(text) => SinkSlot {
                text,
                raw: false,
                torn: false,
            },
        };
        Ok(Self {
            line_ending: slot.text.line_ending(),
            gate: ExclusiveGate::new(Some(slot)),
            framing,
            lifecycle,
        })
    }

    /// Render `message` and write it as one frame.
    pub async fn write<M: Message>(&self, message: &M, cancel: &CancellationToken) -> Result<()> {
        let content = message.to_text().map_err(|err| {
            FrameError::InvalidArgument(format!("failed to render message: {err}"))
        })?;
        self.write_text(&content, cancel).await
    }

    /// Write already-rendered content as one frame.
    ///
    /// Content is validated first, before the disposal and cancellation
    /// checks: invalid content reports `InvalidArgument` even on a disposed
    /// writer, and never takes the gate or touches the sink. Once the gate
    /// is held, only disposal can interrupt the frame.
    ///
    /// A frame that fails with an I/O error before any of its bytes reached
    /// the stream is retracted, so a retry does not send it twice. If the
    /// failure split the frame, every later write fails with
    /// [`FrameError::SinkFaulted`].
    pub async fn write_text(&self, content: &str, cancel: &CancellationToken) -> Result<()> {
        let mut frame = BytesMut::new();
        encode_frame(content, &self.framing, self.line_ending, &mut frame)?;
        self.lifecycle.check(cancel)?;

        let joint = self.lifecycle.joint(cancel);
        let mut slot = self.gate.acquire(&joint).await?;
        let sink = slot.as_mut().ok_or(FrameError::Disposed)?;
        if sink.torn {
            return Err(FrameError::SinkFaulted);
        }

        let before = sink.text.pending();
        let emitted = self
            .lifecycle
            .unless_disposed(async {
                sink.text.write_encoded(&frame).await?;
                sink.text.flush().await
            })
            .await;

        match emitted {
            Ok(Ok(())) => {
                debug!(bytes = frame.len(), "frame written");
                Ok(())
            }
            Ok(Err(err)) => {
                let pending = sink.text.pending();
                if pending == before + frame.len() {
                    sink.text.truncate_pending(before);
                } else if pending > 0 {
                    warn!(error = %err, pending, "sink failed mid-frame");
                    sink.text.truncate_pending(0);
                    sink.torn = true;
                }
                Err(joint.map_io(err))
            }
            Err(cancelled) => {
                if sink.text.pending() == before + frame.len() {
                    // Nothing of this frame reached the stream; take it back.
                    sink.text.truncate_pending(before);
                } else if sink.text.pending() > 0 {
                    debug!(
                        pending = sink.text.pending(),
                        "write interrupted by disposal mid-frame"
                    );
                }
                Err(cancelled)
            }
        }
    }

    /// Fire the disposal signal, wait for the in-flight write to leave the
    /// gate, then tear down the sink.
    ///
    /// Raw sinks: the adapter is flushed and discarded; the stream is shut
    /// down unless `leave_open`, in which case it is handed back. Text sinks:
    /// shut down unless `leave_open`, in which case handed back untouched.
    /// Returns `None` on every call after the first.
    pub async fn close(&self, leave_open: bool, timeout: Duration) -> Option<ReleasedSink<W>> {
        self.lifecycle.dispose();
        let SinkSlot { mut text, raw, .. } = self.gate.acquire_for_teardown().await.take()?;

        match (raw, leave_open) {
            (true, true) => {
                teardown(&mut text, timeout, false).await;
                Some(ReleasedSink::Raw(text.into_inner()))
            }
            (false, true) => Some(ReleasedSink::Text(text)),
            (_, false) => {
                teardown(&mut text, timeout, true).await;
                None
            }
        }
    }

    pub fn framing(&self) -> &Framing {
        &self.framing
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}

async fn teardown<W: AsyncWrite + Unpin>(
    text: &mut TextWriter<W>,
    timeout: Duration,
    shutdown: bool,
) {
    let finished = tokio::time::timeout(timeout, async {
        if shutdown {
            text.shutdown().await
        } else {
            text.flush().await
        }
    })
    .await;

    match finished {
        Ok(Ok(())) => debug!(shutdown, "sink torn down"),
        Ok(Err(err)) => warn!(error = %err, pending = text.pending(), "sink teardown failed"),
        Err(_) => warn!(?timeout, pending = text.pending(), "sink teardown timed out"),
    }
    if text.pending() > 0 {
        warn!(pending = text.pending(), "sink released with an incomplete frame");
    }
}
