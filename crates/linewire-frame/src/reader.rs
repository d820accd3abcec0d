use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::{FrameAssembler, Framing, DEFAULT_MAX_LINE_LENGTH};
use crate::error::{FrameError, Result};
use crate::gate::ExclusiveGate;
use crate::lifecycle::Lifecycle;
use crate::message::Message;
use crate::text::TextReader;

/// Where a reader's source came from. Decides what disposal tears down.
pub enum SourceOrigin<R> {
    /// A raw byte stream. The reader wraps it in a text adapter it owns.
    Raw(R),
    /// A text adapter supplied by the caller.
    Text(TextReader<R>),
}

/// A source handed back by disposal with `leave_open` set.
#[derive(Debug)]
pub enum ReleasedSource<R> {
    /// The raw stream plus bytes its discarded adapter had read ahead.
    Raw { stream: R, unread: Bytes },
    /// The caller's text adapter, untouched.
    Text(TextReader<R>),
}

struct SourceSlot<R> {
    text: TextReader<R>,
    assembler: FrameAssembler,
    raw: bool,
}

/// Reads complete frames from a source.
///
/// A source has one logical reader; the internal lock only keeps disposal
/// from tearing the source out from under a read in progress. Reads are
/// cancel safe: a cancelled read keeps the lines it already consumed and
/// the next read continues the same frame.
pub struct FrameReader<R> {
    lock: ExclusiveGate<Option<SourceSlot<R>>>,
    framing: Framing,
    lifecycle: Lifecycle,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a frame reader with its own lifecycle.
    pub fn new(origin: SourceOrigin<R>, framing: Framing) -> Result<Self> {
        Self::with_lifecycle(origin, framing, DEFAULT_MAX_LINE_LENGTH, Lifecycle::new())
    }

    /// Create a frame reader sharing `lifecycle` with other components.
    ///
    /// `max_line_length` applies to raw sources; a caller-supplied text
    /// adapter keeps its own limit.
    pub fn with_lifecycle(
        origin: SourceOrigin<R>,
        framing: Framing,
        max_line_length: usize,
        lifecycle: Lifecycle,
    ) -> Result<Self> {
        framing.validate()?;
        let slot = match origin {
            SourceOrigin::Raw(stream) => SourceSlot {
                text: TextReader::with_max_line_length(stream, max_line_length),
                assembler: FrameAssembler::new(framing.clone()),
                raw: true,
            },
            SourceOrigin::Text(text) => SourceSlot {
                text,
                assembler: FrameAssembler::new(framing.clone()),
                raw: false,
            },
        };
        Ok(Self {
            lock: ExclusiveGate::new(Some(slot)),
            framing,
            lifecycle,
        })
    }

    /// Read and decode the next frame.
    ///
    /// Returns `Ok(None)` at end of stream. A decode failure consumes the
    /// frame, so the next call starts on the following one.
    pub async fn read<M: Message>(&self, cancel: &CancellationToken) -> Result<Option<M>> {
        let Some(content) = self.read_text(cancel).await? else {
            return Ok(None);
        };
        M::from_text(&content).map(Some).map_err(FrameError::Decode)
    }

    /// Read the next frame's raw content.
    pub async fn read_text(&self, cancel: &CancellationToken) -> Result<Option<String>> {
        self.lifecycle.check(cancel)?;

        let joint = self.lifecycle.joint(cancel);
        let mut slot = self.lock.acquire(&joint).await?;
        let source = slot.as_mut().ok_or(FrameError::Disposed)?;

        loop {
            let line = match joint.guard(source.text.read_line()).await? {
                Ok(line) => line,
                Err(FrameError::Io(err)) => return Err(joint.map_io(err)),
                Err(err) => {
                    // The adapter already skipped the bad line; drop the rest
                    // of its frame too.
                    source.assembler.discard_frame();
                    return Err(err);
                }
            };

            let Some(line) = line else {
                source.assembler.finish()?;
                return Ok(None);
            };
            if let Some(content) = source.assembler.push_line(line) {
                debug!(bytes = content.len(), "frame read");
                return Ok(Some(content));
            }
        }
    }

    /// Fire the disposal signal, wait for the read in progress to bail out,
    /// then tear down the source.
    ///
    /// Raw sources: the adapter is discarded; the stream is dropped unless
    /// `leave_open`, in which case it is handed back with any read-ahead
    /// bytes. Text sources: dropped unless `leave_open`, in which case handed
    /// back untouched. Returns `None` on every call after the first.
    pub async fn close(&self, leave_open: bool) -> Option<ReleasedSource<R>> {
        self.lifecycle.dispose();
        let SourceSlot {
            text,
            assembler,
            raw,
        } = self.lock.acquire_for_teardown().await.take()?;

        if assembler.pending_lines() > 0 {
            warn!(
                lines = assembler.pending_lines(),
                "source released with an incomplete frame"
            );
        }

        match (raw, leave_open) {
            (true, true) => {
                let (stream, unread) = text.into_parts();
                Some(ReleasedSource::Raw { stream, unread })
            }
            (false, true) => Some(ReleasedSource::Text(text)),
            (_, false) => {
                debug!("source closed");
                None
            }
        }
    }

    pub fn framing(&self) -> &Framing {
        &self.framing
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use serde::{Deserialize, Serialize};
    use tokio::io::{AsyncWriteExt, ReadBuf};

    use super::*;
    use crate::message::Json;
    use crate::writer::{FrameWriter, SinkOrigin};

    fn delimited() -> Framing {
        Framing::delimiter("--END--").unwrap()
    }

    fn reader_over(bytes: &'static [u8], framing: Framing) -> FrameReader<&'static [u8]> {
        FrameReader::new(SourceOrigin::Raw(bytes), framing).unwrap()
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Call {
        method: String,
    }

    #[tokio::test]
    async fn line_mode_skips_empty_lines() {
        let reader = reader_over(b"\n\nfoo\n\n", Framing::Line);
        let cancel = CancellationToken::new();
        assert_eq!(reader.read_text(&cancel).await.unwrap().as_deref(), Some("foo"));
        assert!(reader.read_text(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delimiter_mode_joins_lines() {
        let reader = reader_over(b"line1\nline2\n--END--\n", delimited());
        let cancel = CancellationToken::new();
        let msg: String = reader.read(&cancel).await.unwrap().unwrap();
        assert_eq!(msg, "line1\nline2");
        assert!(reader.read::<String>(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_multiple_frames() {
        let reader = reader_over(b"one\r\ntwo\nthree", Framing::Line);
        let cancel = CancellationToken::new();
        for expected in ["one", "two", "three"] {
            assert_eq!(
                reader.read_text(&cancel).await.unwrap().as_deref(),
                Some(expected)
            );
        }
        assert!(reader.read_text(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_frame_faults_then_ends() {
        let reader = reader_over(b"done\n--END--\ndangling\n", delimited());
        let cancel = CancellationToken::new();
        assert_eq!(reader.read_text(&cancel).await.unwrap().as_deref(), Some("done"));
        let err = reader.read_text(&cancel).await.unwrap_err();
        assert!(matches!(err, FrameError::TruncatedFrame { lines: 1 }));
        assert!(reader.read_text(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn decode_failure_does_not_corrupt_next_frame() {
        let reader = reader_over(
            b"{\"method\":\"a\"}\n{broken\n{\"method\":\"b\"}\n",
            Framing::Line,
        );
        let cancel = CancellationToken::new();

        let first: Json<Call> = reader.read(&cancel).await.unwrap().unwrap();
        assert_eq!(first.0.method, "a");

        let err = reader.read::<Json<Call>>(&cancel).await.unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
        assert!(err.is_recoverable());

        let third: Json<Call> = reader.read(&cancel).await.unwrap().unwrap();
        assert_eq!(third.0.method, "b");
    }

    #[tokio::test]
    async fn overlong_line_discards_its_frame() {
        let source: &'static [u8] =
            b"ok\n--END--\nthis-line-is-too-long\nmore\n--END--\nnext\n--END--\n";
        let reader =
            FrameReader::with_lifecycle(SourceOrigin::Raw(source), delimited(), 8, Lifecycle::new())
                .unwrap();
        let cancel = CancellationToken::new();

        assert_eq!(reader.read_text(&cancel).await.unwrap().as_deref(), Some("ok"));
        let err = reader.read_text(&cancel).await.unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { max: 8 }));
        assert_eq!(reader.read_text(&cancel).await.unwrap().as_deref(), Some("next"));
    }

    #[tokio::test]
    async fn pre_cancelled_token_performs_no_io() {
        let source = CountingReader::default();
        let reads = Arc::clone(&source.reads);
        let reader = FrameReader::new(SourceOrigin::Raw(source), Framing::Line).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = reader.read_text(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disposal_wakes_blocked_reader() {
        let (_near, far) = tokio::io::duplex(64);
        let reader = Arc::new(FrameReader::new(SourceOrigin::Raw(far), Framing::Line).unwrap());

        let blocked = {
            let reader = Arc::clone(&reader);
            tokio::spawn(async move { reader.read_text(&CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!blocked.is_finished());

        assert!(reader.close(false).await.is_none());
        assert!(blocked.await.unwrap().unwrap_err().is_cancelled());

        let err = reader
            .read_text(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Disposed));
    }

    #[tokio::test]
    async fn cancelled_read_keeps_partial_frame() {
        let (mut near, far) = tokio::io::duplex(64);
        let reader = FrameReader::new(SourceOrigin::Raw(far), delimited()).unwrap();

        near.write_all(b"first\n").await.unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        assert!(reader.read_text(&cancel).await.unwrap_err().is_cancelled());

        near.write_all(b"second\n--END--\n").await.unwrap();
        let content = reader
            .read_text(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(content.as_deref(), Some("first\nsecond"));
    }

    #[tokio::test]
    async fn roundtrip_over_unix_pair() {
        let (mut left, mut right) = tokio::net::UnixStream::pair().unwrap();
        for framing in [Framing::Line, delimited()] {
            let (_, sink) = left.split();
            let (source, _) = right.split();
            let writer = FrameWriter::new(SinkOrigin::Raw(sink), framing.clone()).unwrap();
            let reader = FrameReader::new(SourceOrigin::Raw(source), framing).unwrap();
            let cancel = CancellationToken::new();

            let sent = Json(serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": "a\nb" }));
            writer.write(&sent, &cancel).await.unwrap();
            let received: Json<serde_json::Value> = reader.read(&cancel).await.unwrap().unwrap();
            assert_eq!(received, sent);
        }
    }

    #[tokio::test]
    async fn leave_open_returns_read_ahead() {
        let reader = reader_over(b"first\nsecond\n", Framing::Line);
        let cancel = CancellationToken::new();
        assert_eq!(reader.read_text(&cancel).await.unwrap().as_deref(), Some("first"));

        let Some(ReleasedSource::Raw { unread, .. }) = reader.close(true).await else {
            panic!("expected the raw source back");
        };
        assert_eq!(unread.as_ref(), b"second\n");
        assert!(reader.close(true).await.is_none());
    }

    #[derive(Default)]
    struct CountingReader {
        reads: Arc<AtomicUsize>,
    }

    impl AsyncRead for CountingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Poll::Ready(Ok(()))
        }
    }
}
