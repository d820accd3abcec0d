use std::sync::Arc;

use linewire_frame::{CancellationToken, Endpoint, ErrorKind, FrameError};
use linewire_transport::UnixDomainSocket;

use crate::cmd::{
    classify_read_error, install_ctrlc_handler, is_peer_disconnect, EchoArgs, ReadErrorDisposition,
};
use crate::exit::{frame_error, transport_error, CliResult, SUCCESS};

/// How one echo session ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    PeerClosed,
    Shutdown,
}

pub async fn run(args: EchoArgs) -> CliResult<i32> {
    let config = args.framing.config()?;
    let listener =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;

    let shutdown = CancellationToken::new();
    install_ctrlc_handler(shutdown.clone());

    loop {
        let stream = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(SUCCESS),
            accepted = listener.accept() => {
                accepted.map_err(|err| transport_error("accept failed", err))?
            }
        };
        let endpoint = Arc::new(
            Endpoint::from_stream(stream, config.clone())
                .map_err(|err| frame_error("endpoint setup failed", err))?,
        );

        // Interrupts dispose the live endpoint; the session observes it as
        // cancellation of whatever read or write is in flight.
        let watcher = {
            let endpoint = Arc::clone(&endpoint);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                endpoint.dispose().await;
            })
        };

        let outcome = echo_session(&endpoint).await;
        if !shutdown.is_cancelled() {
            watcher.abort();
        }
        let _ = watcher.await;
        endpoint.dispose().await;

        match outcome? {
            SessionEnd::PeerClosed => tracing::debug!("peer disconnected"),
            SessionEnd::Shutdown => return Ok(SUCCESS),
        }
    }
}

async fn echo_session<R, W>(endpoint: &Endpoint<R, W>) -> CliResult<SessionEnd>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let cancel = CancellationToken::new();
    loop {
        let content = match endpoint.read_text(&cancel).await {
            Ok(Some(content)) => content,
            Ok(None) => return Ok(SessionEnd::PeerClosed),
            Err(err) => match classify_read_error(err) {
                ReadErrorDisposition::Skip => continue,
                ReadErrorDisposition::Closed => return Ok(SessionEnd::PeerClosed),
                ReadErrorDisposition::Stop => return Ok(SessionEnd::Shutdown),
                ReadErrorDisposition::Fatal(err) => return Err(err),
            },
        };

        tracing::info!(size = content.len(), "echoing frame");

        match endpoint.write_text(&content, &cancel).await {
            Ok(()) => {}
            Err(err) => match classify_write_error(err) {
                Some(end) => return end,
                None => continue,
            },
        }
    }
}

/// `None` keeps the session going.
fn classify_write_error(err: FrameError) -> Option<CliResult<SessionEnd>> {
    match err.kind() {
        ErrorKind::InvalidArgument => {
            tracing::warn!(error = %err, "frame cannot be echoed in this framing");
            None
        }
        ErrorKind::Cancelled | ErrorKind::Disposed => Some(Ok(SessionEnd::Shutdown)),
        ErrorKind::Faulted if is_peer_disconnect(&err) => {
            tracing::debug!(error = %err, "peer disconnected during echo");
            Some(Ok(SessionEnd::PeerClosed))
        }
        ErrorKind::Faulted => Some(Err(frame_error("echo send failed", err))),
    }
}
