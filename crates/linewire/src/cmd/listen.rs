use linewire_frame::{CancellationToken, Endpoint};
use linewire_transport::UnixDomainSocket;

use crate::cmd::{classify_read_error, install_ctrlc_handler, ListenArgs, ReadErrorDisposition};
use crate::exit::{frame_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.framing.config()?;
    let listener =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;

    let shutdown = CancellationToken::new();
    install_ctrlc_handler(shutdown.clone());

    let mut printed = 0usize;
    let mut connections = 0u64;

    loop {
        let stream = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(SUCCESS),
            accepted = listener.accept() => {
                accepted.map_err(|err| transport_error("accept failed", err))?
            }
        };
        connections += 1;
        let peer = format!("conn-{connections}");
        let endpoint = Endpoint::from_stream(stream, config.clone())
            .map_err(|err| frame_error("endpoint setup failed", err))?;

        loop {
            let content = match endpoint.read_text(&shutdown).await {
                Ok(Some(content)) => content,
                Ok(None) => break,
                Err(err) => match classify_read_error(err) {
                    ReadErrorDisposition::Skip => continue,
                    ReadErrorDisposition::Closed => break,
                    ReadErrorDisposition::Stop => {
                        endpoint.dispose().await;
                        return Ok(SUCCESS);
                    }
                    ReadErrorDisposition::Fatal(err) => return Err(err),
                },
            };

            print_frame(&content, &config.framing, &peer, format);
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    endpoint.dispose().await;
                    return Ok(SUCCESS);
                }
            }
        }

        tracing::debug!(%peer, "connection closed");
        endpoint.dispose().await;
    }
}
