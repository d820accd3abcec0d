use std::fs;

use linewire_frame::{validate_content, CancellationToken, Endpoint, Framing};
use linewire_transport::UnixDomainSocket;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{
    frame_error, io_error, transport_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS,
    TIMEOUT, USAGE,
};
use crate::output::{print_frame, OutputFormat};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let config = args.framing.config()?;
    let payload = resolve_payload(&args, &config.framing)?;

    let stream = UnixDomainSocket::connect(&args.path)
        .await
        .map_err(|err| transport_error("connect failed", err))?;
    let endpoint = Endpoint::from_stream(stream, config)
        .map_err(|err| frame_error("endpoint setup failed", err))?;
    let cancel = CancellationToken::new();

    endpoint
        .write_text(&payload, &cancel)
        .await
        .map_err(|err| frame_error("send failed", err))?;

    if args.wait {
        let response = tokio::time::timeout(wait_timeout, endpoint.read_text(&cancel))
            .await
            .map_err(|_| {
                CliError::new(
                    TIMEOUT,
                    format!("no response within {}", args.wait_timeout.trim()),
                )
            })?
            .map_err(|err| frame_error("receive failed", err))?;
        let Some(response) = response else {
            return Err(CliError::new(
                FAILURE,
                "peer closed the connection before responding",
            ));
        };
        let peer = args.path.display().to_string();
        print_frame(&response, &endpoint.config().framing, &peer, format);
    }

    endpoint.dispose().await;
    Ok(SUCCESS)
}

/// Resolve the payload to frame content, rejecting anything the framing
/// cannot carry before a connection is opened.
fn resolve_payload(args: &SendArgs, framing: &Framing) -> CliResult<String> {
    let content = if let Some(json) = &args.json {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        value.to_string()
    } else if let Some(data) = &args.data {
        data.clone()
    } else if let Some(path) = &args.file {
        let text = fs::read_to_string(path).map_err(|err| {
            io_error(&format!("failed reading {}", path.display()), err)
        })?;
        strip_trailing_newline(&text).to_string()
    } else {
        return Err(CliError::new(USAGE, "one of --json, --data or --file is required"));
    };

    validate_content(&content, framing)
        .map_err(|err| CliError::new(DATA_INVALID, format!("payload cannot be framed: {err}")))?;
    Ok(content)
}

fn strip_trailing_newline(text: &str) -> &str {
    match text.strip_suffix('\n') {
        Some(rest) => rest.strip_suffix('\r').unwrap_or(rest),
        None => text,
    }
}
