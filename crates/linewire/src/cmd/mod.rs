use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgGroup, Args, Subcommand};
use linewire_frame::{CancellationToken, EndpointConfig, ErrorKind, FrameError, LineEnding};

use crate::exit::{frame_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Echo every received frame back to its sender.
    Echo(EchoArgs),
    /// Send a single frame.
    Send(SendArgs),
    /// Listen and print received frames.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    if let Command::Version(args) = command {
        return version::run(args);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;

    runtime.block_on(async move {
        match command {
            Command::Echo(args) => echo::run(args).await,
            Command::Send(args) => send::run(args, format).await,
            Command::Listen(args) => listen::run(args, format).await,
            Command::Version(args) => version::run(args),
        }
    })
}

/// Framing options shared by every command that opens an endpoint.
#[derive(Args, Debug, Clone, Default)]
pub struct FramingArgs {
    /// Sentinel line that closes each frame. Omit for one-line frames.
    #[arg(long, value_name = "SENTINEL", allow_hyphen_values = true)]
    pub delimiter: Option<String>,
    /// Terminate written lines with CRLF instead of LF.
    #[arg(long)]
    pub crlf: bool,
}

impl FramingArgs {
    pub fn config(&self) -> CliResult<EndpointConfig> {
        let config = match &self.delimiter {
            Some(sentinel) => EndpointConfig::delimited(sentinel.clone()),
            None => EndpointConfig::line(),
        };
        let line_ending = if self.crlf {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        };
        let config = config.with_line_ending(line_ending);
        config
            .validate()
            .map_err(|err| CliError::new(USAGE, format!("invalid framing: {err}")))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("payload").required(true).args(["json", "data", "file"])))]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// JSON payload, sent in compact form.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file (one trailing newline is dropped).
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for one response frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// What a receive loop does with a failed read.
#[derive(Debug)]
pub enum ReadErrorDisposition {
    /// The bad frame was dropped; the stream is still usable.
    Skip,
    /// The peer went away mid-frame; move on to the next connection.
    Closed,
    /// Shutdown was requested.
    Stop,
    Fatal(CliError),
}

pub fn classify_read_error(err: FrameError) -> ReadErrorDisposition {
    if err.is_recoverable() {
        tracing::warn!(error = %err, "skipping unreadable frame");
        return ReadErrorDisposition::Skip;
    }
    if let FrameError::TruncatedFrame { lines } = err {
        tracing::warn!(lines, "peer closed mid-frame");
        return ReadErrorDisposition::Closed;
    }
    if is_peer_disconnect(&err) {
        tracing::debug!(error = %err, "peer disconnected");
        return ReadErrorDisposition::Closed;
    }
    match err.kind() {
        ErrorKind::Cancelled | ErrorKind::Disposed => ReadErrorDisposition::Stop,
        _ => ReadErrorDisposition::Fatal(frame_error("receive failed", err)),
    }
}

/// True for I/O failures that only mean this one peer went away.
pub fn is_peer_disconnect(err: &FrameError) -> bool {
    match err {
        FrameError::Io(err) => matches!(
            err.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
        ),
        FrameError::SinkFaulted => true,
        _ => false,
    }
}

/// Cancel `shutdown` on the first ctrl-c.
pub fn install_ctrlc_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received, shutting down");
                shutdown.cancel();
            }
            Err(err) => tracing::warn!(error = %err, "signal handler setup failed"),
        }
    });
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}
