mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "linewire", version, about = "Line-framed message transport CLI")]
struct Cli {
    /// Output format for received frames.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "linewire",
            "send",
            "/tmp/test.sock",
            "--delimiter",
            "--END--",
            "--data",
            "hello",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.framing.delimiter.as_deref(), Some("--END--"));
                assert_eq!(args.data.as_deref(), Some("hello"));
                assert!(!args.wait);
            }
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "linewire",
            "send",
            "/tmp/test.sock",
            "--json",
            "{\"x\":1}",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn send_requires_a_payload() {
        let err = Cli::try_parse_from(["linewire", "send", "/tmp/test.sock"])
            .expect_err("missing payload should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_listen_with_global_flags() {
        let cli = Cli::try_parse_from([
            "linewire",
            "listen",
            "/tmp/test.sock",
            "--count",
            "2",
            "--crlf",
            "--format",
            "raw",
            "--log-level",
            "debug",
        ])
        .expect("listen args should parse");

        assert!(matches!(cli.format, Some(OutputFormat::Raw)));
        match cli.command {
            Command::Listen(args) => {
                assert_eq!(args.count, Some(2));
                assert!(args.framing.crlf);
            }
            other => panic!("expected listen, got {other:?}"),
        }
    }
}
