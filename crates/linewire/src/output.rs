use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use linewire_frame::Framing;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One decoded frame as reported on stdout.
#[derive(Serialize, Debug)]
pub struct FrameOutput<'a> {
    framing: &'static str,
    lines: usize,
    size: usize,
    content: &'a str,
    peer: &'a str,
    timestamp: String,
}

impl<'a> FrameOutput<'a> {
    pub fn new(content: &'a str, framing: &Framing, peer: &'a str) -> Self {
        Self {
            framing: framing_label(framing),
            lines: content.split('\n').count(),
            size: content.len(),
            content,
            peer,
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_frame(content: &str, framing: &Framing, peer: &str, format: OutputFormat) {
    let out = FrameOutput::new(content, framing, peer);
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FRAMING", "LINES", "SIZE", "PEER", "CONTENT"])
                .add_row(vec![
                    out.framing.to_string(),
                    out.lines.to_string(),
                    out.size.to_string(),
                    out.peer.to_string(),
                    out.content.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "framing={} lines={} size={} peer={} content={}",
                out.framing,
                out.lines,
                out.size,
                out.peer,
                out.content.escape_debug()
            );
        }
        OutputFormat::Raw => print_raw(content),
    }
}

/// Content followed by a single newline, so consecutive frames stay apart.
pub fn print_raw(content: &str) {
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(content.as_bytes());
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

pub fn framing_label(framing: &Framing) -> &'static str {
    match framing {
        Framing::Line => "line",
        Framing::Delimiter(_) => "delimiter",
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_output_counts_lines() {
        let framing = Framing::Delimiter("--END--".to_string());
        let out = FrameOutput::new("line1\nline2", &framing, "conn-1");
        assert_eq!(out.framing, "delimiter");
        assert_eq!(out.lines, 2);
        assert_eq!(out.size, 11);
    }

    #[test]
    fn frame_output_serializes_fields() {
        let out = FrameOutput::new("hello", &Framing::Line, "conn-7");
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["framing"], "line");
        assert_eq!(value["content"], "hello");
        assert_eq!(value["peer"], "conn-7");
        assert_eq!(value["lines"], 1);
    }
}
