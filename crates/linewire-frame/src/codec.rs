use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// Default maximum length of a single line: 16 MiB.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// How frames are delimited inside the line stream.
///
/// Fixed for the lifetime of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Every non-empty line is one frame. Empty lines are separators.
    #[default]
    Line,
    /// Content lines followed by a line exactly equal to the sentinel.
    Delimiter(String),
}

impl Framing {
    /// Build a delimiter framing, validating the sentinel.
    pub fn delimiter(sentinel: impl Into<String>) -> Result<Self> {
        let framing = Framing::Delimiter(sentinel.into());
        framing.validate()?;
        Ok(framing)
    }

    /// The sentinel, if this is delimiter mode.
    pub fn sentinel(&self) -> Option<&str> {
        match self {
            Framing::Line => None,
            Framing::Delimiter(sentinel) => Some(sentinel),
        }
    }

    /// Check that the sentinel is usable as a line of its own.
    pub fn validate(&self) -> Result<()> {
        if let Framing::Delimiter(sentinel) = self {
            if sentinel.is_empty() {
                return Err(FrameError::InvalidArgument(
                    "delimiter must not be empty".to_string(),
                ));
            }
            if sentinel.contains(['\n', '\r']) {
                return Err(FrameError::InvalidArgument(
                    "delimiter must not contain a line break".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Line terminator emitted after each written line.
///
/// Readers accept both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
        }
    }
}

/// Check that `content` can be carried by `framing` without corrupting it.
pub fn validate_content(content: &str, framing: &Framing) -> Result<()> {
    if content.contains('\r') {
        return Err(FrameError::InvalidArgument(
            "message text contains a carriage return".to_string(),
        ));
    }
    match framing {
        Framing::Line => {
            if content.is_empty() {
                return Err(FrameError::InvalidArgument(
                    "message text is empty (line mode)".to_string(),
                ));
            }
            if content.contains('\n') {
                return Err(FrameError::InvalidArgument(
                    "message text contains a line break (line mode)".to_string(),
                ));
            }
        }
        Framing::Delimiter(sentinel) => {
            if content.split('\n').any(|line| line == sentinel) {
                return Err(FrameError::InvalidArgument(format!(
                    "message text contains the delimiter line {sentinel:?}"
                )));
            }
        }
    }
    Ok(())
}

/// Encode one frame of `content` into `dst`.
///
/// Wire format:
/// ```text
/// line mode:       <content><eol>
/// delimiter mode:  <content><eol><sentinel><eol>
/// ```
pub fn encode_frame(
    content: &str,
    framing: &Framing,
    line_ending: LineEnding,
    dst: &mut BytesMut,
) -> Result<()> {
    validate_content(content, framing)?;

    let eol = line_ending.as_bytes();
    let sentinel = framing.sentinel().unwrap_or_default();
    dst.reserve(content.len() + sentinel.len() + 2 * eol.len());
    dst.put_slice(content.as_bytes());
    dst.put_slice(eol);
    if framing.sentinel().is_some() {
        dst.put_slice(sentinel.as_bytes());
        dst.put_slice(eol);
    }
    Ok(())
}

/// Turns a sequence of lines into frame contents.
///
/// Holds the partial frame between calls, so a reader can be interrupted
/// between lines without losing what it already consumed.
#[derive(Debug)]
pub struct FrameAssembler {
    framing: Framing,
    lines: Vec<String>,
    discarding: bool,
}

impl FrameAssembler {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            lines: Vec::new(),
            discarding: false,
        }
    }

    /// Feed one line. Returns the frame content once a frame is complete.
    pub fn push_line(&mut self, line: String) -> Option<String> {
        match &self.framing {
            Framing::Line => (!line.is_empty()).then_some(line),
            Framing::Delimiter(sentinel) => {
                if line == *sentinel {
                    if self.discarding {
                        self.discarding = false;
                        self.lines.clear();
                        return None;
                    }
                    let content = self.lines.join("\n");
                    self.lines.clear();
                    return Some(content);
                }
                if !self.discarding {
                    self.lines.push(line);
                }
                None
            }
        }
    }

    /// Drop the frame in progress after a bad line.
    ///
    /// In delimiter mode everything up to the next sentinel is skipped too.
    pub fn discard_frame(&mut self) {
        self.lines.clear();
        if self.framing.sentinel().is_some() {
            self.discarding = true;
        }
    }

    /// Signal end of input.
    ///
    /// Fails if a delimited frame was started but never terminated. Trailing
    /// blank lines do not count as a started frame.
    pub fn finish(&mut self) -> Result<()> {
        let lines = std::mem::take(&mut self.lines);
        self.discarding = false;
        if lines.iter().all(String::is_empty) {
            return Ok(());
        }
        Err(FrameError::TruncatedFrame { lines: lines.len() })
    }

    /// Number of content lines buffered for the frame in progress.
    pub fn pending_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn framing(&self) -> &Framing {
        &self.framing
    }
}
