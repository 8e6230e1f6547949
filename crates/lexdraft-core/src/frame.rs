//! Frame payload classification and decoding.
//!
//! A payload is the text after the `data: ` prefix of one line. Bracketed tags
//! select the kind of frame; anything that is not a recognised tag is legacy
//! raw text.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::state::StructuredDiff;

pub const DONE_SENTINEL: &str = "[DONE]";

const TOOL_START: &str = "TOOL_START";
const TOOL_EXECUTING: &str = "TOOL_EXECUTING";
const TOOL_RESULT: &str = "TOOL_RESULT";
const LATEX_DOCUMENT: &str = "LATEX_DOCUMENT";
const DIFF_DATA: &str = "DIFF_DATA";
const TEXT: &str = "TEXT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    ToolStart(String),
    ToolExecuting(String),
    ToolResult(String),
    Document(String),
    Diff(StructuredDiff),
    Text(String),
    /// Untagged payload from servers that predate the tag protocol
    Legacy(String),
    Done,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed base64 in {tag} frame: {source}")]
    Base64 {
        tag: &'static str,
        #[source]
        source: base64::DecodeError,
    },
    #[error("{tag} frame is not valid UTF-8: {source}")]
    Utf8 {
        tag: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("malformed diff JSON: {0}")]
    DiffJson(#[from] serde_json::Error),
}

impl Frame {
    /// Classify a payload, checking tags in fixed priority order.
    pub fn parse(payload: &str) -> Result<Frame, FrameError> {
        if payload == DONE_SENTINEL {
            return Ok(Frame::Done);
        }

        if let Some(name) = tag_body(payload, TOOL_START) {
            return Ok(Frame::ToolStart(name.to_string()));
        }
        if let Some(name) = tag_body(payload, TOOL_EXECUTING) {
            return Ok(Frame::ToolExecuting(name.to_string()));
        }
        if let Some(name) = tag_body(payload, TOOL_RESULT) {
            return Ok(Frame::ToolResult(name.to_string()));
        }
        if let Some(encoded) = tag_body(payload, LATEX_DOCUMENT) {
            return decode_text(LATEX_DOCUMENT, encoded).map(Frame::Document);
        }
        if let Some(encoded) = tag_body(payload, DIFF_DATA) {
            let json = decode_text(DIFF_DATA, encoded)?;
            let diff: StructuredDiff = serde_json::from_str(&json)?;
            return Ok(Frame::Diff(diff));
        }
        if let Some(encoded) = tag_body(payload, TEXT) {
            return decode_text(TEXT, encoded).map(Frame::Text);
        }

        Ok(Frame::Legacy(payload.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::ToolStart(_) => TOOL_START,
            Frame::ToolExecuting(_) => TOOL_EXECUTING,
            Frame::ToolResult(_) => TOOL_RESULT,
            Frame::Document(_) => LATEX_DOCUMENT,
            Frame::Diff(_) => DIFF_DATA,
            Frame::Text(_) => TEXT,
            Frame::Legacy(_) => "LEGACY",
            Frame::Done => "DONE",
        }
    }
}

/// Return the inside of `[TAG:...]`, or None when the payload has another shape.
fn tag_body<'a>(payload: &'a str, tag: &str) -> Option<&'a str> {
    payload
        .strip_prefix('[')?
        .strip_prefix(tag)?
        .strip_prefix(':')?
        .strip_suffix(']')
}

fn decode_text(tag: &'static str, encoded: &str) -> Result<String, FrameError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|source| FrameError::Base64 { tag, source })?;
    String::from_utf8(bytes).map_err(|source| FrameError::Utf8 { tag, source })
}

/// Encode a payload the way the server does; used to build frames in tests
/// and fixtures.
pub fn encode_frame(tag: &str, body: &str) -> String {
    format!("[{}:{}]", tag, STANDARD.encode(body.as_bytes()))
}
