//! Applies frames to the conversation, document, and tool banner.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::frame::Frame;
use crate::state::{ChatMessage, Conversation, DiffMode, DocumentState, ToolPhase, ToolStatus};

/// Appended to the open assistant message when the transport fails.
pub const TRANSPORT_ERROR_MARKER: &str = "\n\n[Error: connection to the drafting server failed]";

/// Feature switches that used to be separate client builds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineFlags {
    pub diff_mode: DiffMode,
    pub highlight_changes: bool,
    pub tool_banners: bool,
    /// How long a finished tool stays on the banner; zero clears at once
    pub tool_result_linger: Duration,
}

impl Default for PipelineFlags {
    fn default() -> Self {
        Self {
            diff_mode: DiffMode::Structured,
            highlight_changes: true,
            tool_banners: true,
            tool_result_linger: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    Done,
}

/// All mutable conversation state for one front end.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    pub conversation: Conversation,
    pub document: DocumentState,
    pub tool: Option<ToolStatus>,
    pub flags: PipelineFlags,
    streaming: bool,
}

impl ChatSession {
    pub fn new(flags: PipelineFlags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Record a user message and open the assistant reply it streams into.
    pub fn begin_send(&mut self, text: &str) {
        self.conversation.open_exchange(text);
        self.streaming = true;
    }

    /// Apply one frame in arrival order.
    pub fn apply(&mut self, frame: Frame, now: Instant) -> FrameOutcome {
        match frame {
            Frame::ToolStart(name) => self.set_tool(ToolPhase::Start, name, now),
            Frame::ToolExecuting(name) => self.set_tool(ToolPhase::Executing, name, now),
            Frame::ToolResult(name) => {
                self.set_tool(ToolPhase::Result, name, now);
                if self.flags.tool_result_linger.is_zero() {
                    self.tool = None;
                }
            }
            Frame::Document(body) => {
                debug!(len = body.len(), "document replaced");
                self.document.replace(body, self.flags.diff_mode);
            }
            Frame::Diff(diff) => self.document.set_diff(diff),
            Frame::Text(text) | Frame::Legacy(text) => {
                if !self.conversation.append_to_open(&text) {
                    warn!("text frame arrived with no open assistant message");
                }
            }
            Frame::Done => {
                self.finish_stream();
                return FrameOutcome::Done;
            }
        }
        FrameOutcome::Continue
    }

    fn set_tool(&mut self, phase: ToolPhase, name: String, now: Instant) {
        if self.flags.tool_banners {
            self.tool = Some(ToolStatus {
                phase,
                name,
                since: now,
            });
        }
    }

    /// Clear a finished tool banner once it has been shown long enough.
    pub fn tick(&mut self, now: Instant) {
        let expired = matches!(
            &self.tool,
            Some(ToolStatus { phase: ToolPhase::Result, since, .. })
                if now.saturating_duration_since(*since) >= self.flags.tool_result_linger
        );
        if expired {
            self.tool = None;
        }
    }

    pub fn finish_stream(&mut self) {
        self.streaming = false;
        self.tool = None;
    }

    /// Surface a transport failure inline and stop streaming. No retry.
    pub fn fail_stream(&mut self) {
        self.conversation.append_to_open(TRANSPORT_ERROR_MARKER);
        self.finish_stream();
    }

    /// Record a reply obtained without streaming.
    pub fn push_reply(&mut self, user_text: &str, reply: String) {
        self.conversation.push(ChatMessage::user(user_text));
        self.conversation.push(ChatMessage::assistant(reply));
    }

    /// Drop all local state, independent of what the server does.
    pub fn clear_history(&mut self) {
        self.conversation.clear();
        self.document.clear();
        self.tool = None;
        self.streaming = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_frame;
    use crate::state::StructuredDiff;
    use pretty_assertions::assert_eq;

    fn session() -> ChatSession {
        let mut s = ChatSession::new(PipelineFlags::default());
        s.begin_send("Draft a mutual NDA");
        s
    }

    fn apply_payload(s: &mut ChatSession, payload: &str) -> FrameOutcome {
        s.apply(Frame::parse(payload).unwrap(), Instant::now())
    }

    #[test]
    fn test_hello_world_scenario() {
        let mut s = session();
        assert_eq!(apply_payload(&mut s, "[TEXT:SGVsbG8=]"), FrameOutcome::Continue);
        assert_eq!(apply_payload(&mut s, "[TEXT:IHdvcmxk]"), FrameOutcome::Continue);
        assert_eq!(apply_payload(&mut s, "[DONE]"), FrameOutcome::Done);

        assert_eq!(s.conversation.messages().last().unwrap().content, "Hello world");
        assert!(!s.is_streaming());
    }

    #[test]
    fn test_tool_frames_do_not_touch_message() {
        let mut s = session();
        apply_payload(&mut s, "[TOOL_START:generate_document]");
        assert_eq!(s.tool.as_ref().unwrap().phase, ToolPhase::Start);
        apply_payload(&mut s, "[TOOL_EXECUTING:generate_document]");
        assert_eq!(s.tool.as_ref().unwrap().phase, ToolPhase::Executing);
        assert_eq!(s.conversation.messages().last().unwrap().content, "");
    }

    #[test]
    fn test_tool_result_lingers_then_clears() {
        let mut s = session();
        let t0 = Instant::now();
        s.apply(Frame::ToolResult("apply_edits".into()), t0);
        s.tick(t0 + Duration::from_millis(500));
        assert!(s.tool.is_some());
        s.tick(t0 + Duration::from_millis(2000));
        assert!(s.tool.is_none());
    }

    #[test]
    fn test_tool_result_clears_immediately_without_linger() {
        let mut s = ChatSession::new(PipelineFlags {
            tool_result_linger: Duration::ZERO,
            ..PipelineFlags::default()
        });
        s.begin_send("x");
        s.apply(Frame::ToolStart("apply_edits".into()), Instant::now());
        assert!(s.tool.is_some());
        s.apply(Frame::ToolResult("apply_edits".into()), Instant::now());
        assert!(s.tool.is_none());
    }

    #[test]
    fn test_banners_disabled_keeps_status_idle() {
        let mut s = ChatSession::new(PipelineFlags {
            tool_banners: false,
            ..PipelineFlags::default()
        });
        s.begin_send("x");
        s.apply(Frame::ToolStart("apply_edits".into()), Instant::now());
        assert!(s.tool.is_none());
    }

    #[test]
    fn test_document_history_follows_diff_mode() {
        let mut s = ChatSession::new(PipelineFlags {
            diff_mode: DiffMode::Line,
            ..PipelineFlags::default()
        });
        s.begin_send("x");
        apply_payload(&mut s, &encode_frame("LATEX_DOCUMENT", "first"));
        apply_payload(&mut s, &encode_frame("LATEX_DOCUMENT", "second"));
        assert_eq!(s.document.current.as_deref(), Some("second"));
        assert_eq!(s.document.previous.as_deref(), Some("first"));
    }

    #[test]
    fn test_diff_frame_replaces_structured_diff() {
        let mut s = session();
        s.apply(
            Frame::Diff(StructuredDiff {
                has_changes: false,
                ..StructuredDiff::default()
            }),
            Instant::now(),
        );
        assert!(s.document.active_diff().is_none());
        apply_payload(
            &mut s,
            &encode_frame("DIFF_DATA", r#"{"has_changes":true,"additions":[{"content":"Term"}]}"#),
        );
        assert_eq!(s.document.active_diff().unwrap().additions.len(), 1);
    }

    #[test]
    fn test_legacy_text_is_appended_verbatim() {
        let mut s = session();
        apply_payload(&mut s, "Sure, ");
        apply_payload(&mut s, "[TEXT:aGVyZQ==]");
        assert_eq!(s.conversation.messages().last().unwrap().content, "Sure, here");
    }

    #[test]
    fn test_failure_appends_marker_and_stops() {
        let mut s = session();
        s.apply(Frame::ToolStart("apply_edits".into()), Instant::now());
        apply_payload(&mut s, "[TEXT:SGk=]");
        s.fail_stream();
        assert_eq!(
            s.conversation.messages().last().unwrap().content,
            format!("Hi{}", TRANSPORT_ERROR_MARKER)
        );
        assert!(!s.is_streaming());
        assert!(s.tool.is_none());
    }

    #[test]
    fn test_clear_history_resets_everything() {
        let mut s = session();
        apply_payload(&mut s, &encode_frame("LATEX_DOCUMENT", "body"));
        s.clear_history();
        assert!(s.conversation.is_empty());
        assert!(s.document.current.is_none());
        assert!(s.document.diff.is_none());
    }
}
