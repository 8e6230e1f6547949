//! UI-agnostic conversation and document state
//!
//! These types are owned by whichever front end drives the stream and are only
//! mutated through [`crate::dispatch::ChatSession`].

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A chat message in the drafting conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered, insertion-only list of messages.
///
/// While a stream is open the last element is always the assistant message
/// receiving text; `open_exchange` keeps that true by pushing the empty
/// assistant entry right after the user entry.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Record the user's message and open an empty assistant reply after it.
    pub fn open_exchange(&mut self, user_text: impl Into<String>) {
        self.messages.push(ChatMessage::user(user_text));
        self.messages.push(ChatMessage::assistant(String::new()));
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Append a fragment to the open assistant message.
    ///
    /// Returns false when the last message is not an assistant message, in
    /// which case nothing is appended.
    pub fn append_to_open(&mut self, fragment: &str) -> bool {
        match self.messages.last_mut() {
            Some(msg) if msg.role == ChatRole::Assistant => {
                msg.content.push_str(fragment);
                true
            }
            _ => false,
        }
    }

    /// Messages that precede the exchange currently being streamed.
    ///
    /// Used as explicit history for servers that do not keep session memory.
    pub fn history_before_open(&self) -> &[ChatMessage] {
        let cut = self.messages.len().saturating_sub(2);
        &self.messages[..cut]
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// One changed fragment inside a [`StructuredDiff`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub content: String,
}

/// Server-computed change list for the latest document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredDiff {
    #[serde(default)]
    pub has_changes: bool,
    #[serde(default)]
    pub additions: Vec<DiffEntry>,
    #[serde(default)]
    pub deletions: Vec<DiffEntry>,
}

/// How the document keeps track of what changed between versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMode {
    /// Keep the server-supplied addition/deletion list
    #[default]
    Structured,
    /// Keep the previous body and compare line by line on the client
    Line,
}

/// The latest generated document and what it replaced
#[derive(Debug, Clone, Default)]
pub struct DocumentState {
    pub current: Option<String>,
    pub previous: Option<String>,
    pub diff: Option<StructuredDiff>,
}

impl DocumentState {
    /// Replace the document body wholesale.
    pub fn replace(&mut self, body: String, mode: DiffMode) {
        let old = self.current.replace(body);
        if mode == DiffMode::Line {
            self.previous = old;
        }
    }

    pub fn set_diff(&mut self, diff: StructuredDiff) {
        self.diff = Some(diff);
    }

    /// The structured diff, only when it reports changes.
    pub fn active_diff(&self) -> Option<&StructuredDiff> {
        self.diff.as_ref().filter(|d| d.has_changes)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPhase {
    Start,
    Executing,
    Result,
}

impl ToolPhase {
    pub fn label(&self) -> &'static str {
        match self {
            ToolPhase::Start => "Calling",
            ToolPhase::Executing => "Running",
            ToolPhase::Result => "Finished",
        }
    }
}

/// Transient banner state for a backend tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub phase: ToolPhase,
    pub name: String,
    pub since: Instant,
}

impl ToolStatus {
    /// Friendly label for the tools the drafting backend is known to expose.
    pub fn display_name(&self) -> &str {
        match self.name.as_str() {
            "extract_information" => "Extracting information",
            "generate_document" => "Generating document",
            "apply_edits" => "Applying edits",
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_open_exchange_leaves_assistant_last() {
        let mut conv = Conversation::new();
        conv.open_exchange("Draft an NDA");
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages()[1], ChatMessage::assistant(""));
        assert!(conv.append_to_open("Sure"));
        assert_eq!(conv.messages()[1].content, "Sure");
    }

    #[test]
    fn test_append_without_open_assistant_is_ignored() {
        let mut conv = Conversation::new();
        conv.push(ChatMessage::user("hi"));
        assert!(!conv.append_to_open("lost"));
        assert_eq!(conv.messages()[0].content, "hi");
    }

    #[test]
    fn test_history_before_open_excludes_current_exchange() {
        let mut conv = Conversation::new();
        conv.open_exchange("one");
        conv.append_to_open("first reply");
        conv.open_exchange("two");
        let history = conv.history_before_open();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "first reply");
    }

    #[test]
    fn test_replace_keeps_previous_only_in_line_mode() {
        let mut doc = DocumentState::default();
        doc.replace("v1".into(), DiffMode::Structured);
        doc.replace("v2".into(), DiffMode::Structured);
        assert_eq!(doc.previous, None);

        doc.replace("v3".into(), DiffMode::Line);
        assert_eq!(doc.current.as_deref(), Some("v3"));
        assert_eq!(doc.previous.as_deref(), Some("v2"));
    }

    #[test]
    fn test_structured_diff_tolerates_missing_fields() {
        let diff: StructuredDiff = serde_json::from_str(r#"{"has_changes": true}"#).unwrap();
        assert!(diff.additions.is_empty());
        assert!(diff.has_changes);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::user("x")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"x"}"#);
    }
}
