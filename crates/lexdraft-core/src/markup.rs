//! Escape-by-default HTML for chat messages.
//!
//! Message text is untrusted. Everything is escaped first; only headings,
//! bold runs, and list items are then turned back into markup.

use regex::Regex;
use std::sync::LazyLock;

use crate::state::{ChatMessage, ChatRole};

static BOLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*([^*]+)\*\*").unwrap_or_else(|e| panic!("invalid bold pattern: {e}"))
});
static ORDERED_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+[.)]\s+(.*)$").unwrap_or_else(|e| panic!("invalid list pattern: {e}"))
});

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Unordered,
    Ordered,
}

impl ListKind {
    fn open(&self) -> &'static str {
        match self {
            ListKind::Unordered => "<ul>",
            ListKind::Ordered => "<ol>",
        }
    }

    fn close(&self) -> &'static str {
        match self {
            ListKind::Unordered => "</ul>",
            ListKind::Ordered => "</ol>",
        }
    }
}

fn inline(text: &str) -> String {
    BOLD.replace_all(&escape_html(text), "<strong>$1</strong>")
        .into_owned()
}

/// Format one message body as safe HTML.
pub fn format_message_html(content: &str) -> String {
    let mut html = String::new();
    let mut list: Option<ListKind> = None;

    for line in content.lines() {
        let trimmed = line.trim_start();

        let item = if let Some(rest) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            Some((ListKind::Unordered, rest.to_string()))
        } else {
            ORDERED_ITEM
                .captures(trimmed)
                .map(|caps| (ListKind::Ordered, caps[1].to_string()))
        };

        if let Some((kind, text)) = item {
            if list != Some(kind) {
                if let Some(open) = list {
                    html.push_str(open.close());
                }
                html.push_str(kind.open());
                list = Some(kind);
            }
            html.push_str(&format!("<li>{}</li>", inline(&text)));
            continue;
        }

        if let Some(open) = list.take() {
            html.push_str(open.close());
        }

        if let Some(text) = trimmed.strip_prefix("### ") {
            html.push_str(&format!("<h5>{}</h5>", inline(text)));
        } else if let Some(text) = trimmed.strip_prefix("## ") {
            html.push_str(&format!("<h4>{}</h4>", inline(text)));
        } else if let Some(text) = trimmed.strip_prefix("# ") {
            html.push_str(&format!("<h3>{}</h3>", inline(text)));
        } else if trimmed.is_empty() {
            html.push_str("<br>");
        } else {
            html.push_str(&inline(line));
            html.push_str("<br>");
        }
    }

    if let Some(open) = list {
        html.push_str(open.close());
    }
    html
}

/// Standalone HTML page for a whole conversation.
pub fn transcript_html(messages: &[ChatMessage]) -> String {
    let mut body = String::new();
    for msg in messages {
        let (class, who) = match msg.role {
            ChatRole::User => ("user", "You"),
            ChatRole::Assistant => ("assistant", "Assistant"),
        };
        body.push_str(&format!(
            "<div class=\"message {}\"><div class=\"who\">{}</div><div class=\"content\">{}</div></div>\n",
            class,
            who,
            format_message_html(&msg.content)
        ));
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Conversation</title>\n\
         <style>body {{ font-family: sans-serif; max-width: 46rem; margin: 2rem auto; }} \
         .message {{ margin-bottom: 1.2rem; }} .who {{ font-weight: bold; }} \
         .user .who {{ color: #0a6ebd; }} .assistant .who {{ color: #a86b00; }}</style>\n\
         </head>\n<body>\n{}</body>\n</html>\n",
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_markup_in_content_is_escaped() {
        assert_eq!(
            format_message_html("<img src=x onerror=alert(1)>"),
            "&lt;img src=x onerror=alert(1)&gt;<br>"
        );
    }

    #[test]
    fn test_headings_bold_and_lists() {
        let html = format_message_html("## Key Terms\n- **Term**: 2 years\n- Law: NY\n1. Sign\n2. Return\nDone");
        assert_eq!(
            html,
            "<h4>Key Terms</h4><ul><li><strong>Term</strong>: 2 years</li><li>Law: NY</li></ul>\
             <ol><li>Sign</li><li>Return</li></ol>Done<br>"
        );
    }

    #[test]
    fn test_bold_cannot_smuggle_tags() {
        let html = format_message_html("**<script>x</script>**");
        assert_eq!(html, "<strong>&lt;script&gt;x&lt;/script&gt;</strong><br>");
    }

    #[test]
    fn test_transcript_contains_every_message() {
        let page = transcript_html(&[
            ChatMessage::user("Draft an NDA"),
            ChatMessage::assistant("# Mutual NDA"),
        ]);
        assert!(page.contains("<div class=\"content\">Draft an NDA<br></div>"));
        assert!(page.contains("<h3>Mutual NDA</h3>"));
    }
}
