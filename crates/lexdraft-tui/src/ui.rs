use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use lexdraft_core::diff::{line_diff, summarize, LineChange};
use lexdraft_core::latex::{render as render_latex, RenderMode};
use lexdraft_core::{ChatRole, ToolStatus};
use crate::app::{App, DocView, FocusPane, InputMode};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    Line::from(spans)
}

/// One line of an assistant message: headings and bullets, then inline bold.
fn chat_line(text: &str) -> Line<'static> {
    let trimmed = text.trim_start();
    let heading = trimmed
        .strip_prefix("### ")
        .or_else(|| trimmed.strip_prefix("## "))
        .or_else(|| trimmed.strip_prefix("# "));
    if let Some(title) = heading {
        return Line::from(Span::styled(
            title.to_string(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
    }

    if let Some(item) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
    {
        let mut line = parse_markdown_line(item);
        line.spans.insert(0, Span::raw("  • "));
        return line;
    }

    parse_markdown_line(text)
}

fn tool_banner(status: &ToolStatus) -> String {
    format!(" {}: {} ", status.phase.label(), status.display_name())
}

fn decode_entity(name: &str) -> Option<char> {
    Some(match name {
        "lt" => '<',
        "gt" => '>',
        "amp" => '&',
        "quot" => '"',
        "#39" => '\'',
        "nbsp" => ' ',
        "mdash" => '—',
        "ndash" => '–',
        "ldquo" => '“',
        "rdquo" => '”',
        _ => return None,
    })
}

#[derive(Default)]
struct PreviewBuilder {
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    text: String,
    styles: Vec<Style>,
}

impl PreviewBuilder {
    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, patch: Style) {
        self.flush_span();
        let next = self.style().patch(patch);
        self.styles.push(next);
    }

    fn pop_style(&mut self) {
        self.flush_span();
        self.styles.pop();
    }

    fn push_char(&mut self, c: char) {
        if c.is_whitespace() {
            // Collapse runs and drop leading space, like a browser would
            let at_line_start = self.text.is_empty() && self.spans.is_empty();
            if at_line_start || self.text.ends_with(' ') {
                return;
            }
            self.text.push(' ');
        } else {
            self.text.push(c);
        }
    }

    fn flush_span(&mut self) {
        if !self.text.is_empty() {
            let style = self.style();
            self.spans.push(Span::styled(std::mem::take(&mut self.text), style));
        }
    }

    fn end_line(&mut self) {
        self.flush_span();
        if !self.spans.is_empty() {
            self.lines.push(Line::from(std::mem::take(&mut self.spans)));
        }
    }

    fn end_block(&mut self) {
        self.end_line();
        if self.lines.last().is_some_and(|l| !l.spans.is_empty()) {
            self.lines.push(Line::default());
        }
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.end_line();
        while self.lines.last().is_some_and(|l| l.spans.is_empty()) {
            self.lines.pop();
        }
        self.lines
    }
}

/// Flatten a rendered HTML fragment into styled terminal lines.
fn preview_lines(html: &str) -> Vec<Line<'static>> {
    let mut out = PreviewBuilder::default();
    let mut chars = html.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '<' => {
                let mut tag = String::new();
                for c in chars.by_ref() {
                    if c == '>' {
                        break;
                    }
                    tag.push(c);
                }
                let name = tag.split_whitespace().next().unwrap_or("").to_ascii_lowercase();
                match name.as_str() {
                    "span" if tag.contains("diff-added") => {
                        out.push_style(Style::default().fg(Color::Black).bg(Color::Green))
                    }
                    "span" if tag.contains("diff-deleted") => out.push_style(
                        Style::default()
                            .fg(Color::Black)
                            .bg(Color::Red)
                            .add_modifier(Modifier::CROSSED_OUT),
                    ),
                    "span" => out.push_style(Style::default()),
                    "h1" | "h2" => out.push_style(
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    ),
                    "h3" | "h4" | "strong" => {
                        out.push_style(Style::default().add_modifier(Modifier::BOLD))
                    }
                    "em" => out.push_style(Style::default().add_modifier(Modifier::ITALIC)),
                    "u" => out.push_style(Style::default().add_modifier(Modifier::UNDERLINED)),
                    "/span" | "/strong" | "/em" | "/u" => out.pop_style(),
                    "/h1" | "/h2" | "/h3" | "/h4" => {
                        out.pop_style();
                        out.end_block();
                    }
                    "/p" | "/ul" | "/ol" => out.end_block(),
                    "li" => {
                        out.end_line();
                        out.text.push_str("  • ");
                    }
                    "br" | "/li" | "/div" => out.end_line(),
                    "hr" | "hr/" => {
                        out.end_line();
                        out.lines.push(Line::from(Span::styled(
                            "─".repeat(24),
                            Style::default().fg(Color::DarkGray),
                        )));
                    }
                    _ => {}
                }
            }
            '&' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if name.len() >= 8 || !(next.is_ascii_alphanumeric() || next == '#') {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                match (chars.peek(), decode_entity(&name)) {
                    (Some(';'), Some(decoded)) => {
                        chars.next();
                        out.text.push(decoded);
                    }
                    _ => {
                        out.text.push('&');
                        out.text.push_str(&name);
                    }
                }
            }
            c => out.push_char(c),
        }
    }

    out.finish()
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let [chat_area, doc_area] = Layout::horizontal([
        Constraint::Percentage(50),
        Constraint::Percentage(50),
    ])
    .areas(body_area);

    render_chat(app, frame, chat_area);
    render_document(app, frame, doc_area);
    render_footer(app, frame, footer_area);

    if app.alert.is_some() {
        render_alert(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" LexDraft ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!(" {} ", app.client().session_id().short()),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!(" {} ", app.client().base_url()),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let banner_height = if app.session.tool.is_some() { 1 } else { 0 };
    let [history_area, banner_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(banner_height),
        Constraint::Length(3),
    ])
    .areas(area);

    app.chat_area = Some(history_area);
    app.chat_height = history_area.height.saturating_sub(2);
    app.chat_width = history_area.width.saturating_sub(2);

    let border_color = if app.focus == FocusPane::Chat { Color::Cyan } else { Color::DarkGray };
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Conversation ");

    let messages = app.session.conversation.messages();
    let chat_text = if messages.is_empty() {
        Text::from(Span::styled(
            "Describe the document you need...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();
        for msg in messages {
            match msg.role {
                ChatRole::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                    lines.push(Line::from(msg.content.as_str()));
                }
                ChatRole::Assistant => {
                    lines.push(Line::from(Span::styled(
                        "Assistant:",
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    )));
                    for line in msg.content.lines() {
                        lines.push(chat_line(line));
                    }
                }
            }
            lines.push(Line::default());
        }

        if app.is_busy() {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Drafting{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, history_area);

    if let Some(status) = &app.session.tool {
        let banner = Paragraph::new(tool_banner(status))
            .style(Style::default().bg(Color::Magenta).fg(Color::White).bold());
        frame.render_widget(banner, banner_area);
    }

    render_input(app, frame, input_area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };
    let title = if app.is_busy() {
        " Waiting for reply "
    } else {
        " Message (i to type) "
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scroll keeps the cursor visible
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);
    frame.render_widget(input, area);

    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn source_lines(previous: Option<&str>, current: &str) -> Vec<Line<'static>> {
    let number_style = Style::default().fg(Color::DarkGray);
    let Some(previous) = previous else {
        return current
            .split('\n')
            .enumerate()
            .map(|(i, text)| {
                Line::from(vec![
                    Span::styled(format!("{:>4}   ", i + 1), number_style),
                    Span::raw(text.trim_end_matches('\r').to_string()),
                ])
            })
            .collect();
    };

    line_diff(previous, current)
        .into_iter()
        .map(|line| {
            let (marker, style) = match line.change {
                LineChange::Unchanged => (' ', Style::default()),
                LineChange::Added => ('+', Style::default().fg(Color::Green)),
                LineChange::Modified => ('~', Style::default().fg(Color::Yellow)),
            };
            Line::from(vec![
                Span::styled(format!("{:>4} ", line.number), number_style),
                Span::styled(format!("{} ", marker), style),
                Span::styled(line.text.to_string(), style),
            ])
        })
        .collect()
}

fn change_lines(app: &App) -> Vec<Line<'static>> {
    let Some(diff) = app.session.document.active_diff() else {
        return vec![Line::from(Span::styled(
            "No changes reported for this version.",
            Style::default().fg(Color::DarkGray),
        ))];
    };

    let mut lines = Vec::new();
    for (title, entries, color, marker) in [
        ("Added", &diff.additions, Color::Green, '+'),
        ("Removed", &diff.deletions, Color::Red, '-'),
    ] {
        if entries.is_empty() {
            continue;
        }
        lines.push(Line::from(Span::styled(
            title,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));
        for entry in entries {
            for (i, text) in entry.content.lines().enumerate() {
                let prefix = if i == 0 { marker } else { ' ' };
                lines.push(Line::from(Span::styled(
                    format!("{} {}", prefix, text),
                    Style::default().fg(color),
                )));
            }
        }
        lines.push(Line::default());
    }
    lines
}

fn render_document(app: &mut App, frame: &mut Frame, area: Rect) {
    app.doc_area = Some(area);

    let border_color = if app.focus == FocusPane::Document { Color::Cyan } else { Color::DarkGray };
    let doc = &app.session.document;
    let title = match doc.active_diff() {
        Some(diff) => format!(" Document: {} ({}) ", app.doc_view.label(), summarize(diff)),
        None => format!(" Document: {} ", app.doc_view.label()),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let Some(current) = doc.current.as_deref() else {
        let empty = Paragraph::new(Span::styled(
            "No document yet. Ask for a draft to get started.",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block)
        .wrap(Wrap { trim: true });
        frame.render_widget(empty, area);
        return;
    };

    let lines = match app.doc_view {
        DocView::Source => source_lines(doc.previous.as_deref(), current),
        DocView::Changes => change_lines(app),
        DocView::Preview => {
            let diff = if app.session.flags.highlight_changes {
                doc.active_diff()
            } else {
                None
            };
            preview_lines(&render_latex(current, RenderMode::Preview, diff))
        }
    };

    let paragraph = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.doc_scroll, 0));
    frame.render_widget(paragraph, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " EDIT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match app.input_mode {
        InputMode::Normal => vec![
            Span::styled(" i ", key_style),
            Span::styled(" type ", label_style),
            Span::styled(" Tab ", key_style),
            Span::styled(" focus ", label_style),
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" v ", key_style),
            Span::styled(" view ", label_style),
            Span::styled(" y ", key_style),
            Span::styled(" copy ", label_style),
            Span::styled(" p ", key_style),
            Span::styled(" print ", label_style),
            Span::styled(" o ", key_style),
            Span::styled(" preview ", label_style),
            Span::styled(" d ", key_style),
            Span::styled(" diff ", label_style),
            Span::styled(" t ", key_style),
            Span::styled(" transcript ", label_style),
            Span::styled(" X ", key_style),
            Span::styled(" clear ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        InputMode::Editing => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Alt+Enter ", key_style),
            Span::styled(" send (no stream) ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" cancel ", label_style),
        ],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    spans.extend(hints);
    if let Some(status) = &app.status {
        spans.push(Span::styled(
            format!("  {}", status),
            Style::default().fg(Color::Green),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_alert(app: &App, frame: &mut Frame, area: Rect) {
    let message = app.alert.as_deref().unwrap_or_default();

    // Calculate popup size and position (centered)
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 7.min(area.height);
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Export failed ");

    let text = Text::from(vec![
        Line::from(message.to_string()),
        Line::default(),
        Line::from(Span::styled(
            "Press Enter or Esc to dismiss",
            Style::default().fg(Color::DarkGray),
        )),
    ]);

    let popup = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
    frame.render_widget(popup, popup_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn texts(lines: &[Line]) -> Vec<String> {
        lines.iter().map(line_text).collect()
    }

    #[test]
    fn test_parse_markdown_line_bold() {
        let line = parse_markdown_line("Term: **two years** total");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "two years");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_parse_markdown_line_unclosed_bold_is_literal() {
        assert_eq!(line_text(&parse_markdown_line("a **b")), "a **b");
    }

    #[test]
    fn test_chat_line_heading_and_bullet() {
        assert_eq!(line_text(&chat_line("## Key Terms")), "Key Terms");
        assert_eq!(line_text(&chat_line("- **Law**: NY")), "  • Law: NY");
    }

    #[test]
    fn test_preview_lines_flatten_blocks() {
        let html = "<h2>Term</h2>\n<p>Two <span class=\"diff-added\">years</span>\n &amp; more</p>\n<p>Next</p>";
        let lines = preview_lines(html);
        assert_eq!(texts(&lines), vec!["Term", "", "Two years & more", "", "Next"]);
        assert_eq!(lines[2].spans[1].style.bg, Some(Color::Green));
        assert_eq!(lines[2].spans[2].style.bg, None);
    }

    #[test]
    fn test_preview_lines_from_rendered_latex() {
        let html = render_latex(
            "\\section{Parties}\nAlice \\& Bob\n\n\\begin{itemize}\\item One\\item Two\\end{itemize}",
            RenderMode::Preview,
            None,
        );
        let lines = texts(&preview_lines(&html));
        assert_eq!(lines[0], "Parties");
        assert!(lines.contains(&"Alice & Bob".to_string()));
        assert!(lines.contains(&"  • One".to_string()));
        assert!(lines.contains(&"  • Two".to_string()));
    }

    #[test]
    fn test_unknown_entity_kept_literal() {
        assert_eq!(texts(&preview_lines("<p>R&D &copy;x</p>")), vec!["R&D &copy;x"]);
    }

    #[test]
    fn test_source_lines_mark_changes() {
        let lines = source_lines(Some("a\nb"), "a\nB\nc");
        assert_eq!(
            texts(&lines),
            vec!["   1   a", "   2 ~ B", "   3 + c"]
        );
    }
}
