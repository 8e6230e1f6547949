use std::time::Instant;
use ratatui::layout::Rect;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use lexdraft_core::dispatch::TRANSPORT_ERROR_MARKER;
use lexdraft_core::export::{self, SystemClipboard};
use lexdraft_core::{ChatSession, Config, DraftClient, ExportError, ExportKind, StreamEvent};
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Chat,
    Document,
}

/// What the document pane shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocView {
    /// Raw source, with line markers against the previous version
    Source,
    /// Server-reported additions and deletions
    Changes,
    /// Rendered text
    Preview,
}

impl DocView {
    pub fn next(self) -> Self {
        match self {
            DocView::Source => DocView::Changes,
            DocView::Changes => DocView::Preview,
            DocView::Preview => DocView::Source,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocView::Source => "Source",
            DocView::Changes => "Changes",
            DocView::Preview => "Preview",
        }
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,
    pub doc_view: DocView,

    // Input box
    pub input: String,
    pub input_cursor: usize, // cursor position in chars

    // Chat pane
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    // Document pane
    pub doc_scroll: u16,

    // Areas for mouse hit-testing
    pub chat_area: Option<Rect>,
    pub doc_area: Option<Rect>,

    pub session: ChatSession,
    /// A non-streaming send is in flight
    pub awaiting_reply: bool,
    /// Bumped by a history clear; events from older sends are dropped
    generation: u64,
    in_flight: Vec<JoinHandle<()>>,

    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub alert: Option<String>,
    pub status: Option<String>,

    pub config: Config,
    clipboard: Option<SystemClipboard>,
    client: DraftClient,
    events: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(config: Config, client: DraftClient, events: UnboundedSender<AppEvent>) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            focus: FocusPane::Chat,
            doc_view: DocView::Source,
            input: String::new(),
            input_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            doc_scroll: 0,
            chat_area: None,
            doc_area: None,
            session: ChatSession::new(config.flags()),
            awaiting_reply: false,
            generation: 0,
            in_flight: Vec::new(),
            animation_frame: 0,
            alert: None,
            status: None,
            config,
            clipboard: None,
            client,
            events,
        }
    }

    pub fn client(&self) -> &DraftClient {
        &self.client
    }

    /// Sending is blocked while any reply is still arriving.
    pub fn is_busy(&self) -> bool {
        self.session.is_streaming() || self.awaiting_reply
    }

    pub fn tick(&mut self, now: Instant) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        self.session.tick(now);
    }

    /// Take the typed message if it can be sent right now.
    pub fn take_input(&mut self) -> Option<String> {
        if self.is_busy() || self.input.trim().is_empty() {
            return None;
        }
        self.input_cursor = 0;
        self.input_mode = InputMode::Normal;
        Some(std::mem::take(&mut self.input))
    }

    /// Send the typed message over the streaming endpoint.
    pub fn send_streaming(&mut self) {
        let Some(text) = self.take_input() else {
            return;
        };

        self.session.begin_send(&text);
        let history = self.session.conversation.history_before_open().to_vec();
        self.scroll_chat_to_bottom();

        let client = self.client.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stream = tokio::spawn(async move {
            client.stream(&text, &history, tx).await;
        });

        let events = self.events.clone();
        let generation = self.generation;
        let relay = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if events.send(AppEvent::Stream { generation, event }).is_err() {
                    break;
                }
            }
        });

        self.track(stream);
        self.track(relay);
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.in_flight.retain(|h| !h.is_finished());
        self.in_flight.push(handle);
    }

    /// Drop whatever the previous sends are still doing.
    fn abandon_in_flight(&mut self) {
        for handle in self.in_flight.drain(..) {
            handle.abort();
        }
        self.generation += 1;
        self.awaiting_reply = false;
    }

    /// Send the typed message and wait for the whole reply.
    pub fn send_blocking(&mut self) {
        let Some(text) = self.take_input() else {
            return;
        };

        self.awaiting_reply = true;
        let history = self.session.conversation.messages().to_vec();
        let client = self.client.clone();
        let events = self.events.clone();
        let generation = self.generation;
        let request = tokio::spawn(async move {
            let result = client
                .chat(&text, &history)
                .await
                .map_err(|e| e.to_string());
            let _ = events.send(AppEvent::Reply {
                generation,
                user_text: text,
                result,
            });
        });
        self.track(request);
    }

    pub fn on_stream_event(&mut self, generation: u64, event: StreamEvent) {
        if generation != self.generation {
            info!(generation, "dropping event from an abandoned stream");
            return;
        }
        match event {
            StreamEvent::Frame(frame) => {
                self.session.apply(frame, Instant::now());
                self.scroll_chat_to_bottom();
            }
            StreamEvent::Failed(reason) => {
                warn!("stream failed: {}", reason);
                self.session.fail_stream();
                self.scroll_chat_to_bottom();
            }
            StreamEvent::Closed => {
                if self.session.is_streaming() {
                    info!("stream ended without a done frame");
                    self.session.finish_stream();
                }
            }
        }
    }

    pub fn on_reply(&mut self, generation: u64, user_text: String, result: Result<String, String>) {
        if generation != self.generation {
            info!(generation, "dropping reply to an abandoned send");
            return;
        }
        self.awaiting_reply = false;
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!("chat request failed: {}", e);
                TRANSPORT_ERROR_MARKER.trim_start().to_string()
            }
        };
        self.session.push_reply(&user_text, reply);
        self.scroll_chat_to_bottom();
    }

    /// Reset local state now and tell the server in the background.
    pub fn clear_history(&mut self) {
        self.abandon_in_flight();

        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.clear_history().await {
                warn!("failed to clear server history: {}", e);
            }
        });

        self.session.clear_history();
        self.chat_scroll = 0;
        self.doc_scroll = 0;
        self.status = Some("History cleared".to_string());
    }

    pub fn copy_document(&mut self) {
        if self.session.document.current.is_none() {
            self.alert = Some(ExportError::NoDocument.to_string());
            return;
        }
        let clipboard = self.clipboard.get_or_insert_with(SystemClipboard::default);
        match export::copy_document(&self.session.document, clipboard) {
            Ok(()) => self.status = Some("Document copied".to_string()),
            Err(e) => self.alert = Some(e.to_string()),
        }
    }

    pub fn export(&mut self, kind: ExportKind) {
        let result = export::export_and_open(
            kind,
            &self.session.document,
            self.session.conversation.messages(),
            self.session.flags.highlight_changes,
            &self.config.export_dir(),
            self.client.session_id().short(),
        );
        match result {
            Ok(path) => self.status = Some(format!("Opened {}", path.display())),
            Err(e) => {
                warn!("export failed: {}", e);
                self.alert = Some(e.to_string());
            }
        }
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    pub fn cycle_doc_view(&mut self) {
        self.doc_view = self.doc_view.next();
        self.doc_scroll = 0;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        match self.focus {
            FocusPane::Chat => self.chat_scroll = self.chat_scroll.saturating_add(lines),
            FocusPane::Document => self.doc_scroll = self.doc_scroll.saturating_add(lines),
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        match self.focus {
            FocusPane::Chat => self.chat_scroll = self.chat_scroll.saturating_sub(lines),
            FocusPane::Document => self.doc_scroll = self.doc_scroll.saturating_sub(lines),
        }
    }

    /// Scroll chat to bottom so the newest text is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for msg in self.session.conversation.messages() {
            total_lines = total_lines.saturating_add(1); // Role line
            for line in msg.content.lines() {
                let char_count = line.chars().count();
                total_lines = total_lines.saturating_add((char_count / wrap_width + 1) as u16);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }
        if self.is_busy() {
            total_lines = total_lines.saturating_add(1); // "Drafting..."
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }
}
