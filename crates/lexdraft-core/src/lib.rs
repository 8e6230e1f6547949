pub mod client;
pub mod config;
pub mod diff;
pub mod dispatch;
pub mod export;
pub mod frame;
pub mod latex;
pub mod markup;
pub mod session;
pub mod state;
pub mod stream;

// Re-export main types for convenience
pub use client::DraftClient;
pub use config::Config;
pub use dispatch::{ChatSession, FrameOutcome, PipelineFlags};
pub use export::{ExportError, ExportKind};
pub use frame::{Frame, FrameError};
pub use session::SessionId;
pub use state::{ChatMessage, ChatRole, DiffMode, DocumentState, StructuredDiff, ToolPhase, ToolStatus};
pub use stream::StreamEvent;
