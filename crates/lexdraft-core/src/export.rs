//! Copy and print/export of the current document.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, info};

use crate::diff::line_diff_html;
use crate::latex::{render_page, RenderMode};
use crate::markup::transcript_html;
use crate::state::{ChatMessage, DocumentState};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no document has been generated yet")]
    NoDocument,
    #[error("no previous version to compare against")]
    NoPrevious,
    #[error("no clipboard available (tried the native clipboard, {0})")]
    ClipboardUnavailable(String),
    #[error("clipboard command `{program}` failed: {reason}")]
    Clipboard { program: String, reason: String },
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not open a browser for {path}: {reason}")]
    Launch { path: PathBuf, reason: String },
}

pub trait Clipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ExportError>;
}

/// Clipboard backed by an external program that reads the text on stdin.
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    program: String,
    args: Vec<String>,
}

impl CommandClipboard {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl Clipboard for CommandClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ExportError> {
        let fail = |reason: String| ExportError::Clipboard {
            program: self.program.clone(),
            reason,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| fail(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| fail(e.to_string()))?;
        }

        let status = child.wait().map_err(|e| fail(e.to_string()))?;
        if !status.success() {
            return Err(fail(format!("exited with {}", status)));
        }
        Ok(())
    }
}

/// Native clipboard, falling back to the platform command-line tools.
///
/// Keep one instance alive for the whole session: on X11 the copied text is
/// only served while the native handle exists.
pub struct SystemClipboard {
    native: Option<arboard::Clipboard>,
    fallbacks: Vec<CommandClipboard>,
}

impl Default for SystemClipboard {
    fn default() -> Self {
        let native = match arboard::Clipboard::new() {
            Ok(cb) => Some(cb),
            Err(e) => {
                debug!("native clipboard unavailable: {}", e);
                None
            }
        };
        let fallbacks = if cfg!(target_os = "macos") {
            vec![CommandClipboard::new("pbcopy", &[])]
        } else if cfg!(windows) {
            vec![CommandClipboard::new("clip", &[])]
        } else {
            vec![
                CommandClipboard::new("wl-copy", &[]),
                CommandClipboard::new("xclip", &["-selection", "clipboard"]),
                CommandClipboard::new("xsel", &["--clipboard", "--input"]),
            ]
        };
        Self { native, fallbacks }
    }
}

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ExportError> {
        if let Some(native) = &mut self.native {
            match native.set_text(text.to_string()) {
                Ok(()) => return Ok(()),
                Err(e) => debug!("native clipboard rejected text: {}", e),
            }
        }
        for candidate in &mut self.fallbacks {
            if candidate.set_text(text).is_ok() {
                return Ok(());
            }
        }
        let tried = self
            .fallbacks
            .iter()
            .map(|c| c.program.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Err(ExportError::ClipboardUnavailable(tried))
    }
}

/// Put the raw document source on the clipboard, byte for byte.
pub fn copy_document(doc: &DocumentState, clipboard: &mut dyn Clipboard) -> Result<(), ExportError> {
    let source = doc.current.as_deref().ok_or(ExportError::NoDocument)?;
    clipboard.set_text(source)?;
    info!(bytes = source.len(), "document copied to clipboard");
    Ok(())
}

/// Write an HTML page into `dir` and return its path.
pub fn write_page(dir: &Path, file_name: &str, html: &str) -> Result<PathBuf, ExportError> {
    let path = dir.join(file_name);
    std::fs::create_dir_all(dir)
        .and_then(|_| std::fs::write(&path, html))
        .map_err(|source| ExportError::Write {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

/// Hand a file to the system browser.
pub fn open_in_browser(path: &Path) -> Result<(), ExportError> {
    webbrowser::open(&path.to_string_lossy()).map_err(|e| ExportError::Launch {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// What to write for a given export action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Print-styled page that opens the print dialog by itself
    Print,
    /// On-screen preview, with change highlighting when enabled
    Preview,
    /// Index-aligned line diff against the previous version
    LineDiff,
    /// The whole conversation
    Transcript,
}

impl ExportKind {
    fn file_stem(&self) -> &'static str {
        match self {
            ExportKind::Print => "print",
            ExportKind::Preview => "preview",
            ExportKind::LineDiff => "changes",
            ExportKind::Transcript => "transcript",
        }
    }
}

/// Build the HTML for an export without touching the filesystem.
pub fn build_export(
    kind: ExportKind,
    doc: &DocumentState,
    messages: &[ChatMessage],
    highlight: bool,
) -> Result<String, ExportError> {
    match kind {
        ExportKind::Print => {
            let source = doc.current.as_deref().ok_or(ExportError::NoDocument)?;
            Ok(render_page(source, RenderMode::Print, None))
        }
        ExportKind::Preview => {
            let source = doc.current.as_deref().ok_or(ExportError::NoDocument)?;
            let diff = if highlight { doc.active_diff() } else { None };
            Ok(render_page(source, RenderMode::Preview, diff))
        }
        ExportKind::LineDiff => {
            let current = doc.current.as_deref().ok_or(ExportError::NoDocument)?;
            let previous = doc.previous.as_deref().ok_or(ExportError::NoPrevious)?;
            Ok(format!(
                "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Changes</title>\n\
                 <style>body {{ font-family: monospace; }} .line-no {{ color: #888; display: inline-block; width: 3em; }} \
                 .added {{ background: #d4f8d4; }} .modified {{ background: #fdf2c4; }}</style>\n\
                 </head>\n<body>\n{}</body>\n</html>\n",
                line_diff_html(previous, current)
            ))
        }
        ExportKind::Transcript => Ok(transcript_html(messages)),
    }
}

/// Write an export into `dir` and open it in the browser.
///
/// Returns the written path; a launch failure still leaves the file behind.
pub fn export_and_open(
    kind: ExportKind,
    doc: &DocumentState,
    messages: &[ChatMessage],
    highlight: bool,
    dir: &Path,
    session_tag: &str,
) -> Result<PathBuf, ExportError> {
    let html = build_export(kind, doc, messages, highlight)?;
    let file_name = format!("lexdraft-{}-{}.html", kind.file_stem(), session_tag);
    let path = write_page(dir, &file_name, &html)?;
    info!(path = %path.display(), kind = kind.file_stem(), "export written");
    open_in_browser(&path)?;
    Ok(path)
}
