//! Reassembles a chunked response body into `data: ` frames.

use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::frame::Frame;

pub const FRAME_PREFIX: &str = "data: ";

/// Line buffer that tolerates frames split across chunks.
///
/// Bytes are kept undecoded until a full line is available, so multi-byte
/// characters split by the transport are never mangled.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect the payloads of every line it completes.
    ///
    /// Lines without the frame prefix are skipped. The trailing partial line
    /// stays buffered for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split(|&b| b == b'\n')
            .filter_map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                let text = String::from_utf8_lossy(line);
                text.strip_prefix(FRAME_PREFIX).map(str::to_string)
            })
            .collect()
    }

    /// Bytes received after the last complete line.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Pulls frame payloads out of any chunked byte stream.
pub struct FrameReader<S> {
    stream: S,
    buffer: FrameBuffer,
    ready: VecDeque<String>,
}

impl<S, B, E> FrameReader<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: FrameBuffer::new(),
            ready: VecDeque::new(),
        }
    }

    /// Next payload in arrival order, or None once the stream completes.
    ///
    /// An unterminated final line is dropped when the stream ends.
    pub async fn next_payload(&mut self) -> Result<Option<String>, E> {
        loop {
            if let Some(payload) = self.ready.pop_front() {
                return Ok(Some(payload));
            }
            match self.stream.next().await {
                Some(chunk) => {
                    let chunk = chunk?;
                    self.ready.extend(self.buffer.push(chunk.as_ref()));
                }
                None => {
                    if self.buffer.pending_len() > 0 {
                        debug!(
                            bytes = self.buffer.pending_len(),
                            "discarding unterminated trailing line"
                        );
                    }
                    return Ok(None);
                }
            }
        }
    }
}

/// What the stream-read task reports back to the event loop
#[derive(Debug)]
pub enum StreamEvent {
    Frame(Frame),
    /// Transport failed mid-stream
    Failed(String),
    /// The body ended without a `[DONE]` frame
    Closed,
}

/// Read frames until `[DONE]`, stream end, or transport failure, forwarding
/// each decoded frame in order. Frames that fail to decode are logged and
/// dropped.
pub async fn forward_frames<S, B, E>(mut reader: FrameReader<S>, tx: &UnboundedSender<StreamEvent>)
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    loop {
        let payload = match reader.next_payload().await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                let _ = tx.send(StreamEvent::Closed);
                return;
            }
            Err(e) => {
                warn!("stream transport failed: {}", e);
                let _ = tx.send(StreamEvent::Failed(e.to_string()));
                return;
            }
        };

        match Frame::parse(&payload) {
            Ok(frame) => {
                debug!(kind = frame.kind(), "frame received");
                let done = frame == Frame::Done;
                if tx.send(StreamEvent::Frame(frame)).is_err() || done {
                    return;
                }
            }
            Err(e) => warn!("dropping frame: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = Result<Vec<u8>, String>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok::<_, String>(p.to_vec()))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect_payloads(parts: &[&[u8]]) -> Vec<String> {
        let mut reader = FrameReader::new(chunks(parts));
        let mut out = Vec::new();
        while let Some(payload) = reader.next_payload().await.unwrap() {
            out.push(payload);
        }
        out
    }

    #[test]
    fn test_push_keeps_partial_line() {
        let mut buf = FrameBuffer::new();
        assert!(buf.push(b"data: [TEXT:SGVs").is_empty());
        assert_eq!(buf.push(b"bG8=]\n\ndata: x"), vec!["[TEXT:SGVsbG8=]".to_string()]);
        assert_eq!(buf.pending_len(), "data: x".len());
    }

    #[test]
    fn test_non_frame_lines_are_ignored() {
        let mut buf = FrameBuffer::new();
        let out = buf.push(b": keepalive\nevent: message\r\ndata: a\r\n\ndata:b\n");
        assert_eq!(out, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_reassembly_is_chunk_boundary_invariant() {
        let body = "data: [TEXT:SGVsbG8=]\n\ndata: [TOOL_START:apply_edits]\n\
                    data: [TEXT:4oCU]\ndata: legacy ünïcode\n\ndata: [DONE]\n\n"
            .as_bytes();
        let whole = collect_payloads(&[body]).await;
        assert_eq!(whole.len(), 5);

        for split in 0..=body.len() {
            let (a, b) = body.split_at(split);
            assert_eq!(collect_payloads(&[a, b]).await, whole, "split at {}", split);
        }

        let bytewise: Vec<&[u8]> = body.chunks(1).collect();
        assert_eq!(collect_payloads(&bytewise).await, whole);
    }

    #[tokio::test]
    async fn test_unterminated_tail_is_dropped_at_end() {
        let payloads = collect_payloads(&[b"data: one\ndata: two"]).await;
        assert_eq!(payloads, vec!["one".to_string()]);
    }

    #[tokio::test]
    async fn test_forward_stops_at_done_before_trailing_partial() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reader = FrameReader::new(chunks(&[
            b"data: [TEXT:SGk=]\ndata: [DONE]\ndata: [TEXT:SGk=]\ndata: [TEXT:ba",
        ]));
        forward_frames(reader, &tx).await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StreamEvent::Frame(Frame::Text(t)) if t == "Hi"));
        assert!(matches!(&events[1], StreamEvent::Frame(Frame::Done)));
    }

    #[tokio::test]
    async fn test_forward_drops_bad_frames_and_reports_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let parts: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"data: [TEXT:@@@]\ndata: [TEXT:b2s=]\n".to_vec()),
            Err("connection reset".to_string()),
        ];
        forward_frames(FrameReader::new(stream::iter(parts)), &tx).await;
        drop(tx);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, StreamEvent::Frame(Frame::Text(ref t)) if t == "ok"));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, StreamEvent::Failed(ref msg) if msg == "connection reset"));
        assert!(rx.recv().await.is_none());
    }
}
