use reqwest::Client;
use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::config::Config;
use crate::session::SessionId;
use crate::state::ChatMessage;
use crate::stream::{forward_frames, FrameReader, StreamEvent};

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    history: Option<&'a [ChatMessage]>,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: String,
    #[allow(dead_code)]
    #[serde(default)]
    message_received: String,
}

/// HTTP client for the drafting server
#[derive(Clone)]
pub struct DraftClient {
    client: Client,
    base_url: String,
    stream_path: String,
    chat_path: String,
    history_path: String,
    send_history: bool,
    session_id: SessionId,
}

impl DraftClient {
    pub fn new(config: &Config, session_id: SessionId) -> Self {
        Self {
            client: Client::new(),
            base_url: config.server_url.trim_end_matches('/').to_string(),
            stream_path: config.stream_path.clone(),
            chat_path: config.chat_path.clone(),
            history_path: config.history_path.clone(),
            send_history: config.send_history,
            session_id,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request<'a>(&'a self, message: &'a str, history: &'a [ChatMessage]) -> ChatRequest<'a> {
        ChatRequest {
            message,
            session_id: self.session_id.as_str(),
            history: self.send_history.then_some(history),
        }
    }

    /// POST a message and forward its frames to `tx` until the stream ends.
    ///
    /// Exactly one terminal event is sent: `[DONE]` as a frame, `Closed`, or
    /// `Failed` for any transport error including a bad status.
    pub async fn stream(&self, message: &str, history: &[ChatMessage], tx: UnboundedSender<StreamEvent>) {
        let url = format!("{}{}", self.base_url, self.stream_path);
        debug!(%url, "opening stream");

        let response = self
            .client
            .post(&url)
            .json(&self.request(message, history))
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                let status = r.status();
                warn!(%status, "stream request rejected");
                let _ = tx.send(StreamEvent::Failed(format!("server returned {}", status)));
                return;
            }
            Err(e) => {
                warn!("stream request failed: {}", e);
                let _ = tx.send(StreamEvent::Failed(e.to_string()));
                return;
            }
        };

        forward_frames(FrameReader::new(Box::pin(response.bytes_stream())), &tx).await;
    }

    /// Send a message and wait for the whole reply.
    pub async fn chat(&self, message: &str, history: &[ChatMessage]) -> Result<String> {
        let url = format!("{}{}", self.base_url, self.chat_path);

        let response = self
            .client
            .post(&url)
            .json(&self.request(message, history))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Chat request failed with status {}: {}", status, text));
        }

        let chat_response: ChatResponse = response.json().await?;
        Ok(chat_response.response)
    }

    /// Ask the server to forget this session's memory.
    pub async fn clear_history(&self) -> Result<()> {
        let url = format!("{}{}", self.base_url, self.history_path);

        let response = self
            .client
            .delete(&url)
            .query(&[("session_id", self.session_id.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to clear history: {}", response.status()));
        }
        Ok(())
    }
}
