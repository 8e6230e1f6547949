use std::time::Instant;

use lexdraft_core::frame::encode_frame;
use lexdraft_core::{ChatMessage, ChatSession, Config, DraftClient, Frame, PipelineFlags, SessionId, StreamEvent};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, send_history: bool) -> DraftClient {
    let mut config = Config::new();
    config.server_url = server.uri();
    config.send_history = send_history;
    DraftClient::new(&config, SessionId::from("session_test"))
}

fn sse(payloads: &[String]) -> String {
    payloads.iter().map(|p| format!("data: {}\n\n", p)).collect()
}

async fn collect(mut rx: mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_stream_drives_session() {
    let server = MockServer::start().await;
    let body = sse(&[
        encode_frame("TEXT", "Hel"),
        encode_frame("TEXT", "lo world"),
        "[TOOL_START:generate_document]".to_string(),
        encode_frame("LATEX_DOCUMENT", "\\section{Term}\nTwo years."),
        "[DONE]".to_string(),
        encode_frame("TEXT", "ignored"),
    ]);
    Mock::given(method("POST"))
        .and(path("/stream"))
        .and(body_partial_json(json!({"message": "Draft it", "session_id": "session_test"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = client_for(&server, false);
    let (tx, rx) = mpsc::unbounded_channel();
    client.stream("Draft it", &[], tx).await;
    let events = collect(rx).await;

    let mut session = ChatSession::new(PipelineFlags::default());
    session.begin_send("Draft it");
    for event in events {
        match event {
            StreamEvent::Frame(frame) => {
                session.apply(frame, Instant::now());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    assert!(!session.is_streaming());
    assert_eq!(
        session.conversation.messages(),
        &[ChatMessage::user("Draft it"), ChatMessage::assistant("Hello world")]
    );
    assert_eq!(
        session.document.current.as_deref(),
        Some("\\section{Term}\nTwo years.")
    );
}

#[tokio::test]
async fn test_stream_without_done_reports_closed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("data: plain words\n\ndata: [TEXT:", "text/event-stream"),
        )
        .mount(&server)
        .await;

    let (tx, rx) = mpsc::unbounded_channel();
    client_for(&server, false).stream("hi", &[], tx).await;
    let events = collect(rx).await;

    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], StreamEvent::Frame(Frame::Legacy(t)) if t == "plain words"));
    assert!(matches!(events[1], StreamEvent::Closed));
}

#[tokio::test]
async fn test_stream_error_status_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (tx, rx) = mpsc::unbounded_channel();
    client_for(&server, false).stream("hi", &[], tx).await;
    let events = collect(rx).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], StreamEvent::Failed(_)));
}

#[tokio::test]
async fn test_unreachable_server_fails() {
    let mut config = Config::new();
    config.server_url = "http://127.0.0.1:9".to_string();
    let client = DraftClient::new(&config, SessionId::generate());

    let (tx, rx) = mpsc::unbounded_channel();
    client.stream("hi", &[], tx).await;
    let events = collect(rx).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], StreamEvent::Failed(_)));
}

#[tokio::test]
async fn test_history_sent_only_when_enabled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("data: [DONE]\n\n", "text/event-stream"))
        .mount(&server)
        .await;

    let history = vec![ChatMessage::user("first"), ChatMessage::assistant("reply")];
    for send_history in [false, true] {
        let (tx, rx) = mpsc::unbounded_channel();
        client_for(&server, send_history).stream("second", &history, tx).await;
        collect(rx).await;
    }

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let without: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let with: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(without, json!({"message": "second", "session_id": "session_test"}));
    assert_eq!(
        with["history"],
        json!([
            {"role": "user", "content": "first"},
            {"role": "assistant", "content": "reply"}
        ])
    );
}

#[tokio::test]
async fn test_chat_returns_response_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(body_partial_json(json!({"message": "Summarize", "session_id": "session_test"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "It is a two-year NDA.",
            "message_received": "Summarize"
        })))
        .mount(&server)
        .await;

    let reply = client_for(&server, false).chat("Summarize", &[]).await.unwrap();
    assert_eq!(reply, "It is a two-year NDA.");
}

#[tokio::test]
async fn test_chat_error_status_is_err() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let err = client_for(&server, false).chat("x", &[]).await.unwrap_err();
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_clear_history_sends_session_id() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/history"))
        .and(query_param("session_id", "session_test"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server, false).clear_history().await.unwrap();
}
