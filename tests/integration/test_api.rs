//! Integration tests for the HTTP API and the WebSocket activity stream.
//!
//! Each test spawns a real server on a free port and talks to it with
//! reqwest and tokio-tungstenite.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use lecture_core::{build_gateway, create_router, AppState, Config, Dice, QuizEngine, QuizEvent};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn app_state() -> AppState {
    let mut config = Config::default();
    config.notes_directory = format!("{}/fixtures/notes", env!("CARGO_MANIFEST_DIR"));
    config.gateway.perturbation_chance = 0.0;

    let dice = Arc::new(Dice::seeded(11));
    let gateway = build_gateway(&config.gateway, Arc::clone(&dice)).expect("heuristic gateway");
    let engine = Arc::new(QuizEngine::from_config(&config, gateway, dice));
    AppState::new(engine)
}

/// Spawns the test server and returns its base address (`127.0.0.1:port`).
async fn spawn_test_server() -> (String, tokio::task::JoinHandle<()>) {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");

    let router = create_router(app_state());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, handle)
}

async fn post_message(client: &reqwest::Client, addr: &str, user: &str, body: Value) -> Value {
    client
        .post(format!("http://{addr}/api/users/{user}/messages"))
        .json(&body)
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Reply is JSON")
}

async fn say(client: &reqwest::Client, addr: &str, user: &str, text: &str) -> Value {
    post_message(client, addr, user, json!({"type": "text", "text": text})).await
}

async fn command(client: &reqwest::Client, addr: &str, user: &str, name: &str) -> Value {
    post_message(client, addr, user, json!({"type": "command", "command": name})).await
}

/// Receives the next event, answering pings on the way.
async fn receive_event(client: &mut WsClient) -> QuizEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            other => panic!("Unexpected message: {other:?}"),
        }
    }
}

// ----------------------------------------------------------------------------
// HTTP
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_conversation_over_http() {
    let (addr, server) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let reply = command(&client, &addr, "42", "study").await;
    assert_eq!(reply["keyboard"], json!(["Bio", "Math"]));

    let reply = say(&client, &addr, "42", "Math").await;
    assert_eq!(reply["keyboard"][0], "Algebra");

    let reply = say(&client, &addr, "42", "Algebra").await;
    let text = reply["text"].as_str().expect("text");
    assert!(text.starts_with("📝 Question (Math / Algebra):"));
    assert!(reply["keyboard"].is_null());

    let session: Value = client
        .get(format!("http://{addr}/api/users/42/session"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Snapshot is JSON");
    assert_eq!(session["userId"], "42");
    assert_eq!(session["status"], "awaiting_answer");
    assert_eq!(session["subject"], "Math");
    assert_eq!(session["topic"], "Algebra");

    let reply = say(&client, &addr, "42", "no idea").await;
    assert!(reply["text"].as_str().expect("text").starts_with("✅ Score: 0/3"));
    assert_eq!(reply["keyboard"].as_array().map(Vec::len), Some(4));

    server.abort();
}

#[tokio::test]
async fn test_http_errors() {
    let (addr, server) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/api/users/nobody/session"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = response.json().await.expect("Error body is JSON");
    assert!(body["error"].as_str().expect("error").contains("nobody"));

    let response = client
        .post(format!("http://{addr}/api/users/7/messages"))
        .json(&json!({"type": "text", "text": "  "}))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("http://{addr}/api/users/7/messages"))
        .json(&json!({"type": "photo"}))
        .send()
        .await
        .expect("Request failed");
    assert!(response.status().is_client_error());

    server.abort();
}

#[tokio::test]
async fn test_subjects_listing() {
    let (addr, server) = spawn_test_server().await;

    let subjects: Value = reqwest::get(format!("http://{addr}/api/subjects"))
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Subjects are JSON");

    assert_eq!(subjects[0]["name"], "Bio");
    assert_eq!(subjects[1]["name"], "Math");
    assert_eq!(subjects[1]["topics"][0]["name"], "Algebra");

    server.abort();
}

// ----------------------------------------------------------------------------
// WebSocket
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_ws_connected_event() {
    let (addr, server) = spawn_test_server().await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect to WebSocket");

    match receive_event(&mut ws).await {
        QuizEvent::Connected(payload) => {
            assert_eq!(payload.subjects, vec!["Bio", "Math"]);
            assert_eq!(payload.sessions, 0);
        }
        other => panic!("Expected connected, got {other:?}"),
    }

    server.abort();
}

#[tokio::test]
async fn test_ws_streams_quiz_activity() {
    let (addr, server) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect to WebSocket");
    assert!(matches!(receive_event(&mut ws).await, QuizEvent::Connected(_)));

    command(&client, &addr, "ws-user", "study").await;
    match receive_event(&mut ws).await {
        QuizEvent::SessionReset(payload) => assert_eq!(payload.user_id.to_string(), "ws-user"),
        other => panic!("Expected session_reset, got {other:?}"),
    }

    say(&client, &addr, "ws-user", "Bio").await;
    say(&client, &addr, "ws-user", "Cells").await;
    match receive_event(&mut ws).await {
        QuizEvent::QuestionAsked(payload) => {
            assert_eq!(payload.subject, "Bio");
            assert_eq!(payload.topic, "Cells");
            assert!(payload.source.starts_with("organelles.md"));
        }
        other => panic!("Expected question_asked, got {other:?}"),
    }

    say(&client, &addr, "ws-user", "mitochondria make ATP").await;
    match receive_event(&mut ws).await {
        QuizEvent::AnswerScored(payload) => {
            assert_eq!(payload.max_score, 3);
            assert_eq!(payload.answered, 1);
            assert!(payload.score <= 3);
        }
        other => panic!("Expected answer_scored, got {other:?}"),
    }

    ws.close(None).await.ok();
    server.abort();
}
