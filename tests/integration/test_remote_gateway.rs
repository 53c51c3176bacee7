//! Remote gateway tests against a local mock of the model endpoints.
//!
//! The mock speaks just enough of the chat-completions and messages wire
//! formats: it records every request and answers with a scripted reply.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use lecture_core::{
    Config, Dice, GatewayConfig, GatewayErrorKind, GatewayProvider, Passage, QuizEngine,
    QuizError, QuizGateway, QuizInput, RemoteGateway, UserId,
};
use serde_json::{json, Value};

fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

#[derive(Clone)]
struct MockModel {
    status: StatusCode,
    question: String,
    scoring: String,
    requests: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
}

impl MockModel {
    fn new(question: &str, scoring: &str) -> Self {
        Self {
            status: StatusCode::OK,
            question: question.to_string(),
            scoring: scoring.to_string(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn failing(status: StatusCode) -> Self {
        Self {
            status,
            ..Self::new("", "")
        }
    }

    fn requests(&self) -> Vec<(HeaderMap, Value)> {
        self.requests.lock().expect("lock").clone()
    }
}

/// Picks the scripted reply by looking at the prompt.
fn scripted_reply(model: &MockModel, body: &Value) -> String {
    let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
    if prompt.contains("Student's answer") {
        model.scoring.clone()
    } else {
        model.question.clone()
    }
}

async fn openai_completions(
    State(model): State<MockModel>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    model
        .requests
        .lock()
        .expect("lock")
        .push((headers, body.clone()));
    if model.status != StatusCode::OK {
        return (model.status, Json(json!({"error": {"message": "nope"}})));
    }
    let content = scripted_reply(&model, &body);
    (
        StatusCode::OK,
        Json(json!({"choices": [{"message": {"role": "assistant", "content": content}}]})),
    )
}

async fn anthropic_messages(
    State(model): State<MockModel>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    model
        .requests
        .lock()
        .expect("lock")
        .push((headers, body.clone()));
    let text = scripted_reply(&model, &body);
    (
        StatusCode::OK,
        Json(json!({"content": [{"type": "text", "text": text}]})),
    )
}

/// Spawns the mock and returns its base URL.
async fn spawn_mock(model: MockModel) -> (String, tokio::task::JoinHandle<()>) {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");

    let router = Router::new()
        .route("/v1/chat/completions", post(openai_completions))
        .route("/v1/messages", post(anthropic_messages))
        .with_state(model);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Mock failed");
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{addr}"), handle)
}

fn gateway_config(provider: GatewayProvider, api_url: String) -> GatewayConfig {
    GatewayConfig {
        provider,
        api_url: Some(api_url),
        model: Some("test-model".to_string()),
        ..GatewayConfig::default()
    }
}

fn passage() -> Passage {
    Passage {
        text: "Mitochondria turn glucose and oxygen into ATP for the cell.".to_string(),
        source: PathBuf::from("notes/Bio/Cells/organelles.md"),
        index: 2,
    }
}

fn error_kind(e: &QuizError) -> Option<GatewayErrorKind> {
    match e {
        QuizError::GatewayError { kind, .. } => Some(*kind),
        _ => None,
    }
}

// ----------------------------------------------------------------------------
// OpenAI-compatible endpoint
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_openai_question_and_score() {
    let model = MockModel::new(
        "  What do mitochondria produce?  ",
        "Here is my assessment:\n{\"score\": 2, \"explanation\": \"Mostly right.\"}",
    );
    let (base, server) = spawn_mock(model.clone()).await;
    let config = gateway_config(GatewayProvider::OpenAi, format!("{base}/v1/chat/completions"));
    let gateway = RemoteGateway::with_api_key(&config, "sk-test").expect("gateway");

    let question = gateway.generate_question(&passage()).await.expect("question");
    assert_eq!(question, "What do mitochondria produce?");

    let assessment = gateway
        .score_answer(&question, "ATP", &passage())
        .await
        .expect("assessment");
    assert_eq!(assessment.score, 2);
    assert_eq!(assessment.feedback, "Mostly right.");

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    let (headers, body) = &requests[1];
    assert_eq!(headers["authorization"], "Bearer sk-test");
    assert_eq!(body["model"], "test-model");
    let prompt = body["messages"][0]["content"].as_str().expect("prompt");
    assert!(prompt.contains("Mitochondria turn glucose"));
    assert!(prompt.contains("Student's answer: ATP"));
    assert!(!prompt.contains("{max_score}"));

    server.abort();
}

#[tokio::test]
async fn test_openai_error_statuses() {
    for (status, expected) in [
        (StatusCode::UNAUTHORIZED, GatewayErrorKind::Authentication),
        (StatusCode::TOO_MANY_REQUESTS, GatewayErrorKind::RateLimit),
        (StatusCode::BAD_GATEWAY, GatewayErrorKind::Server),
    ] {
        let (base, server) = spawn_mock(MockModel::failing(status)).await;
        let config =
            gateway_config(GatewayProvider::OpenAi, format!("{base}/v1/chat/completions"));
        let gateway = RemoteGateway::with_api_key(&config, "sk-test").expect("gateway");

        let err = gateway
            .generate_question(&passage())
            .await
            .expect_err("status should fail");
        assert_eq!(error_kind(&err), Some(expected), "status {status}");
        assert!(err.is_gateway_failure());

        server.abort();
    }
}

#[tokio::test]
async fn test_out_of_range_score_is_rejected() {
    let model = MockModel::new("Q?", "{\"score\": 9, \"explanation\": \"Too generous\"}");
    let (base, server) = spawn_mock(model).await;
    let config = gateway_config(GatewayProvider::OpenAi, format!("{base}/v1/chat/completions"));
    let gateway = RemoteGateway::with_api_key(&config, "sk-test").expect("gateway");

    let err = gateway
        .score_answer("Q?", "ATP", &passage())
        .await
        .expect_err("score 9 exceeds the range");
    assert_eq!(error_kind(&err), Some(GatewayErrorKind::InvalidResponse));

    server.abort();
}

// ----------------------------------------------------------------------------
// Anthropic endpoint
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_anthropic_headers_and_feedback_alias() {
    let model = MockModel::new("Why do cells need ATP?", "{\"score\": 3, \"feedback\": \"Spot on.\"}");
    let (base, server) = spawn_mock(model.clone()).await;
    let config = gateway_config(GatewayProvider::Anthropic, format!("{base}/v1/messages"));
    let gateway = RemoteGateway::with_api_key(&config, "ak-test").expect("gateway");

    let assessment = gateway
        .score_answer("Why do cells need ATP?", "Energy", &passage())
        .await
        .expect("assessment");
    assert_eq!(assessment.score, 3);
    assert_eq!(assessment.feedback, "Spot on.");

    let requests = model.requests();
    let (headers, body) = &requests[0];
    assert_eq!(headers["x-api-key"], "ak-test");
    assert_eq!(headers["anthropic-version"], "2023-06-01");
    assert!(headers.get("authorization").is_none());
    assert_eq!(body["max_tokens"], 1024);

    server.abort();
}

// ----------------------------------------------------------------------------
// Engine over a remote gateway
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_engine_with_remote_gateway() {
    let model = MockModel::new(
        "What do mitochondria produce?",
        "{\"score\": 2, \"explanation\": \"Good, but mention oxygen.\"}",
    );
    let (base, server) = spawn_mock(model).await;

    let mut config = Config::default();
    config.notes_directory = format!("{}/fixtures/notes", env!("CARGO_MANIFEST_DIR"));
    config.gateway = gateway_config(GatewayProvider::OpenAi, format!("{base}/v1/chat/completions"));
    let gateway: Arc<dyn QuizGateway> =
        Arc::new(RemoteGateway::with_api_key(&config.gateway, "sk-test").expect("gateway"));
    let engine = QuizEngine::from_config(&config, gateway, Arc::new(Dice::seeded(3)));

    let user = UserId::from("remote");
    for message in ["/study", "Bio"] {
        engine.handle(&user, QuizInput::from_message(message)).await;
    }
    let reply = engine.handle(&user, QuizInput::from_message("Cells")).await;
    assert!(reply.text.contains("What do mitochondria produce?"));

    let reply = engine.handle(&user, QuizInput::from_message("ATP")).await;
    assert!(reply.text.starts_with("✅ Score: 2/3"));
    assert!(reply.text.contains("Good, but mention oxygen."));

    server.abort();
}

#[tokio::test]
async fn test_engine_survives_unreachable_model() {
    let mut config = Config::default();
    config.notes_directory = format!("{}/fixtures/notes", env!("CARGO_MANIFEST_DIR"));
    let port = find_available_port();
    config.gateway = gateway_config(
        GatewayProvider::OpenAi,
        format!("http://127.0.0.1:{port}/v1/chat/completions"),
    );
    let gateway: Arc<dyn QuizGateway> =
        Arc::new(RemoteGateway::with_api_key(&config.gateway, "sk-test").expect("gateway"));
    let engine = QuizEngine::from_config(&config, gateway, Arc::new(Dice::seeded(3)));

    let user = UserId::from("offline");
    for message in ["/study", "Math"] {
        engine.handle(&user, QuizInput::from_message(message)).await;
    }
    let reply = engine.handle(&user, QuizInput::from_message("Algebra")).await;
    assert!(reply.text.contains("couldn't come up with a question"));

    // Picking the topic again retries
    let reply = engine.handle(&user, QuizInput::from_message("Algebra")).await;
    assert!(reply.text.contains("couldn't come up with a question"));
    let snapshot = engine.session_snapshot(&user).await.expect("session");
    assert!(snapshot.question.is_none());
}
