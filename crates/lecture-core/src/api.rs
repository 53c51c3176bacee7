//! HTTP API for driving quiz sessions.
//!
//! A chat transport relays each inbound user event as one request and
//! renders the returned reply. Observers can follow all activity on `/ws`.
//!
//! # Endpoints
//!
//! - `POST /api/users/:user_id/messages` - Apply one user event, returns the reply
//! - `GET /api/users/:user_id/session` - Snapshot of a user's session
//! - `GET /api/subjects` - Current corpus listing
//! - `GET /ws` - WebSocket activity stream
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lecture_core::{build_gateway, create_router, AppState, Config, Dice, QuizEngine};
//!
//! # async fn example() -> lecture_core::Result<()> {
//! let config = Config::default();
//! let dice = Arc::new(Dice::from_seed_option(config.random_seed));
//! let gateway = build_gateway(&config.gateway, Arc::clone(&dice))?;
//! let engine = QuizEngine::from_config(&config, gateway, dice);
//!
//! let router = create_router(AppState::new(Arc::new(engine)));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::command::InboundMessage;
use crate::corpus::Subject;
use crate::engine::{QuizEngine, Reply};
use crate::events::ws_handler;
use crate::session::{SessionSnapshot, UserId};

// ============================================================================
// Response Types
// ============================================================================

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    /// The quiz engine all requests go through.
    pub engine: Arc<QuizEngine>,
}

impl AppState {
    /// Creates a new `AppState`.
    #[must_use]
    pub const fn new(engine: Arc<QuizEngine>) -> Self {
        Self { engine }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// The request was well-formed JSON but not usable.
    BadRequest(String),
    /// No session exists for the user.
    SessionNotFound(String),
    /// The corpus could not be read.
    Corpus(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::SessionNotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Corpus(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all endpoints, CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/users/:user_id/messages", post(handle_message))
        .route("/users/:user_id/session", get(handle_session))
        .route("/subjects", get(handle_subjects));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `POST /api/users/:user_id/messages`.
async fn handle_message(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(message): Json<InboundMessage>,
) -> Result<Json<Reply>, ApiError> {
    if let InboundMessage::Text { text } = &message {
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "Message text must not be empty".to_string(),
            ));
        }
    }

    let user = UserId::from(user_id);
    let input = message.resolve();
    info!(user = %user, input = ?input, "Received message");

    Ok(Json(state.engine.handle(&user, input).await))
}

/// Handler for `GET /api/users/:user_id/session`.
async fn handle_session(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let user = UserId::from(user_id);
    state
        .engine
        .session_snapshot(&user)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::SessionNotFound(format!("No session for user '{user}'")))
}

/// Handler for `GET /api/subjects`.
async fn handle_subjects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Subject>>, ApiError> {
    state.engine.subjects().await.map(Json).map_err(|e| {
        error!(error = %e, "Failed to scan notes directory");
        ApiError::Corpus(e.to_string())
    })
}

// ============================================================================
// Tests
// ============================================================================
