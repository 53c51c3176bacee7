//! Quiz activity events and the WebSocket stream that carries them.
//!
//! The engine publishes an event whenever a session resets, a question is
//! asked, an answer is scored, or a gateway call fails. Every connected
//! WebSocket client receives every event; nothing is kept for clients that
//! connect later.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, with a corpus and session summary
//! - `session_reset` - A user restarted or went back to the subject list
//! - `question_asked` - A question was generated for a user
//! - `answer_scored` - A user's answer was scored
//! - `gateway_failed` - Question generation or scoring failed
//!
//! # Example
//!
//! ```
//! use lecture_core::events::{EventBroadcaster, QuizEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(16);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(QuizEvent::session_reset("42".into()));
//!
//! if let Ok(event) = receiver.recv().await {
//!     assert_eq!(event.event_name(), "session_reset");
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::session::UserId;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    /// Subject names currently in the corpus.
    pub subjects: Vec<String>,
    /// Number of users with a session.
    pub sessions: usize,
}

/// Payload for the `session_reset` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResetPayload {
    /// The user whose selection was cleared.
    pub user_id: UserId,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `question_asked` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAskedPayload {
    /// The user being asked.
    pub user_id: UserId,
    /// Subject of the question.
    pub subject: String,
    /// Topic of the question.
    pub topic: String,
    /// Where the reference passage came from.
    pub source: String,
    /// The question text.
    pub question: String,
}

/// Payload for the `answer_scored` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerScoredPayload {
    /// The user who answered.
    pub user_id: UserId,
    /// Subject of the question.
    pub subject: String,
    /// Topic of the question.
    pub topic: String,
    /// Score awarded.
    pub score: u32,
    /// Upper bound of the score range.
    pub max_score: u32,
    /// The user's answer count after this answer.
    pub answered: u32,
}

/// Payload for the `gateway_failed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayFailedPayload {
    /// The user whose request failed.
    pub user_id: UserId,
    /// `generate_question` or `score_answer`.
    pub operation: String,
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Activity events, serialized as `{"event": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum QuizEvent {
    /// Sent to a client when it connects.
    Connected(ConnectedPayload),
    /// A session's selection was cleared.
    SessionReset(SessionResetPayload),
    /// A question was asked.
    QuestionAsked(QuestionAskedPayload),
    /// An answer was scored.
    AnswerScored(AnswerScoredPayload),
    /// A gateway call failed.
    GatewayFailed(GatewayFailedPayload),
}

impl QuizEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(subjects: Vec<String>, sessions: usize) -> Self {
        Self::Connected(ConnectedPayload { subjects, sessions })
    }

    /// Creates a `SessionReset` event stamped now.
    #[must_use]
    pub fn session_reset(user_id: UserId) -> Self {
        Self::SessionReset(SessionResetPayload {
            user_id,
            timestamp: Utc::now(),
        })
    }

    /// Creates a `GatewayFailed` event.
    #[must_use]
    pub fn gateway_failed(
        user_id: UserId,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::GatewayFailed(GatewayFailedPayload {
            user_id,
            operation: operation.into(),
            message: message.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::SessionReset(_) => "session_reset",
            Self::QuestionAsked(_) => "question_asked",
            Self::AnswerScored(_) => "answer_scored",
            Self::GatewayFailed(_) => "gateway_failed",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Fans quiz events out to every subscriber.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<QuizEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a new subscriber. A subscriber that falls behind skips events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QuizEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event and returns how many subscribers will see it.
    pub fn send(&self, event: QuizEvent) -> usize {
        // Err only means nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Seconds between heartbeat pings.
const HEARTBEAT_SECS: u64 = 30;

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// Upgrades `GET /ws` to the activity stream.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe first so nothing published after the greeting is missed
    let mut events = state.engine.events().subscribe();

    let subjects = state
        .engine
        .subject_names()
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list subjects for new client");
            Vec::new()
        });
    let connected = QuizEvent::connected(subjects, state.engine.sessions().len());
    if send_event(&mut sender, &connected).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }
    info!("WebSocket client connected");

    let mut heartbeat = interval(Duration::from_secs(HEARTBEAT_SECS));
    // The first tick completes immediately
    heartbeat.tick().await;
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        debug!("Ignoring message from client");
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket error");
                        break;
                    }
                    None => break,
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if send_event(&mut sender, &event).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "Client lagged behind the event stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

/// Serializes and sends one event. Serialization failures are logged and skipped.
async fn send_event<S>(sender: &mut S, event: &QuizEvent) -> Result<(), S::Error>
where
    S: futures::Sink<Message> + Unpin,
{
    match serde_json::to_string(event) {
        Ok(json) => sender.send(Message::Text(json)).await,
        Err(e) => {
            warn!(event = event.event_name(), error = %e, "Failed to serialize event");
            Ok(())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
