//! Per-user quiz sessions.
//!
//! A [`Session`] remembers what one user has selected, the question they are
//! currently answering, and their running statistics. The status is derived
//! from which selections are present, and every mutator refuses a change that
//! would break the selection invariants:
//!
//! - a topic is only selected when a subject is
//! - a question is only active when both subject and topic are selected

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{QuizError, Result};
use crate::passage::Passage;

// ============================================================================
// UserId
// ============================================================================

/// Opaque identity of a chat user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

// ============================================================================
// SessionStatus
// ============================================================================

/// Where a session is in the quiz conversation.
///
/// - `Idle` -> `SubjectChosen` when a known subject is picked
/// - `SubjectChosen` -> `AwaitingAnswer` when a question is asked
/// - `AwaitingAnswer` -> `SubjectChosen` once the answer is scored
/// - any -> `Idle` on restart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Nothing selected.
    #[default]
    Idle,
    /// A subject (and possibly a remembered topic) is selected, no question active.
    SubjectChosen,
    /// A question has been asked and its answer is pending.
    AwaitingAnswer,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::SubjectChosen => write!(f, "subject_chosen"),
            Self::AwaitingAnswer => write!(f, "awaiting_answer"),
        }
    }
}

// ============================================================================
// Question and SessionStats
// ============================================================================

/// A question in flight, owning the passage it was generated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// The question text shown to the user.
    pub text: String,

    /// Reference passage the answer is scored against.
    pub passage: Passage,

    /// Subject the question belongs to.
    pub subject: String,

    /// Topic the question belongs to.
    pub topic: String,

    /// When the question was asked.
    pub asked_at: DateTime<Utc>,
}

impl Question {
    /// Creates a question asked now.
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        passage: Passage,
        subject: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            passage,
            subject: subject.into(),
            topic: topic.into(),
            asked_at: Utc::now(),
        }
    }
}

/// Cumulative answer statistics. Survives restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Number of answers scored.
    pub answered: u32,

    /// Sum of all scores.
    pub total_score: u64,
}

impl SessionStats {
    /// Mean score, or `None` before the first answer.
    ///
    /// # Examples
    ///
    /// ```
    /// use lecture_core::SessionStats;
    ///
    /// assert_eq!(SessionStats::default().average(), None);
    ///
    /// let stats = SessionStats { answered: 4, total_score: 9 };
    /// assert_eq!(stats.average(), Some(2.25));
    /// ```
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> Option<f64> {
        (self.answered > 0).then(|| self.total_score as f64 / f64::from(self.answered))
    }
}

// ============================================================================
// Session
// ============================================================================

/// One user's quiz conversation.
#[derive(Debug, Clone)]
pub struct Session {
    user_id: UserId,
    subject: Option<String>,
    topic: Option<String>,
    question: Option<Question>,
    stats: SessionStats,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    /// Creates an idle session with empty statistics.
    ///
    /// # Examples
    ///
    /// ```
    /// use lecture_core::{Session, SessionStatus};
    ///
    /// let session = Session::new("42".into());
    /// assert_eq!(session.status(), SessionStatus::Idle);
    /// assert_eq!(session.stats().answered, 0);
    /// ```
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            subject: None,
            topic: None,
            question: None,
            stats: SessionStats::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The user this session belongs to.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Current status, derived from the selections present.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        if self.question.is_some() {
            SessionStatus::AwaitingAnswer
        } else if self.subject.is_some() {
            SessionStatus::SubjectChosen
        } else {
            SessionStatus::Idle
        }
    }

    /// Selected subject name.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Selected (or remembered) topic name.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// The question awaiting an answer.
    #[must_use]
    pub const fn question(&self) -> Option<&Question> {
        self.question.as_ref()
    }

    /// Cumulative statistics.
    #[must_use]
    pub const fn stats(&self) -> SessionStats {
        self.stats
    }

    /// When the session was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the session last changed.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Updates the `updated_at` timestamp to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Clears subject, topic and question. Statistics are kept.
    pub fn reset(&mut self) {
        self.subject = None;
        self.topic = None;
        self.question = None;
        self.touch();
    }

    /// Selects a subject. Only valid from `Idle`.
    pub fn select_subject(&mut self, subject: impl Into<String>) -> Result<()> {
        if self.status() != SessionStatus::Idle {
            return Err(QuizError::invalid_transition(
                self.status(),
                SessionStatus::SubjectChosen,
            ));
        }
        self.subject = Some(subject.into());
        self.topic = None;
        self.touch();
        Ok(())
    }

    /// Selects a topic under the current subject. Not valid while a question is active.
    pub fn select_topic(&mut self, topic: impl Into<String>) -> Result<()> {
        if self.status() != SessionStatus::SubjectChosen {
            return Err(QuizError::invalid_transition(
                self.status(),
                "topic_selected",
            ));
        }
        self.topic = Some(topic.into());
        self.touch();
        Ok(())
    }

    /// Forgets the topic and any active question, keeping the subject.
    pub fn clear_topic(&mut self) {
        self.topic = None;
        self.question = None;
        self.touch();
    }

    /// Makes `question` the active question, replacing any previous one.
    ///
    /// The question must belong to the selected subject and topic.
    pub fn begin_question(&mut self, question: Question) -> Result<()> {
        let matches_selection = self.subject.as_deref() == Some(question.subject.as_str())
            && self.topic.as_deref() == Some(question.topic.as_str());
        if !matches_selection {
            return Err(QuizError::invalid_transition(
                self.status(),
                SessionStatus::AwaitingAnswer,
            ));
        }
        self.question = Some(question);
        self.touch();
        Ok(())
    }

    /// Records a scored answer to the active question and returns that question.
    ///
    /// The subject and topic stay selected.
    pub fn record_answer(&mut self, score: u32) -> Result<Question> {
        let Some(question) = self.question.take() else {
            return Err(QuizError::invalid_transition(
                self.status(),
                SessionStatus::SubjectChosen,
            ));
        };
        self.stats.answered += 1;
        self.stats.total_score += u64::from(score);
        self.touch();
        Ok(question)
    }

    /// Serializable view of the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user_id: self.user_id.clone(),
            status: self.status(),
            subject: self.subject.clone(),
            topic: self.topic.clone(),
            question: self.question.as_ref().map(|q| q.text.clone()),
            stats: self.stats,
            average: self.stats.average(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Point-in-time view of a [`Session`] for status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// The session's user.
    pub user_id: UserId,
    /// Derived status.
    pub status: SessionStatus,
    /// Selected subject.
    pub subject: Option<String>,
    /// Selected topic.
    pub topic: Option<String>,
    /// Text of the active question.
    pub question: Option<String>,
    /// Cumulative statistics.
    pub stats: SessionStats,
    /// Mean score, absent before the first answer.
    pub average: Option<f64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// SessionRegistry
// ============================================================================

/// Shared handle to one session. Hold the lock for a whole exchange.
pub type SessionHandle = Arc<AsyncMutex<Session>>;

/// In-memory map of sessions keyed by user, created on first contact.
///
/// The outer lock is only held to look up or insert; each session has its
/// own async lock so one user's pending gateway call never blocks another.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<UserId, SessionHandle>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `user`, creating an idle one on first contact.
    pub fn get_or_create(&self, user: &UserId) -> SessionHandle {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            sessions
                .entry(user.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(Session::new(user.clone())))),
        )
    }

    /// Returns the session for `user` if they have made contact.
    pub fn get(&self, user: &UserId) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user)
            .map(Arc::clone)
    }

    /// Number of known users.
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no user has made contact.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
