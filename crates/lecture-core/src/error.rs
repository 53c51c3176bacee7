//! Error types for the Lecture Me quiz core.
//!
//! This module defines the error hierarchy for all core operations,
//! including configuration loading, notes corpus lookups, gateway calls,
//! and session state transitions.

use std::path::PathBuf;

/// A specialized `Result` type for quiz core operations.
pub type Result<T> = std::result::Result<T, QuizError>;

/// Errors that can occur while running a quiz session.
///
/// Error variants are organized by subsystem and include actionable suggestions
/// where possible to help users resolve issues.
#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your lecture-me.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Corpus Errors
    // ========================================================================
    /// The requested subject does not exist in the notes corpus.
    #[error("Subject '{name}' not found. Please choose from: {}", .available.join(", "))]
    SubjectNotFound {
        /// The name the user asked for.
        name: String,
        /// Subject names that do exist.
        available: Vec<String>,
    },

    /// The requested topic does not exist under the selected subject.
    #[error("Topic '{name}' not found in '{subject}'. Please choose from: {}", .available.join(", "))]
    TopicNotFound {
        /// The owning subject.
        subject: String,
        /// The name the user asked for.
        name: String,
        /// Topic names that do exist.
        available: Vec<String>,
    },

    /// No qualifying passage could be extracted for the topic.
    #[error("No suitable passage found in '{subject}/{topic}'\n\nSuggestion: Add longer paragraphs to the notes in this topic")]
    PassageNotFound {
        /// The subject searched.
        subject: String,
        /// The topic searched.
        topic: String,
    },

    // ========================================================================
    // Gateway Errors
    // ========================================================================
    /// The question/scoring gateway returned an error.
    #[error("Gateway error ({kind}): {message}\n\nSuggestion: {suggestion}")]
    GatewayError {
        /// The kind of gateway failure.
        kind: GatewayErrorKind,
        /// Detailed error message.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// A gateway call did not finish within the configured timeout.
    #[error("Gateway timeout after {timeout_secs}s while running {operation}\n\nSuggestion: Increase gateway.timeoutSeconds or check the model endpoint")]
    GatewayTimeout {
        /// The gateway operation that timed out.
        operation: String,
        /// The timeout duration in seconds.
        timeout_secs: u64,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error talking to a remote model.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },
}

/// Categories of gateway failures for structured error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// Authentication failure (missing or invalid API key).
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// The model answered, but not in the agreed shape.
    InvalidResponse,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::InvalidResponse => write!(f, "invalid_response"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl GatewayErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check the API key environment variable named by gateway.apiKeyEnv",
            Self::RateLimit => "Wait and retry, or reduce request frequency",
            Self::Server => "Retry later; the model service may be experiencing issues",
            Self::Network => "Check your network connection and gateway.apiUrl",
            Self::InvalidResponse => "Adjust gateway.scoringPrompt so the model replies with the expected JSON",
            Self::Other => "Check the model provider's status page",
        }
    }

    /// Classifies an HTTP status code returned by a model endpoint.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

impl QuizError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `SubjectNotFound` error.
    #[must_use]
    pub fn subject_not_found(name: impl Into<String>, available: Vec<String>) -> Self {
        Self::SubjectNotFound {
            name: name.into(),
            available,
        }
    }

    /// Creates a new `TopicNotFound` error.
    #[must_use]
    pub fn topic_not_found(
        subject: impl Into<String>,
        name: impl Into<String>,
        available: Vec<String>,
    ) -> Self {
        Self::TopicNotFound {
            subject: subject.into(),
            name: name.into(),
            available,
        }
    }

    /// Creates a new `PassageNotFound` error.
    #[must_use]
    pub fn passage_not_found(subject: impl Into<String>, topic: impl Into<String>) -> Self {
        Self::PassageNotFound {
            subject: subject.into(),
            topic: topic.into(),
        }
    }

    /// Creates a new `GatewayError` with automatic suggestion based on error kind.
    #[must_use]
    pub fn gateway(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        let suggestion = kind.suggestion().to_string();
        Self::GatewayError {
            kind,
            message: message.into(),
            suggestion,
        }
    }

    /// Creates a new `GatewayTimeout` error.
    #[must_use]
    pub fn gateway_timeout(operation: impl Into<String>, timeout_secs: u64) -> Self {
        Self::GatewayTimeout {
            operation: operation.into(),
            timeout_secs,
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns `true` for lookups that failed because the thing asked for does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SubjectNotFound { .. } | Self::TopicNotFound { .. } | Self::PassageNotFound { .. }
        )
    }

    /// Returns `true` if this error came out of a question or scoring call.
    #[must_use]
    pub const fn is_gateway_failure(&self) -> bool {
        matches!(
            self,
            Self::GatewayError { .. } | Self::GatewayTimeout { .. } | Self::Http(_)
        )
    }

    /// Returns `true` if this error is transient and may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::GatewayError {
                kind: GatewayErrorKind::RateLimit
                    | GatewayErrorKind::Server
                    | GatewayErrorKind::Network,
                ..
            } | Self::GatewayTimeout { .. }
        )
    }
}
