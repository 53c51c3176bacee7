//! Lecture Me quiz core
//!
//! Quizzes users on their own notes: scans a notes corpus, picks passages,
//! asks generated questions, scores answers and keeps per-user statistics.
//! Ships an HTTP API and a WebSocket activity stream for chat transports.

pub mod api;
pub mod command;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod passage;
pub mod random;
pub mod session;


pub use api::{create_router, AppState, ErrorResponse};
pub use command::{InboundMessage, MenuAction, QuizInput, RANDOM_TOPIC_LABEL};
pub use config::{Config, CorpusConfig, GatewayConfig, GatewayProvider, PassageConfig};
pub use corpus::{CorpusIndex, NotesDirectory, Subject, Topic};
pub use engine::{QuizEngine, Reply};
pub use error::{GatewayErrorKind, QuizError, Result};
pub use events::{EventBroadcaster, QuizEvent};
pub use gateway::{
    build_gateway, Assessment, HeuristicGateway, QuizGateway, RemoteGateway, ScoreRange,
};
pub use passage::{extract_passages, strip_markup, Passage, PassageSelector};
pub use random::Dice;
pub use session::{
    Question, Session, SessionRegistry, SessionSnapshot, SessionStats, SessionStatus, UserId,
};
