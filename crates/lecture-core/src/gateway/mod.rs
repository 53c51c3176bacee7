//! Question generation and answer scoring.
//!
//! The quiz engine treats the gateway as an opaque capability behind the
//! [`QuizGateway`] trait. Two implementations ship with the crate:
//!
//! - [`HeuristicGateway`]: local keyword-overlap scoring with canned questions
//! - [`RemoteGateway`]: a generative model reached over HTTP
//!
//! Trait methods return boxed futures so the engine can hold the gateway as
//! `Arc<dyn QuizGateway>` and swap implementations from configuration.

mod heuristic;
mod remote;

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::passage::Passage;
use crate::random::Dice;

pub use heuristic::HeuristicGateway;
pub use remote::{extract_assessment, RemoteGateway};

/// Closed score range `0..=max` a gateway reports in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRange {
    /// Inclusive upper bound.
    pub max: u32,
}

impl ScoreRange {
    /// Creates a range `0..=max`.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { max }
    }

    /// Returns `true` if `score` lies within the range.
    #[must_use]
    pub const fn contains(&self, score: u32) -> bool {
        score <= self.max
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self::new(3)
    }
}

/// A scored answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    /// Score within the gateway's [`ScoreRange`].
    pub score: u32,

    /// Free-text feedback for direct display to the user.
    pub feedback: String,
}

/// Produces questions from passages and scores answers against them.
pub trait QuizGateway: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// The range every [`Assessment::score`] must fall in.
    fn score_range(&self) -> ScoreRange;

    /// Generates one question about `passage`.
    fn generate_question<'a>(&'a self, passage: &'a Passage) -> BoxFuture<'a, Result<String>>;

    /// Scores `answer` to `question` against the reference `passage`.
    fn score_answer<'a>(
        &'a self,
        question: &'a str,
        answer: &'a str,
        passage: &'a Passage,
    ) -> BoxFuture<'a, Result<Assessment>>;
}

/// Builds the gateway selected by `config.provider`.
///
/// # Errors
///
/// Returns a gateway authentication error if a remote provider is selected
/// and its API key environment variable is unset.
pub fn build_gateway(config: &GatewayConfig, dice: Arc<Dice>) -> Result<Arc<dyn QuizGateway>> {
    let gateway: Arc<dyn QuizGateway> = if config.provider.is_remote() {
        Arc::new(RemoteGateway::from_config(config)?)
    } else {
        Arc::new(HeuristicGateway::new(
            dice,
            ScoreRange::new(config.max_score),
            config.perturbation_chance,
        ))
    };
    info!(gateway = gateway.name(), max_score = config.max_score, "Gateway ready");
    Ok(gateway)
}
