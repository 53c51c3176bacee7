//! Local keyword-overlap gateway.
//!
//! Scores an answer by how many of the passage's content words it repeats,
//! with small bonuses for explanatory language, examples and length. The
//! result is a level from 0 to 3, scaled onto the configured score range.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use super::{Assessment, QuizGateway, ScoreRange};
use crate::error::Result;
use crate::passage::Passage;
use crate::random::Dice;

/// Highest internal level; scores are scaled from `0..=TOP_LEVEL`.
const TOP_LEVEL: u32 = 3;

/// Characters of the passage quoted in a generated question.
const QUESTION_EXCERPT_CHARS: usize = 100;

const STOP_WORDS: [&str; 47] = [
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "can", "this", "that", "these", "those",
    "it", "they", "them", "their", "there", "where", "when", "how", "why",
];

const CONNECTIVES: [&str; 5] = ["because", "therefore", "however", "although", "since"];

const EXAMPLE_MARKERS: [&str; 4] = ["example", "instance", "such as", "like"];

static QUESTION_TEMPLATES: [&str; 5] = [
    "Based on the following information, explain the main concept: {excerpt}...",
    "What are the key points mentioned in this text: {excerpt}...",
    "Summarize and explain the following: {excerpt}...",
    "What is the significance of the ideas presented in: {excerpt}...",
    "Analyze and discuss the following content: {excerpt}...",
];

static FEEDBACK: [[&str; 3]; 4] = [
    [
        "Your answer needs significant improvement. Please review the material more carefully.",
        "This answer doesn't address the question adequately. Consider the key concepts more thoroughly.",
        "Please try again with more focus on the specific topic and its main ideas.",
    ],
    [
        "Fair answer. You touched on some relevant points but could expand on key concepts.",
        "Partially correct. Try to include more specific details and explanations.",
        "You're on the right track, but your answer needs more depth and detail.",
    ],
    [
        "Good answer! You covered most of the important points with solid understanding.",
        "Well done! Your response shows good grasp of the material with minor gaps.",
        "Nice work! You've captured the main ideas effectively.",
    ],
    [
        "Excellent answer! You demonstrated a comprehensive understanding of the topic.",
        "Outstanding! Your answer covers all the key concepts thoroughly.",
        "Perfect! You've shown deep understanding and provided a complete response.",
    ],
];

/// Deterministic-given-seed gateway that needs no network.
pub struct HeuristicGateway {
    dice: Arc<Dice>,
    range: ScoreRange,
    perturbation_chance: f64,
}

impl HeuristicGateway {
    /// Creates a heuristic gateway reporting scores in `range`.
    #[must_use]
    pub fn new(dice: Arc<Dice>, range: ScoreRange, perturbation_chance: f64) -> Self {
        Self {
            dice,
            range,
            perturbation_chance,
        }
    }

    /// Builds a question from a randomly chosen template.
    #[must_use]
    pub fn question_for(&self, passage: &Passage) -> String {
        let excerpt: String = passage.text.chars().take(QUESTION_EXCERPT_CHARS).collect();
        let template = self.dice.pick(&QUESTION_TEMPLATES).unwrap_or(&QUESTION_TEMPLATES[0]);
        template.replace("{excerpt}", &excerpt)
    }

    /// Assesses `answer` against `reference` text.
    #[must_use]
    pub fn assess(&self, answer: &str, reference: &str) -> Assessment {
        let level = self.perturb(base_level(answer, reference), reference);
        let feedback = self.feedback(level, answer, reference);
        Assessment {
            score: scale(level, self.range.max),
            feedback,
        }
    }

    fn perturb(&self, level: u32, reference: &str) -> u32 {
        // A reference with no content words always gets the fallback level
        if content_words(reference).is_empty() || !self.dice.chance(self.perturbation_chance) {
            return level;
        }
        let shifted = i64::from(level) + self.dice.sign();
        let clamped = shifted.clamp(0, i64::from(TOP_LEVEL));
        debug!(from = level, to = clamped, "Perturbed heuristic score");
        u32::try_from(clamped).unwrap_or(level)
    }

    fn feedback(&self, level: u32, answer: &str, reference: &str) -> String {
        let level_index = usize::try_from(level.min(TOP_LEVEL)).unwrap_or(0);
        let templates = &FEEDBACK[level_index];
        let mut feedback = (*self.dice.pick(templates).unwrap_or(&templates[0])).to_string();

        if level < 2 && answer.split_whitespace().count() < 10 {
            feedback.push_str(" Try to provide more detailed explanations.");
        }
        if level < TOP_LEVEL {
            if let Some(phrase) = key_phrase(reference) {
                feedback.push_str(&format!(" Consider discussing concepts like '{phrase}'."));
            }
        }
        feedback
    }
}

impl QuizGateway for HeuristicGateway {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn score_range(&self) -> ScoreRange {
        self.range
    }

    fn generate_question<'a>(&'a self, passage: &'a Passage) -> BoxFuture<'a, Result<String>> {
        async move { Ok(self.question_for(passage)) }.boxed()
    }

    fn score_answer<'a>(
        &'a self,
        _question: &'a str,
        answer: &'a str,
        passage: &'a Passage,
    ) -> BoxFuture<'a, Result<Assessment>> {
        async move { Ok(self.assess(answer, &passage.text)) }.boxed()
    }
}

/// Lowercased, whitespace-split words with stop words removed.
fn content_words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Unperturbed level in `0..=TOP_LEVEL`.
#[allow(clippy::cast_precision_loss)]
fn base_level(answer: &str, reference: &str) -> u32 {
    let reference_words = content_words(reference);
    if reference_words.is_empty() {
        return 1;
    }
    let answer_words = content_words(answer);
    let overlap = answer_words.intersection(&reference_words).count();
    let overlap_ratio = overlap as f64 / reference_words.len() as f64;

    let length_factor = (answer.split_whitespace().count() as f64 / 20.0).min(1.0);

    let lowered = answer.to_lowercase();
    let mut bonus = 0.0;
    if CONNECTIVES.iter().any(|w| lowered.contains(w)) {
        bonus += 0.1;
    }
    if EXAMPLE_MARKERS.iter().any(|w| lowered.contains(w)) {
        bonus += 0.1;
    }

    let total = overlap_ratio + bonus + length_factor * 0.2;
    if total >= 0.8 {
        3
    } else if total >= 0.6 {
        2
    } else if total >= 0.3 {
        1
    } else {
        0
    }
}

/// Maps a level in `0..=TOP_LEVEL` onto `0..=max`.
fn scale(level: u32, max: u32) -> u32 {
    let scaled = u64::from(level.min(TOP_LEVEL)) * u64::from(max) / u64::from(TOP_LEVEL);
    u32::try_from(scaled).unwrap_or(max)
}

/// Three words starting a third of the way into `reference`, if it is long enough.
fn key_phrase(reference: &str) -> Option<String> {
    let words: Vec<&str> = reference.split_whitespace().collect();
    if words.len() <= 10 {
        return None;
    }
    let start = words.len() / 3;
    Some(words[start..(start + 3).min(words.len())].join(" "))
}
