//! Passage selection from notes.
//!
//! A passage is one blank-line-separated block of a note, long enough to ask
//! a question about and stripped of inline markdown. Selection picks a unit of
//! the topic uniformly at random, then a qualifying block of that unit
//! uniformly at random. A unit with no qualifying block yields nothing; other
//! units of the topic are not tried.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::corpus::CorpusIndex;
use crate::error::Result;
use crate::random::Dice;

static BOLD: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").ok());
static ITALIC: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\*(.*?)\*").ok());
static INLINE_CODE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"`(.*?)`").ok());
static LINK: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\[(.*?)\]\(.*?\)").ok());

/// Block prefixes that never make a passage: headings, fences, rules.
const EXCLUDED_PREFIXES: [&str; 3] = ["#", "```", "---"];

/// An excerpt of a note used as the basis for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// Plain-text excerpt.
    pub text: String,

    /// Content unit the excerpt came from.
    pub source: PathBuf,

    /// Ordinal of the block within the unit (0-based, counting every block).
    pub index: usize,
}

impl Passage {
    /// Short human-readable provenance, e.g. `linear.md, paragraph 3`.
    #[must_use]
    pub fn provenance(&self) -> String {
        let file = self
            .source
            .file_name()
            .map_or_else(|| self.source.display().to_string(), |n| n.to_string_lossy().into_owned());
        format!("{file}, paragraph {}", self.index + 1)
    }
}

/// Picks random passages from a corpus.
#[derive(Clone)]
pub struct PassageSelector {
    corpus: Arc<dyn CorpusIndex>,
    dice: Arc<Dice>,
    min_chars: usize,
}

impl PassageSelector {
    /// Creates a selector over `corpus`.
    #[must_use]
    pub fn new(corpus: Arc<dyn CorpusIndex>, dice: Arc<Dice>, min_chars: usize) -> Self {
        Self {
            corpus,
            dice,
            min_chars,
        }
    }

    /// Selects a random passage from `subject`/`topic`.
    ///
    /// Returns `Ok(None)` when the topic is unknown, has no units, or the
    /// randomly chosen unit has no qualifying block.
    pub fn select(&self, subject: &str, topic: &str) -> Result<Option<Passage>> {
        let Some(topic) = self.corpus.find_topic(subject, topic)? else {
            debug!(subject, topic, "Topic not found for passage selection");
            return Ok(None);
        };
        let Some(unit) = self.dice.pick(&topic.units) else {
            return Ok(None);
        };

        let passages = self.passages_in(unit);
        let Some((text, index)) = self.dice.pick(&passages) else {
            debug!(unit = %unit.display(), "Chosen note has no qualifying passage");
            return Ok(None);
        };

        Ok(Some(Passage {
            text: text.clone(),
            source: unit.clone(),
            index: *index,
        }))
    }

    fn passages_in(&self, unit: &Path) -> Vec<(String, usize)> {
        match self.corpus.read_unit(unit) {
            Ok(content) => extract_passages(&content, self.min_chars),
            Err(e) => {
                warn!(unit = %unit.display(), error = %e, "Failed to read note");
                Vec::new()
            }
        }
    }
}

/// Splits `content` on blank lines and returns qualifying blocks with their ordinals.
///
/// A block qualifies when its trimmed length exceeds `min_chars` characters and
/// it does not start with a heading, code fence or horizontal rule. Returned
/// text has inline markup stripped.
#[must_use]
pub fn extract_passages(content: &str, min_chars: usize) -> Vec<(String, usize)> {
    let normalized = content.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .enumerate()
        .filter_map(|(index, block)| {
            let trimmed = block.trim();
            let qualifies = trimmed.chars().count() > min_chars
                && !EXCLUDED_PREFIXES.iter().any(|p| trimmed.starts_with(p));
            qualifies.then(|| (strip_markup(trimmed), index))
        })
        .collect()
}

/// Removes bold, italic, inline code and link markup, keeping link text.
#[must_use]
pub fn strip_markup(text: &str) -> String {
    let mut out = text.to_string();
    for re in [&BOLD, &ITALIC, &INLINE_CODE, &LINK] {
        if let Some(re) = re.as_ref() {
            out = re.replace_all(&out, "$1").into_owned();
        }
    }
    out
}
