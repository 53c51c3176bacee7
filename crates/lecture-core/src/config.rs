//! Configuration types for Lecture Me.
//!
//! This module provides all configuration structures used to control
//! the quiz, including the notes corpus location, passage extraction,
//! and the question/scoring gateway.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QuizError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "lecture-me.json";

/// Default notes directory.
fn default_notes_directory() -> String {
    "notes".to_string()
}

/// Default allow-list of note file extensions.
fn default_extensions() -> Vec<String> {
    vec!["md".to_string(), "markdown".to_string()]
}

/// Default reserved control file excluded from the corpus.
fn default_reserved_file() -> String {
    "state.md".to_string()
}

/// Default minimum passage length in characters (exclusive).
const fn default_min_chars() -> usize {
    50
}

/// Default upper bound of the score range.
const fn default_max_score() -> u32 {
    3
}

/// Default per-call gateway timeout in seconds.
const fn default_gateway_timeout() -> u64 {
    60
}

/// Default probability of the heuristic ±1 score perturbation.
const fn default_perturbation_chance() -> f64 {
    0.2
}

/// Default environment variable holding the remote API key.
fn default_api_key_env() -> String {
    "LECTURE_ME_API_KEY".to_string()
}

/// Default question-generation prompt.
fn default_question_prompt() -> String {
    "You are a tutor writing quiz questions from a student's own notes.\n\
     Write one open-ended question that checks understanding of the key idea in the passage below.\n\
     Reply with the question only.\n\n\
     Passage:\n{passage}"
        .to_string()
}

/// Default answer-scoring prompt.
fn default_scoring_prompt() -> String {
    "You are an educational assessment AI. Score the student's answer on a scale of 0-{max_score} \
     where 0 is completely incorrect or irrelevant and {max_score} is an excellent, comprehensive answer.\n\n\
     Question: {question}\n\n\
     Reference material: {passage}\n\n\
     Student's answer: {answer}\n\n\
     Respond with JSON only: {\"score\": <integer>, \"explanation\": \"<brief feedback for the student>\"}"
        .to_string()
}

/// Main configuration for Lecture Me.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Root directory of the notes corpus.
    #[serde(default = "default_notes_directory")]
    pub notes_directory: String,

    /// Seed for the random source; `None` seeds from entropy.
    #[serde(default)]
    pub random_seed: Option<u64>,

    /// Which files in the notes directory count as content units.
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Passage extraction settings.
    #[serde(default)]
    pub passage: PassageConfig,

    /// Question generation and answer scoring.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notes_directory: default_notes_directory(),
            random_seed: None,
            corpus: CorpusConfig::default(),
            passage: PassageConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `lecture-me.json` in the current directory. If found, loads and
    /// validates the configuration. If not found, returns default configuration.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            QuizError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::ConfigParseError` if the file exists but contains
    /// invalid JSON or invalid enum values.
    ///
    /// Returns `QuizError::ConfigValidationError` if the configuration values
    /// are invalid (e.g., zero timeout, empty paths).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(QuizError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| QuizError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::ConfigValidationError` if any validation check fails.
    pub fn validate(&self) -> Result<()> {
        if self.notes_directory.trim().is_empty() {
            return Err(QuizError::config_validation(
                "notesDirectory must not be empty",
                "Point notesDirectory at the folder holding your subject directories",
            ));
        }

        if self.corpus.extensions.iter().all(|ext| ext.trim().is_empty()) {
            return Err(QuizError::config_validation(
                "corpus.extensions must list at least one extension",
                "Use [\"md\", \"markdown\"] for markdown notes",
            ));
        }

        if self.corpus.reserved_file.trim().is_empty() {
            return Err(QuizError::config_validation(
                "corpus.reservedFile must not be empty",
                "Remove the key to use the default 'state.md'",
            ));
        }

        if self.passage.min_chars == 0 {
            return Err(QuizError::config_validation(
                "passage.minChars must be greater than 0",
                "Set passage.minChars to at least 1 in your lecture-me.json",
            ));
        }

        if self.gateway.max_score == 0 {
            return Err(QuizError::config_validation(
                "gateway.maxScore must be greater than 0",
                "Set gateway.maxScore to at least 1 in your lecture-me.json",
            ));
        }

        if self.gateway.timeout_seconds == 0 {
            return Err(QuizError::config_validation(
                "gateway.timeoutSeconds must be greater than 0",
                "Set gateway.timeoutSeconds to at least 1 second in your lecture-me.json",
            ));
        }

        if !(0.0..=1.0).contains(&self.gateway.perturbation_chance) {
            return Err(QuizError::config_validation(
                "gateway.perturbationChance must be between 0 and 1",
                "Use 0 to disable score perturbation",
            ));
        }

        for (key, prompt) in [
            ("gateway.questionPrompt", &self.gateway.question_prompt),
            ("gateway.scoringPrompt", &self.gateway.scoring_prompt),
        ] {
            if !prompt.contains("{passage}") {
                return Err(QuizError::config_validation(
                    format!("{key} must contain the {{passage}} placeholder"),
                    format!("Add {{passage}} where the note excerpt belongs in {key}"),
                ));
            }
        }

        Ok(())
    }
}

/// Rules for which files in the notes tree are content units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusConfig {
    /// File extensions (without the dot) that qualify, case-insensitive.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// File name excluded from every topic.
    #[serde(default = "default_reserved_file")]
    pub reserved_file: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            reserved_file: default_reserved_file(),
        }
    }
}

/// Passage extraction settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassageConfig {
    /// An excerpt qualifies only if its trimmed length exceeds this many characters.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for PassageConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
        }
    }
}

/// Question generation and scoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Which gateway implementation to use.
    #[serde(default)]
    pub provider: GatewayProvider,

    /// Upper bound of the score range; the lower bound is always 0.
    #[serde(default = "default_max_score")]
    pub max_score: u32,

    /// Timeout applied to each gateway call, in seconds.
    #[serde(default = "default_gateway_timeout")]
    pub timeout_seconds: u64,

    /// Probability that the heuristic scorer nudges a score by one level.
    #[serde(default = "default_perturbation_chance")]
    pub perturbation_chance: f64,

    /// Remote endpoint; defaults per provider when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Remote model name; defaults per provider when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Environment variable holding the remote API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Template for question generation (`{passage}`).
    #[serde(default = "default_question_prompt")]
    pub question_prompt: String,

    /// Template for answer scoring (`{question}`, `{answer}`, `{passage}`, `{max_score}`).
    #[serde(default = "default_scoring_prompt")]
    pub scoring_prompt: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: GatewayProvider::default(),
            max_score: default_max_score(),
            timeout_seconds: default_gateway_timeout(),
            perturbation_chance: default_perturbation_chance(),
            api_url: None,
            model: None,
            api_key_env: default_api_key_env(),
            question_prompt: default_question_prompt(),
            scoring_prompt: default_scoring_prompt(),
        }
    }
}

/// Supported gateway implementations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GatewayProvider {
    /// Local keyword-overlap scorer (default).
    #[default]
    Heuristic,
    /// `OpenAI`-compatible chat completions endpoint.
    OpenAi,
    /// Anthropic messages endpoint.
    Anthropic,
}

impl GatewayProvider {
    /// Parses a string into a `GatewayProvider`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "heuristic" => Some(Self::Heuristic),
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }

    /// Returns `true` for providers that call a remote model.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::OpenAi | Self::Anthropic)
    }

    /// Default endpoint for remote providers.
    #[must_use]
    pub const fn default_api_url(&self) -> Option<&'static str> {
        match self {
            Self::Heuristic => None,
            Self::OpenAi => Some("https://api.openai.com/v1/chat/completions"),
            Self::Anthropic => Some("https://api.anthropic.com/v1/messages"),
        }
    }

    /// Default model for remote providers.
    #[must_use]
    pub const fn default_model(&self) -> Option<&'static str> {
        match self {
            Self::Heuristic => None,
            Self::OpenAi => Some("gpt-4o-mini"),
            Self::Anthropic => Some("claude-3-haiku-20240307"),
        }
    }
}

impl<'de> Deserialize<'de> for GatewayProvider {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid gateway provider '{s}': expected one of 'heuristic', 'openai', 'anthropic'"
            ))
        })
    }
}

impl Serialize for GatewayProvider {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::Heuristic => "heuristic",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        };
        serializer.serialize_str(s)
    }
}
