//! Generative-model gateway over HTTP.
//!
//! Speaks both the OpenAI-compatible chat completions format and the
//! Anthropic messages format. Prompts come from configuration; the scoring
//! reply must carry a JSON object with `score` and `explanation`.

use futures::future::{BoxFuture, FutureExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Assessment, QuizGateway, ScoreRange};
use crate::config::{GatewayConfig, GatewayProvider};
use crate::error::{GatewayErrorKind, QuizError, Result};
use crate::passage::Passage;

const MAX_TOKENS: u32 = 1024;
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Gateway backed by a remote chat model.
pub struct RemoteGateway {
    client: Client,
    provider: GatewayProvider,
    api_key: String,
    api_url: String,
    model: String,
    range: ScoreRange,
    question_prompt: String,
    scoring_prompt: String,
}

impl std::fmt::Debug for RemoteGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteGateway")
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

impl RemoteGateway {
    /// Creates a gateway from configuration, reading the key from `config.api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns an authentication error if the environment variable is unset
    /// or empty.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                QuizError::gateway(
                    GatewayErrorKind::Authentication,
                    format!("environment variable {} is not set", config.api_key_env),
                )
            })?;
        Self::with_api_key(config, api_key)
    }

    /// Creates a gateway from configuration with an explicit API key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config.provider` is not a remote
    /// provider, or an HTTP error if the client cannot be built.
    pub fn with_api_key(config: &GatewayConfig, api_key: impl Into<String>) -> Result<Self> {
        let provider = config.provider;
        let (Some(default_url), Some(default_model)) =
            (provider.default_api_url(), provider.default_model())
        else {
            return Err(QuizError::config_validation(
                "gateway.provider must be 'openai' or 'anthropic' for a remote gateway",
                "Set gateway.provider, or leave it as 'heuristic' to score locally",
            ));
        };

        Ok(Self {
            client: Client::builder().build()?,
            provider,
            api_key: api_key.into(),
            api_url: config
                .api_url
                .clone()
                .unwrap_or_else(|| default_url.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            range: ScoreRange::new(config.max_score),
            question_prompt: config.question_prompt.clone(),
            scoring_prompt: config.scoring_prompt.clone(),
        })
    }

    /// Sends one user prompt and returns the model's text reply.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let request = match self.provider {
            GatewayProvider::Anthropic => self
                .client
                .post(&self.api_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&ChatRequest::new(&self.model, prompt)),
            _ => self
                .client
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .json(&ChatRequest::new(&self.model, prompt)),
        };

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), model = %self.model, "Model endpoint returned an error");
            return Err(QuizError::gateway(
                GatewayErrorKind::from_status(status.as_u16()),
                format!("model endpoint returned {status}: {}", body.trim()),
            ));
        }

        let text = match self.provider {
            GatewayProvider::Anthropic => response
                .json::<AnthropicResponse>()
                .await
                .map_err(invalid_body)?
                .content
                .into_iter()
                .find_map(|block| block.text),
            _ => response
                .json::<OpenAiResponse>()
                .await
                .map_err(invalid_body)?
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content),
        };

        text.filter(|t| !t.trim().is_empty()).ok_or_else(|| {
            QuizError::gateway(GatewayErrorKind::InvalidResponse, "model returned an empty reply")
        })
    }
}

impl QuizGateway for RemoteGateway {
    fn name(&self) -> &'static str {
        match self.provider {
            GatewayProvider::Anthropic => "anthropic",
            _ => "openai",
        }
    }

    fn score_range(&self) -> ScoreRange {
        self.range
    }

    fn generate_question<'a>(&'a self, passage: &'a Passage) -> BoxFuture<'a, Result<String>> {
        async move {
            let max_score = self.range.max.to_string();
            let prompt = render(
                &self.question_prompt,
                &[
                    ("passage", passage.text.as_str()),
                    ("max_score", max_score.as_str()),
                ],
            );
            let reply = self.complete(&prompt).await?;
            Ok(reply.trim().to_string())
        }
        .boxed()
    }

    fn score_answer<'a>(
        &'a self,
        question: &'a str,
        answer: &'a str,
        passage: &'a Passage,
    ) -> BoxFuture<'a, Result<Assessment>> {
        async move {
            let max_score = self.range.max.to_string();
            let prompt = render(
                &self.scoring_prompt,
                &[
                    ("passage", passage.text.as_str()),
                    ("question", question),
                    ("answer", answer),
                    ("max_score", max_score.as_str()),
                ],
            );
            let reply = self.complete(&prompt).await?;
            debug!(reply_len = reply.len(), "Received scoring reply");
            extract_assessment(&reply, self.range)
        }
        .boxed()
    }
}

/// Substitutes `{name}` placeholders; unknown braces are left alone.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{name}}}"), value)
        })
}

/// Parses the first JSON object in a scoring reply into an [`Assessment`].
///
/// Accepts `feedback` in place of `explanation` and tolerates prose around
/// the object.
///
/// # Errors
///
/// Returns an invalid-response gateway error if no object parses or the
/// score falls outside `range`.
pub fn extract_assessment(reply: &str, range: ScoreRange) -> Result<Assessment> {
    let object = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Err(QuizError::gateway(
                GatewayErrorKind::InvalidResponse,
                "scoring reply contains no JSON object",
            ))
        }
    };

    let raw: RawAssessment = serde_json::from_str(object).map_err(|e| {
        QuizError::gateway(
            GatewayErrorKind::InvalidResponse,
            format!("scoring reply is not valid JSON: {e}"),
        )
    })?;

    let score = u32::try_from(raw.score)
        .ok()
        .filter(|s| range.contains(*s))
        .ok_or_else(|| {
            QuizError::gateway(
                GatewayErrorKind::InvalidResponse,
                format!("score {} is outside 0..={}", raw.score, range.max),
            )
        })?;

    Ok(Assessment {
        score,
        feedback: raw.explanation.trim().to_string(),
    })
}

fn classify_transport(e: reqwest::Error) -> QuizError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        QuizError::gateway(GatewayErrorKind::Network, e.to_string())
    } else {
        QuizError::Http(e)
    }
}

fn invalid_body(e: reqwest::Error) -> QuizError {
    QuizError::gateway(
        GatewayErrorKind::InvalidResponse,
        format!("unexpected response body: {e}"),
    )
}

#[derive(Deserialize)]
struct RawAssessment {
    score: i64,
    #[serde(alias = "feedback")]
    explanation: String,
}

// Both providers accept the same minimal request shape.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

impl<'a> ChatRequest<'a> {
    const fn new(model: &'a str, prompt: &'a str) -> Self {
        Self {
            model,
            max_tokens: MAX_TOKENS,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        }
    }
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
