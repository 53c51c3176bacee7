//! The quiz engine: one state machine per user.
//!
//! [`QuizEngine::handle`] takes a resolved [`QuizInput`] for a user, advances
//! that user's [`Session`] and returns the [`Reply`] to render. The session
//! lock is held for the whole exchange, gateway calls included, so inputs
//! from one user are applied strictly in order while other users proceed
//! independently.
//!
//! Nothing in here is fatal: unknown names, empty topics and gateway failures
//! all become user-facing messages and leave the session in a usable state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::command::{MenuAction, QuizInput, RANDOM_TOPIC_LABEL};
use crate::config::Config;
use crate::corpus::{CorpusIndex, NotesDirectory, Subject};
use crate::error::{GatewayErrorKind, QuizError, Result};
use crate::events::{AnswerScoredPayload, EventBroadcaster, QuestionAskedPayload, QuizEvent};
use crate::gateway::QuizGateway;
use crate::passage::PassageSelector;
use crate::random::Dice;
use crate::session::{Question, Session, SessionRegistry, SessionSnapshot, SessionStatus, UserId};

const WELCOME: &str = "Welcome to the Self-Education Bot! 🎓\n\n\
                       I'll help you learn by asking questions based on your notes.\n\
                       Use /study to start a study session or /stats to see your progress.";

const HELP: &str = "I quiz you on your own notes.\n\n\
                    /study - choose a subject and topic\n\
                    /stats - see your progress\n\
                    /restart - clear your selection and start over\n\
                    /help - show this message\n\n\
                    After a question, just type your answer.";

const NO_SUBJECTS: &str = "No study materials found! Please make sure your notes directory \
                           contains subjects with topics and markdown files.";

const NO_STATS: &str =
    "You haven't answered any questions yet! Use /study to start learning.";

const CHOOSE_SUBJECT_FIRST: &str = "Please choose a subject first. Use /study to see your subjects.";

const ANSWER_FIRST: &str =
    "Please answer the current question first, or use /study to start over.";

const GENERATION_FAILED: &str =
    "Sorry, I couldn't come up with a question right now. Please pick the topic again to retry.";

const SCORING_FAILED: &str =
    "Sorry, I couldn't score your answer right now. Please send your answer again.";

const INTERNAL_ERROR: &str = "Something went wrong on my side. Please try again, or use /restart.";

/// What to show the user in response to one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Message text.
    pub text: String,

    /// Selectable options, if the reply offers any.
    pub keyboard: Option<Vec<String>>,
}

impl Reply {
    /// A plain text reply.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    /// A reply offering `options`.
    #[must_use]
    pub fn with_keyboard(text: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(options),
        }
    }
}

/// Drives quiz sessions against a corpus and a gateway.
pub struct QuizEngine {
    corpus: Arc<dyn CorpusIndex>,
    selector: PassageSelector,
    gateway: Arc<dyn QuizGateway>,
    sessions: SessionRegistry,
    dice: Arc<Dice>,
    timeout: Duration,
    events: EventBroadcaster,
}

impl QuizEngine {
    /// Creates an engine with the default passage length and gateway timeout.
    #[must_use]
    pub fn new(
        corpus: Arc<dyn CorpusIndex>,
        gateway: Arc<dyn QuizGateway>,
        dice: Arc<Dice>,
    ) -> Self {
        let defaults = Config::default();
        let selector = PassageSelector::new(
            Arc::clone(&corpus),
            Arc::clone(&dice),
            defaults.passage.min_chars,
        );
        Self {
            corpus,
            selector,
            gateway,
            sessions: SessionRegistry::new(),
            dice,
            timeout: Duration::from_secs(defaults.gateway.timeout_seconds),
            events: EventBroadcaster::default(),
        }
    }

    /// Creates an engine over the notes directory named in `config`.
    #[must_use]
    pub fn from_config(config: &Config, gateway: Arc<dyn QuizGateway>, dice: Arc<Dice>) -> Self {
        let corpus: Arc<dyn CorpusIndex> = Arc::new(NotesDirectory::new(
            &config.notes_directory,
            config.corpus.clone(),
        ));
        Self::new(corpus, gateway, dice)
            .with_min_chars(config.passage.min_chars)
            .with_timeout(Duration::from_secs(config.gateway.timeout_seconds))
    }

    /// Sets the minimum passage length.
    #[must_use]
    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.selector = PassageSelector::new(Arc::clone(&self.corpus), Arc::clone(&self.dice), min_chars);
        self
    }

    /// Sets the per-call gateway timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Publishes activity on `events` instead of a private broadcaster.
    #[must_use]
    pub fn with_events(mut self, events: EventBroadcaster) -> Self {
        self.events = events;
        self
    }

    /// The activity broadcaster.
    #[must_use]
    pub const fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// The session registry.
    #[must_use]
    pub const fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// The gateway in use.
    #[must_use]
    pub fn gateway(&self) -> &dyn QuizGateway {
        self.gateway.as_ref()
    }

    /// Scans the corpus.
    pub async fn subjects(&self) -> Result<Vec<Subject>> {
        self.scan(|corpus| corpus.list_subjects()).await
    }

    /// Scans the corpus and returns subject names only.
    pub async fn subject_names(&self) -> Result<Vec<String>> {
        Ok(self.subjects().await?.into_iter().map(|s| s.name).collect())
    }

    /// Runs a corpus read on the blocking thread pool.
    async fn scan<T, F>(&self, read: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn CorpusIndex) -> Result<T> + Send + 'static,
    {
        let corpus = Arc::clone(&self.corpus);
        tokio::task::spawn_blocking(move || read(corpus.as_ref()))
            .await
            .map_err(|e| QuizError::Io(std::io::Error::other(e)))?
    }

    async fn topic_names(&self, subject: &str) -> Result<Vec<String>> {
        let subject = subject.to_string();
        self.scan(move |corpus| {
            Ok(corpus
                .list_topics(&subject)?
                .into_iter()
                .map(|t| t.name)
                .collect())
        })
        .await
    }

    /// Returns a snapshot of `user`'s session, if they have made contact.
    pub async fn session_snapshot(&self, user: &UserId) -> Option<SessionSnapshot> {
        let handle = self.sessions.get(user)?;
        let session = handle.lock().await;
        Some(session.snapshot())
    }

    /// Applies one input for `user` and returns the reply.
    pub async fn handle(&self, user: &UserId, input: QuizInput) -> Reply {
        let handle = self.sessions.get_or_create(user);
        let mut session = handle.lock().await;
        let before = session.status();
        debug!(user = %user, status = %before, input = ?input, "Handling input");

        let reply = match self.dispatch(&mut session, input).await {
            Ok(reply) => reply,
            Err(e) if e.is_not_found() => Reply::text(e.to_string()),
            Err(e) => {
                error!(user = %user, error = %e, "Failed to handle input");
                Reply::text(INTERNAL_ERROR)
            }
        };

        let after = session.status();
        if before != after {
            info!(user = %user, from = %before, to = %after, "Session transition");
        }
        reply
    }

    async fn dispatch(&self, session: &mut Session, input: QuizInput) -> Result<Reply> {
        match input {
            QuizInput::Restart => {
                self.reset(session);
                Ok(Reply::text(WELCOME))
            }
            QuizInput::ListSubjects | QuizInput::Menu(MenuAction::MainMenu) => {
                self.reset(session);
                self.list_subjects().await
            }
            QuizInput::Stats | QuizInput::Menu(MenuAction::ViewStats) => {
                Ok(self.stats_reply(session))
            }
            QuizInput::Help => Ok(Reply::text(HELP)),
            QuizInput::Menu(MenuAction::RepeatQuestion) => self.repeat_question(session).await,
            QuizInput::Menu(MenuAction::ChangeTopic) => match session.subject().map(str::to_string) {
                Some(subject) => {
                    session.clear_topic();
                    self.offer_topics(&subject, format!("Choose a new topic in '{subject}':"))
                        .await
                }
                None => Ok(Reply::text(CHOOSE_SUBJECT_FIRST)),
            },
            QuizInput::RandomTopic => match session.status() {
                SessionStatus::SubjectChosen => self.choose_topic(session, None).await,
                SessionStatus::Idle => Ok(Reply::text(CHOOSE_SUBJECT_FIRST)),
                SessionStatus::AwaitingAnswer => Ok(Reply::text(ANSWER_FIRST)),
            },
            QuizInput::Text(text) => match session.status() {
                SessionStatus::Idle => self.choose_subject(session, &text).await,
                SessionStatus::SubjectChosen => self.choose_topic(session, Some(&text)).await,
                SessionStatus::AwaitingAnswer => self.answer(session, &text).await,
            },
        }
    }

    fn reset(&self, session: &mut Session) {
        session.reset();
        self.emit(QuizEvent::session_reset(session.user_id().clone()));
    }

    async fn list_subjects(&self) -> Result<Reply> {
        let names = self.subject_names().await?;
        if names.is_empty() {
            return Ok(Reply::text(NO_SUBJECTS));
        }
        Ok(Reply::with_keyboard("Choose a subject to study:", names))
    }

    fn stats_reply(&self, session: &Session) -> Reply {
        let stats = session.stats();
        let Some(average) = stats.average() else {
            return Reply::text(NO_STATS);
        };
        Reply::text(format!(
            "📊 Your Study Statistics:\n\
             Questions answered: {}\n\
             Total score: {}\n\
             Average score: {average:.1}/{}",
            stats.answered,
            stats.total_score,
            self.gateway.score_range().max
        ))
    }

    async fn choose_subject(&self, session: &mut Session, name: &str) -> Result<Reply> {
        let names = self.subject_names().await?;
        if names.is_empty() {
            return Ok(Reply::text(NO_SUBJECTS));
        }
        if !names.iter().any(|n| n == name) {
            let message = QuizError::subject_not_found(name, names.clone()).to_string();
            return Ok(Reply::with_keyboard(message, names));
        }

        session.select_subject(name)?;
        self.offer_topics(name, format!("Great! You selected '{name}'. Now choose a topic:"))
            .await
    }

    async fn offer_topics(&self, subject: &str, prompt: String) -> Result<Reply> {
        let mut options = self.topic_names(subject).await?;
        if options.is_empty() {
            return Ok(Reply::text(format!(
                "No topics found for subject '{subject}'. Please check your notes directory."
            )));
        }
        options.push(RANDOM_TOPIC_LABEL.to_string());
        Ok(Reply::with_keyboard(prompt, options))
    }

    async fn choose_topic(&self, session: &mut Session, requested: Option<&str>) -> Result<Reply> {
        let Some(subject) = session.subject().map(str::to_string) else {
            return Ok(Reply::text(CHOOSE_SUBJECT_FIRST));
        };
        let names = self.topic_names(&subject).await?;

        let topic = match requested {
            Some(name) if names.iter().any(|n| n == name) => name.to_string(),
            Some(name) => {
                let message = QuizError::topic_not_found(&subject, name, names.clone()).to_string();
                let mut options = names;
                options.push(RANDOM_TOPIC_LABEL.to_string());
                return Ok(Reply::with_keyboard(message, options));
            }
            None => match self.dice.pick(&names) {
                Some(name) => {
                    debug!(subject = %subject, topic = %name, "Picked random topic");
                    name.clone()
                }
                None => {
                    return Ok(Reply::text(format!(
                        "No topics found for subject '{subject}'. Please check your notes directory."
                    )))
                }
            },
        };

        session.select_topic(topic)?;
        self.ask_question(session).await
    }

    async fn repeat_question(&self, session: &mut Session) -> Result<Reply> {
        let subject = session.subject().map(str::to_string);
        let has_topic = session.topic().is_some();
        match subject {
            Some(_) if has_topic => self.ask_question(session).await,
            Some(subject) => {
                self.offer_topics(&subject, format!("Choose a topic in '{subject}' first:"))
                    .await
            }
            None => Ok(Reply::text(CHOOSE_SUBJECT_FIRST)),
        }
    }

    async fn ask_question(&self, session: &mut Session) -> Result<Reply> {
        let (Some(subject), Some(topic)) = (
            session.subject().map(str::to_string),
            session.topic().map(str::to_string),
        ) else {
            return Ok(Reply::text(CHOOSE_SUBJECT_FIRST));
        };

        let selector = self.selector.clone();
        let (unit_subject, unit_topic) = (subject.clone(), topic.clone());
        let selected = self
            .scan(move |_| selector.select(&unit_subject, &unit_topic))
            .await?;
        let Some(passage) = selected else {
            info!(subject = %subject, topic = %topic, "No passage available");
            return Err(QuizError::passage_not_found(subject, topic));
        };

        let generated = self
            .timed("generate_question", self.gateway.generate_question(&passage))
            .await;
        let text = match generated {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                let e = QuizError::gateway(GatewayErrorKind::InvalidResponse, "empty question");
                return Ok(self.gateway_failure(session, "generate_question", &e, GENERATION_FAILED));
            }
            Err(e) => {
                return Ok(self.gateway_failure(session, "generate_question", &e, GENERATION_FAILED));
            }
        };

        let source = passage.provenance();
        session.begin_question(Question::new(text.clone(), passage, &subject, &topic))?;
        info!(user = %session.user_id(), subject = %subject, topic = %topic, source = %source, "Question asked");
        self.emit(QuizEvent::QuestionAsked(QuestionAskedPayload {
            user_id: session.user_id().clone(),
            subject: subject.clone(),
            topic: topic.clone(),
            source,
            question: text.clone(),
        }));

        Ok(Reply::text(format!(
            "📝 Question ({subject} / {topic}):\n\n{text}\n\nType your answer below."
        )))
    }

    async fn answer(&self, session: &mut Session, answer: &str) -> Result<Reply> {
        let Some(question) = session.question().cloned() else {
            return Ok(Reply::text(CHOOSE_SUBJECT_FIRST));
        };
        let range = self.gateway.score_range();

        let scored = self
            .timed(
                "score_answer",
                self.gateway.score_answer(&question.text, answer, &question.passage),
            )
            .await
            .and_then(|assessment| {
                if range.contains(assessment.score) {
                    Ok(assessment)
                } else {
                    Err(QuizError::gateway(
                        GatewayErrorKind::InvalidResponse,
                        format!("score {} is outside 0..={}", assessment.score, range.max),
                    ))
                }
            });
        let assessment = match scored {
            Ok(assessment) => assessment,
            Err(e) => return Ok(self.gateway_failure(session, "score_answer", &e, SCORING_FAILED)),
        };

        session.record_answer(assessment.score)?;
        let stats = session.stats();
        info!(
            user = %session.user_id(),
            score = assessment.score,
            answered = stats.answered,
            "Answer scored"
        );
        self.emit(QuizEvent::AnswerScored(AnswerScoredPayload {
            user_id: session.user_id().clone(),
            subject: question.subject.clone(),
            topic: question.topic.clone(),
            score: assessment.score,
            max_score: range.max,
            answered: stats.answered,
        }));

        Ok(Reply::with_keyboard(
            format!(
                "✅ Score: {}/{}\n\n{}\n\n📖 Source: {}",
                assessment.score,
                range.max,
                assessment.feedback,
                question.passage.provenance()
            ),
            MenuAction::keyboard(),
        ))
    }

    fn gateway_failure(
        &self,
        session: &Session,
        operation: &str,
        e: &QuizError,
        message: &str,
    ) -> Reply {
        warn!(
            user = %session.user_id(),
            gateway = self.gateway.name(),
            operation,
            transient = e.is_transient(),
            error = %e,
            "Gateway call failed"
        );
        self.emit(QuizEvent::gateway_failed(
            session.user_id().clone(),
            operation,
            e.to_string(),
        ));
        Reply::text(message)
    }

    async fn timed<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| QuizError::gateway_timeout(operation, self.timeout.as_secs()))?
    }

    fn emit(&self, event: QuizEvent) {
        let receivers = self.events.send(event);
        debug!(receivers, "Published quiz event");
    }
}

// ============================================================================
// Tests
// ============================================================================
