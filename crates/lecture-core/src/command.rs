//! Inbound message resolution.
//!
//! Chat transports deliver commands, keyboard button presses and free text.
//! They are resolved into a [`QuizInput`] once, here, so the engine only ever
//! matches on variants and never compares strings against button labels.

use serde::{Deserialize, Serialize};

/// Label of the keyboard option that picks a random topic.
pub const RANDOM_TOPIC_LABEL: &str = "🎲 Random Topic";

/// The fixed menu offered after an answer is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuAction {
    /// Ask another question on the same topic.
    RepeatQuestion,
    /// Pick a different topic in the same subject.
    ChangeTopic,
    /// Show statistics.
    ViewStats,
    /// Start over from the subject list.
    MainMenu,
}

impl MenuAction {
    /// All actions in keyboard order.
    pub const ALL: [Self; 4] = [
        Self::RepeatQuestion,
        Self::ChangeTopic,
        Self::ViewStats,
        Self::MainMenu,
    ];

    /// Button label shown to the user.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::RepeatQuestion => "🔄 Another question",
            Self::ChangeTopic => "📚 Change topic",
            Self::ViewStats => "📊 View stats",
            Self::MainMenu => "🏠 Main menu",
        }
    }

    /// Resolves a button label back to its action.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.label() == label)
    }

    /// The menu as keyboard labels.
    #[must_use]
    pub fn keyboard() -> Vec<String> {
        Self::ALL.iter().map(|a| a.label().to_string()).collect()
    }
}

/// A user event the quiz engine understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizInput {
    /// Clear the selection and show the welcome text.
    Restart,
    /// Clear the selection and list subjects.
    ListSubjects,
    /// Show statistics.
    Stats,
    /// Show usage.
    Help,
    /// A post-answer menu button.
    Menu(MenuAction),
    /// The random-topic button.
    RandomTopic,
    /// Anything else; meaning depends on the session state.
    Text(String),
}

impl QuizInput {
    /// Resolves a raw chat message.
    ///
    /// A leading `/` followed by a known command name (`/start`, `/restart`,
    /// `/study`, `/stats`, `/help`) is a command; a `@botname` suffix is
    /// ignored. Other slash text, such as an answer quoting `/etc/hosts`, is
    /// free text. Exact button labels resolve to their typed variants;
    /// everything else is trimmed free text.
    ///
    /// # Examples
    ///
    /// ```
    /// use lecture_core::{MenuAction, QuizInput};
    ///
    /// assert_eq!(QuizInput::from_message("/study"), QuizInput::ListSubjects);
    /// assert_eq!(
    ///     QuizInput::from_message("📊 View stats"),
    ///     QuizInput::Menu(MenuAction::ViewStats)
    /// );
    /// assert_eq!(QuizInput::from_message("  Math "), QuizInput::Text("Math".into()));
    /// assert_eq!(QuizInput::from_message("/tmp"), QuizInput::Text("/tmp".into()));
    /// ```
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        let trimmed = message.trim();
        if let Some(input) = trimmed.strip_prefix('/').and_then(Self::known_command) {
            return input;
        }
        if trimmed == RANDOM_TOPIC_LABEL {
            return Self::RandomTopic;
        }
        MenuAction::from_label(trimmed).map_or_else(|| Self::Text(trimmed.to_string()), Self::Menu)
    }

    /// Resolves an explicit command, with or without the leading `/`.
    ///
    /// Unknown names resolve to [`QuizInput::Help`].
    #[must_use]
    pub fn from_command(command: &str) -> Self {
        Self::known_command(command).unwrap_or(Self::Help)
    }

    fn known_command(command: &str) -> Option<Self> {
        let name = command
            .trim()
            .trim_start_matches('/')
            .split(['@', ' '])
            .next()
            .unwrap_or_default()
            .to_lowercase();
        match name.as_str() {
            "start" | "restart" => Some(Self::Restart),
            "study" => Some(Self::ListSubjects),
            "stats" => Some(Self::Stats),
            "help" => Some(Self::Help),
            _ => None,
        }
    }
}

/// Wire form of an inbound event, as posted to the HTTP API.
///
/// ```json
/// {"type": "command", "command": "study"}
/// {"type": "text", "text": "Math"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// A slash command.
    Command {
        /// Command name, with or without the leading `/`.
        command: String,
    },
    /// A text message or keyboard button press.
    Text {
        /// The message text.
        text: String,
    },
}

impl InboundMessage {
    /// Resolves the message into engine input.
    #[must_use]
    pub fn resolve(&self) -> QuizInput {
        match self {
            Self::Command { command } => QuizInput::from_command(command),
            Self::Text { text } => QuizInput::from_message(text),
        }
    }
}
