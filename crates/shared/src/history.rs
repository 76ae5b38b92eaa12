use serde::{Deserialize, Serialize};

/// One user message paired with its assistant reply.
///
/// `user` is `None` only for system/error-injected entries. The assistant
/// side of the newest turn is rewritten repeatedly while a reply streams in.
///
/// Serialized as a two-element array `[user|null, assistant|null]`, matching
/// the persisted session format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "(Option<String>, Option<String>)",
    into = "(Option<String>, Option<String>)"
)]
pub struct Turn {
    pub user: Option<String>,
    pub assistant: Option<String>,
}

impl Turn {
    /// An entry carrying only assistant-side text (error notice, analysis result).
    pub fn is_notice(&self) -> bool {
        self.user.is_none()
    }
}

impl From<(Option<String>, Option<String>)> for Turn {
    fn from((user, assistant): (Option<String>, Option<String>)) -> Self {
        Self { user, assistant }
    }
}

impl From<Turn> for (Option<String>, Option<String>) {
    fn from(turn: Turn) -> Self {
        (turn.user, turn.assistant)
    }
}

/// Ordered list of turns for one active conversation.
///
/// Append-only, except for the in-place update of the last turn's assistant
/// side during streaming and the explicit `clear`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatHistory(Vec<Turn>);

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.0.last()
    }

    /// Appends a user turn with no reply yet.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.0.push(Turn {
            user: Some(text.into()),
            assistant: None,
        });
    }

    /// Replaces the assistant side of the newest turn. No-op on an empty
    /// history; the orchestrator always appends the user turn first.
    pub fn set_last_assistant(&mut self, text: impl Into<String>) {
        if let Some(turn) = self.0.last_mut() {
            turn.assistant = Some(text.into());
        }
    }

    /// Appends an assistant-only entry, used for backend errors and analysis
    /// results. Never overwrites a user turn.
    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.0.push(Turn {
            user: None,
            assistant: Some(text.into()),
        });
    }

    pub fn clear(&mut self) {
        self.0.clear();
        tracing::info!("chat history cleared");
    }

    /// User-side messages in insertion order, for title generation.
    pub fn user_messages(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|t| t.user.as_deref())
    }
}

impl FromIterator<Turn> for ChatHistory {
    fn from_iter<I: IntoIterator<Item = Turn>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
