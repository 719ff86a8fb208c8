use serde::{Deserialize, Serialize};

/// A candidate system prompt.
///
/// Immutable once created. `accepted_at` is the cycle whose rewrite produced
/// it, 0 for the initial prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    text: String,
    accepted_at: usize,
}

impl Prompt {
    pub fn initial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            accepted_at: 0,
        }
    }

    pub(crate) fn accepted(text: impl Into<String>, cycle: usize) -> Self {
        Self {
            text: text.into(),
            accepted_at: cycle,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn accepted_at(&self) -> usize {
        self.accepted_at
    }

    /// First line of the prompt, for progress output
    pub fn preview(&self) -> String {
        self.text.lines().next().unwrap_or_default().chars().take(100).collect()
    }
}
