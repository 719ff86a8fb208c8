use serde::{Deserialize, Serialize};

use promptloop_critic::Score;

/// Scores of retained cycles, oldest first.
///
/// Append-only. A backtracked cycle's score is never pushed, so the history
/// can be shorter than the number of cycles run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreHistory(Vec<Score>);

impl ScoreHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, score: Score) {
        self.0.push(score);
    }

    pub fn last(&self) -> Option<Score> {
        self.0.last().copied()
    }

    pub fn first(&self) -> Option<Score> {
        self.0.first().copied()
    }

    pub fn best(&self) -> Option<Score> {
        self.0.iter().max().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Score] {
        &self.0
    }

    pub fn values(&self) -> Vec<u8> {
        self.0.iter().map(|s| s.value()).collect()
    }

    /// Last retained score minus the first
    pub fn improvement(&self) -> Option<i16> {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => Some(i16::from(last.value()) - i16::from(first.value())),
            _ => None,
        }
    }
}
