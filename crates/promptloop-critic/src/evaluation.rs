use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::shape::{parse_tagged, OutputShape, ShapeError};

/// An evaluator score, guaranteed to lie in `1..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Score(u8);

impl Score {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 100;

    pub fn new(value: i64) -> Result<Self, ShapeError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Score(value as u8))
        } else {
            Err(ShapeError::ScoreOutOfRange(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Score {
    type Error = ShapeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Score::new(value)
    }
}

impl From<Score> for i64 {
    fn from(score: Score) -> Self {
        i64::from(score.0)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The evaluator's verdict on one cycle's transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationResult {
    pub score: Score,
    pub improvement_instructions: Vec<String>,
}

impl EvaluationResult {
    pub fn new(score: Score, improvement_instructions: Vec<String>) -> Self {
        Self {
            score,
            improvement_instructions,
        }
    }
}

/// Wire shape of the `<evaluation>` block.
#[derive(Debug, Deserialize)]
struct RawEvaluation {
    score: i64,
    #[serde(default, alias = "improvement_instr")]
    improvement_instructions: Vec<String>,
}

impl OutputShape for EvaluationResult {
    fn parse(raw: &str) -> Result<Self, ShapeError> {
        let parsed: RawEvaluation = parse_tagged(raw, "evaluation")?;
        let score = Score::new(parsed.score)?;
        let improvement_instructions = parsed
            .improvement_instructions
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(EvaluationResult {
            score,
            improvement_instructions,
        })
    }
}

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Evaluator agent failed: {0}")]
    AgentFailed(String),

    #[error("Evaluator returned score {0}, outside 1..=100")]
    ScoreOutOfRange(i64),

    #[error("Failed to parse evaluation: {0}")]
    Malformed(ShapeError),
}

impl From<ShapeError> for EvaluationError {
    fn from(error: ShapeError) -> Self {
        match error {
            ShapeError::ScoreOutOfRange(score) => EvaluationError::ScoreOutOfRange(score),
            other => EvaluationError::Malformed(other),
        }
    }
}
