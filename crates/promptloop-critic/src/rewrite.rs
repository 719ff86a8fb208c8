use serde::Deserialize;
use thiserror::Error;

use crate::shape::{parse_tagged, OutputShape, ShapeError};

/// A rewritten prompt and the changes the rewriter says it made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteResult {
    pub new_prompt: String,
    pub improvements: Vec<String>,
}

impl RewriteResult {
    pub fn new(new_prompt: impl Into<String>, improvements: Vec<String>) -> Self {
        Self {
            new_prompt: new_prompt.into(),
            improvements,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRewrite {
    #[serde(alias = "new_system_prompt")]
    new_prompt: String,
    #[serde(default, alias = "Improvements")]
    improvements: Vec<String>,
}

impl OutputShape for RewriteResult {
    fn parse(raw: &str) -> Result<Self, ShapeError> {
        let parsed: RawRewrite = parse_tagged(raw, "rewrite")?;
        let new_prompt = parsed.new_prompt.trim();
        if new_prompt.is_empty() {
            return Err(ShapeError::EmptyField("new_prompt"));
        }
        Ok(RewriteResult {
            new_prompt: new_prompt.to_string(),
            improvements: parsed.improvements,
        })
    }
}

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Rewriter agent failed: {0}")]
    AgentFailed(String),

    #[error("Failed to parse rewrite: {0}")]
    Malformed(#[from] ShapeError),
}
