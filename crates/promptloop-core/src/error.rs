use thiserror::Error;

use promptloop_critic::{EvaluationError, GenerationError, RewriteError};
use promptloop_store::StorageError;

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Rewrite failed: {0}")]
    Rewrite(#[from] RewriteError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Cycle is incomplete: {collected} of {required} queries collected")]
    CycleIncomplete { collected: usize, required: usize },
}

impl LoopError {
    /// Whether re-running the same step may succeed.
    ///
    /// Collaborator and storage failures leave the session untouched; the
    /// others come from calling a step at the wrong time or with bad input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LoopError::Generation(_)
                | LoopError::Evaluation(_)
                | LoopError::Rewrite(_)
                | LoopError::Storage(_)
        )
    }
}
