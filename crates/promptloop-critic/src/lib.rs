//! # promptloop-critic
//!
//! The three language-model roles of the training loop, built on one
//! [`Collaborator`] type:
//!
//! - responder: answers a user query under the candidate prompt
//! - evaluator: scores a transcript against a rubric
//! - rewriter: applies improvement instructions to a prompt
//!
//! Agent output is parsed into typed results here, once. Anything that does not
//! fit the expected shape becomes that role's error and never reaches the loop.

mod collaborator;
mod evaluation;
mod prompts;
mod rewrite;
mod shape;

pub use collaborator::{
    Collaborator, EvaluationCollaborator, GenerationCollaborator, GenerationError,
    RewriteCollaborator, RoleKind,
};
pub use evaluation::{EvaluationError, EvaluationResult, Score};
pub use prompts::{CollabPrompts, DEFAULT_RUBRIC, DEFAULT_SYSTEM_PROMPT};
pub use rewrite::{RewriteError, RewriteResult};
pub use shape::{OutputShape, Reply, ShapeError};
