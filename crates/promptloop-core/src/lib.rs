//! # promptloop-core
//!
//! The cycle controller: a hill-climbing loop over system prompts with
//! one-step backtracking.
//!
//! A run is a [`TrainingSession`] value the driver keeps between calls. The
//! [`CycleController`] advances it one step at a time:
//!
//! 1. [`CycleController::submit_query`] until the cycle has its queries
//! 2. [`CycleController::advance_cycle`] to evaluate, then accept (rewrite
//!    the prompt and append to the ledger) or backtrack to the prior prompt
//!
//! Ties accept. Only a strictly lower score backtracks.

mod config;
mod controller;
mod error;
mod outcome;
mod prompt;
mod score;
mod session;

pub use config::{CycleConfig, DEFAULT_CYCLES, DEFAULT_QUERIES_PER_CYCLE};
pub use controller::CycleController;
pub use error::LoopError;
pub use outcome::{CycleAdvance, CycleOutcome, CycleStatus, RunOutcome, TrainingSummary};
pub use prompt::Prompt;
pub use score::ScoreHistory;
pub use session::{CyclePhase, TrainingSession};
