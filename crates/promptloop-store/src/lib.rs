//! # promptloop-store
//!
//! Durable JSON files that give the training loop its memory.
//!
//! - [`InteractionLog`] - the current cycle's query/response pairs, reset at
//!   every cycle boundary
//! - [`PromptLedger`] - every accepted prompt rewrite, never truncated
//! - [`CheckpointFile`] - a resumable snapshot of an in-flight run
//!
//! All writes go through a temp file and a rename, so readers never observe a
//! half-written file. A single writer per file is assumed.

mod checkpoint;
mod error;
mod fsutil;
mod interactions;
mod ledger;

pub use checkpoint::CheckpointFile;
pub use error::StorageError;
pub use interactions::{InteractionLog, InteractionRecord, LogRead, ReadState};
pub use ledger::{LedgerEntry, PromptLedger};

/// Default file name of the interaction log inside a state directory.
pub const INTERACTIONS_FILE: &str = "interactions.json";
/// Default file name of the prompt ledger inside a state directory.
pub const LEDGER_FILE: &str = "new_prompt.json";
/// Default file name of the session checkpoint inside a state directory.
pub const CHECKPOINT_FILE: &str = "session.json";
