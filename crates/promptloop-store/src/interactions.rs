use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::fsutil::{read_optional, to_pretty_json, write_atomic};
use crate::StorageError;

/// One query answered under the current prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    #[serde(rename = "user_input")]
    pub query: String,
    #[serde(rename = "agent_output")]
    pub response: String,
}

impl InteractionRecord {
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
        }
    }
}

/// Why a read produced the records it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// The file parsed as a list of records
    Present,
    /// The file has never been written
    Missing,
    /// The file exists but is not a list of records; treated as empty
    Corrupt,
}

/// Result of reading the interaction log, tagged with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRead {
    pub records: Vec<InteractionRecord>,
    pub state: ReadState,
}

/// The durable interaction log for the cycle in progress.
///
/// Stored as a pretty-printed JSON array of `{"user_input", "agent_output"}`
/// objects. Corrupt content reads as an empty log rather than an error, which
/// lets training continue at the cost of silently dropping what was there.
#[derive(Debug, Clone)]
pub struct InteractionLog {
    path: PathBuf,
}

impl InteractionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the log under a state directory using the default file name.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(crate::INTERACTIONS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the durable content with an empty list.
    pub fn reset(&self) -> Result<(), StorageError> {
        debug!(path = %self.path.display(), "Resetting interaction log");
        write_atomic(&self.path, "[]")
    }

    /// Append one record at the tail.
    ///
    /// The whole file is rewritten through a rename, so a failed write leaves
    /// the previous content intact.
    pub fn append(&self, record: &InteractionRecord) -> Result<(), StorageError> {
        let mut records = self.read()?.records;
        records.push(record.clone());
        let json = to_pretty_json(&self.path, &records)?;
        write_atomic(&self.path, &json)?;
        debug!(
            path = %self.path.display(),
            count = records.len(),
            "Appended interaction"
        );
        Ok(())
    }

    /// All records in insertion order; empty when missing or corrupt.
    pub fn read_all(&self) -> Result<Vec<InteractionRecord>, StorageError> {
        Ok(self.read()?.records)
    }

    /// Read the log and report whether the content was present, missing or corrupt.
    ///
    /// Only I/O failures other than a missing file are errors.
    pub fn read(&self) -> Result<LogRead, StorageError> {
        let Some(raw) = read_optional(&self.path)? else {
            return Ok(LogRead {
                records: Vec::new(),
                state: ReadState::Missing,
            });
        };

        match serde_json::from_str::<Vec<InteractionRecord>>(&raw) {
            Ok(records) => Ok(LogRead {
                records,
                state: ReadState::Present,
            }),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Interaction log is corrupt, treating it as empty"
                );
                Ok(LogRead {
                    records: Vec::new(),
                    state: ReadState::Corrupt,
                })
            }
        }
    }

    /// The raw JSON text handed to the evaluator.
    pub fn transcript(&self) -> Result<String, StorageError> {
        let records = self.read_all()?;
        to_pretty_json(&self.path, &records)
    }
}
