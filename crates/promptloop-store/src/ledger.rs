use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::fsutil::{read_optional, to_pretty_json, write_atomic};
use crate::StorageError;

/// An accepted prompt rewrite and the changes it made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub new_prompt: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub improvements: Vec<String>,
}

impl LedgerEntry {
    pub fn new(new_prompt: impl Into<String>, improvements: Vec<String>) -> Self {
        Self {
            new_prompt: new_prompt.into(),
            improvements,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Append-only history of accepted prompts.
///
/// Stored as a JSON array of `{"new_prompt", "improvements"}`. There is no
/// delete or compaction; the file only grows.
#[derive(Debug, Clone)]
pub struct PromptLedger {
    path: PathBuf,
}

impl PromptLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the ledger under a state directory using the default file name.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(crate::LEDGER_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry at the tail.
    ///
    /// Existing content that is not a JSON array is kept as the first element
    /// of a new array, so nothing already on disk is thrown away.
    pub fn append(&self, entry: &LedgerEntry) -> Result<(), StorageError> {
        let mut items = self.read_values()?;
        let value = serde_json::to_value(entry).map_err(|source| StorageError::Encode {
            path: self.path.clone(),
            source,
        })?;
        items.push(value);

        let json = to_pretty_json(&self.path, &items)?;
        write_atomic(&self.path, &json)?;
        debug!(
            path = %self.path.display(),
            entries = items.len(),
            "Appended ledger entry"
        );
        Ok(())
    }

    /// Typed view of the ledger, in insertion order.
    ///
    /// Elements that do not have the entry shape (for example content coerced
    /// in from a malformed file) are skipped here; [`read_raw`](Self::read_raw)
    /// returns them too.
    pub fn read_all(&self) -> Result<Vec<LedgerEntry>, StorageError> {
        let entries = self
            .read_values()?
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_value(value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        index,
                        error = %e,
                        "Skipping ledger element that is not a prompt entry"
                    );
                    None
                }
            })
            .collect();
        Ok(entries)
    }

    /// The most recently accepted entry, if any.
    pub fn latest(&self) -> Result<Option<LedgerEntry>, StorageError> {
        Ok(self.read_all()?.pop())
    }

    /// Every element of the ledger as stored, including coerced content.
    pub fn read_raw(&self) -> Result<Vec<Value>, StorageError> {
        self.read_values()
    }

    fn read_values(&self) -> Result<Vec<Value>, StorageError> {
        let Some(raw) = read_optional(&self.path)? else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => Ok(items),
            Ok(other) => {
                warn!(path = %self.path.display(), "Ledger is not a list, wrapping existing content");
                Ok(vec![other])
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ledger is not valid JSON, keeping it as a text element"
                );
                Ok(vec![Value::String(raw)])
            }
        }
    }
}
