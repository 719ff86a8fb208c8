use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::fsutil::{read_optional, to_pretty_json, write_atomic};
use crate::StorageError;

/// A single JSON snapshot file, rewritten atomically on every save.
///
/// Unlike the interaction log, an unreadable checkpoint is an error: resuming
/// from a silently empty snapshot would restart training from scratch.
#[derive(Debug, Clone)]
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the checkpoint under a state directory using the default file name.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(crate::CHECKPOINT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save<T: Serialize>(&self, value: &T) -> Result<(), StorageError> {
        let json = to_pretty_json(&self.path, value)?;
        write_atomic(&self.path, &json)
    }

    /// Load the snapshot. Returns `Ok(None)` if it was never written.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<T>, StorageError> {
        let Some(raw) = read_optional(&self.path)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Checkpoint {
                path: self.path.clone(),
                source,
            })
    }

    /// Remove the snapshot once a run has finished.
    pub fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
