use std::io;
use std::path::{Path, PathBuf};

use crate::StorageError;

/// Raw file contents, `None` when the file does not exist.
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>, StorageError> {
    match std::fs::read(path) {
        // Invalid UTF-8 is surfaced as text the JSON parser will reject
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StorageError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Atomic write: write a sibling temp file, then rename it over the target.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<(), StorageError> {
    let wrap = |source: io::Error| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(wrap)?;
    }

    let tmp_path = temp_path(path);
    std::fs::write(&tmp_path, contents).map_err(wrap)?;
    if let Err(source) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(wrap(source));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

pub(crate) fn to_pretty_json<T: serde::Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<String, StorageError> {
    serde_json::to_string_pretty(value).map_err(|source| StorageError::Encode {
        path: path.to_path_buf(),
        source,
    })
}
