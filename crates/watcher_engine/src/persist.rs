use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("settings directory {path:?} is unusable: {message}")]
    Dir { path: PathBuf, message: String },
    #[error("{path:?} has no parent directory")]
    NoParent { path: PathBuf },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Create `dir` if missing and check it is a writable directory.
pub fn ensure_dir(dir: &Path) -> Result<(), PersistError> {
    let unusable = |message: String| PersistError::Dir {
        path: dir.to_path_buf(),
        message,
    };
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| unusable(e.to_string()))?;
        if !meta.is_dir() {
            return Err(unusable("not a directory".to_string()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| unusable(e.to_string()))?;
    }
    NamedTempFile::new_in(dir).map_err(|e| unusable(e.to_string()))?;
    Ok(())
}

/// Replace `target` with `content` via a sibling temp file and rename, so
/// concurrent readers see either the old or the new file, never a torn one.
pub fn write_atomic(target: &Path, content: &str) -> Result<(), PersistError> {
    let dir = target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .ok_or_else(|| PersistError::NoParent {
            path: target.to_path_buf(),
        })?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(target).map_err(|e| PersistError::Io(e.error))?;
    Ok(())
}
