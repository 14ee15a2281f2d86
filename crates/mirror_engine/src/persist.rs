use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    // The directory must accept a temp file.
    NamedTempFile::new_in(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    Ok(())
}

/// A download in progress: bytes go to a hidden temp file next to the
/// target, which only replaces the target on [`StagedFile::commit`].
/// Dropping an uncommitted `StagedFile` removes the temp file.
pub struct StagedFile {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    pub fn create(target: &Path) -> Result<Self, PersistError> {
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;
        let tmp = tempfile::Builder::new()
            .prefix(".rwget-")
            .suffix(".part")
            .tempfile_in(&parent)?;
        Ok(Self {
            tmp,
            target: target.to_path_buf(),
        })
    }

    /// Independent async handle onto the temp file for streaming writes.
    pub fn async_file(&self) -> Result<tokio::fs::File, PersistError> {
        let handle = self.tmp.as_file().try_clone()?;
        Ok(tokio::fs::File::from_std(handle))
    }

    pub fn commit(self) -> Result<PathBuf, PersistError> {
        self.tmp.as_file().sync_all()?;
        // `persist` renames over an existing target in one step.
        self.tmp
            .persist(&self.target)
            .map_err(|e| PersistError::Io(e.error))?;
        Ok(self.target)
    }
}
