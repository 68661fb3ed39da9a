//! Checkpoint file persistence
//!
//! On-disk format is a single JSON object: `{"position": <integer>}`.
//! Saves go through a temp file in the same directory and an atomic rename,
//! so a reader never observes a half-written checkpoint.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Maximum accepted checkpoint file size; anything larger is not ours
pub const MAX_CHECKPOINT_FILE_SIZE: u64 = 64 * 1024;

/// Suffix appended to an output path to derive its checkpoint path
pub const CHECKPOINT_SUFFIX: &str = "checkpoint";

/// Row position checkpoint for one output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    position: u64,
}

impl Checkpoint {
    /// Create a checkpoint at `position`
    pub fn new(position: u64) -> Self {
        Self { position }
    }

    /// Number of rows of the current batch already written
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Load a checkpoint file
    ///
    /// Returns `Ok(None)` when no checkpoint exists.
    ///
    /// # Errors
    /// Returns [`ResumeError::Deserialization`] for malformed content and
    /// [`ResumeError::StateTooLarge`] for oversized files. Callers treat both
    /// as "no checkpoint".
    pub fn load(path: &Path) -> ResumeResult<Option<Self>> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(path = %path.display(), "No checkpoint file");
                return Ok(None);
            }
            Err(e) => return Err(ResumeError::Io(e.to_string())),
        };

        if metadata.len() > MAX_CHECKPOINT_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size: metadata.len(),
                max: MAX_CHECKPOINT_FILE_SIZE,
            });
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ResumeError::Io(e.to_string()))?;
        let checkpoint: Checkpoint = serde_json::from_str(&contents)
            .map_err(|e| ResumeError::Deserialization(e.to_string()))?;

        debug!(
            path = %path.display(),
            position = checkpoint.position,
            "Loaded checkpoint"
        );
        Ok(Some(checkpoint))
    }

    /// Persist the checkpoint atomically
    pub fn save(&self, path: &Path) -> ResumeResult<()> {
        let json = serde_json::to_string(self)
            .map_err(|e| ResumeError::Serialization(e.to_string()))?;

        let parent_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent_dir).map_err(|e| ResumeError::Io(e.to_string()))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::Io(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| ResumeError::Io(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| ResumeError::Io(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_data()
            .map_err(|e| ResumeError::Io(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(path)
            .map_err(|e| ResumeError::Io(format!("Failed to persist temp file: {e}")))?;

        trace!(path = %path.display(), position = self.position, "Checkpoint saved");
        Ok(())
    }

    /// Delete a checkpoint file; a missing file is not an error
    pub fn remove(path: &Path) -> ResumeResult<()> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed checkpoint");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ResumeError::Io(e.to_string())),
        }
    }
}

/// Default checkpoint location for an output file: `<output>.checkpoint`
pub fn checkpoint_path_for(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".");
    name.push(CHECKPOINT_SUFFIX);
    PathBuf::from(name)
}

/// Errors related to checkpoint state
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Checkpoint file too large
    #[error("checkpoint file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Malformed checkpoint content
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Result type for checkpoint operations
pub type ResumeResult<T> = Result<T, ResumeError>;
