//! Data output writers

use crate::resume::ResumeError;
use std::path::{Path, PathBuf};

pub mod csv;

pub use self::csv::{write_batch, ResumableCsvWriter};

/// Marker inserted before the extension of the data file to name its error file
pub const ERROR_FILE_MARKER: &str = "error";

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    Csv(String),

    /// A record lacks a header column
    #[error("row {row} is missing required column '{column}'")]
    MissingColumn {
        /// Missing column name
        column: String,
        /// Index of the row within its batch
        row: u64,
    },

    /// A record carries a field the frozen header does not have
    #[error("row {row} has column '{column}' which is not in the file header")]
    UnexpectedColumn {
        /// Extra column name
        column: String,
        /// Index of the row within its batch
        row: u64,
    },

    /// Existing file header differs from the writer's columns
    #[error("header mismatch: expected {expected:?}, found {found:?}")]
    HeaderMismatch {
        /// Columns the writer was opened with
        expected: Vec<String>,
        /// Columns found in the existing file
        found: Vec<String>,
    },

    /// Checkpoint persistence failed
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] ResumeError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Statistics about one `write_rows` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteStats {
    /// Rows written during this call
    pub items_written: u64,
    /// Bytes appended to the file during this call
    pub bytes_written: u64,
    /// Batch index the call started from
    pub start_position: u64,
}

/// Sibling error-file path for a data file
///
/// `data/videos.csv` becomes `data/videos.error.csv`; a path without an
/// extension gets `.error` appended.
pub fn error_output_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{stem}.{ERROR_FILE_MARKER}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{ERROR_FILE_MARKER}"),
    };
    path.with_file_name(file_name)
}

/// Whether `path` is an existing, non-empty file
pub fn file_has_content(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
