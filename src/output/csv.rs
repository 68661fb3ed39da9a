//! Resumable CSV writer with per-row checkpointing
//!
//! Every row is written, flushed and synced before the checkpoint is advanced,
//! so a crash at any point leaves the file holding each row up to the
//! checkpoint exactly once, with no row truncated mid-write. Re-opening a
//! writer on the same output path resumes at the checkpointed batch index.

use crate::record::Record;
use crate::resume::{checkpoint_path_for, Checkpoint};
use csv::{Writer, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::{file_has_content, OutputError, OutputResult, WriteStats};

/// UTF-8 byte order mark written at the start of every new file
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Crash-resumable CSV writer for uniformly shaped records
///
/// Opening the writer is the scope entry; [`ResumableCsvWriter::finish`] is
/// the clean exit that deletes the checkpoint. Dropping the writer without
/// finishing persists the checkpoint so a later writer resumes correctly.
pub struct ResumableCsvWriter {
    output_path: PathBuf,
    checkpoint_path: PathBuf,
    columns: Vec<String>,
    writer: Writer<File>,
    position: u64,
    finished: bool,
}

impl ResumableCsvWriter {
    /// Open a writer using the default `<output>.checkpoint` location
    pub fn open<P: AsRef<Path>>(output_path: P, columns: &[String]) -> OutputResult<Self> {
        let output_path = output_path.as_ref();
        Self::open_with_checkpoint(output_path, columns, checkpoint_path_for(output_path))
    }

    /// Open a writer with an explicit checkpoint file
    ///
    /// Reads any existing checkpoint, then appends when there is something to
    /// resume or the file already has content; otherwise the file is created
    /// (truncated) and the BOM plus header row are written first.
    ///
    /// # Errors
    /// Returns [`OutputError::HeaderMismatch`] when appending to a file whose
    /// header differs from `columns`, and IO errors from opening the file.
    pub fn open_with_checkpoint<P: AsRef<Path>, C: Into<PathBuf>>(
        output_path: P,
        columns: &[String],
        checkpoint_path: C,
    ) -> OutputResult<Self> {
        let output_path = output_path.as_ref().to_path_buf();
        let checkpoint_path = checkpoint_path.into();

        let mut position = match Checkpoint::load(&checkpoint_path) {
            Ok(Some(checkpoint)) => checkpoint.position(),
            Ok(None) => 0,
            Err(e) => {
                warn!(
                    path = %checkpoint_path.display(),
                    error = %e,
                    "Could not load checkpoint, starting from position 0"
                );
                0
            }
        };

        let has_content = file_has_content(&output_path);
        if position > 0 && !has_content {
            warn!(
                path = %output_path.display(),
                position = position,
                "Checkpoint found but output file is empty or missing, starting from position 0"
            );
            position = 0;
        }

        let append = position > 0 || has_content;
        let file = if append {
            let found = read_header(&output_path)?;
            if found != columns {
                return Err(OutputError::HeaderMismatch {
                    expected: columns.to_vec(),
                    found,
                });
            }
            OpenOptions::new()
                .append(true)
                .open(&output_path)
                .map_err(|e| OutputError::Io(format!("Failed to open file for append: {e}")))?
        } else {
            if let Some(parent) = output_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        OutputError::Io(format!("Failed to create directory: {e}"))
                    })?;
                }
            }
            let mut file = File::create(&output_path)
                .map_err(|e| OutputError::Io(format!("Failed to create file: {e}")))?;
            file.write_all(UTF8_BOM)
                .map_err(|e| OutputError::Io(format!("Failed to write BOM: {e}")))?;
            file
        };

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if !append {
            writer
                .write_record(columns)
                .map_err(|e| OutputError::Csv(format!("Failed to write header: {e}")))?;
            writer
                .flush()
                .map_err(|e| OutputError::Io(format!("Failed to flush header: {e}")))?;
        }

        info!(
            path = %output_path.display(),
            columns = columns.len(),
            position = position,
            mode = if append { "append" } else { "write" },
            "Opened resumable CSV writer"
        );

        Ok(Self {
            output_path,
            checkpoint_path,
            columns: columns.to_vec(),
            writer,
            position,
            finished: false,
        })
    }

    /// Write `rows`, starting at the resume position or at `start_from`
    ///
    /// Each row is reordered to the header's column order, flushed and synced
    /// to disk, and then the checkpoint advances by one.
    ///
    /// # Errors
    /// A row missing a header column (or carrying a column not in the header)
    /// fails immediately; every row before it stays written and checkpointed.
    pub fn write_rows(&mut self, rows: &[Record], start_from: Option<u64>) -> OutputResult<WriteStats> {
        if let Some(start) = start_from {
            self.position = start;
        }

        let start_position = self.position;
        let initial_len = self.file_len()?;

        for (index, row) in rows.iter().enumerate().skip(start_position as usize) {
            if let Err(e) = self.write_row(row, index as u64) {
                error!(
                    path = %self.output_path.display(),
                    position = self.position,
                    error = %e,
                    "Error occurred while writing rows"
                );
                if let Err(save_err) = self.save_checkpoint() {
                    warn!(error = %save_err, "Could not save checkpoint after write failure");
                }
                return Err(e);
            }
            self.position = index as u64 + 1;
            self.save_checkpoint()?;
        }

        let bytes_written = self.file_len()?.saturating_sub(initial_len);
        let items_written = self.position.saturating_sub(start_position);

        debug!(
            path = %self.output_path.display(),
            items_written = items_written,
            bytes_written = bytes_written,
            start_position = start_position,
            "Rows written"
        );

        Ok(WriteStats {
            items_written,
            bytes_written,
            start_position,
        })
    }

    fn write_row(&mut self, row: &Record, index: u64) -> OutputResult<()> {
        if let Some(extra) = row.keys().find(|key| !self.columns.iter().any(|c| c == key)) {
            return Err(OutputError::UnexpectedColumn {
                column: extra.to_string(),
                row: index,
            });
        }

        let mut cells = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let value = row.get(column).ok_or_else(|| OutputError::MissingColumn {
                column: column.clone(),
                row: index,
            })?;
            cells.push(value.to_string());
        }

        self.writer
            .write_record(&cells)
            .map_err(|e| OutputError::Csv(format!("Failed to write row: {e}")))?;
        self.writer
            .flush()
            .map_err(|e| OutputError::Io(format!("Failed to flush: {e}")))?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| OutputError::Io(format!("Failed to sync file: {e}")))?;
        Ok(())
    }

    fn save_checkpoint(&self) -> OutputResult<()> {
        Checkpoint::new(self.position).save(&self.checkpoint_path)?;
        Ok(())
    }

    fn file_len(&mut self) -> OutputResult<u64> {
        self.writer
            .flush()
            .map_err(|e| OutputError::Io(format!("Failed to flush: {e}")))?;
        self.writer
            .get_ref()
            .metadata()
            .map(|m| m.len())
            .map_err(|e| OutputError::Io(format!("Failed to stat file: {e}")))
    }

    /// Clean scope exit: sync the file and delete the checkpoint
    pub fn finish(mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::Io(format!("Failed to flush: {e}")))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| OutputError::Io(format!("Failed to sync file: {e}")))?;
        Checkpoint::remove(&self.checkpoint_path)?;
        self.finished = true;

        debug!(
            path = %self.output_path.display(),
            position = self.position,
            "Resumable CSV writer finished"
        );
        Ok(())
    }

    /// Failed scope exit: persist the checkpoint for a later resume
    pub fn abort(mut self) -> OutputResult<()> {
        self.finished = true;
        self.save_checkpoint()
    }

    /// Current batch position (rows of the batch already written)
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Header columns, in file order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Output file path
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Checkpoint file path
    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }
}

impl Drop for ResumableCsvWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.save_checkpoint() {
            warn!(
                path = %self.checkpoint_path.display(),
                error = %e,
                "Could not persist checkpoint on drop"
            );
        }
    }
}

/// Open, write and finish in one call
///
/// On failure the checkpoint is left in place so that writing the same batch
/// to the same path again resumes where this call stopped.
pub fn write_batch<P: AsRef<Path>>(
    output_path: P,
    columns: &[String],
    rows: &[Record],
) -> OutputResult<WriteStats> {
    let mut writer = ResumableCsvWriter::open(output_path, columns)?;
    let stats = writer.write_rows(rows, None)?;
    writer.finish()?;
    Ok(stats)
}

/// Read the header row of an existing CSV file, ignoring a leading BOM
pub fn read_header(path: &Path) -> OutputResult<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| OutputError::Io(format!("Failed to open file: {e}")))?;

    let mut record = csv::StringRecord::new();
    let found = reader
        .read_record(&mut record)
        .map_err(|e| OutputError::Csv(format!("Failed to read header: {e}")))?;
    if !found {
        return Ok(Vec::new());
    }

    Ok(record
        .iter()
        .enumerate()
        .map(|(i, field)| {
            if i == 0 {
                field.trim_start_matches('\u{feff}').to_string()
            } else {
                field.to_string()
            }
        })
        .collect())
}
