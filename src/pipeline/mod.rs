//! Dual-queue data pipeline
//!
//! A [`DataPipeline`] buffers records in two in-memory queues (data and
//! errors) and flushes each to its own CSV file through the resumable writer
//! once the queue reaches the configured batch size. The error file sits next
//! to the data file (see [`crate::output::error_output_path`]).
//!
//! # Lifecycle
//!
//! 1. [`DataPipeline::open`] enters the scope: stale output files and their
//!    checkpoints for this path are deleted and the start time is recorded.
//! 2. [`DataPipeline::enqueue`] appends to a queue; disk I/O only happens
//!    when a queue crosses the batch size.
//! 3. [`DataPipeline::close`] flushes whatever is left in both queues and
//!    logs the summary. Dropping an unclosed pipeline performs the same
//!    flush best-effort, so buffered records are not silently lost on early
//!    returns or panics.
//!
//! In dry-run mode every counter is maintained but nothing touches the disk.

pub mod stats;

use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_BATCH_SIZE;
use crate::metrics;
use crate::output::{error_output_path, write_batch, OutputError, WriteStats};
use crate::record::{collect_columns, Record, RecordError};
use crate::resume::{checkpoint_path_for, Checkpoint};
pub use stats::{PipelineStats, PipelineSummary, QueueKind, QueueStats};

/// Pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Caller passed something that is not a flat mapping
    #[error("invalid item: {0}")]
    InvalidItem(#[from] RecordError),

    /// Persisting a batch failed
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Invalid pipeline configuration
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// Pipeline already closed
    #[error("pipeline is closed")]
    Closed,
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline construction parameters
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Data file path; `None` forces dry-run mode
    pub output_path: Option<PathBuf>,
    /// Queue length that triggers a flush
    pub batch_size: usize,
    /// Fixed data-file columns; otherwise frozen from the first flushed batch
    pub columns: Option<Vec<String>>,
    /// Skip all disk I/O
    pub dry_run: bool,
    /// Name used in the summary log
    pub name: Option<String>,
}

impl PipelineConfig {
    /// Pipeline writing to `output_path` with the default batch size
    pub fn new<P: Into<PathBuf>>(output_path: P) -> Self {
        Self {
            output_path: Some(output_path.into()),
            batch_size: DEFAULT_BATCH_SIZE,
            columns: None,
            dry_run: false,
            name: None,
        }
    }

    /// Pipeline that never writes to disk
    pub fn dry_run() -> Self {
        Self {
            output_path: None,
            batch_size: DEFAULT_BATCH_SIZE,
            columns: None,
            dry_run: true,
            name: None,
        }
    }

    /// Set the flush threshold
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Fix the data-file column list
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Enable or disable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Name the pipeline for logging
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

struct Queue {
    kind: QueueKind,
    records: Vec<Record>,
    path: Option<PathBuf>,
    columns: Option<Vec<String>>,
}

impl Queue {
    fn new(kind: QueueKind, path: Option<PathBuf>, columns: Option<Vec<String>>) -> Self {
        Self {
            kind,
            records: Vec::new(),
            path,
            columns,
        }
    }
}

/// Buffered two-stream record sink
pub struct DataPipeline {
    name: String,
    batch_size: usize,
    dry_run: bool,
    data: Queue,
    errors: Queue,
    stats: PipelineStats,
    started: Instant,
    closed: bool,
}

impl DataPipeline {
    /// Enter the pipeline scope
    ///
    /// Outside dry-run mode, deletes any existing data/error files for this
    /// path (and their checkpoints) so old and new data never mix.
    pub fn open(config: PipelineConfig) -> PipelineResult<Self> {
        if config.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }

        let dry_run = config.dry_run || config.output_path.is_none();
        let data_path = config.output_path;
        let error_path = data_path.as_deref().map(error_output_path);

        if !dry_run {
            for path in data_path.iter().chain(error_path.iter()) {
                remove_stale_output(path)?;
            }
        }

        let name = config.name.unwrap_or_else(|| "Unnamed".to_string());
        let stats = PipelineStats {
            started_at: Some(Utc::now()),
            ..PipelineStats::default()
        };

        info!(
            pipeline = %name,
            path = ?data_path,
            batch_size = config.batch_size,
            dry_run = dry_run,
            "Data pipeline opened"
        );

        Ok(Self {
            name,
            batch_size: config.batch_size,
            dry_run,
            data: Queue::new(QueueKind::Data, data_path, config.columns),
            errors: Queue::new(QueueKind::Errors, error_path, None),
            stats,
            started: Instant::now(),
            closed: false,
        })
    }

    /// Enqueue a record
    pub fn enqueue(&mut self, item: Record, kind: QueueKind) -> PipelineResult<Record> {
        self.enqueue_with(item, kind, Record::new())
    }

    /// Enqueue a record with extra fields merged in (extra fields win)
    ///
    /// Flushes the target queue once it reaches the batch size, unless in
    /// dry-run mode. Returns the merged record.
    ///
    /// # Errors
    /// [`PipelineError::Closed`] and validation errors reject the record.
    /// A [`PipelineError::Output`] error comes from the threshold flush: the
    /// record has already been accepted and stays queued with the rest of
    /// the batch, so it must not be enqueued again. Retry with
    /// [`flush`](Self::flush) or let [`close`](Self::close) write it.
    pub fn enqueue_with(
        &mut self,
        item: Record,
        kind: QueueKind,
        extra: Record,
    ) -> PipelineResult<Record> {
        if self.closed {
            return Err(PipelineError::Closed);
        }

        let mut record = item;
        record.merge(extra);

        self.queue_mut(kind).records.push(record.clone());
        self.stats.queue_mut(kind).queued += 1;
        metrics::record_queued(kind.label());

        if !self.dry_run && self.queue(kind).records.len() >= self.batch_size {
            self.flush(kind)?;
        }

        Ok(record)
    }

    /// Validate an untyped item and enqueue it
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidItem`] when `item` is not a flat
    /// JSON object.
    pub fn enqueue_json(
        &mut self,
        item: &Value,
        kind: QueueKind,
        extra: Record,
    ) -> PipelineResult<Record> {
        let record = Record::from_json(item).map_err(|e| {
            error!(pipeline = %self.name, error = %e, "Couldn't queue item");
            PipelineError::InvalidItem(e)
        })?;
        self.enqueue_with(record, kind, extra)
    }

    /// Persist and clear one queue
    ///
    /// On failure the queue is left intact and the writer's checkpoint stays
    /// on disk, so the next flush of the same queue resumes at the failed row.
    pub fn flush(&mut self, kind: QueueKind) -> PipelineResult<WriteStats> {
        if self.dry_run {
            return Ok(WriteStats::default());
        }

        let name = self.name.clone();
        let queue = self.queue_mut(kind);
        if queue.records.is_empty() {
            return Ok(WriteStats::default());
        }
        let Some(path) = queue.path.clone() else {
            return Ok(WriteStats::default());
        };

        let records = &queue.records;
        let columns = queue
            .columns
            .get_or_insert_with(|| collect_columns(records))
            .clone();

        match write_batch(&path, &columns, &queue.records) {
            Ok(written) => {
                let flushed = queue.records.len();
                queue.records.clear();

                let counts = self.stats.queue_mut(kind);
                counts.saved += written.items_written;
                counts.bytes += written.bytes_written;
                counts.flushes += 1;
                metrics::record_flush(kind.label(), written.items_written, written.bytes_written);

                debug!(
                    pipeline = %name,
                    queue = %kind,
                    flushed = flushed,
                    items_written = written.items_written,
                    bytes_written = written.bytes_written,
                    "Queue flushed"
                );
                Ok(written)
            }
            Err(e) => {
                error!(
                    pipeline = %name,
                    queue = %kind,
                    path = %path.display(),
                    error = %e,
                    "Writing failed"
                );
                Err(e.into())
            }
        }
    }

    /// Exit the pipeline scope
    ///
    /// Flushes both queues regardless of size, records the end time and logs
    /// the summary. Both queues are attempted even if the first flush fails;
    /// the first failure is returned.
    pub fn close(mut self) -> PipelineResult<PipelineSummary> {
        self.closed = true;
        let result = self.flush_all();
        let summary = self.finish();
        result.map(|()| summary)
    }

    fn flush_all(&mut self) -> PipelineResult<()> {
        let data = self.flush(QueueKind::Data);
        let errors = self.flush(QueueKind::Errors);
        data?;
        errors?;
        Ok(())
    }

    fn finish(&mut self) -> PipelineSummary {
        self.stats.ended_at = Some(Utc::now());
        let summary = PipelineSummary {
            name: self.name.clone(),
            stats: self.stats.clone(),
            elapsed: self.started.elapsed(),
            dry_run: self.dry_run,
        };

        info!(
            pipeline = %summary.name,
            queued = summary.stats.data.queued,
            saved = summary.stats.data.saved,
            bytes = summary.stats.data.bytes,
            err_queued = summary.stats.errors.queued,
            err_saved = summary.stats.errors.saved,
            err_bytes = summary.stats.errors.bytes,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "{}",
            summary.format_summary()
        );
        summary
    }

    fn queue(&self, kind: QueueKind) -> &Queue {
        match kind {
            QueueKind::Data => &self.data,
            QueueKind::Errors => &self.errors,
        }
    }

    fn queue_mut(&mut self, kind: QueueKind) -> &mut Queue {
        match kind {
            QueueKind::Data => &mut self.data,
            QueueKind::Errors => &mut self.errors,
        }
    }

    /// Current counters
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Records currently buffered in `kind`
    pub fn queued(&self, kind: QueueKind) -> usize {
        self.queue(kind).records.len()
    }

    /// Columns in use for `kind`, once fixed or frozen
    pub fn columns(&self, kind: QueueKind) -> Option<&[String]> {
        self.queue(kind).columns.as_deref()
    }

    /// Whether disk writes are disabled
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Flush threshold
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Data file path
    pub fn data_path(&self) -> Option<&Path> {
        self.data.path.as_deref()
    }

    /// Error file path
    pub fn error_path(&self) -> Option<&Path> {
        self.errors.path.as_deref()
    }

    /// Pipeline name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for DataPipeline {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if !self.dry_run && (self.queued(QueueKind::Data) > 0 || self.queued(QueueKind::Errors) > 0) {
            warn!(
                pipeline = %self.name,
                data_pending = self.queued(QueueKind::Data),
                errors_pending = self.queued(QueueKind::Errors),
                "Pipeline dropped without close, flushing remaining records"
            );
        }
        if let Err(e) = self.flush_all() {
            error!(pipeline = %self.name, error = %e, "Failed to flush pipeline on drop");
        }
        self.finish();
    }
}

fn remove_stale_output(path: &Path) -> PipelineResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => warn!(path = %path.display(), "Deleted existing data"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(PipelineError::Output(OutputError::Io(format!(
                "Failed to delete {}: {e}",
                path.display()
            ))))
        }
    }
    Checkpoint::remove(&checkpoint_path_for(path)).map_err(OutputError::from)?;
    Ok(())
}
