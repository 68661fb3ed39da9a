//! Pipeline counters and end-of-run summary

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Which of the two pipeline queues a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Successfully collected items
    Data,
    /// Failure descriptors
    Errors,
}

impl QueueKind {
    /// Label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Errors => "errors",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Counters for one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Records enqueued
    pub queued: u64,
    /// Records persisted
    pub saved: u64,
    /// Bytes appended to the output file
    pub bytes: u64,
    /// Successful flush operations
    pub flushes: u64,
}

impl QueueStats {
    /// Records still waiting to be persisted
    pub fn pending(&self) -> u64 {
        self.queued.saturating_sub(self.saved)
    }
}

/// Counters for both queues plus run timestamps
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    /// Success queue counters
    pub data: QueueStats,
    /// Error queue counters
    pub errors: QueueStats,
    /// When the pipeline scope was entered
    pub started_at: Option<DateTime<Utc>>,
    /// When the pipeline scope was exited
    pub ended_at: Option<DateTime<Utc>>,
}

impl PipelineStats {
    /// Counters for `kind`
    pub fn queue(&self, kind: QueueKind) -> &QueueStats {
        match kind {
            QueueKind::Data => &self.data,
            QueueKind::Errors => &self.errors,
        }
    }

    pub(crate) fn queue_mut(&mut self, kind: QueueKind) -> &mut QueueStats {
        match kind {
            QueueKind::Data => &mut self.data,
            QueueKind::Errors => &mut self.errors,
        }
    }
}

/// Final report produced when a pipeline closes
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    /// Pipeline name
    pub name: String,
    /// Final counters
    pub stats: PipelineStats,
    /// Wall-clock time between scope entry and exit
    pub elapsed: Duration,
    /// Whether disk writes were disabled
    pub dry_run: bool,
}

impl PipelineSummary {
    /// Human-readable summary for logging
    pub fn format_summary(&self) -> String {
        let elapsed = self.elapsed.as_secs_f64();
        format!(
            "<DataPipeline> \"{}\" processed jobs{}: items saved/queued {}/{} ({} B) in {:.6} seconds, errors saved/queued {}/{} ({} B) in {:.6} seconds",
            self.name,
            if self.dry_run { " (dry run)" } else { "" },
            self.stats.data.saved,
            self.stats.data.queued,
            self.stats.data.bytes,
            elapsed,
            self.stats.errors.saved,
            self.stats.errors.queued,
            self.stats.errors.bytes,
            elapsed,
        )
    }
}
