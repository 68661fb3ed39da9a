//! Per-item collection and outcome routing
//!
//! A [`Collector`] turns one identifier into a flat [`Record`]. The
//! [`Orchestrator`] runs a collector over a list of identifiers under the
//! [`ConcurrencyLimiter`](crate::limiter::ConcurrencyLimiter) and routes
//! every result into a shared [`DataPipeline`](crate::pipeline::DataPipeline):
//! successes to the data queue, failures to the error queue.
//!
//! Per-item failures never abort a run. They become [`Outcome::Failure`]
//! values carrying a descriptive record, and [`bucket`] splits a set of
//! outcomes into the final [`Aggregate`] without inspecting record shapes.

pub mod data_api;
pub mod job;
pub mod orchestrator;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::record::{FieldValue, Record};
pub use data_api::DataApiCollector;
pub use job::{JobProgress, JobSnapshot, JobStatus, JobTracker};
pub use orchestrator::Orchestrator;

/// Why a single item could not be collected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectErrorKind {
    /// The per-item timeout elapsed
    Timeout,
    /// The upstream has no such item
    NotFound,
    /// The upstream answered with an error status
    Upstream {
        /// HTTP status code
        status: u16,
    },
    /// Transport failure
    Network,
    /// The upstream payload could not be interpreted
    Parse,
    /// The progress callback failed
    Progress,
}

impl CollectErrorKind {
    /// Short label written to the error file
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::Upstream { .. } => "upstream",
            Self::Network => "network",
            Self::Parse => "parse",
            Self::Progress => "progress",
        }
    }

    /// HTTP status, for upstream failures
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for CollectErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream { status } => write!(f, "upstream ({status})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Failure of one collection operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to collect '{identifier}' ({kind}): {message}")]
pub struct CollectError {
    /// Item the failure belongs to
    pub identifier: String,
    /// Failure category
    pub kind: CollectErrorKind,
    /// Human-readable detail
    pub message: String,
}

/// Result type for collection operations
pub type CollectResult<T> = Result<T, CollectError>;

impl CollectError {
    /// Create an error for `identifier`
    pub fn new(
        identifier: impl Into<String>,
        kind: CollectErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            message: message.into(),
        }
    }

    /// Timeout after `after`
    pub fn timeout(identifier: impl Into<String>, after: Duration) -> Self {
        Self::new(
            identifier,
            CollectErrorKind::Timeout,
            format!("timed out after {} ms", after.as_millis()),
        )
    }

    /// Item missing upstream
    pub fn not_found(identifier: impl Into<String>) -> Self {
        Self::new(identifier, CollectErrorKind::NotFound, "item not found")
    }

    /// Same failure, attributed to another identifier
    pub fn for_identifier(&self, identifier: impl Into<String>) -> Self {
        Self::new(identifier, self.kind.clone(), self.message.clone())
    }

    /// Descriptive fields for the error file
    ///
    /// Every error record has the same keys (`id`, `error_kind`, `status`,
    /// `message`) so the error file header stays stable across batches.
    pub fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.identifier.as_str())
            .with("error_kind", self.kind.label())
            .with("status", self.kind.status().map(u32::from))
            .with("message", self.message.as_str())
    }
}

/// One identifier in, one flat record out
#[async_trait]
pub trait Collector: Send + Sync {
    /// Collect a single item
    async fn collect(&self, identifier: &str) -> CollectResult<Record>;

    /// Called once per chunk before its items are collected
    ///
    /// Batch APIs use this to fetch the whole chunk in one request. A failure
    /// here is reported against every identifier of the chunk.
    async fn prepare(&self, _chunk: &[String]) -> CollectResult<()> {
        Ok(())
    }
}

/// Receives `(index, identifier)` before each item is collected
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Report that the item at `index` is about to be collected
    async fn report(&self, index: usize, identifier: &str) -> CollectResult<()>;
}

/// Tagged result of one item
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Collected record
    Success(Record),
    /// Failure descriptor
    Failure(Record),
}

impl Outcome {
    /// Non-negative for successes, negative for failures
    pub fn status_code(&self) -> i32 {
        match self {
            Self::Success(_) => 0,
            Self::Failure(_) => -1,
        }
    }

    /// Whether the item was collected
    pub fn is_success(&self) -> bool {
        self.status_code() >= 0
    }

    /// The carried record
    pub fn record(&self) -> &Record {
        match self {
            Self::Success(record) | Self::Failure(record) => record,
        }
    }

    /// Take the carried record
    pub fn into_record(self) -> Record {
        match self {
            Self::Success(record) | Self::Failure(record) => record,
        }
    }
}

/// Successes and failures of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregate {
    /// Collected records
    pub videos: Vec<Record>,
    /// Failure records
    pub errors: Vec<Record>,
}

impl Aggregate {
    /// Total outcomes
    pub fn len(&self) -> usize {
        self.videos.len() + self.errors.len()
    }

    /// Whether no outcome was recorded
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty() && self.errors.is_empty()
    }

    /// Identifiers of failed items, read from the `id` field
    pub fn failed_ids(&self) -> Vec<&str> {
        self.errors
            .iter()
            .filter_map(|r| r.get("id").and_then(FieldValue::as_str))
            .collect()
    }

    fn push(&mut self, outcome: Outcome) {
        if outcome.is_success() {
            self.videos.push(outcome.into_record());
        } else {
            self.errors.push(outcome.into_record());
        }
    }
}

/// Split outcomes by status code
pub fn bucket<I>(outcomes: I) -> Aggregate
where
    I: IntoIterator<Item = Outcome>,
{
    let mut aggregate = Aggregate::default();
    for outcome in outcomes {
        aggregate.push(outcome);
    }
    aggregate
}
