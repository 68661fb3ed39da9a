//! Job status tracking for a collection run

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{Aggregate, CollectResult, ProgressReporter};

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job has not started yet
    #[default]
    Pending,
    /// Job is currently running
    Running,
    /// Job completed; results are available
    Completed,
    /// Job failed with error
    Failed,
}

/// Job progress tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobProgress {
    /// Items handed to the collector so far
    pub completed: u64,
    /// Items in the job
    pub total: u64,
    /// Identifier most recently reported
    pub current: String,
}

impl JobProgress {
    /// Progress percentage (0.0 to 100.0)
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }
}

/// Point-in-time view of a job
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    /// Job id
    pub job_id: String,
    /// Current status
    pub status: JobStatus,
    /// Current progress
    pub progress: JobProgress,
    /// Final aggregate, once completed
    pub results: Option<Aggregate>,
    /// Failure message, once failed
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct JobState {
    status: JobStatus,
    progress: JobProgress,
    results: Option<Aggregate>,
    error: Option<String>,
}

/// Tracks one job's lifecycle and receives its progress callbacks
#[derive(Debug)]
pub struct JobTracker {
    job_id: String,
    state: RwLock<JobState>,
}

impl JobTracker {
    /// Create a pending job for `total` items, id derived from the current time
    pub fn new(total: usize) -> Self {
        Self::with_id(Self::generate_id(Utc::now()), total)
    }

    /// Create a pending job with an explicit id
    pub fn with_id(job_id: impl Into<String>, total: usize) -> Self {
        Self {
            job_id: job_id.into(),
            state: RwLock::new(JobState {
                progress: JobProgress {
                    total: total as u64,
                    ..JobProgress::default()
                },
                ..JobState::default()
            }),
        }
    }

    /// Job id format: `YYYYmmdd_HHMMSS`
    pub fn generate_id(at: DateTime<Utc>) -> String {
        at.format("%Y%m%d_%H%M%S").to_string()
    }

    /// Job id
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Mark the job as running
    pub async fn start(&self) {
        self.state.write().await.status = JobStatus::Running;
    }

    /// Mark the job as completed and store its results
    pub async fn complete(&self, results: Aggregate) {
        let mut state = self.state.write().await;
        state.status = JobStatus::Completed;
        state.results = Some(results);
    }

    /// Mark the job as failed
    pub async fn fail(&self, error: impl ToString) {
        let mut state = self.state.write().await;
        state.status = JobStatus::Failed;
        state.error = Some(error.to_string());
    }

    /// Current status
    pub async fn status(&self) -> JobStatus {
        self.state.read().await.status
    }

    /// Current progress
    pub async fn progress(&self) -> JobProgress {
        self.state.read().await.progress.clone()
    }

    /// Results, available only once completed
    pub async fn results(&self) -> Option<Aggregate> {
        let state = self.state.read().await;
        match state.status {
            JobStatus::Completed => state.results.clone(),
            _ => None,
        }
    }

    /// Full state for a status surface
    pub async fn snapshot(&self) -> JobSnapshot {
        let state = self.state.read().await;
        JobSnapshot {
            job_id: self.job_id.clone(),
            status: state.status,
            progress: state.progress.clone(),
            results: state.results.clone(),
            error: state.error.clone(),
        }
    }
}

#[async_trait]
impl ProgressReporter for JobTracker {
    async fn report(&self, _index: usize, identifier: &str) -> CollectResult<()> {
        let mut state = self.state.write().await;
        state.progress.completed += 1;
        state.progress.current = identifier.to_string();
        Ok(())
    }
}
