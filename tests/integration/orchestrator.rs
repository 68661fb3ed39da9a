//! Integration tests for orchestrated collection into the pipeline

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use video_stats_collector::collector::{
    CollectError, CollectErrorKind, CollectResult, Collector, JobStatus, JobTracker, Orchestrator,
    ProgressReporter,
};
use video_stats_collector::output::error_output_path;
use video_stats_collector::pipeline::{DataPipeline, PipelineConfig};
use video_stats_collector::{ConcurrencyLimiter, Record};

/// Returns `{"id": id, "v": 1}`, fails for ids in `failing`, hangs for ids in `hanging`
struct FakeCollector {
    failing: HashSet<String>,
    hanging: HashSet<String>,
}

impl FakeCollector {
    fn new(failing: &[&str], hanging: &[&str]) -> Self {
        Self {
            failing: failing.iter().map(|s| s.to_string()).collect(),
            hanging: hanging.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Collector for FakeCollector {
    async fn collect(&self, identifier: &str) -> CollectResult<Record> {
        if self.hanging.contains(identifier) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.contains(identifier) {
            return Err(CollectError::new(
                identifier,
                CollectErrorKind::Upstream { status: 404 },
                "video unavailable",
            ));
        }
        Ok(Record::new().with("id", identifier).with("v", 1i64))
    }
}

struct FailingPrepare;

#[async_trait]
impl Collector for FailingPrepare {
    async fn prepare(&self, chunk: &[String]) -> CollectResult<()> {
        Err(CollectError::new(
            chunk[0].as_str(),
            CollectErrorKind::Upstream { status: 403 },
            "quota exceeded",
        ))
    }

    async fn collect(&self, identifier: &str) -> CollectResult<Record> {
        Ok(Record::new().with("id", identifier))
    }
}

/// Batch step that never answers
struct HangingPrepare;

#[async_trait]
impl Collector for HangingPrepare {
    async fn prepare(&self, _chunk: &[String]) -> CollectResult<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }

    async fn collect(&self, identifier: &str) -> CollectResult<Record> {
        Ok(Record::new().with("id", identifier))
    }
}

struct BrokenProgress;

#[async_trait]
impl ProgressReporter for BrokenProgress {
    async fn report(&self, _index: usize, identifier: &str) -> CollectResult<()> {
        if identifier == "B" {
            return Err(CollectError::new(identifier, CollectErrorKind::Progress, "ui gone"));
        }
        Ok(())
    }
}

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn orchestrator<C: Collector>(collector: C, chunk_size: usize) -> Orchestrator<C> {
    Orchestrator::new(
        Arc::new(collector),
        ConcurrencyLimiter::new(3, Some(100.0)).unwrap(),
        chunk_size,
        Duration::from_secs(2),
    )
}

fn id_of(record: &Record) -> &str {
    record.get("id").and_then(|v| v.as_str()).unwrap()
}

#[tokio::test]
async fn test_example_scenario_aggregate() {
    let orchestrator = orchestrator(FakeCollector::new(&["B"], &[]), 50);
    let pipeline = Mutex::new(DataPipeline::open(PipelineConfig::dry_run()).unwrap());

    let aggregate = orchestrator
        .run(&ids(&["A", "B", "C"]), &pipeline, None)
        .await
        .unwrap();

    let mut videos: Vec<&str> = aggregate.videos.iter().map(id_of).collect();
    videos.sort();
    assert_eq!(videos, vec!["A", "C"]);
    for video in &aggregate.videos {
        assert_eq!(video.get("v").and_then(|v| v.as_i64()), Some(1));
    }

    assert_eq!(aggregate.errors.len(), 1);
    let error = &aggregate.errors[0];
    assert_eq!(id_of(error), "B");
    assert_eq!(error.get("error_kind").and_then(|v| v.as_str()), Some("upstream"));
    assert_eq!(error.get("status").and_then(|v| v.as_i64()), Some(404));

    let json = serde_json::to_value(&aggregate).unwrap();
    assert!(json.get("videos").is_some());
    assert!(json.get("errors").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_isolated_to_its_item() {
    let orchestrator = orchestrator(FakeCollector::new(&[], &["slow"]), 50);
    let pipeline = Mutex::new(DataPipeline::open(PipelineConfig::dry_run()).unwrap());

    let aggregate = orchestrator
        .run(&ids(&["a", "slow", "b", "c"]), &pipeline, None)
        .await
        .unwrap();

    assert_eq!(aggregate.videos.len(), 3);
    assert_eq!(aggregate.failed_ids(), vec!["slow"]);
    assert_eq!(
        aggregate.errors[0].get("error_kind").and_then(|v| v.as_str()),
        Some("timeout")
    );
}

#[tokio::test]
async fn test_collect_to_files_writes_both_streams() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("videos.csv");
    let orchestrator = orchestrator(FakeCollector::new(&["v3", "v7"], &[]), 4);
    let all: Vec<String> = (0..10).map(|i| format!("v{i}")).collect();

    let config = PipelineConfig::new(&output_path)
        .with_batch_size(3)
        .with_name("fake run");
    let (aggregate, summary) = orchestrator
        .collect_to_files(&all, config, None)
        .await
        .unwrap();

    assert_eq!(aggregate.videos.len(), 8);
    assert_eq!(aggregate.errors.len(), 2);
    assert_eq!(summary.stats.data.saved, 8);
    assert_eq!(summary.stats.errors.saved, 2);

    let mut reader = csv::Reader::from_path(&output_path).unwrap();
    assert_eq!(reader.records().count(), 8);
    let mut reader = csv::Reader::from_path(error_output_path(&output_path)).unwrap();
    assert_eq!(reader.records().count(), 2);
}

#[tokio::test]
async fn test_progress_reaches_job_tracker() {
    let orchestrator = orchestrator(FakeCollector::new(&[], &[]), 2);
    let job = JobTracker::with_id("job", 5);
    let pipeline = Mutex::new(DataPipeline::open(PipelineConfig::dry_run()).unwrap());

    job.start().await;
    let aggregate = orchestrator
        .run(&ids(&["a", "b", "c", "d", "e"]), &pipeline, Some(&job))
        .await
        .unwrap();
    job.complete(aggregate).await;

    let snapshot = job.snapshot().await;
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.progress.completed, 5);
    assert_eq!(snapshot.progress.total, 5);
    assert_eq!(snapshot.results.map(|r| r.videos.len()), Some(5));
}

#[tokio::test]
async fn test_progress_failure_becomes_error_record() {
    let orchestrator = orchestrator(FakeCollector::new(&[], &[]), 50);
    let pipeline = Mutex::new(DataPipeline::open(PipelineConfig::dry_run()).unwrap());

    let aggregate = orchestrator
        .run(&ids(&["A", "B", "C"]), &pipeline, Some(&BrokenProgress))
        .await
        .unwrap();

    assert_eq!(aggregate.videos.len(), 2);
    assert_eq!(aggregate.failed_ids(), vec!["B"]);
    assert_eq!(
        aggregate.errors[0].get("error_kind").and_then(|v| v.as_str()),
        Some("progress")
    );
}

#[tokio::test]
async fn test_prepare_failure_fails_whole_chunk() {
    let orchestrator = orchestrator(FailingPrepare, 2);
    let job = JobTracker::with_id("job", 3);
    let pipeline = Mutex::new(DataPipeline::open(PipelineConfig::dry_run()).unwrap());

    let aggregate = orchestrator
        .run(&ids(&["a", "b", "c"]), &pipeline, Some(&job))
        .await
        .unwrap();

    assert!(aggregate.videos.is_empty());
    let mut failed = aggregate.failed_ids();
    failed.sort();
    assert_eq!(failed, vec!["a", "b", "c"]);

    // Every item is still reported, so the job reaches its total
    let progress = job.progress().await;
    assert_eq!(progress.completed, 3);
    assert_eq!(progress.total, 3);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_prepare_times_out_whole_chunk() {
    let orchestrator = orchestrator(HangingPrepare, 10);
    let job = JobTracker::with_id("job", 2);
    let pipeline = Mutex::new(DataPipeline::open(PipelineConfig::dry_run()).unwrap());

    let started = tokio::time::Instant::now();
    let aggregate = orchestrator
        .run(&ids(&["a", "b"]), &pipeline, Some(&job))
        .await
        .unwrap();

    // Bounded by the 2s item deadline, not by the stalled request
    assert!(started.elapsed() <= Duration::from_secs(5));
    assert!(aggregate.videos.is_empty());
    let mut failed = aggregate.failed_ids();
    failed.sort();
    assert_eq!(failed, vec!["a", "b"]);
    for record in &aggregate.errors {
        assert_eq!(
            record.get("error_kind").and_then(|v| v.as_str()),
            Some("timeout")
        );
    }
    assert_eq!(job.progress().await.completed, 2);
}

#[tokio::test]
async fn test_write_failure_is_surfaced() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("videos.csv");
    let orchestrator = orchestrator(FakeCollector::new(&[], &[]), 10);

    // Fixed header the collected records cannot satisfy
    let config = PipelineConfig::new(&output_path)
        .with_batch_size(2)
        .with_columns(["id", "v", "likes"]);
    let result = orchestrator
        .collect_to_files(&ids(&["a", "b", "c"]), config, None)
        .await;

    assert!(result.is_err());
}
