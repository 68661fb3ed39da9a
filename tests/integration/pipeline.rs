//! Integration tests for the dual-queue data pipeline

use std::path::Path;
use tempfile::TempDir;
use video_stats_collector::output::{error_output_path, OutputError};
use video_stats_collector::pipeline::{DataPipeline, PipelineConfig, PipelineError, QueueKind};
use video_stats_collector::Record;

fn video(i: usize) -> Record {
    Record::new()
        .with("video_id", format!("v{i}"))
        .with("views", i as i64)
}

fn read_rows(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header = reader
        .headers()
        .unwrap()
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}

#[test]
fn test_below_threshold_writes_only_on_close() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("videos.csv");

    for n in [1usize, 4, 9] {
        let mut pipeline =
            DataPipeline::open(PipelineConfig::new(&output_path).with_batch_size(10)).unwrap();
        for i in 0..n {
            pipeline.enqueue(video(i), QueueKind::Data).unwrap();
            assert!(!output_path.exists(), "no disk write before scope exit");
        }
        pipeline.close().unwrap();

        let (header, rows) = read_rows(&output_path);
        assert_eq!(header, vec!["video_id", "views"]);
        assert_eq!(rows.len(), n);
    }
}

#[test]
fn test_above_threshold_writes_every_row_once() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("videos.csv");
    let threshold = 4;
    let n = 11;

    let mut pipeline =
        DataPipeline::open(PipelineConfig::new(&output_path).with_batch_size(threshold)).unwrap();
    for i in 0..n {
        pipeline.enqueue(video(i), QueueKind::Data).unwrap();
    }
    let summary = pipeline.close().unwrap();

    let (_, rows) = read_rows(&output_path);
    assert_eq!(rows.len(), n);
    let ids: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    let expected: Vec<String> = (0..n).map(|i| format!("v{i}")).collect();
    assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());

    let content = std::fs::read_to_string(&output_path).unwrap();
    assert_eq!(content.matches("video_id,views").count(), 1);

    assert_eq!(summary.stats.data.saved, n as u64);
    assert!(summary.stats.data.flushes >= n.div_ceil(threshold) as u64);
    assert!(checkpoint_absent(&output_path));
}

fn checkpoint_absent(output_path: &Path) -> bool {
    !video_stats_collector::resume::checkpoint_path_for(output_path).exists()
}

#[test]
fn test_file_starts_with_bom() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("videos.csv");

    let mut pipeline = DataPipeline::open(PipelineConfig::new(&output_path)).unwrap();
    pipeline.enqueue(video(0), QueueKind::Data).unwrap();
    pipeline.close().unwrap();

    let bytes = std::fs::read(&output_path).unwrap();
    assert!(bytes.starts_with(b"\xEF\xBB\xBF"));
}

#[test]
fn test_dry_run_never_creates_output() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("videos.csv");

    let mut pipeline = DataPipeline::open(
        PipelineConfig::new(&output_path)
            .with_batch_size(2)
            .with_dry_run(true),
    )
    .unwrap();
    for i in 0..7 {
        pipeline.enqueue(video(i), QueueKind::Data).unwrap();
    }
    pipeline
        .enqueue(Record::new().with("id", "x"), QueueKind::Errors)
        .unwrap();
    assert!(pipeline.is_dry_run());

    let summary = pipeline.close().unwrap();
    assert_eq!(summary.stats.data.queued, 7);
    assert_eq!(summary.stats.errors.queued, 1);
    assert!(!output_path.exists());
    assert!(!error_output_path(&output_path).exists());
}

#[test]
fn test_missing_column_raises_at_flush_time() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("videos.csv");

    let mut pipeline = DataPipeline::open(
        PipelineConfig::new(&output_path)
            .with_batch_size(3)
            .with_columns(["video_id", "views"]),
    )
    .unwrap();

    pipeline.enqueue(video(0), QueueKind::Data).unwrap();
    pipeline
        .enqueue(Record::new().with("video_id", "v1"), QueueKind::Data)
        .expect("enqueue below threshold must not validate columns");

    let err = pipeline.enqueue(video(2), QueueKind::Data).unwrap_err();
    match err {
        PipelineError::Output(OutputError::MissingColumn { column, row }) => {
            assert_eq!(column, "views");
            assert_eq!(row, 1);
        }
        other => panic!("Expected MissingColumn, got {other:?}"),
    }

    // The queue survives for a retry and the checkpoint marks the failed row
    assert_eq!(pipeline.queued(QueueKind::Data), 3);
    assert!(!checkpoint_absent(&output_path));
}

#[test]
fn test_successes_and_errors_split_into_sibling_files() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("videos.csv");
    let error_path = error_output_path(&output_path);

    let mut pipeline = DataPipeline::open(
        PipelineConfig::new(&output_path)
            .with_batch_size(2)
            .with_name("split"),
    )
    .unwrap();
    assert_eq!(pipeline.error_path(), Some(error_path.as_path()));

    for i in 0..3 {
        pipeline.enqueue(video(i), QueueKind::Data).unwrap();
    }
    for i in 0..2 {
        pipeline
            .enqueue_with(
                Record::new().with("id", format!("bad{i}")),
                QueueKind::Errors,
                Record::new().with("message", "not found"),
            )
            .unwrap();
    }
    let summary = pipeline.close().unwrap();

    let (_, data_rows) = read_rows(&output_path);
    let (error_header, error_rows) = read_rows(&error_path);
    assert_eq!(data_rows.len(), 3);
    assert_eq!(error_header, vec!["id", "message"]);
    assert_eq!(error_rows.len(), 2);
    assert_eq!(summary.name, "split");
    assert_eq!(summary.stats.errors.saved, 2);
}

#[test]
fn test_reopen_replaces_previous_run() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("videos.csv");

    for run in 0..2 {
        let mut pipeline = DataPipeline::open(PipelineConfig::new(&output_path)).unwrap();
        for i in 0..(3 + run) {
            pipeline.enqueue(video(i), QueueKind::Data).unwrap();
        }
        pipeline.close().unwrap();
    }

    let (_, rows) = read_rows(&output_path);
    assert_eq!(rows.len(), 4);
}

#[test]
fn test_enqueue_json_validates_input() {
    let mut pipeline = DataPipeline::open(PipelineConfig::dry_run()).unwrap();

    let record = pipeline
        .enqueue_json(
            &serde_json::json!({"video_id": "v1", "views": 3}),
            QueueKind::Data,
            Record::new().with("source", "api"),
        )
        .unwrap();
    assert_eq!(record.len(), 3);

    let err = pipeline
        .enqueue_json(&serde_json::json!("v1"), QueueKind::Data, Record::new())
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidItem(_)));

    let err = pipeline
        .enqueue_json(
            &serde_json::json!({"video_id": "v1", "tags": ["a"]}),
            QueueKind::Data,
            Record::new(),
        )
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidItem(_)));
}
