//! Integration tests for crash recovery of the resumable CSV writer

use tempfile::TempDir;
use video_stats_collector::output::{write_batch, ResumableCsvWriter};
use video_stats_collector::resume::{checkpoint_path_for, Checkpoint};
use video_stats_collector::Record;

fn columns() -> Vec<String> {
    vec!["video_id".to_string(), "views".to_string()]
}

fn batch(m: usize) -> Vec<Record> {
    (0..m)
        .map(|i| {
            Record::new()
                .with("views", (i * 10) as i64)
                .with("video_id", format!("v{i}"))
        })
        .collect()
}

fn read_ids(path: &std::path::Path) -> Vec<String> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader
        .records()
        .map(|r| r.unwrap()[0].to_string())
        .collect()
}

#[test]
fn test_crash_after_row_k_resumes_without_duplicates() {
    let m = 8;
    for k in [1usize, 3, 7] {
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("videos.csv");
        let rows = batch(m);

        // Process killed after row k: no drop, no finish
        let mut writer = ResumableCsvWriter::open(&output_path, &columns()).unwrap();
        writer.write_rows(&rows[..k], None).unwrap();
        std::mem::forget(writer);

        let checkpoint = Checkpoint::load(&checkpoint_path_for(&output_path))
            .unwrap()
            .expect("checkpoint should survive the crash");
        assert_eq!(checkpoint.position(), k as u64);

        let mut writer = ResumableCsvWriter::open(&output_path, &columns()).unwrap();
        assert_eq!(writer.position(), k as u64);
        let stats = writer.write_rows(&rows, None).unwrap();
        writer.finish().unwrap();

        assert_eq!(stats.start_position, k as u64);
        assert_eq!(stats.items_written, (m - k) as u64);

        let expected: Vec<String> = (0..m).map(|i| format!("v{i}")).collect();
        assert_eq!(read_ids(&output_path), expected);
        assert!(!checkpoint_path_for(&output_path).exists());
    }
}

#[test]
fn test_checkpoint_file_format() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("videos.csv");

    let mut writer = ResumableCsvWriter::open(&output_path, &columns()).unwrap();
    writer.write_rows(&batch(3), None).unwrap();
    drop(writer);

    let contents = std::fs::read_to_string(checkpoint_path_for(&output_path)).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(parsed, serde_json::json!({"position": 3}));
}

#[test]
fn test_failed_batch_retry_completes_file() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("videos.csv");

    let mut rows = batch(5);
    rows[3] = Record::new().with("video_id", "v3");

    assert!(write_batch(&output_path, &columns(), &rows).is_err());
    assert_eq!(read_ids(&output_path), vec!["v0", "v1", "v2"]);

    // Caller repairs the row and retries the same batch
    rows[3] = rows[3].clone().with("views", 30i64);
    let stats = write_batch(&output_path, &columns(), &rows).unwrap();

    assert_eq!(stats.start_position, 3);
    assert_eq!(read_ids(&output_path), vec!["v0", "v1", "v2", "v3", "v4"]);
    assert!(!checkpoint_path_for(&output_path).exists());
}

#[test]
fn test_corrupt_checkpoint_is_not_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("videos.csv");
    std::fs::write(checkpoint_path_for(&output_path), "{not json").unwrap();

    let stats = write_batch(&output_path, &columns(), &batch(2)).unwrap();

    assert_eq!(stats.start_position, 0);
    assert_eq!(read_ids(&output_path), vec!["v0", "v1"]);
}

#[test]
fn test_clean_run_leaves_no_checkpoint() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("nested").join("videos.csv");

    write_batch(&output_path, &columns(), &batch(4)).unwrap();

    assert!(output_path.exists());
    assert!(!checkpoint_path_for(&output_path).exists());
}
