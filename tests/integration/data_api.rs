//! Integration tests for the Data API collector against a local stub server

use reqwest::Client;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use video_stats_collector::collector::{CollectErrorKind, Collector, DataApiCollector};

/// Serve `responses` in order, one connection each, and return the base URL
async fn stub_server(responses: Vec<(u16, String)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut read = 0;
            loop {
                let n = socket.read(&mut buf[read..]).await.unwrap();
                read += n;
                if n == 0 || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        }
    });

    format!("http://{addr}")
}

fn client() -> Arc<Client> {
    Arc::new(Client::builder().no_proxy().build().unwrap())
}

fn video_json(id: &str, views: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "snippet": {
            "title": format!("title {id}"),
            "publishedAt": "2024-05-01T10:00:00Z",
            "defaultAudioLanguage": "es-MX"
        },
        "contentDetails": {"duration": "PT1M1S"},
        "statistics": {"viewCount": views, "likeCount": "7", "commentCount": "2"}
    })
}

#[tokio::test]
async fn test_prepare_then_collect() {
    let body = serde_json::json!({"items": [video_json("A", "100"), video_json("C", "300")]});
    let base_url = stub_server(vec![(200, body.to_string())]).await;
    let collector = DataApiCollector::new(client(), base_url, "key");

    let chunk: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
    collector.prepare(&chunk).await.unwrap();

    let a = collector.collect("A").await.unwrap();
    assert_eq!(a.get("view_count").and_then(|v| v.as_i64()), Some(100));
    assert_eq!(a.get("language_name").and_then(|v| v.as_str()), Some("Spanish"));
    assert_eq!(a.get("country").and_then(|v| v.as_str()), Some("MX"));
    assert_eq!(a.get("duration").and_then(|v| v.as_i64()), Some(61));

    let b = collector.collect("B").await.unwrap_err();
    assert_eq!(b.kind, CollectErrorKind::NotFound);
    assert_eq!(b.identifier, "B");

    assert!(collector.collect("C").await.is_ok());
}

#[tokio::test]
async fn test_http_error_maps_to_upstream() {
    let body = r#"{"error": {"code": 403, "message": "quotaExceeded"}}"#.to_string();
    let base_url = stub_server(vec![(403, body)]).await;
    let collector = DataApiCollector::new(client(), base_url, "key");

    let err = collector
        .prepare(&["A".to_string()])
        .await
        .unwrap_err();

    assert_eq!(err.kind, CollectErrorKind::Upstream { status: 403 });
    assert_eq!(err.message, "quotaExceeded");
}

#[tokio::test]
async fn test_collect_without_prepare_fetches_single_id() {
    let body = serde_json::json!({"items": [video_json("Z", "5")]});
    let base_url = stub_server(vec![(200, body.to_string())]).await;
    let collector = DataApiCollector::new(client(), base_url, "key");

    let record = collector.collect("Z").await.unwrap();
    assert_eq!(record.get("video_id").and_then(|v| v.as_str()), Some("Z"));
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let base_url = stub_server(vec![(200, "not json".to_string())]).await;
    let collector = DataApiCollector::new(client(), base_url, "key");

    let err = collector.collect("A").await.unwrap_err();
    assert_eq!(err.kind, CollectErrorKind::Parse);
}
