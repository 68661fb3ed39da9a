//! Data API v3 `videos.list` collector
//!
//! [`Collector::prepare`] fetches a whole chunk of ids with as few requests
//! as the API allows (50 ids each) and caches the parsed records;
//! [`Collector::collect`] then hands out one cached result per id. Ids the
//! API does not return are reported as [`CollectErrorKind::NotFound`].

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{CollectError, CollectErrorKind, CollectResult, Collector};
use crate::config::{CollectorConfig, DEFAULT_API_BASE_URL};
use crate::record::Record;
use crate::video::Video;

/// Maximum ids accepted by one `videos.list` request
pub const MAX_IDS_PER_REQUEST: usize = 50;

/// Resource parts requested for every video
pub const VIDEO_PARTS: &str = "snippet,contentDetails,statistics";

/// HTTP connect timeout (seconds) - time to establish the TCP connection
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Build the HTTP client for [`DataApiCollector`]
///
/// Sets a connect timeout and an overall `request_timeout`, so a stalled
/// socket is released even when nobody awaits the request any more.
pub fn http_client(request_timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS).min(request_timeout))
        .timeout(request_timeout)
        .build()
}

/// Collector backed by the Data API `videos` endpoint
///
/// The injected client should carry its own connect and request timeouts
/// (see [`http_client`]).
pub struct DataApiCollector {
    client: Arc<Client>,
    base_url: String,
    api_key: String,
    fetched: Mutex<HashMap<String, CollectResult<Record>>>,
}

impl DataApiCollector {
    /// Create a collector
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client
    /// * `base_url` - API base URL (e.g., "<https://www.googleapis.com/youtube/v3>")
    /// * `api_key` - Developer key sent with every request
    pub fn new(
        client: Arc<Client>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            fetched: Mutex::new(HashMap::new()),
        }
    }

    /// Create a collector from runtime settings; `None` when no key is configured
    pub fn from_config(client: Arc<Client>, config: &CollectorConfig) -> Option<Self> {
        let key = config.api_key.as_deref()?;
        Some(Self::new(client, config.api_base_url.as_str(), key))
    }

    /// Collector against the public endpoint
    pub fn with_default_endpoint(client: Arc<Client>, api_key: impl Into<String>) -> Self {
        Self::new(client, DEFAULT_API_BASE_URL, api_key)
    }

    /// Fetch and parse one request's worth of ids
    ///
    /// Ids missing from the response map to `NotFound`.
    pub async fn fetch_batch(
        &self,
        ids: &[String],
    ) -> CollectResult<HashMap<String, CollectResult<Record>>> {
        let label = ids.first().map(String::as_str).unwrap_or_default();
        let url = format!("{}/videos", self.base_url);
        let params = [
            ("part", VIDEO_PARTS.to_string()),
            ("id", ids.join(",")),
            ("key", self.api_key.clone()),
        ];

        debug!(url = %url, ids = ids.len(), "Requesting videos");

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| CollectError::new(label, CollectErrorKind::Network, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CollectError::new(label, CollectErrorKind::Network, e.to_string()))?;

        if !status.is_success() {
            let message = api_error_message(&body).unwrap_or_else(|| format!("HTTP {status}"));
            warn!(status = status.as_u16(), error = %message, "Data API request failed");
            return Err(CollectError::new(
                label,
                CollectErrorKind::Upstream {
                    status: status.as_u16(),
                },
                message,
            ));
        }

        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| CollectError::new(label, CollectErrorKind::Parse, e.to_string()))?;

        let mut results = parse_videos_response(&payload)
            .map_err(|message| CollectError::new(label, CollectErrorKind::Parse, message))?;
        for id in ids {
            results
                .entry(id.clone())
                .or_insert_with(|| Err(CollectError::not_found(id.as_str())));
        }
        Ok(results)
    }
}

#[async_trait]
impl Collector for DataApiCollector {
    async fn prepare(&self, chunk: &[String]) -> CollectResult<()> {
        for ids in chunk.chunks(MAX_IDS_PER_REQUEST) {
            let results = self.fetch_batch(ids).await?;
            self.fetched.lock().await.extend(results);
        }
        Ok(())
    }

    async fn collect(&self, identifier: &str) -> CollectResult<Record> {
        if let Some(result) = self.fetched.lock().await.remove(identifier) {
            return result;
        }

        let ids = [identifier.to_string()];
        self.fetch_batch(&ids)
            .await?
            .remove(identifier)
            .unwrap_or_else(|| Err(CollectError::not_found(identifier)))
    }
}

/// Map a `videos.list` payload to per-id records
///
/// Items that fail to parse become `Parse` errors for their id. Returns an
/// error message when the payload has no `items` array.
pub fn parse_videos_response(
    payload: &Value,
) -> Result<HashMap<String, CollectResult<Record>>, String> {
    let items = payload
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| "response has no 'items' array".to_string())?;

    let mut results = HashMap::with_capacity(items.len());
    for item in items {
        let Some(id) = item.get("id").and_then(Value::as_str) else {
            warn!("Skipping video resource without id");
            continue;
        };
        let parsed = Video::from_api_item(item)
            .map(|video| {
                debug!(video = %video, "Parsed video");
                video.to_record()
            })
            .map_err(|e| CollectError::new(id, CollectErrorKind::Parse, e.to_string()));
        results.insert(id.to_string(), parsed);
    }
    Ok(results)
}

fn api_error_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body).ok()?;
    payload
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
}
