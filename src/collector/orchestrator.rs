//! Chunked, rate-limited collection into a shared pipeline

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    bucket, Aggregate, CollectError, CollectErrorKind, CollectResult, Collector, Outcome,
    ProgressReporter,
};
use crate::config::{CollectorConfig, ConfigResult};
use crate::limiter::ConcurrencyLimiter;
use crate::metrics;
use crate::pipeline::{
    DataPipeline, PipelineConfig, PipelineError, PipelineResult, PipelineSummary, QueueKind,
};
use crate::record::Record;
use crate::shutdown::SharedShutdown;

/// Runs a [`Collector`] over identifiers and routes outcomes into a pipeline
pub struct Orchestrator<C: ?Sized> {
    collector: Arc<C>,
    limiter: ConcurrencyLimiter,
    chunk_size: usize,
    item_timeout: Duration,
    shutdown: Option<SharedShutdown>,
}

struct ItemResult {
    outcome: Outcome,
    write_error: Option<PipelineError>,
}

impl<C> Orchestrator<C>
where
    C: Collector + ?Sized,
{
    /// Create an orchestrator
    ///
    /// # Arguments
    /// * `collector` - Collection operation shared by all items
    /// * `limiter` - Concurrency and start-rate caps for items within a chunk
    /// * `chunk_size` - Identifiers per chunk (the upstream request limit); 0 is treated as 1
    /// * `item_timeout` - Deadline for each chunk preparation and each item's collection
    pub fn new(
        collector: Arc<C>,
        limiter: ConcurrencyLimiter,
        chunk_size: usize,
        item_timeout: Duration,
    ) -> Self {
        Self {
            collector,
            limiter,
            chunk_size: chunk_size.max(1),
            item_timeout,
            shutdown: None,
        }
    }

    /// Create an orchestrator from runtime settings
    pub fn from_config(collector: Arc<C>, config: &CollectorConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::new(
            collector,
            config.limiter()?,
            config.batch_size,
            config.io_timeout,
        ))
    }

    /// Stop launching chunks and items once `shutdown` is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Identifiers per chunk
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Per-item deadline
    pub fn item_timeout(&self) -> Duration {
        self.item_timeout
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|s| s.is_shutdown_requested())
    }

    /// Collect every identifier into `pipeline`
    ///
    /// Chunks run one after another; items within a chunk run concurrently
    /// under the limiter. The per-chunk `prepare` step and each item's
    /// `collect` get their own `item_timeout` deadline. Progress is reported
    /// for every item, including those of a chunk whose preparation failed.
    /// Collection failures become error records. A
    /// pipeline write failure stops the run after the current chunk and is
    /// returned.
    pub async fn run(
        &self,
        ids: &[String],
        pipeline: &Mutex<DataPipeline>,
        progress: Option<&dyn ProgressReporter>,
    ) -> PipelineResult<Aggregate> {
        let total = ids.len();
        let chunk_count = total.div_ceil(self.chunk_size);
        let mut outcomes = Vec::with_capacity(total);

        info!(
            items = total,
            chunks = chunk_count,
            chunk_size = self.chunk_size,
            "Starting collection"
        );

        for (chunk_index, chunk) in ids.chunks(self.chunk_size).enumerate() {
            if self.shutdown_requested() {
                warn!(
                    chunk = chunk_index + 1,
                    chunks = chunk_count,
                    "Shutdown requested, not launching remaining chunks"
                );
                break;
            }

            let offset = chunk_index * self.chunk_size;
            debug!(
                chunk = chunk_index + 1,
                chunks = chunk_count,
                start = offset + 1,
                end = offset + chunk.len(),
                total = total,
                "Collecting chunk"
            );

            let prepare_error = self.prepare_chunk(chunk_index, chunk).await.err();
            let prepare_error = prepare_error.as_ref();

            let tasks = chunk.iter().enumerate().map(|(i, id)| {
                let index = offset + i;
                move || async move {
                    if self.shutdown_requested() {
                        return None;
                    }
                    let result = self.collect_one(index, id, progress, prepare_error).await;
                    Some(route(result, pipeline).await)
                }
            });

            let mut write_error = None;
            for item in self.limiter.run_all(tasks).await.into_iter().flatten() {
                if write_error.is_none() {
                    write_error = item.write_error;
                }
                outcomes.push(item.outcome);
            }

            if let Some(e) = write_error {
                return Err(e);
            }
        }

        let aggregate = bucket(outcomes);
        info!(
            collected = aggregate.videos.len(),
            failed = aggregate.errors.len(),
            skipped = total - aggregate.len(),
            "Collection finished"
        );
        Ok(aggregate)
    }

    /// Run the collector's per-chunk step under the item deadline
    async fn prepare_chunk(&self, chunk_index: usize, chunk: &[String]) -> CollectResult<()> {
        match tokio::time::timeout(self.item_timeout, self.collector.prepare(chunk)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(chunk = chunk_index + 1, error = %e, "Chunk preparation failed");
                Err(e)
            }
            Err(_) => {
                warn!(
                    chunk = chunk_index + 1,
                    timeout_ms = self.item_timeout.as_millis() as u64,
                    "Chunk preparation timed out"
                );
                let first = chunk.first().map(String::as_str).unwrap_or_default();
                Err(CollectError::timeout(first, self.item_timeout))
            }
        }
    }

    async fn collect_one(
        &self,
        index: usize,
        id: &str,
        progress: Option<&dyn ProgressReporter>,
        prepare_error: Option<&CollectError>,
    ) -> CollectResult<Record> {
        if let Some(reporter) = progress {
            reporter.report(index, id).await.map_err(|e| {
                CollectError::new(id, CollectErrorKind::Progress, e.message)
            })?;
        }

        // A failed chunk preparation is the outcome of each of its items
        if let Some(e) = prepare_error {
            return Err(e.for_identifier(id));
        }

        match tokio::time::timeout(self.item_timeout, self.collector.collect(id)).await {
            Ok(result) => result,
            Err(_) => Err(CollectError::timeout(id, self.item_timeout)),
        }
    }

    /// Run a full collection with its own pipeline scope
    ///
    /// The pipeline is closed even when the run fails; the run's error takes
    /// precedence over a close error.
    pub async fn collect_to_files(
        &self,
        ids: &[String],
        config: PipelineConfig,
        progress: Option<&dyn ProgressReporter>,
    ) -> PipelineResult<(Aggregate, PipelineSummary)> {
        let pipeline = Mutex::new(DataPipeline::open(config)?);
        let result = self.run(ids, &pipeline, progress).await;
        let closed = pipeline.into_inner().close();

        let aggregate = result?;
        Ok((aggregate, closed?))
    }
}

async fn route(
    result: CollectResult<Record>,
    pipeline: &Mutex<DataPipeline>,
) -> ItemResult {
    let (kind, record) = match result {
        Ok(record) => (QueueKind::Data, record),
        Err(e) => {
            debug!(id = %e.identifier, kind = %e.kind, error = %e.message, "Item failed");
            (QueueKind::Errors, e.to_record())
        }
    };

    let enqueued = pipeline.lock().await.enqueue(record.clone(), kind);
    let (record, write_error) = match enqueued {
        Ok(merged) => (merged, None),
        Err(e) => (record, Some(e)),
    };

    let outcome = match kind {
        QueueKind::Data => {
            metrics::record_outcome("success");
            Outcome::Success(record)
        }
        QueueKind::Errors => {
            metrics::record_outcome("failure");
            Outcome::Failure(record)
        }
    };

    ItemResult {
        outcome,
        write_error,
    }
}
