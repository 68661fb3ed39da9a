//! # Video Stats Collector Library
//!
//! Collects per-video engagement metadata for a list of video ids and
//! persists the results through a crash-resumable CSV pipeline.
//!
//! ## Features
//!
//! - **Bounded concurrency**: at most N collections in flight and at most R
//!   started per second
//! - **Batched persistence**: records are buffered and flushed in batches;
//!   successes and failures land in two sibling files
//! - **Crash recovery**: a checkpoint next to the output file lets an
//!   interrupted batch resume without duplicating or losing rows
//! - **Error isolation**: a failing item becomes an error record and never
//!   stops the rest of the run
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use video_stats_collector::collector::data_api::http_client;
//! use video_stats_collector::collector::{DataApiCollector, Orchestrator};
//! use video_stats_collector::config::CollectorConfig;
//! use video_stats_collector::pipeline::PipelineConfig;
//! use video_stats_collector::video::Video;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CollectorConfig::from_env()?;
//! let client = Arc::new(http_client(config.io_timeout)?);
//! let collector = DataApiCollector::from_config(client, &config).ok_or("YT_API_KEY is not set")?;
//!
//! let orchestrator = Orchestrator::from_config(Arc::new(collector), &config)?;
//! let ids = vec!["dQw4w9WgXcQ".to_string()];
//! let pipeline = PipelineConfig::new("data/videos.csv")
//!     .with_batch_size(config.batch_size)
//!     .with_columns(Video::columns())
//!     .with_name("Fetch videos using the Data API");
//!
//! let (aggregate, summary) = orchestrator.collect_to_files(&ids, pipeline, None).await?;
//! println!("{} videos, {} errors", aggregate.videos.len(), aggregate.errors.len());
//! println!("{}", summary.format_summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! - [`record`] - Flat, insertion-ordered key/value records
//! - [`limiter`] - Concurrency cap plus start-rate throttle
//! - [`resume`] - Write-position checkpoints
//! - [`output`] - Resumable CSV batch writer
//! - [`pipeline`] - Dual-queue buffered sink (data and errors)
//! - [`collector`] - Collector traits, orchestrator and implementations
//! - [`video`] - Video model and field parsers
//!
//! Ambient: [`config`], [`logging`], [`metrics`], [`shutdown`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Collection traits, orchestration and collector implementations
pub mod collector;

/// Runtime configuration from the environment
pub mod config;

/// Concurrency and start-rate limiting
pub mod limiter;

/// Tracing subscriber setup
pub mod logging;

/// Prometheus metrics
pub mod metrics;

/// Data output writers
pub mod output;

/// Buffered dual-queue data pipeline
pub mod pipeline;

/// Flat records
pub mod record;

/// Resume capability with checkpointing
pub mod resume;

/// Graceful shutdown coordination
pub mod shutdown;

/// Video model and parsers
pub mod video;

// Re-export commonly used types
pub use collector::{Aggregate, CollectError, Collector, Orchestrator, Outcome};
pub use limiter::ConcurrencyLimiter;
pub use pipeline::{DataPipeline, PipelineConfig, QueueKind};
pub use record::{FieldValue, Record};
