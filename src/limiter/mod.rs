//! Concurrency and start-rate limiting for per-item operations
//!
//! [`ConcurrencyLimiter`] runs a sequence of zero-argument async callables
//! while enforcing two caps at once:
//!
//! - at most `max_concurrent` callables in flight
//! - at most `max_per_second` callables started per second
//!
//! Results are returned in completion order. The limiter neither swallows
//! nor retries failures: each callable converts its own errors into a result
//! value, and one failing callable never blocks the others.

pub mod rate;

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::metrics;
pub use rate::StartRateThrottle;

/// Limiter errors
#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    /// Invalid limiter configuration
    #[error("invalid limiter configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for limiter construction
pub type LimiterResult<T> = Result<T, LimiterError>;

/// Bounded-concurrency, rate-throttled task runner
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    max_concurrent: usize,
    throttle: Option<Arc<StartRateThrottle>>,
}

impl ConcurrencyLimiter {
    /// Create a limiter
    ///
    /// # Arguments
    /// * `max_concurrent` - Maximum callables in flight at once
    /// * `max_per_second` - Maximum callable starts per second (`None` = unthrottled)
    pub fn new(max_concurrent: usize, max_per_second: Option<f64>) -> LimiterResult<Self> {
        if max_concurrent == 0 {
            return Err(LimiterError::InvalidConfig(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        let throttle = max_per_second
            .map(StartRateThrottle::per_second)
            .transpose()?
            .map(Arc::new);

        Ok(Self {
            max_concurrent,
            throttle,
        })
    }

    /// Create a limiter with a concurrency cap only
    pub fn unthrottled(max_concurrent: usize) -> LimiterResult<Self> {
        Self::new(max_concurrent, None)
    }

    /// Maximum callables in flight
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Whether a start-rate throttle is configured
    pub fn is_throttled(&self) -> bool {
        self.throttle.is_some()
    }

    /// Run every callable under both caps, collecting results as they complete
    ///
    /// Callers needing positional correspondence must carry an index in the
    /// callable's own output.
    pub async fn run_all<I, F, Fut, T>(&self, tasks: I) -> Vec<T>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let throttle = self.throttle.as_deref();

        let results: Vec<T> = stream::iter(tasks)
            .map(|task| async move {
                if let Some(throttle) = throttle {
                    let waited = throttle.acquire().await;
                    metrics::record_start_wait(waited);
                }
                metrics::record_in_flight(1.0);
                let output = task().await;
                metrics::record_in_flight(-1.0);
                output
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        debug!(
            completed = results.len(),
            max_concurrent = self.max_concurrent,
            "Limiter run finished"
        );
        results
    }
}
