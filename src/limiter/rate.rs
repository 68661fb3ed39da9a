//! Start-rate throttle
//!
//! Leaky bucket over operation starts: each caller reserves the next free
//! start slot under a lock, then sleeps until that slot. Consecutive starts
//! are therefore spaced by at least `1 / max_per_second`.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

use super::{LimiterError, LimiterResult};

/// Throttles how often new operations may begin
#[derive(Debug)]
pub struct StartRateThrottle {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl StartRateThrottle {
    /// Create a throttle allowing `max_per_second` starts per second
    ///
    /// # Errors
    /// Returns [`LimiterError::InvalidConfig`] for zero, negative or
    /// non-finite rates, and for rates so small that the start interval
    /// does not fit in a [`Duration`].
    pub fn per_second(max_per_second: f64) -> LimiterResult<Self> {
        Ok(Self {
            interval: start_interval(max_per_second)?,
            next_slot: Mutex::new(None),
        })
    }

    /// Minimum spacing between two starts
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the next start slot
    ///
    /// Returns how long the caller waited.
    pub async fn acquire(&self) -> Duration {
        let now = Instant::now();
        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let slot = match *next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            *next_slot = Some(slot + self.interval);
            slot
        };

        if slot > now {
            sleep_until(slot).await;
        }
        slot.saturating_duration_since(now)
    }
}

/// Spacing between starts for `max_per_second`
pub fn start_interval(max_per_second: f64) -> LimiterResult<Duration> {
    if !max_per_second.is_finite() || max_per_second <= 0.0 {
        return Err(LimiterError::InvalidConfig(format!(
            "max_per_second must be a positive number, got {max_per_second}"
        )));
    }
    Duration::try_from_secs_f64(1.0 / max_per_second).map_err(|e| {
        LimiterError::InvalidConfig(format!(
            "max_per_second {max_per_second} is too small: {e}"
        ))
    })
}
