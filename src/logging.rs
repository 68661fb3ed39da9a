//! Tracing subscriber setup
//!
//! Filtering follows `RUST_LOG` and defaults to `video_stats_collector=info`.
//! Set `LOG_FORMAT=json` for structured JSON lines.

use tracing_subscriber::EnvFilter;

/// Default filter directive when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "video_stats_collector=info";

fn json_requested() -> bool {
    std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global tracing subscriber
///
/// # Panics
/// Panics if a global subscriber is already installed; use
/// [`try_init_tracing`] when that may be the case.
pub fn init_tracing() {
    if json_requested() {
        tracing_subscriber::fmt().json().with_env_filter(env_filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter()).init();
    }
}

/// Install the global tracing subscriber unless one already exists
pub fn try_init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if json_requested() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter())
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter()).try_init()
    }
}
