//! Outbound throttling for `DistributorClient`.
//!
//! Unlike inbound HTTP rate limiting, this is a single-process, single-shared
//! spacing gate: every request, successful or not, waits for its turn before
//! being allowed to fire. There is no per-caller bucket because the
//! distributor's rate limit is account-wide, not per-BomItem.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Enforces a minimum spacing between successive outbound calls. Shared via
/// `Arc` across every `MatchPipeline` task so the whole worker pool respects
/// one account-wide pace.
#[derive(Debug)]
pub struct OutboundThrottle {
    min_spacing: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl OutboundThrottle {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_request: Mutex::new(None),
        }
    }

    /// Blocks the caller until at least `min_spacing` has elapsed since the
    /// last call was admitted through this gate.
    pub async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_spacing {
                sleep(self.min_spacing - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

pub type SharedThrottle = Arc<OutboundThrottle>;

/// A fixed retry schedule: attempt once, then retry up to `max_retries` times
/// with a flat delay between attempts.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetrySchedule {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self { max_retries, retry_delay }
    }

    pub async fn delay_before_retry(&self) {
        sleep(self.retry_delay).await;
    }
}
