//! Transaction-rate sampling.
//!
//! Calls a member back-to-back for a fixed window and reports the achieved
//! call rate. Results are diagnostic: every band is reported as `Info`.

use super::{CancellationSignal, Verdict};
use crate::hardware::DeviceResult;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default sampling window per sampled member.
pub const DEFAULT_SAMPLE_WINDOW: Duration = Duration::from_secs(10);

/// Observed call rate band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateBand {
    /// More than 10 transactions per second.
    Excellent,
    /// 2 to 10 per second.
    Good,
    /// 1 to 2 per second.
    Fair,
    /// Under 1 per second.
    Poor,
}

impl RateBand {
    pub fn classify(rate_per_second: f64) -> Self {
        if rate_per_second > 10.0 {
            RateBand::Excellent
        } else if rate_per_second >= 2.0 {
            RateBand::Good
        } else if rate_per_second >= 1.0 {
            RateBand::Fair
        } else {
            RateBand::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateBand::Excellent => "excellent",
            RateBand::Good => "good",
            RateBand::Fair => "fair",
            RateBand::Poor => "poor",
        }
    }

    /// Rates are diagnostic only.
    pub fn verdict(&self) -> Verdict {
        Verdict::Info
    }
}

/// Result of one sampling window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleOutcome {
    pub count: u64,
    pub elapsed: Duration,
    /// Stopped early because the run was cancelled.
    pub cancelled: bool,
    /// Progress statuses emitted (at most one per elapsed second).
    pub status_updates: u32,
}

impl SampleOutcome {
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.count as f64 / secs
        } else {
            0.0
        }
    }

    pub fn band(&self) -> RateBand {
        RateBand::classify(self.rate())
    }
}

/// Call `read` repeatedly until `window` has elapsed.
///
/// # Errors
/// A failing call aborts the sample and its error is returned; the call is
/// not retried.
pub async fn sample<T, F, Fut>(
    mut read: F,
    window: Duration,
    cancel: &CancellationSignal,
) -> DeviceResult<SampleOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DeviceResult<T>>,
{
    let start = Instant::now();
    let mut count = 0u64;
    let mut reported_secs = 0u64;
    let mut status_updates = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Ok(SampleOutcome {
                count,
                elapsed: start.elapsed(),
                cancelled: true,
                status_updates,
            });
        }

        read().await?;
        count += 1;

        let elapsed = start.elapsed();
        if elapsed.as_secs() > reported_secs {
            reported_secs = elapsed.as_secs();
            status_updates += 1;
            debug!(
                transactions = count,
                seconds = reported_secs,
                window_secs = window.as_secs(),
                "Sampling transaction rate"
            );
        }

        if elapsed >= window {
            return Ok(SampleOutcome {
                count,
                elapsed,
                cancelled: false,
                status_updates,
            });
        }
    }
}
