//! Bounded, cancellable polling.
//!
//! The one primitive every wait on hardware goes through. It blocks the
//! calling sequence (cooperative `tokio::time::sleep`, never a background
//! task) until the predicate reads false, the timeout expires, or the run is
//! cancelled.
//!
//! A timeout is a normal outcome, not an error: the caller turns it into a
//! verdict. Only a failing predicate read is returned as `Err`.

use super::CancellationSignal;
use crate::hardware::DeviceResult;
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

/// Default interval between predicate evaluations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default upper bound on a single wait.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Condition to wait out, typically a busy indicator read from the device.
pub type Predicate<'a> = Box<dyn FnMut() -> BoxFuture<'a, DeviceResult<bool>> + Send + 'a>;

/// Optional status source sampled between polls (e.g. "position 42.0").
pub type ProgressReader<'a> = Box<dyn FnMut() -> BoxFuture<'a, String> + Send + 'a>;

/// One wait. Built fresh per wait and consumed by [`poll_until_false`].
pub struct PollSpec<'a> {
    /// Names the wait in log output.
    pub description: String,
    pub predicate: Predicate<'a>,
    /// Sleep between evaluations.
    pub interval: Duration,
    /// Upper bound on the whole wait.
    pub timeout: Duration,
    pub progress: Option<ProgressReader<'a>>,
}

impl<'a> PollSpec<'a> {
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: FnMut() -> BoxFuture<'a, DeviceResult<bool>> + Send + 'a,
    {
        Self::from_predicate(description, Box::new(predicate))
    }

    pub fn from_predicate(description: impl Into<String>, predicate: Predicate<'a>) -> Self {
        Self {
            description: description.into(),
            predicate,
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
            progress: None,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressReader<'a>>) -> Self {
        self.progress = progress;
        self
    }
}

/// Why a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The predicate read false.
    Predicate,
    /// The timeout elapsed with the predicate still true.
    Timeout,
    /// The cancellation signal was raised.
    Cancelled,
}

/// Result of one wait.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub stopped: StopReason,
    pub elapsed: Duration,
    /// Number of predicate evaluations.
    pub polls: u32,
    pub last_status: Option<String>,
}

/// Evaluate `spec.predicate` until it reads false, the timeout expires, or `cancel` is set.
///
/// Loop order per iteration: evaluate; sleep one interval; check
/// cancellation; check the timeout; sample progress. Cancellation therefore
/// takes priority over a simultaneous timeout and is observed within one
/// interval.
///
/// # Errors
/// Returns the predicate's error if it fails to evaluate.
pub async fn poll_until_false(
    mut spec: PollSpec<'_>,
    cancel: &CancellationSignal,
) -> DeviceResult<PollOutcome> {
    let start = Instant::now();
    let mut polls = 0u32;
    let mut last_status = None;

    loop {
        polls += 1;
        if !(spec.predicate)().await? {
            trace!(wait = %spec.description, polls, "Predicate cleared");
            return Ok(PollOutcome {
                stopped: StopReason::Predicate,
                elapsed: start.elapsed(),
                polls,
                last_status,
            });
        }

        sleep(spec.interval).await;

        if cancel.is_cancelled() {
            debug!(wait = %spec.description, "Wait cancelled");
            return Ok(PollOutcome {
                stopped: StopReason::Cancelled,
                elapsed: start.elapsed(),
                polls,
                last_status,
            });
        }

        let elapsed = start.elapsed();
        if elapsed >= spec.timeout {
            debug!(wait = %spec.description, ?elapsed, "Wait timed out");
            return Ok(PollOutcome {
                stopped: StopReason::Timeout,
                elapsed,
                polls,
                last_status,
            });
        }

        if let Some(progress) = spec.progress.as_mut() {
            let status = progress().await;
            debug!(wait = %spec.description, elapsed_ms = elapsed.as_millis() as u64, "{}", status);
            last_status = Some(status);
        }
    }
}
