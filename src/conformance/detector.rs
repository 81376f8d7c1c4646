//! Synchronous versus asynchronous command completion.
//!
//! The interfaces under test allow either convention for motion commands:
//! return when done, or return at once and expose a busy indicator. The
//! harness discovers which one a driver uses by timing the call:
//!
//! - returned after more than the threshold: tentatively synchronous, but the
//!   busy indicator must already read false;
//! - returned within the threshold: asynchronous, wait out the busy
//!   indicator with the bounded poller.
//!
//! If the busy indicator cannot be read at all, completion is assumed to be
//! synchronous since no further waiting is possible.

use super::poller::{poll_until_false, PollSpec, Predicate, ProgressReader, StopReason};
use super::{CancellationSignal, Verdict};
use crate::hardware::{DeviceError, DeviceResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Protocol-level default for the sync/async threshold.
pub const DEFAULT_ASYNC_THRESHOLD: Duration = Duration::from_millis(1000);

/// How one command invocation completed, judged by elapsed time alone.
///
/// Consumed by the step that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncDetection {
    pub is_asynchronous: bool,
    pub elapsed_at_return: Duration,
}

impl AsyncDetection {
    pub fn from_elapsed(elapsed: Duration, threshold: Duration) -> Self {
        Self {
            is_asynchronous: elapsed <= threshold,
            elapsed_at_return: elapsed,
        }
    }
}

/// Invoke `command`, timing how long it takes to return.
///
/// # Errors
/// Returns the command's own error untouched so the caller can classify it.
pub async fn invoke_and_classify<T, F>(
    command: F,
    threshold: Duration,
) -> DeviceResult<(T, AsyncDetection)>
where
    F: Future<Output = DeviceResult<T>>,
{
    let start = Instant::now();
    let value = command.await?;
    let detection = AsyncDetection::from_elapsed(start.elapsed(), threshold);
    debug!(
        elapsed_ms = detection.elapsed_at_return.as_millis() as u64,
        asynchronous = detection.is_asynchronous,
        "Command returned"
    );
    Ok((value, detection))
}

/// Poll interval and timeout for waiting out a busy indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

/// How a command finished, once the busy indicator has been consulted.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Returned after the threshold and was no longer busy.
    Synchronous { elapsed: Duration },
    /// Returned after the threshold but still reported busy; waited until it cleared.
    SynchronousStillBusy { waited: Duration },
    /// Returned quickly; busy cleared after `waited`.
    Asynchronous { waited: Duration },
    /// Still busy when the wait timed out.
    TimedOut { waited: Duration },
    Cancelled,
    /// No usable busy indicator; completion assumed synchronous.
    BusyUnreadable { error: Option<DeviceError> },
}

impl Completion {
    /// Whether the device can be assumed to be at rest.
    pub fn settled(&self) -> bool {
        !matches!(self, Completion::TimedOut { .. } | Completion::Cancelled)
    }

    /// Verdict for the completion itself, independent of where the device ended up.
    pub fn verdict(&self) -> Verdict {
        match self {
            Completion::Synchronous { .. } | Completion::Asynchronous { .. } => Verdict::Ok,
            Completion::BusyUnreadable { .. } | Completion::Cancelled => Verdict::Info,
            Completion::SynchronousStillBusy { .. } | Completion::TimedOut { .. } => Verdict::Issue,
        }
    }

    pub fn describe(&self, member: &str) -> String {
        match self {
            Completion::Synchronous { elapsed } => format!(
                "{} completed synchronously in {:.1}s",
                member,
                elapsed.as_secs_f64()
            ),
            Completion::SynchronousStillBusy { waited } => format!(
                "{} returned as a synchronous call but the device still reported busy \
                 (settled {:.1}s later)",
                member,
                waited.as_secs_f64()
            ),
            Completion::Asynchronous { waited } => format!(
                "{} completed asynchronously in {:.1}s",
                member,
                waited.as_secs_f64()
            ),
            Completion::TimedOut { waited } => format!(
                "{} did not complete within {:.1}s",
                member,
                waited.as_secs_f64()
            ),
            Completion::Cancelled => format!("{} wait cancelled", member),
            Completion::BusyUnreadable { error: Some(err) } => format!(
                "{}: busy indicator could not be read ({}), assuming synchronous completion",
                member, err
            ),
            Completion::BusyUnreadable { error: None } => format!(
                "{}: no busy indicator available, assuming synchronous completion",
                member
            ),
        }
    }
}

/// Wait for a command to finish according to how it was detected.
pub async fn await_completion<'a>(
    member: &str,
    detection: AsyncDetection,
    busy: Option<Predicate<'a>>,
    progress: Option<ProgressReader<'a>>,
    wait: WaitSettings,
    cancel: &CancellationSignal,
) -> Completion {
    let Some(mut busy) = busy else {
        return Completion::BusyUnreadable { error: None };
    };

    let mut still_busy = false;
    if !detection.is_asynchronous {
        match busy().await {
            Ok(false) => {
                return Completion::Synchronous {
                    elapsed: detection.elapsed_at_return,
                }
            }
            Ok(true) => still_busy = true,
            Err(error) => return Completion::BusyUnreadable { error: Some(error) },
        }
    }

    let spec = PollSpec::from_predicate(format!("{} completion", member), busy)
        .interval(wait.interval)
        .timeout(wait.timeout)
        .with_progress(progress);

    match poll_until_false(spec, cancel).await {
        Ok(outcome) => match outcome.stopped {
            StopReason::Predicate if still_busy => Completion::SynchronousStillBusy {
                waited: outcome.elapsed,
            },
            StopReason::Predicate => Completion::Asynchronous {
                waited: outcome.elapsed,
            },
            StopReason::Timeout => Completion::TimedOut {
                waited: outcome.elapsed,
            },
            StopReason::Cancelled => Completion::Cancelled,
        },
        Err(error) => Completion::BusyUnreadable { error: Some(error) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    const WAIT: WaitSettings = WaitSettings {
        interval: Duration::from_millis(100),
        timeout: Duration::from_secs(5),
    };

    fn busy_for(polls: u32) -> Predicate<'static> {
        let calls = Arc::new(AtomicU32::new(0));
        Box::new(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(n < polls) }.boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_return_is_asynchronous() {
        let command = async {
            sleep(Duration::from_millis(50)).await;
            Ok(())
        };
        let ((), detection) = invoke_and_classify(command, DEFAULT_ASYNC_THRESHOLD)
            .await
            .unwrap();
        assert!(detection.is_asynchronous);
        assert_eq!(detection.elapsed_at_return, Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_return_is_synchronous() {
        let command = async {
            sleep(Duration::from_millis(1500)).await;
            Ok(7)
        };
        let (value, detection) = invoke_and_classify(command, DEFAULT_ASYNC_THRESHOLD)
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert!(!detection.is_asynchronous);
    }

    #[test]
    fn test_threshold_is_inclusive_for_asynchronous() {
        let threshold = Duration::from_millis(1000);
        assert!(AsyncDetection::from_elapsed(threshold, threshold).is_asynchronous);
        assert!(
            !AsyncDetection::from_elapsed(threshold + Duration::from_millis(1), threshold)
                .is_asynchronous
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_error_is_returned() {
        let command = async { Err::<(), _>(DeviceError::invalid_value("405 degrees")) };
        let err = invoke_and_classify(command, DEFAULT_ASYNC_THRESHOLD)
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::hardware::ErrorKind::InvalidValue);
    }

    #[tokio::test(start_paused = true)]
    async fn test_asynchronous_waits_for_busy_to_clear() {
        let cancel = CancellationSignal::new();
        let detection = AsyncDetection::from_elapsed(Duration::from_millis(5), DEFAULT_ASYNC_THRESHOLD);

        let completion =
            await_completion("Move", detection, Some(busy_for(3)), None, WAIT, &cancel).await;
        assert_eq!(
            completion,
            Completion::Asynchronous {
                waited: Duration::from_millis(300)
            }
        );
        assert_eq!(completion.verdict(), Verdict::Ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synchronous_idle() {
        let cancel = CancellationSignal::new();
        let detection = AsyncDetection::from_elapsed(Duration::from_secs(2), DEFAULT_ASYNC_THRESHOLD);

        let completion =
            await_completion("Move", detection, Some(busy_for(0)), None, WAIT, &cancel).await;
        assert_eq!(
            completion,
            Completion::Synchronous {
                elapsed: Duration::from_secs(2)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_synchronous_but_still_busy_is_an_issue() {
        let cancel = CancellationSignal::new();
        let detection = AsyncDetection::from_elapsed(Duration::from_secs(2), DEFAULT_ASYNC_THRESHOLD);

        let completion =
            await_completion("Move", detection, Some(busy_for(2)), None, WAIT, &cancel).await;
        assert!(matches!(completion, Completion::SynchronousStillBusy { .. }));
        assert_eq!(completion.verdict(), Verdict::Issue);
        assert!(completion.settled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_busy_indicator_assumes_synchronous() {
        let cancel = CancellationSignal::new();
        let detection = AsyncDetection::from_elapsed(Duration::from_millis(5), DEFAULT_ASYNC_THRESHOLD);

        let completion = await_completion("Move", detection, None, None, WAIT, &cancel).await;
        assert_eq!(completion, Completion::BusyUnreadable { error: None });
        assert!(completion.settled());
        assert_eq!(completion.verdict(), Verdict::Info);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_busy_indicator_assumes_synchronous() {
        let cancel = CancellationSignal::new();
        let detection = AsyncDetection::from_elapsed(Duration::from_secs(2), DEFAULT_ASYNC_THRESHOLD);
        let busy: Predicate<'static> =
            Box::new(|| async { Err(DeviceError::not_implemented("IsMoving")) }.boxed());

        let completion = await_completion("Move", detection, Some(busy), None, WAIT, &cancel).await;
        assert!(matches!(
            completion,
            Completion::BusyUnreadable { error: Some(_) }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_settles_times_out() {
        let cancel = CancellationSignal::new();
        let detection = AsyncDetection::from_elapsed(Duration::ZERO, DEFAULT_ASYNC_THRESHOLD);

        let completion = await_completion(
            "Move",
            detection,
            Some(busy_for(u32::MAX)),
            None,
            WAIT,
            &cancel,
        )
        .await;
        assert_eq!(
            completion,
            Completion::TimedOut {
                waited: Duration::from_secs(5)
            }
        );
        assert!(!completion.settled());
        assert_eq!(completion.verdict(), Verdict::Issue);
    }
}
