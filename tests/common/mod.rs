//! Common test utilities for rust_conform integration tests
//!
//! This module provides reusable test helpers for:
//! - Timing assertions with appropriate tolerances
//! - Running a suite against a device and collecting its report
//! - Looking up verdicts by check name

#![allow(dead_code, unused_macros)] // Not every test binary uses every helper

use rust_conform::config::CategorySettings;
use rust_conform::conformance::{CancellationSignal, Verdict};
use rust_conform::hardware::DeviceCategory;
use rust_conform::report::ConformanceReport;
use rust_conform::sequencer::{DeviceSuite, RunSummary};
use std::time::Duration;

/// Tolerance levels for timing assertions.
#[derive(Debug, Clone, Copy)]
pub enum TimingTolerance {
    /// Exact match - only for simulated time with `start_paused = true`
    Exact,
    /// One poll interval either way
    Poll,
    /// 20% tolerance
    Normal,
}

impl TimingTolerance {
    /// Allowed slack around `expected`.
    pub fn slack(&self, expected: Duration) -> Duration {
        match self {
            TimingTolerance::Exact => Duration::ZERO,
            TimingTolerance::Poll => Duration::from_millis(500),
            TimingTolerance::Normal => expected.mul_f64(0.20),
        }
    }
}

/// Assert that a duration is within tolerance of an expected value.
///
/// # Panics
/// Panics if the actual duration is outside the tolerance range.
pub fn assert_duration_near(
    actual: Duration,
    expected: Duration,
    tolerance: TimingTolerance,
    context: &str,
) {
    let slack = tolerance.slack(expected);
    let min = expected.saturating_sub(slack);
    let max = expected + slack;

    assert!(
        actual >= min && actual <= max,
        "{}: expected {:?} +/- {:?}, got {:?} (acceptable range: {:?} to {:?})",
        context,
        expected,
        slack,
        actual,
        min,
        max
    );
}

/// Implement [`Device`](rust_conform::hardware::Device) for a wrapper driver
/// by forwarding every common member to its `inner` simulator.
macro_rules! delegate_device {
    ($wrapper:ty) => {
        #[async_trait::async_trait]
        impl rust_conform::hardware::Device for $wrapper {
            async fn connected(&self) -> rust_conform::hardware::DeviceResult<bool> {
                rust_conform::hardware::Device::connected(&self.inner).await
            }
            async fn set_connected(
                &self,
                connected: bool,
            ) -> rust_conform::hardware::DeviceResult<()> {
                rust_conform::hardware::Device::set_connected(&self.inner, connected).await
            }
            async fn name(&self) -> rust_conform::hardware::DeviceResult<String> {
                rust_conform::hardware::Device::name(&self.inner).await
            }
            async fn description(&self) -> rust_conform::hardware::DeviceResult<String> {
                rust_conform::hardware::Device::description(&self.inner).await
            }
            async fn driver_info(&self) -> rust_conform::hardware::DeviceResult<String> {
                rust_conform::hardware::Device::driver_info(&self.inner).await
            }
            async fn driver_version(&self) -> rust_conform::hardware::DeviceResult<String> {
                rust_conform::hardware::Device::driver_version(&self.inner).await
            }
            async fn interface_version(&self) -> rust_conform::hardware::DeviceResult<i32> {
                rust_conform::hardware::Device::interface_version(&self.inner).await
            }
        }
    };
}

/// Default settings for a category with the method phase on and performance off.
pub fn settings(category: DeviceCategory) -> CategorySettings {
    CategorySettings::defaults(category)
}

/// Run suite `S` against `device` and return the summary and full report.
pub async fn run_suite<S: DeviceSuite>(
    device: &S::Device,
    settings: CategorySettings,
    cancel: &CancellationSignal,
) -> (RunSummary, ConformanceReport) {
    let mut report = ConformanceReport::new();
    let summary = S::run(device, settings, cancel, &mut report).await;
    (summary, report)
}

/// Verdict of the first record with this check name.
///
/// # Panics
/// Panics if no such check was recorded.
pub fn verdict_of(report: &ConformanceReport, check: &str) -> Verdict {
    match report.find(check) {
        Some(record) => record.verdict,
        None => panic!(
            "no record for check '{}'; recorded: {:?}",
            check,
            report.records.iter().map(|r| &r.check).collect::<Vec<_>>()
        ),
    }
}

/// Print every Issue or Error, for diagnosing a failing assertion.
pub fn failures(report: &ConformanceReport) -> String {
    report
        .failures()
        .iter()
        .map(|r| format!("{} {}: {}", r.verdict, r.check, r.message))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_duration_near_passes() {
        let expected = Duration::from_millis(100);
        assert_duration_near(expected, expected, TimingTolerance::Exact, "exact");
        assert_duration_near(
            Duration::from_millis(115),
            expected,
            TimingTolerance::Normal,
            "15% over",
        );
    }

    #[test]
    #[should_panic(expected = "outside tolerance")]
    fn test_assert_duration_near_fails() {
        assert_duration_near(
            Duration::from_millis(130),
            Duration::from_millis(100),
            TimingTolerance::Normal,
            "outside tolerance",
        );
    }
}
