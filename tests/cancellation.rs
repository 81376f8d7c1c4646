//! Cancelling a run part way through.

#[macro_use]
mod common;

use async_trait::async_trait;
use common::{assert_duration_near, run_suite, settings, TimingTolerance};
use rust_conform::conformance::CancellationSignal;
use rust_conform::hardware::mock::{FocuserSimulator, RotatorSimulator, RotatorSimulatorConfig};
use rust_conform::hardware::{DeviceCategory, DeviceResult, Focuser};
use rust_conform::sequencer::{FocuserSuite, RotatorSuite, SequencerState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[tokio::test(start_paused = true)]
async fn test_cancel_before_start_runs_nothing() {
    let device = RotatorSimulator::default();
    let cancel = CancellationSignal::new();
    cancel.cancel();

    let (summary, report) =
        run_suite::<RotatorSuite>(&device, settings(DeviceCategory::Rotator), &cancel).await;

    assert!(summary.cancelled);
    assert!(!summary.is_conformant());
    assert_eq!(summary.state, SequencerState::Done);
    assert_eq!(summary.checks_run, 0);
    assert!(report.records.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_wait_stops_promptly() {
    // A stalled rotator holds the sequencer in its first completion wait
    let device = RotatorSimulator::new(RotatorSimulatorConfig {
        stall: true,
        ..Default::default()
    });
    let cancel = CancellationSignal::new();
    let trigger = cancel.clone();
    let cancel_after = Duration::from_secs(20);

    let started = Instant::now();
    let ((summary, report), ()) = tokio::join!(
        run_suite::<RotatorSuite>(&device, settings(DeviceCategory::Rotator), &cancel),
        async move {
            sleep(cancel_after).await;
            trigger.cancel();
        }
    );

    assert_duration_near(
        started.elapsed(),
        cancel_after,
        TimingTolerance::Normal,
        "run should end soon after cancellation",
    );
    assert!(summary.cancelled);
    assert_eq!(summary.state, SequencerState::Done);

    // Properties and the early method checks were recorded
    assert!(report.find("Position").is_some());
    assert!(report.find("Halt").is_some());
    // The interrupted wait records nothing and later checks never start
    assert!(report.find("MoveAbsolute 45").is_none());
    assert!(report.find("MoveAbsolute 135").is_none());
    assert!(report.find("Sync").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_performance_sampling() {
    let device = RotatorSimulator::default();
    let mut settings = settings(DeviceCategory::Rotator);
    settings.run_methods = false;
    settings.run_performance = true;
    settings.performance_window = Duration::from_secs(60);
    let cancel = CancellationSignal::new();
    let trigger = cancel.clone();

    let ((summary, report), ()) = tokio::join!(
        run_suite::<RotatorSuite>(&device, settings, &cancel),
        async move {
            sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        }
    );

    assert!(summary.cancelled);
    assert!(report.find("Position Performance").is_none());
    assert!(report.find("IsMoving Performance").is_none());
}

/// Counts `Move` commands and cancels the run on the first `Position` read
/// made at rest after the second move.
struct CancelAfterSecondMove {
    inner: FocuserSimulator,
    cancel: CancellationSignal,
    moves: AtomicUsize,
}

delegate_device!(CancelAfterSecondMove);

#[async_trait]
impl Focuser for CancelAfterSecondMove {
    async fn absolute(&self) -> DeviceResult<bool> {
        self.inner.absolute().await
    }
    async fn is_moving(&self) -> DeviceResult<bool> {
        self.inner.is_moving().await
    }
    async fn max_step(&self) -> DeviceResult<i32> {
        self.inner.max_step().await
    }
    async fn max_increment(&self) -> DeviceResult<i32> {
        self.inner.max_increment().await
    }
    async fn position(&self) -> DeviceResult<i32> {
        let position = self.inner.position().await?;
        if self.moves.load(Ordering::SeqCst) >= 2 && !self.inner.is_moving().await? {
            self.cancel.cancel();
        }
        Ok(position)
    }
    async fn step_size(&self) -> DeviceResult<f64> {
        self.inner.step_size().await
    }
    async fn temp_comp_available(&self) -> DeviceResult<bool> {
        self.inner.temp_comp_available().await
    }
    async fn temp_comp(&self) -> DeviceResult<bool> {
        self.inner.temp_comp().await
    }
    async fn set_temp_comp(&self, enabled: bool) -> DeviceResult<()> {
        self.inner.set_temp_comp(enabled).await
    }
    async fn temperature(&self) -> DeviceResult<f64> {
        self.inner.temperature().await
    }
    async fn halt(&self) -> DeviceResult<()> {
        self.inner.halt().await
    }
    async fn move_to(&self, position: i32) -> DeviceResult<()> {
        self.moves.fetch_add(1, Ordering::SeqCst);
        self.inner.move_to(position).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_between_focuser_legs_skips_return_move() {
    let cancel = CancellationSignal::new();
    // First move belongs to Halt, second is the outbound leg
    let device = CancelAfterSecondMove {
        inner: FocuserSimulator::default(),
        cancel: cancel.clone(),
        moves: AtomicUsize::new(0),
    };

    let (summary, report) =
        run_suite::<FocuserSuite>(&device, settings(DeviceCategory::Focuser), &cancel).await;

    assert!(summary.cancelled);
    assert_eq!(summary.state, SequencerState::Done);
    assert!(report.find("Move Out").is_some());
    assert!(report.find("Move Back").is_none());
    assert_eq!(device.moves.load(Ordering::SeqCst), 2);
}
