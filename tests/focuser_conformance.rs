//! End-to-end focuser runs against the simulator and a faulty driver.

#[macro_use]
mod common;

use async_trait::async_trait;
use common::{failures, run_suite, settings, verdict_of};
use rust_conform::conformance::{CancellationSignal, Verdict};
use rust_conform::hardware::mock::{CompletionMode, FocuserSimulator, FocuserSimulatorConfig};
use rust_conform::hardware::{DeviceCategory, DeviceError, DeviceResult, Focuser};
use rust_conform::sequencer::{FocuserSuite, SequencerState};

#[tokio::test(start_paused = true)]
async fn test_absolute_focuser_is_conformant() {
    let device = FocuserSimulator::new(FocuserSimulatorConfig::default());
    let cancel = CancellationSignal::new();
    let (summary, report) =
        run_suite::<FocuserSuite>(&device, settings(DeviceCategory::Focuser), &cancel).await;

    assert_eq!(summary.state, SequencerState::Done);
    assert!(summary.is_conformant(), "unexpected failures:\n{}", failures(&report));
    assert_eq!(verdict_of(&report, "Position"), Verdict::Ok);
    assert_eq!(verdict_of(&report, "TempComp Write"), Verdict::Ok);
    assert_eq!(verdict_of(&report, "TempComp Read Back"), Verdict::Ok);
    assert_eq!(verdict_of(&report, "Halt"), Verdict::Ok);
    assert_eq!(verdict_of(&report, "Move Out"), Verdict::Ok);
    assert_eq!(verdict_of(&report, "Move Out Position"), Verdict::Ok);
    assert_eq!(verdict_of(&report, "Move Back Position"), Verdict::Ok);
}

#[tokio::test(start_paused = true)]
async fn test_synchronous_focuser_is_conformant() {
    let device = FocuserSimulator::new(FocuserSimulatorConfig {
        completion: CompletionMode::Synchronous,
        ..Default::default()
    });
    let cancel = CancellationSignal::new();
    let (summary, report) =
        run_suite::<FocuserSuite>(&device, settings(DeviceCategory::Focuser), &cancel).await;

    assert!(summary.is_conformant(), "unexpected failures:\n{}", failures(&report));
    assert!(report
        .find("Move Out")
        .unwrap()
        .message
        .contains("synchronously"));
}

#[tokio::test(start_paused = true)]
async fn test_relative_focuser_must_not_report_position() {
    let device = FocuserSimulator::new(FocuserSimulatorConfig {
        absolute: false,
        max_increment: 1_000,
        ..Default::default()
    });
    let cancel = CancellationSignal::new();
    let (summary, report) =
        run_suite::<FocuserSuite>(&device, settings(DeviceCategory::Focuser), &cancel).await;

    assert!(summary.is_conformant(), "unexpected failures:\n{}", failures(&report));
    assert_eq!(verdict_of(&report, "Position"), Verdict::Ok);
    assert!(report
        .find("Position")
        .unwrap()
        .message
        .contains("correctly reports NotImplemented"));
    // Relative moves complete but have no position to verify
    assert_eq!(verdict_of(&report, "Move Out"), Verdict::Ok);
    assert!(report.find("Move Out Position").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_temp_comp_unavailable_rejects_write() {
    let device = FocuserSimulator::new(FocuserSimulatorConfig {
        temp_comp_available: false,
        temperature: None,
        ..Default::default()
    });
    let cancel = CancellationSignal::new();
    let (summary, report) =
        run_suite::<FocuserSuite>(&device, settings(DeviceCategory::Focuser), &cancel).await;

    assert!(summary.is_conformant(), "unexpected failures:\n{}", failures(&report));
    assert_eq!(verdict_of(&report, "TempComp Write"), Verdict::Ok);
    assert!(report.find("TempComp Read Back").is_none());
    assert_eq!(verdict_of(&report, "Temperature"), Verdict::Ok);
}

#[tokio::test(start_paused = true)]
async fn test_max_increment_above_max_step_is_an_issue() {
    let device = FocuserSimulator::new(FocuserSimulatorConfig {
        max_step: 10_000,
        max_increment: 20_000,
        initial_position: 5_000,
        ..Default::default()
    });
    let cancel = CancellationSignal::new();
    let (summary, report) =
        run_suite::<FocuserSuite>(&device, settings(DeviceCategory::Focuser), &cancel).await;

    assert_eq!(verdict_of(&report, "MaxIncrement"), Verdict::Issue);
    assert!(!summary.is_conformant());
}

#[tokio::test(start_paused = true)]
async fn test_landing_error_on_exact_band_is_an_issue() {
    let device = FocuserSimulator::new(FocuserSimulatorConfig {
        landing_error: 3,
        ..Default::default()
    });
    let cancel = CancellationSignal::new();
    let (_, report) =
        run_suite::<FocuserSuite>(&device, settings(DeviceCategory::Focuser), &cancel).await;

    // 3 steps is past the ok band of 0 but inside the info band of 10
    assert_eq!(verdict_of(&report, "Move Out Position"), Verdict::Info);
}

/// Delegates to a simulator but fails `MaxStep` with an unclassified error.
struct BrokenMaxStep {
    inner: FocuserSimulator,
}

delegate_device!(BrokenMaxStep);

#[async_trait]
impl Focuser for BrokenMaxStep {
    async fn absolute(&self) -> DeviceResult<bool> {
        self.inner.absolute().await
    }
    async fn is_moving(&self) -> DeviceResult<bool> {
        self.inner.is_moving().await
    }
    async fn max_step(&self) -> DeviceResult<i32> {
        Err(DeviceError::other("encoder offline"))
    }
    async fn max_increment(&self) -> DeviceResult<i32> {
        self.inner.max_increment().await
    }
    async fn position(&self) -> DeviceResult<i32> {
        self.inner.position().await
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
        self.inner.move_to(position).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_prerequisite_skips_dependent_checks() {
    let device = BrokenMaxStep {
        inner: FocuserSimulator::default(),
    };
    let cancel = CancellationSignal::new();
    let (summary, report) =
        run_suite::<FocuserSuite>(&device, settings(DeviceCategory::Focuser), &cancel).await;

    assert_eq!(verdict_of(&report, "MaxStep"), Verdict::Error);
    assert!(report.find("MaxStep").unwrap().message.contains("encoder offline"));

    for check in ["Halt", "Move"] {
        assert_eq!(verdict_of(&report, check), Verdict::Info);
        assert!(report.find(check).unwrap().message.contains("MaxStep"));
    }
    assert!(report.find("Move Out").is_none());
    // Checks that do not need MaxStep still ran
    assert_eq!(verdict_of(&report, "TempComp Write"), Verdict::Ok);
    assert_eq!(summary.counts.error, 1);
    assert_eq!(summary.state, SequencerState::Done);
}
