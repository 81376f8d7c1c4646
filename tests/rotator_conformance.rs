//! End-to-end rotator runs against the simulator.

mod common;

use common::{failures, run_suite, settings, verdict_of};
use rust_conform::conformance::{CancellationSignal, Verdict};
use rust_conform::hardware::mock::{CompletionMode, RotatorSimulator, RotatorSimulatorConfig};
use rust_conform::hardware::DeviceCategory;
use rust_conform::sequencer::{RotatorSuite, SequencerState};

fn rotator(config: RotatorSimulatorConfig) -> RotatorSimulator {
    RotatorSimulator::new(config)
}

#[tokio::test(start_paused = true)]
async fn test_well_behaved_rotator_is_conformant() {
    let device = rotator(RotatorSimulatorConfig::default());
    let cancel = CancellationSignal::new();
    let (summary, report) =
        run_suite::<RotatorSuite>(&device, settings(DeviceCategory::Rotator), &cancel).await;

    assert_eq!(summary.state, SequencerState::Done);
    assert!(!summary.cancelled);
    assert!(summary.is_conformant(), "unexpected failures:\n{}", failures(&report));

    assert_eq!(verdict_of(&report, "Connect"), Verdict::Ok);
    assert_eq!(verdict_of(&report, "CanReverse"), Verdict::Ok);
    assert_eq!(verdict_of(&report, "Reverse Write"), Verdict::Ok);
    assert_eq!(verdict_of(&report, "Reverse Read Back"), Verdict::Ok);
    assert_eq!(verdict_of(&report, "MoveAbsolute 45"), Verdict::Ok);
    assert_eq!(verdict_of(&report, "MoveAbsolute 10 Position"), Verdict::Ok);
    assert_eq!(verdict_of(&report, "MoveAbsolute 405 (invalid)"), Verdict::Ok);
    assert_eq!(verdict_of(&report, "Sync Position"), Verdict::Ok);
    assert_eq!(verdict_of(&report, "Sync Restore Position"), Verdict::Ok);
}

#[tokio::test(start_paused = true)]
async fn test_asynchronous_moves_are_detected() {
    let device = rotator(RotatorSimulatorConfig::default());
    let cancel = CancellationSignal::new();
    let (_, report) =
        run_suite::<RotatorSuite>(&device, settings(DeviceCategory::Rotator), &cancel).await;

    let record = report.find("MoveAbsolute 135").unwrap();
    assert!(record.message.contains("asynchronously"), "{}", record.message);
}

#[tokio::test(start_paused = true)]
async fn test_synchronous_moves_are_detected() {
    let device = rotator(RotatorSimulatorConfig {
        completion: CompletionMode::Synchronous,
        ..Default::default()
    });
    let cancel = CancellationSignal::new();
    let (summary, report) =
        run_suite::<RotatorSuite>(&device, settings(DeviceCategory::Rotator), &cancel).await;

    assert!(summary.is_conformant(), "unexpected failures:\n{}", failures(&report));
    let record = report.find("MoveAbsolute 135").unwrap();
    assert!(record.message.contains("synchronously"), "{}", record.message);
}

#[tokio::test(start_paused = true)]
async fn test_reverse_accepted_without_capability_is_an_issue() {
    let device = rotator(RotatorSimulatorConfig {
        can_reverse: false,
        reverse_without_capability: true,
        ..Default::default()
    });
    let cancel = CancellationSignal::new();
    let (summary, report) =
        run_suite::<RotatorSuite>(&device, settings(DeviceCategory::Rotator), &cancel).await;

    assert_eq!(verdict_of(&report, "Reverse Write"), Verdict::Issue);
    assert_eq!(verdict_of(&report, "Reverse"), Verdict::Issue);
    let record = report.find("Reverse Write").unwrap();
    assert!(record.message.contains("capability false but no exception raised"));
    assert!(!summary.is_conformant());
}

#[tokio::test(start_paused = true)]
async fn test_reverse_not_implemented_without_capability_is_ok() {
    let device = rotator(RotatorSimulatorConfig {
        can_reverse: false,
        ..Default::default()
    });
    let cancel = CancellationSignal::new();
    let (summary, report) =
        run_suite::<RotatorSuite>(&device, settings(DeviceCategory::Rotator), &cancel).await;

    assert_eq!(verdict_of(&report, "Reverse Write"), Verdict::Ok);
    assert_eq!(verdict_of(&report, "Reverse"), Verdict::Ok);
    assert!(report.find("Reverse Read Back").is_none());
    assert!(summary.is_conformant(), "unexpected failures:\n{}", failures(&report));
}

#[tokio::test(start_paused = true)]
async fn test_landing_error_graded_by_band() {
    // 1.5 degrees: past the 1.0 ok band, inside the 2.0 info band
    let device = rotator(RotatorSimulatorConfig {
        landing_error: 1.5,
        ..Default::default()
    });
    let cancel = CancellationSignal::new();
    let (_, report) =
        run_suite::<RotatorSuite>(&device, settings(DeviceCategory::Rotator), &cancel).await;
    assert_eq!(verdict_of(&report, "MoveAbsolute 45 Position"), Verdict::Info);
    assert_eq!(verdict_of(&report, "MoveAbsolute 45 TargetPosition"), Verdict::Ok);

    let device = rotator(RotatorSimulatorConfig {
        landing_error: 5.0,
        ..Default::default()
    });
    let (summary, report) =
        run_suite::<RotatorSuite>(&device, settings(DeviceCategory::Rotator), &cancel).await;
    assert_eq!(verdict_of(&report, "MoveAbsolute 45 Position"), Verdict::Issue);
    assert!(!summary.is_conformant());
}

#[tokio::test(start_paused = true)]
async fn test_missing_step_size_is_acceptable() {
    let device = rotator(RotatorSimulatorConfig {
        step_size: None,
        ..Default::default()
    });
    let cancel = CancellationSignal::new();
    let (summary, report) =
        run_suite::<RotatorSuite>(&device, settings(DeviceCategory::Rotator), &cancel).await;

    assert_eq!(verdict_of(&report, "StepSize"), Verdict::Ok);
    assert!(report.find("StepSize").unwrap().message.contains("not implemented"));
    assert!(summary.is_conformant(), "unexpected failures:\n{}", failures(&report));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_rotator_times_out_and_continues() {
    let device = rotator(RotatorSimulatorConfig {
        stall: true,
        ..Default::default()
    });
    let mut settings = settings(DeviceCategory::Rotator);
    settings.operation_timeout = std::time::Duration::from_secs(5);
    let cancel = CancellationSignal::new();
    let (summary, report) = run_suite::<RotatorSuite>(&device, settings, &cancel).await;

    assert_eq!(verdict_of(&report, "MoveAbsolute 45"), Verdict::Issue);
    assert!(report
        .find("MoveAbsolute 45")
        .unwrap()
        .message
        .contains("did not complete"));
    // The timed-out move was halted, so each later move is judged on its own
    assert_eq!(verdict_of(&report, "MoveAbsolute 135"), Verdict::Issue);
    assert!(report
        .find("MoveAbsolute 135")
        .unwrap()
        .message
        .contains("did not complete"));
    assert!(report
        .records
        .iter()
        .all(|r| !r.message.contains("already moving")));
    assert_eq!(summary.counts.error, 0);
    assert_eq!(summary.state, SequencerState::Done);
}

#[tokio::test(start_paused = true)]
async fn test_performance_phase_reports_rates() {
    let device = rotator(RotatorSimulatorConfig::default());
    let mut settings = settings(DeviceCategory::Rotator);
    settings.run_methods = false;
    settings.run_performance = true;
    settings.performance_window = std::time::Duration::from_secs(2);
    let cancel = CancellationSignal::new();
    let (summary, report) = run_suite::<RotatorSuite>(&device, settings, &cancel).await;

    assert_eq!(verdict_of(&report, "Position Performance"), Verdict::Info);
    assert_eq!(verdict_of(&report, "IsMoving Performance"), Verdict::Info);
    assert!(report
        .find("TargetPosition Performance")
        .unwrap()
        .message
        .contains("excellent"));
    assert!(report.find("MoveAbsolute 45").is_none());
    assert!(summary.is_conformant());
}
