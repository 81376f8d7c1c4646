//! CoverCalibrator suite
//!
//! The cover and the calibrator are tested independently. When
//! `CoverState` or `CalibratorState` reads `NotPresent`, every member of that
//! half must raise NotImplemented.

use super::{
    Capability, CapabilityFlags, DeviceSuite, Judgement, Monitor, PerformanceCheck, PropertyCheck,
    RunContext, Sequencer,
};
use crate::conformance::{Predicate, RequirementPolicy, Verdict};
use crate::hardware::{CalibratorStatus, CoverCalibrator, CoverStatus, DeviceCategory, Value};
use async_trait::async_trait;
use futures::{FutureExt, TryFutureExt};
use std::time::Duration;

const CONNECTED: &[Capability] = &[Capability::Connected];
const COVER: &[Capability] = &[Capability::Connected, Capability::CoverPresent];
const CALIBRATOR: &[Capability] = &[Capability::Connected, Capability::CalibratorPresent];
const BRIGHTNESS_OK: &[Capability] = &[
    Capability::Connected,
    Capability::CalibratorPresent,
    Capability::MaxBrightnessOk,
];

/// HaltCover interrupts a cover operation after this long.
const HALT_DELAY: Duration = Duration::from_millis(500);

/// Checks for [`CoverCalibrator`] drivers.
pub struct CoverCalibratorSuite;

fn cover_policy(flags: &CapabilityFlags) -> RequirementPolicy {
    RequirementPolicy::when(
        flags.value(Capability::CoverPresent),
        RequirementPolicy::Mandatory,
        RequirementPolicy::MustNotBeImplemented,
    )
}

fn calibrator_policy(flags: &CapabilityFlags) -> RequirementPolicy {
    RequirementPolicy::when(
        flags.value(Capability::CalibratorPresent),
        RequirementPolicy::Mandatory,
        RequirementPolicy::MustNotBeImplemented,
    )
}

fn cover_state(value: &Value, _: &RunContext) -> Judgement {
    let state = value.as_enum().unwrap_or("Unknown");
    Judgement::ok(state).with_flag(state != CoverStatus::NotPresent.as_str())
}

fn calibrator_state(value: &Value, _: &RunContext) -> Judgement {
    let state = value.as_enum().unwrap_or("Unknown");
    Judgement::ok(state).with_flag(state != CalibratorStatus::NotPresent.as_str())
}

fn max_brightness(value: &Value, _: &RunContext) -> Judgement {
    match value.as_i64() {
        Some(max) if max >= 1 => Judgement::ok(format!("{}", max)),
        _ => Judgement::issue(format!("MaxBrightness must be 1 or greater, got {}", value)),
    }
}

fn brightness(value: &Value, context: &RunContext) -> Judgement {
    let level = value.as_i64().unwrap_or(-1);
    let max = context.reading("MaxBrightness").and_then(Value::as_i64);
    match max {
        Some(max) if !(0..=max).contains(&level) => Judgement::issue(format!(
            "Brightness {} is outside [0, {}]",
            level, max
        )),
        _ if level < 0 => Judgement::issue(format!("Brightness {} is negative", value)),
        _ => Judgement::ok(format!("{}", level)),
    }
}

fn cover_moving(device: &dyn CoverCalibrator) -> Predicate<'_> {
    Box::new(move || {
        device
            .cover_state()
            .map_ok(|state| state == CoverStatus::Moving)
            .boxed()
    })
}

fn calibrator_not_ready(device: &dyn CoverCalibrator) -> Predicate<'_> {
    Box::new(move || {
        device
            .calibrator_state()
            .map_ok(|state| state == CalibratorStatus::NotReady)
            .boxed()
    })
}

/// Brightness levels exercised by `CalibratorOn`.
fn brightness_levels(max: i32) -> Vec<i32> {
    let mut levels = vec![0, max / 2, max];
    levels.dedup();
    levels
}

#[async_trait]
impl DeviceSuite for CoverCalibratorSuite {
    type Device = dyn CoverCalibrator;

    const CATEGORY: DeviceCategory = DeviceCategory::CoverCalibrator;

    fn properties() -> Vec<PropertyCheck<dyn CoverCalibrator>> {
        vec![
            PropertyCheck {
                member: "CalibratorState",
                requires: CONNECTED,
                policy: |_| RequirementPolicy::Mandatory,
                read: |d| {
                    d.calibrator_state()
                        .map_ok(|state| Value::Enum(state.as_str()))
                        .boxed()
                },
                judge: calibrator_state,
                produces: Some(Capability::CalibratorPresent),
            },
            PropertyCheck {
                member: "CoverState",
                requires: CONNECTED,
                policy: |_| RequirementPolicy::Mandatory,
                read: |d| {
                    d.cover_state()
                        .map_ok(|state| Value::Enum(state.as_str()))
                        .boxed()
                },
                judge: cover_state,
                produces: Some(Capability::CoverPresent),
            },
            PropertyCheck {
                member: "MaxBrightness",
                requires: CALIBRATOR,
                policy: calibrator_policy,
                read: |d| d.max_brightness().map_ok(Value::from).boxed(),
                judge: max_brightness,
                produces: Some(Capability::MaxBrightnessOk),
            },
            PropertyCheck {
                member: "Brightness",
                requires: CALIBRATOR,
                policy: calibrator_policy,
                read: |d| d.brightness().map_ok(Value::from).boxed(),
                judge: brightness,
                produces: None,
            },
        ]
    }

    async fn methods(seq: &mut Sequencer<'_, dyn CoverCalibrator>) {
        open_cover(seq).await;
        halt_cover(seq).await;
        close_cover(seq).await;
        calibrator_on(seq).await;
        calibrator_off(seq).await;
    }

    fn performance_checks() -> Vec<PerformanceCheck<dyn CoverCalibrator>> {
        vec![
            PerformanceCheck {
                member: "CoverState",
                requires: CONNECTED,
                read: |d| {
                    d.cover_state()
                        .map_ok(|state| Value::Enum(state.as_str()))
                        .boxed()
                },
            },
            PerformanceCheck {
                member: "CalibratorState",
                requires: CONNECTED,
                read: |d| {
                    d.calibrator_state()
                        .map_ok(|state| Value::Enum(state.as_str()))
                        .boxed()
                },
            },
            PerformanceCheck {
                member: "Brightness",
                requires: CALIBRATOR,
                read: |d| d.brightness().map_ok(Value::from).boxed(),
            },
        ]
    }
}

async fn open_cover(seq: &mut Sequencer<'_, dyn CoverCalibrator>) {
    move_cover(seq, "OpenCover", CoverStatus::Open).await;
}

async fn close_cover(seq: &mut Sequencer<'_, dyn CoverCalibrator>) {
    move_cover(seq, "CloseCover", CoverStatus::Closed).await;
}

async fn move_cover(seq: &mut Sequencer<'_, dyn CoverCalibrator>, member: &str, target: CoverStatus) {
    if !seq.begin(member, member, COVER) {
        return;
    }
    let device = seq.device();
    let policy = cover_policy(seq.flags());
    let call = match target {
        CoverStatus::Open => device.open_cover(),
        _ => device.close_cover(),
    };

    if policy == RequirementPolicy::MustNotBeImplemented {
        seq.invoke(member, member, policy, call).await;
        return;
    }

    let monitor =
        Monitor::new(cover_moving(device), seq.operation_wait()).with_halt(device.halt_cover());
    let Some(completion) = seq.command(member, member, policy, call, monitor).await else {
        return;
    };
    if completion.settled() {
        seq.verify_state(
            &format!("{} CoverState", member),
            "CoverState",
            target,
            device.cover_state(),
        )
        .await;
    }
}

/// Start closing the cover, interrupt it, and confirm it stopped.
async fn halt_cover(seq: &mut Sequencer<'_, dyn CoverCalibrator>) {
    let check = "HaltCover";
    if !seq.begin(check, check, COVER) {
        return;
    }
    let device = seq.device();
    if cover_policy(seq.flags()) == RequirementPolicy::MustNotBeImplemented {
        seq.invoke(
            check,
            check,
            RequirementPolicy::MustNotBeImplemented,
            device.halt_cover(),
        )
        .await;
        return;
    }

    if seq
        .invoke_quietly(check, "CloseCover", RequirementPolicy::Mandatory, device.close_cover())
        .await
        .is_none()
    {
        return;
    }
    tokio::time::sleep(HALT_DELAY).await;

    let halted = seq
        .invoke(check, check, RequirementPolicy::Optional, device.halt_cover())
        .await
        .is_some();
    if !halted {
        let wait = seq.operation_wait();
        seq.wait_until_idle(check, "CoverState", cover_moving(device), wait)
            .await;
        return;
    }

    let Some(state) = seq
        .invoke_quietly(check, "CoverState", RequirementPolicy::Mandatory, device.cover_state())
        .await
    else {
        return;
    };
    if state == CoverStatus::Moving {
        seq.emit(
            "HaltCover CoverState",
            "CoverState",
            Verdict::Issue,
            "CoverState still reports Moving after HaltCover",
        );
    } else {
        seq.emit(
            "HaltCover CoverState",
            "CoverState",
            Verdict::Ok,
            format!("cover stopped, CoverState is {}", state.as_str()),
        );
    }
}

async fn calibrator_on(seq: &mut Sequencer<'_, dyn CoverCalibrator>) {
    let check = "CalibratorOn";
    let device = seq.device();

    if seq.flags().get(Capability::CalibratorPresent) == Some(false) {
        if seq.begin(check, check, CALIBRATOR) {
            seq.invoke(
                check,
                check,
                RequirementPolicy::MustNotBeImplemented,
                device.calibrator_on(0),
            )
            .await;
        }
        return;
    }

    if !seq.begin(check, check, BRIGHTNESS_OK) {
        return;
    }
    let max = seq
        .context()
        .reading("MaxBrightness")
        .and_then(Value::as_i64)
        .and_then(|max| i32::try_from(max).ok())
        .unwrap_or(1);

    for level in brightness_levels(max) {
        if seq.is_cancelled() {
            return;
        }
        let step = format!("CalibratorOn {}", level);
        let monitor = Monitor::new(calibrator_not_ready(device), seq.calibrator_wait());
        let Some(completion) = seq
            .command(
                &step,
                check,
                RequirementPolicy::Mandatory,
                device.calibrator_on(level),
                monitor,
            )
            .await
        else {
            continue;
        };
        if !completion.settled() {
            continue;
        }
        seq.verify_state(
            &format!("{} CalibratorState", step),
            "CalibratorState",
            CalibratorStatus::Ready,
            device.calibrator_state(),
        )
        .await;
        seq.verify_state(
            &format!("{} Brightness", step),
            "Brightness",
            level,
            device.brightness(),
        )
        .await;
    }

    for level in [-1, max.saturating_add(1)] {
        if seq.is_cancelled() {
            return;
        }
        let step = format!("CalibratorOn {} (invalid)", level);
        seq.invoke_expecting_invalid(&step, check, level, device.calibrator_on(level))
            .await;
    }
}

async fn calibrator_off(seq: &mut Sequencer<'_, dyn CoverCalibrator>) {
    let check = "CalibratorOff";
    if !seq.begin(check, check, CALIBRATOR) {
        return;
    }
    let device = seq.device();
    let policy = calibrator_policy(seq.flags());
    if policy == RequirementPolicy::MustNotBeImplemented {
        seq.invoke(check, check, policy, device.calibrator_off())
            .await;
        return;
    }

    let monitor = Monitor::new(calibrator_not_ready(device), seq.calibrator_wait());
    let Some(completion) = seq
        .command(check, check, policy, device.calibrator_off(), monitor)
        .await
    else {
        return;
    };
    if completion.settled() {
        seq.verify_state(
            "CalibratorOff CalibratorState",
            "CalibratorState",
            CalibratorStatus::Off,
            device.calibrator_state(),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brightness_levels() {
        assert_eq!(brightness_levels(100), vec![0, 50, 100]);
        assert_eq!(brightness_levels(1), vec![0, 1]);
    }

    #[test]
    fn test_state_judges_set_presence() {
        let context = RunContext::default();
        let absent = cover_state(&Value::Enum("NotPresent"), &context);
        assert_eq!(absent.flag, Some(false));
        let present = calibrator_state(&Value::Enum("Off"), &context);
        assert_eq!(present.flag, Some(true));
        assert_eq!(present.verdict, Verdict::Ok);
    }

    #[test]
    fn test_brightness_range() {
        let mut context = RunContext::default();
        context.readings.insert("MaxBrightness", Value::Int(100));
        assert_eq!(brightness(&Value::Int(100), &context).verdict, Verdict::Ok);
        assert_eq!(brightness(&Value::Int(101), &context).verdict, Verdict::Issue);
        assert_eq!(max_brightness(&Value::Int(0), &context).verdict, Verdict::Issue);
    }
}
