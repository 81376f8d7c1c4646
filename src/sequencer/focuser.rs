//! Focuser suite

use super::{
    accept, positive, Capability, CapabilityFlags, DeviceSuite, Judgement, Monitor,
    PerformanceCheck, PropertyCheck, RunContext, Sequencer,
};
use crate::conformance::{Predicate, ProgressReader, RequirementPolicy};
use crate::hardware::{DeviceCategory, Focuser, Value};
use async_trait::async_trait;
use futures::{FutureExt, TryFutureExt};
use std::time::Duration;

const CONNECTED: &[Capability] = &[Capability::Connected];
const ABSOLUTE: &[Capability] = &[Capability::Connected, Capability::Absolute];
const MOTION: &[Capability] = &[Capability::Connected, Capability::Absolute, Capability::MaxStep];
const TEMP_COMP: &[Capability] = &[Capability::Connected, Capability::TempCompAvailable];

/// Upper bound on a test move, in steps.
const MAX_TEST_TRAVEL: i64 = 1_000;
const HALT_DELAY: Duration = Duration::from_millis(300);

/// Checks for [`Focuser`] drivers.
pub struct FocuserSuite;

fn position_policy(flags: &CapabilityFlags) -> RequirementPolicy {
    RequirementPolicy::when(
        flags.value(Capability::Absolute),
        RequirementPolicy::Mandatory,
        RequirementPolicy::MustNotBeImplemented,
    )
}

fn temp_comp_policy(flags: &CapabilityFlags) -> RequirementPolicy {
    RequirementPolicy::when(
        flags.value(Capability::TempCompAvailable),
        RequirementPolicy::Mandatory,
        RequirementPolicy::MustNotBeImplemented,
    )
}

fn at_rest(value: &Value, _: &RunContext) -> Judgement {
    match value.as_bool() {
        Some(false) => Judgement::ok("not moving"),
        _ => Judgement::issue("IsMoving is true before any move was commanded"),
    }
}

fn max_increment(value: &Value, context: &RunContext) -> Judgement {
    let Some(increment) = value.as_i64().filter(|i| *i > 0) else {
        return Judgement::issue(format!("MaxIncrement must be positive, got {}", value));
    };
    match context.reading("MaxStep").and_then(Value::as_i64) {
        Some(max_step) if increment > max_step => Judgement::issue(format!(
            "MaxIncrement {} exceeds MaxStep {}",
            increment, max_step
        )),
        _ => Judgement::ok(format!("{}", increment)),
    }
}

fn within_travel(value: &Value, context: &RunContext) -> Judgement {
    let position = value.as_i64().unwrap_or(-1);
    match context.reading("MaxStep").and_then(Value::as_i64) {
        Some(max_step) if !(0..=max_step).contains(&position) => Judgement::issue(format!(
            "Position {} is outside [0, {}]",
            position, max_step
        )),
        _ if position < 0 => Judgement::issue(format!("Position {} is negative", value)),
        _ => Judgement::ok(format!("{}", position)),
    }
}

fn moving(device: &dyn Focuser) -> Predicate<'_> {
    Box::new(move || device.is_moving())
}

fn position_status(device: &dyn Focuser) -> ProgressReader<'_> {
    Box::new(move || {
        async move {
            match device.position().await {
                Ok(position) => format!("position {}", position),
                Err(err) => format!("position unreadable: {}", err),
            }
        }
        .boxed()
    })
}

fn motion_monitor<'a>(seq: &Sequencer<'a, dyn Focuser>) -> Monitor<'a> {
    let device = seq.device();
    let monitor = Monitor::new(moving(device), seq.operation_wait()).with_halt(device.halt());
    if seq.flags().value(Capability::Absolute) {
        monitor.with_progress(position_status(device))
    } else {
        monitor
    }
}

/// Step count for a test move that stays inside the focuser's travel.
fn test_travel(context: &RunContext) -> i64 {
    let max_step = context
        .reading("MaxStep")
        .and_then(Value::as_i64)
        .unwrap_or(MAX_TEST_TRAVEL);
    let max_increment = context
        .reading("MaxIncrement")
        .and_then(Value::as_i64)
        .unwrap_or(max_step);
    (max_step / 10).min(max_increment).clamp(1, MAX_TEST_TRAVEL)
}

/// An in-range target `travel` steps away from `start`.
fn outbound_target(start: i64, travel: i64, max_step: i64) -> i64 {
    if start + travel <= max_step {
        start + travel
    } else {
        (start - travel).max(0)
    }
}

#[async_trait]
impl DeviceSuite for FocuserSuite {
    type Device = dyn Focuser;

    const CATEGORY: DeviceCategory = DeviceCategory::Focuser;

    fn properties() -> Vec<PropertyCheck<dyn Focuser>> {
        vec![
            PropertyCheck {
                member: "Absolute",
                requires: CONNECTED,
                policy: |_| RequirementPolicy::Mandatory,
                read: |d| d.absolute().map_ok(Value::from).boxed(),
                judge: accept,
                produces: Some(Capability::Absolute),
            },
            PropertyCheck {
                member: "IsMoving",
                requires: CONNECTED,
                policy: |_| RequirementPolicy::Mandatory,
                read: |d| d.is_moving().map_ok(Value::from).boxed(),
                judge: at_rest,
                produces: None,
            },
            PropertyCheck {
                member: "MaxStep",
                requires: CONNECTED,
                policy: |_| RequirementPolicy::Mandatory,
                read: |d| d.max_step().map_ok(Value::from).boxed(),
                judge: positive,
                produces: Some(Capability::MaxStep),
            },
            PropertyCheck {
                member: "MaxIncrement",
                requires: CONNECTED,
                policy: |_| RequirementPolicy::Mandatory,
                read: |d| d.max_increment().map_ok(Value::from).boxed(),
                judge: max_increment,
                produces: None,
            },
            PropertyCheck {
                member: "Position",
                requires: ABSOLUTE,
                policy: position_policy,
                read: |d| d.position().map_ok(Value::from).boxed(),
                judge: within_travel,
                produces: None,
            },
            PropertyCheck {
                member: "StepSize",
                requires: CONNECTED,
                policy: |_| RequirementPolicy::Optional,
                read: |d| d.step_size().map_ok(Value::from).boxed(),
                judge: positive,
                produces: None,
            },
            PropertyCheck {
                member: "TempCompAvailable",
                requires: CONNECTED,
                policy: |_| RequirementPolicy::Mandatory,
                read: |d| d.temp_comp_available().map_ok(Value::from).boxed(),
                judge: accept,
                produces: Some(Capability::TempCompAvailable),
            },
            PropertyCheck {
                member: "TempComp",
                requires: CONNECTED,
                policy: |_| RequirementPolicy::Mandatory,
                read: |d| d.temp_comp().map_ok(Value::from).boxed(),
                judge: accept,
                produces: None,
            },
            PropertyCheck {
                member: "Temperature",
                requires: CONNECTED,
                policy: |_| RequirementPolicy::Optional,
                read: |d| d.temperature().map_ok(Value::from).boxed(),
                judge: accept,
                produces: None,
            },
        ]
    }

    async fn methods(seq: &mut Sequencer<'_, dyn Focuser>) {
        temp_comp_write(seq).await;
        halt(seq).await;
        move_out_and_back(seq).await;
    }

    fn performance_checks() -> Vec<PerformanceCheck<dyn Focuser>> {
        vec![
            PerformanceCheck {
                member: "Position",
                requires: ABSOLUTE,
                read: |d| d.position().map_ok(Value::from).boxed(),
            },
            PerformanceCheck {
                member: "IsMoving",
                requires: CONNECTED,
                read: |d| d.is_moving().map_ok(Value::from).boxed(),
            },
            PerformanceCheck {
                member: "Temperature",
                requires: CONNECTED,
                read: |d| d.temperature().map_ok(Value::from).boxed(),
            },
        ]
    }
}

async fn temp_comp_write(seq: &mut Sequencer<'_, dyn Focuser>) {
    let check = "TempComp Write";
    if !seq.begin(check, "TempComp", TEMP_COMP) {
        return;
    }
    let device = seq.device();
    let policy = temp_comp_policy(seq.flags());

    if policy == RequirementPolicy::MustNotBeImplemented {
        seq.invoke(check, "TempComp", policy, device.set_temp_comp(true))
            .await;
        return;
    }

    let original = seq
        .context()
        .reading("TempComp")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if seq
        .invoke(check, "TempComp", policy, device.set_temp_comp(!original))
        .await
        .is_none()
    {
        return;
    }
    seq.verify_state("TempComp Read Back", "TempComp", !original, device.temp_comp())
        .await;
    seq.invoke_quietly(
        "TempComp Restore",
        "TempComp",
        RequirementPolicy::Mandatory,
        device.set_temp_comp(original),
    )
    .await;
}

async fn halt(seq: &mut Sequencer<'_, dyn Focuser>) {
    let check = "Halt";
    if !seq.begin(check, "Halt", MOTION) {
        return;
    }
    let device = seq.device();
    let travel = test_travel(seq.context());
    let Some(step) = plan_move(seq, check, travel).await else {
        return;
    };
    if seq
        .invoke_quietly(check, "Move", RequirementPolicy::Mandatory, device.move_to(step))
        .await
        .is_none()
    {
        return;
    }
    tokio::time::sleep(HALT_DELAY).await;
    seq.invoke(check, "Halt", RequirementPolicy::Optional, device.halt())
        .await;
    let wait = seq.operation_wait();
    seq.wait_until_idle(check, "IsMoving", moving(device), wait)
        .await;
}

/// The `Move` argument for an outbound move: a target step for absolute
/// focusers, an offset for relative ones.
async fn plan_move(seq: &mut Sequencer<'_, dyn Focuser>, check: &str, travel: i64) -> Option<i32> {
    if !seq.flags().value(Capability::Absolute) {
        return i32::try_from(travel).ok();
    }
    let device = seq.device();
    let start = seq
        .invoke_quietly(check, "Position", RequirementPolicy::Mandatory, device.position())
        .await?;
    let max_step = seq
        .context()
        .reading("MaxStep")
        .and_then(Value::as_i64)
        .unwrap_or(i64::from(start) + travel);
    i32::try_from(outbound_target(i64::from(start), travel, max_step)).ok()
}

/// Move away from the current position and back again.
async fn move_out_and_back(seq: &mut Sequencer<'_, dyn Focuser>) {
    let check = "Move";
    if !seq.begin(check, "Move", MOTION) {
        return;
    }
    let device = seq.device();
    let absolute = seq.flags().value(Capability::Absolute);
    let travel = test_travel(seq.context());

    let start = if absolute {
        match seq
            .invoke_quietly(check, "Position", RequirementPolicy::Mandatory, device.position())
            .await
        {
            Some(position) => Some(position),
            None => return,
        }
    } else {
        None
    };

    let Some(outbound) = plan_move(seq, check, travel).await else {
        return;
    };
    let legs = match start {
        Some(start) => [("Move Out", outbound), ("Move Back", start)],
        None => [("Move Out", outbound), ("Move Back", -outbound)],
    };

    for (leg, argument) in legs {
        if seq.is_cancelled() {
            return;
        }
        let monitor = motion_monitor(seq);
        let Some(completion) = seq
            .command(
                leg,
                "Move",
                RequirementPolicy::Mandatory,
                device.move_to(argument),
                monitor,
            )
            .await
        else {
            return;
        };
        if !completion.settled() {
            return;
        }
        if absolute {
            let band = seq.settings().tolerance;
            let read = device.position().map_ok(f64::from);
            seq.verify_quantity(
                &format!("{} Position", leg),
                "Position",
                f64::from(argument),
                read,
                None,
                band,
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::Verdict;

    fn context_with(max_step: i64, max_increment: i64) -> RunContext {
        let mut context = RunContext::default();
        context.readings.insert("MaxStep", Value::Int(max_step));
        context.readings.insert("MaxIncrement", Value::Int(max_increment));
        context
    }

    #[test]
    fn test_travel_respects_limits() {
        assert_eq!(test_travel(&context_with(50_000, 50_000)), 1_000);
        assert_eq!(test_travel(&context_with(5_000, 50_000)), 500);
        assert_eq!(test_travel(&context_with(50_000, 200)), 200);
        assert_eq!(test_travel(&RunContext::default()), 100);
    }

    #[test]
    fn test_outbound_target_stays_in_range() {
        assert_eq!(outbound_target(100, 1_000, 50_000), 1_100);
        assert_eq!(outbound_target(49_500, 1_000, 50_000), 48_500);
        assert_eq!(outbound_target(10, 1_000, 500), 0);
    }

    #[test]
    fn test_max_increment_bounded_by_max_step() {
        let context = context_with(10_000, 0);
        assert_eq!(
            max_increment(&Value::Int(20_000), &context).verdict,
            Verdict::Issue
        );
        assert_eq!(max_increment(&Value::Int(500), &context).verdict, Verdict::Ok);
        assert_eq!(max_increment(&Value::Int(0), &context).verdict, Verdict::Issue);
    }

    #[test]
    fn test_position_within_travel() {
        let context = context_with(10_000, 10_000);
        assert_eq!(within_travel(&Value::Int(5_000), &context).verdict, Verdict::Ok);
        assert_eq!(within_travel(&Value::Int(10_001), &context).verdict, Verdict::Issue);
        assert_eq!(
            within_travel(&Value::Int(-1), &RunContext::default()).verdict,
            Verdict::Issue
        );
    }
}
