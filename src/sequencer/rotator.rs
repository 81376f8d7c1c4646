//! Rotator suite
//!
//! Positions are angles, so every arrival check is circular with period 360.

use super::{
    accept, angle, positive, Capability, DeviceSuite, Judgement, Monitor, PerformanceCheck,
    PropertyCheck, RunContext, Sequencer,
};
use crate::conformance::tolerance::wrap;
use crate::conformance::{Predicate, ProgressReader, RequirementPolicy, Verdict};
use crate::hardware::{DeviceCategory, Rotator, Value};
use async_trait::async_trait;
use futures::{FutureExt, TryFutureExt};
use std::time::Duration;

const CONNECTED: &[Capability] = &[Capability::Connected];
const REVERSE: &[Capability] = &[Capability::Connected, Capability::CanReverse];

const FULL_CIRCLE: f64 = 360.0;
const MOVE_TARGETS: [f64; 5] = [45.0, 135.0, 225.0, 315.0, 10.0];
const RELATIVE_OFFSETS: [f64; 2] = [10.0, -10.0];
const MECHANICAL_TARGETS: [f64; 2] = [90.0, 270.0];
const INVALID_ANGLES: [f64; 3] = [-10.0, 360.0, 405.0];
const SYNC_OFFSET: f64 = 30.0;
/// Halt interrupts a 90 degree move after this long.
const HALT_DELAY: Duration = Duration::from_secs(1);

/// Checks for [`Rotator`] drivers.
pub struct RotatorSuite;

fn reverse_policy(flags: &super::CapabilityFlags) -> RequirementPolicy {
    RequirementPolicy::when(
        flags.value(Capability::CanReverse),
        RequirementPolicy::MustBeImplemented,
        RequirementPolicy::MustNotBeImplemented,
    )
}

fn at_rest(value: &Value, _: &RunContext) -> Judgement {
    match value.as_bool() {
        Some(false) => Judgement::ok("not moving"),
        _ => Judgement::issue("IsMoving is true before any move was commanded"),
    }
}

fn moving(device: &dyn Rotator) -> Predicate<'_> {
    Box::new(move || device.is_moving())
}

fn position_status(device: &dyn Rotator) -> ProgressReader<'_> {
    Box::new(move || {
        async move {
            match device.position().await {
                Ok(position) => format!("position {:.1}", position),
                Err(err) => format!("position unreadable: {}", err),
            }
        }
        .boxed()
    })
}

fn motion_monitor<'a>(seq: &Sequencer<'a, dyn Rotator>) -> Monitor<'a> {
    let device = seq.device();
    Monitor::new(moving(device), seq.operation_wait())
        .with_progress(position_status(device))
        .with_halt(device.halt())
}

#[async_trait]
impl DeviceSuite for RotatorSuite {
    type Device = dyn Rotator;

    const CATEGORY: DeviceCategory = DeviceCategory::Rotator;

    fn properties() -> Vec<PropertyCheck<dyn Rotator>> {
        vec![
            PropertyCheck {
                member: "CanReverse",
                requires: CONNECTED,
                policy: |_| RequirementPolicy::Mandatory,
                read: |d| d.can_reverse().map_ok(Value::from).boxed(),
                judge: accept,
                produces: Some(Capability::CanReverse),
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
                member: "Position",
                requires: CONNECTED,
                policy: |_| RequirementPolicy::Mandatory,
                read: |d| d.position().map_ok(Value::from).boxed(),
                judge: angle,
                produces: None,
            },
            PropertyCheck {
                member: "TargetPosition",
                requires: CONNECTED,
                policy: |_| RequirementPolicy::Mandatory,
                read: |d| d.target_position().map_ok(Value::from).boxed(),
                judge: angle,
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
                member: "MechanicalPosition",
                requires: CONNECTED,
                policy: |_| RequirementPolicy::Mandatory,
                read: |d| d.mechanical_position().map_ok(Value::from).boxed(),
                judge: angle,
                produces: None,
            },
            PropertyCheck {
                member: "Reverse",
                requires: REVERSE,
                policy: reverse_policy,
                read: |d| d.reverse().map_ok(Value::from).boxed(),
                judge: accept,
                produces: None,
            },
        ]
    }

    async fn methods(seq: &mut Sequencer<'_, dyn Rotator>) {
        reverse_write(seq).await;
        halt(seq).await;
        move_absolute(seq).await;
        move_absolute_invalid(seq).await;
        move_relative(seq).await;
        move_mechanical(seq).await;
        sync(seq).await;
    }

    fn performance_checks() -> Vec<PerformanceCheck<dyn Rotator>> {
        vec![
            PerformanceCheck {
                member: "Position",
                requires: CONNECTED,
                read: |d| d.position().map_ok(Value::from).boxed(),
            },
            PerformanceCheck {
                member: "IsMoving",
                requires: CONNECTED,
                read: |d| d.is_moving().map_ok(Value::from).boxed(),
            },
            PerformanceCheck {
                member: "TargetPosition",
                requires: CONNECTED,
                read: |d| d.target_position().map_ok(Value::from).boxed(),
            },
        ]
    }
}

/// Flip `Reverse`, read it back, and restore it.
async fn reverse_write(seq: &mut Sequencer<'_, dyn Rotator>) {
    let check = "Reverse Write";
    if !seq.begin(check, "Reverse", REVERSE) {
        return;
    }
    let device = seq.device();
    let policy = reverse_policy(seq.flags());
    let original = seq
        .context()
        .reading("Reverse")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if seq
        .invoke(check, "Reverse", policy, device.set_reverse(!original))
        .await
        .is_none()
    {
        return;
    }
    if policy == RequirementPolicy::MustBeImplemented {
        seq.verify_state("Reverse Read Back", "Reverse", !original, device.reverse())
            .await;
    }
    seq.invoke_quietly(
        "Reverse Restore",
        "Reverse",
        RequirementPolicy::Mandatory,
        device.set_reverse(original),
    )
    .await;
}

/// Start a 90 degree move, interrupt it, and confirm the rotator stops.
async fn halt(seq: &mut Sequencer<'_, dyn Rotator>) {
    let check = "Halt";
    if !seq.begin(check, "Halt", CONNECTED) {
        return;
    }
    let device = seq.device();
    let Some(start) = seq
        .invoke_quietly(check, "Position", RequirementPolicy::Mandatory, device.position())
        .await
    else {
        return;
    };
    let target = wrap(start + 90.0, FULL_CIRCLE);
    if seq
        .invoke_quietly(
            check,
            "MoveAbsolute",
            RequirementPolicy::Mandatory,
            device.move_absolute(target),
        )
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

async fn move_absolute(seq: &mut Sequencer<'_, dyn Rotator>) {
    for target in MOVE_TARGETS {
        let check = format!("MoveAbsolute {}", target);
        if !seq.begin(&check, "MoveAbsolute", CONNECTED) {
            continue;
        }
        let device = seq.device();
        let monitor = motion_monitor(seq);
        let Some(completion) = seq
            .command(
                &check,
                "MoveAbsolute",
                RequirementPolicy::Mandatory,
                device.move_absolute(target),
                monitor,
            )
            .await
        else {
            continue;
        };
        if completion.settled() {
            verify_position(seq, &check, target).await;
            let band = seq.settings().tolerance;
            seq.verify_quantity(
                &format!("{} TargetPosition", check),
                "TargetPosition",
                target,
                device.target_position(),
                Some(FULL_CIRCLE),
                band,
            )
            .await;
        }
    }
}

async fn move_absolute_invalid(seq: &mut Sequencer<'_, dyn Rotator>) {
    for target in INVALID_ANGLES {
        let check = format!("MoveAbsolute {} (invalid)", target);
        if !seq.begin(&check, "MoveAbsolute", CONNECTED) {
            continue;
        }
        let device = seq.device();
        let verdict = seq
            .invoke_expecting_invalid(&check, "MoveAbsolute", target, device.move_absolute(target))
            .await;
        if verdict == Verdict::Issue {
            let wait = seq.operation_wait();
            seq.wait_until_idle(&check, "IsMoving", moving(device), wait)
                .await;
        }
    }
}

async fn move_relative(seq: &mut Sequencer<'_, dyn Rotator>) {
    for offset in RELATIVE_OFFSETS {
        let check = format!("MoveRelative {}", offset);
        if !seq.begin(&check, "MoveRelative", CONNECTED) {
            continue;
        }
        let device = seq.device();
        let Some(start) = seq
            .invoke_quietly(&check, "Position", RequirementPolicy::Mandatory, device.position())
            .await
        else {
            continue;
        };
        let monitor = motion_monitor(seq);
        let Some(completion) = seq
            .command(
                &check,
                "MoveRelative",
                RequirementPolicy::Mandatory,
                device.move_relative(offset),
                monitor,
            )
            .await
        else {
            continue;
        };
        if completion.settled() {
            verify_position(seq, &check, wrap(start + offset, FULL_CIRCLE)).await;
        }
    }
}

async fn move_mechanical(seq: &mut Sequencer<'_, dyn Rotator>) {
    for target in MECHANICAL_TARGETS {
        let check = format!("MoveMechanical {}", target);
        if !seq.begin(&check, "MoveMechanical", CONNECTED) {
            continue;
        }
        let device = seq.device();
        let monitor = motion_monitor(seq);
        let Some(completion) = seq
            .command(
                &check,
                "MoveMechanical",
                RequirementPolicy::Mandatory,
                device.move_mechanical(target),
                monitor,
            )
            .await
        else {
            continue;
        };
        if completion.settled() {
            let band = seq.settings().tolerance;
            seq.verify_quantity(
                &format!("{} MechanicalPosition", check),
                "MechanicalPosition",
                target,
                device.mechanical_position(),
                Some(FULL_CIRCLE),
                band,
            )
            .await;
        }
    }

    for target in INVALID_ANGLES {
        let check = format!("MoveMechanical {} (invalid)", target);
        if !seq.begin(&check, "MoveMechanical", CONNECTED) {
            continue;
        }
        let device = seq.device();
        let verdict = seq
            .invoke_expecting_invalid(
                &check,
                "MoveMechanical",
                target,
                device.move_mechanical(target),
            )
            .await;
        if verdict == Verdict::Issue {
            let wait = seq.operation_wait();
            seq.wait_until_idle(&check, "IsMoving", moving(device), wait)
                .await;
        }
    }
}

/// Sync to an offset sky angle, verify, and sync back.
async fn sync(seq: &mut Sequencer<'_, dyn Rotator>) {
    let check = "Sync";
    if !seq.begin(check, "Sync", CONNECTED) {
        return;
    }
    let device = seq.device();
    let Some(original) = seq
        .invoke_quietly(check, "Position", RequirementPolicy::Mandatory, device.position())
        .await
    else {
        return;
    };
    let synced = wrap(original + SYNC_OFFSET, FULL_CIRCLE);
    if seq
        .invoke(check, "Sync", RequirementPolicy::Mandatory, device.sync(synced))
        .await
        .is_none()
    {
        return;
    }
    verify_position(seq, check, synced).await;

    if seq
        .invoke_quietly(
            "Sync Restore",
            "Sync",
            RequirementPolicy::Mandatory,
            device.sync(original),
        )
        .await
        .is_some()
    {
        verify_position(seq, "Sync Restore", original).await;
    }
}

async fn verify_position(seq: &mut Sequencer<'_, dyn Rotator>, check: &str, expected: f64) {
    let device = seq.device();
    let band = seq.settings().tolerance;
    seq.verify_quantity(
        &format!("{} Position", check),
        "Position",
        expected,
        device.position(),
        Some(FULL_CIRCLE),
        band,
    )
    .await;
}
