//! Checks shared by every device category.

use super::{non_empty, Capability, Judgement, PropertyCheck, RunContext, Sequencer};
use crate::conformance::RequirementPolicy;
use crate::hardware::{Device, Value};
use futures::{FutureExt, TryFutureExt};
use tracing::debug;

const CONNECTED: &[Capability] = &[Capability::Connected];

/// Prerequisite phase: connect and confirm the device reports it.
pub async fn connect<D: Device + ?Sized + 'static>(seq: &mut Sequencer<'_, D>) {
    let check = "Connect";
    if !seq.begin(check, "Connected", &[]) {
        return;
    }
    let device = seq.device();
    if seq
        .invoke_quietly(
            check,
            "Connected",
            RequirementPolicy::Mandatory,
            device.set_connected(true),
        )
        .await
        .is_none()
    {
        return;
    }
    if seq
        .verify_state(check, "Connected", true, device.connected())
        .await
    {
        seq.set_flag(Capability::Connected, true);
    }
}

/// Leave the device disconnected after a run. Not a check.
pub async fn disconnect<D: Device + ?Sized + 'static>(seq: &mut Sequencer<'_, D>) {
    if !seq.flags().value(Capability::Connected) {
        return;
    }
    if let Err(err) = seq.device().set_connected(false).await {
        debug!(error = %err, "Disconnect failed");
    }
}

fn interface_version(value: &Value, _: &RunContext) -> Judgement {
    match value.as_i64() {
        Some(v) if v >= 1 => Judgement::ok(format!("interface version {}", v)),
        _ => Judgement::issue(format!(
            "interface version must be 1 or greater, got {}",
            value
        )),
    }
}

/// Identity members present on every device.
pub fn properties<D: Device + ?Sized + 'static>() -> Vec<PropertyCheck<D>> {
    vec![
        PropertyCheck {
            member: "Name",
            requires: CONNECTED,
            policy: |_| RequirementPolicy::Mandatory,
            read: |d| d.name().map_ok(Value::from).boxed(),
            judge: non_empty,
            produces: None,
        },
        PropertyCheck {
            member: "Description",
            requires: CONNECTED,
            policy: |_| RequirementPolicy::Mandatory,
            read: |d| d.description().map_ok(Value::from).boxed(),
            judge: non_empty,
            produces: None,
        },
        PropertyCheck {
            member: "DriverInfo",
            requires: CONNECTED,
            policy: |_| RequirementPolicy::Mandatory,
            read: |d| d.driver_info().map_ok(Value::from).boxed(),
            judge: non_empty,
            produces: None,
        },
        PropertyCheck {
            member: "DriverVersion",
            requires: CONNECTED,
            policy: |_| RequirementPolicy::Mandatory,
            read: |d| d.driver_version().map_ok(Value::from).boxed(),
            judge: non_empty,
            produces: None,
        },
        PropertyCheck {
            member: "InterfaceVersion",
            requires: CONNECTED,
            policy: |_| RequirementPolicy::Mandatory,
            read: |d| d.interface_version().map_ok(Value::from).boxed(),
            judge: interface_version,
            produces: None,
        },
    ]
}
