//! Simulated devices for exercising the harness without hardware.
//!
//! All simulators use async-safe timing (`tokio::time::sleep`, never
//! `std::thread::sleep`) and compute motion lazily from `tokio::time::Instant`,
//! so they behave deterministically under a paused test clock.
//!
//! # Available Simulators
//!
//! - [`RotatorSimulator`] - rotator, 10 deg/s slew by default
//! - [`FocuserSimulator`] - absolute or relative focuser, 1000 steps/s by default
//! - [`CoverCalibratorSimulator`] - dust cover plus flat-field lamp
//!
//! Each can be configured to complete commands synchronously or
//! asynchronously, to stall, or to land off target, which is what the
//! harness tests use to provoke Issue verdicts.

use super::{DeviceError, DeviceResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::{sleep, Instant};

pub mod cover_calibrator;
pub mod focuser;
pub mod rotator;

pub use cover_calibrator::{CoverCalibratorSimulator, CoverCalibratorSimulatorConfig};
pub use focuser::{FocuserSimulator, FocuserSimulatorConfig};
pub use rotator::{RotatorSimulator, RotatorSimulatorConfig};

/// Default per-call communication delay.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(2);

/// How a simulator completes motion commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionMode {
    /// Return at once and report busy until done.
    #[default]
    Asynchronous,
    /// Return only when the operation is complete.
    Synchronous,
}

/// Static identity reported through the common members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub description: String,
    pub driver_info: String,
    pub driver_version: String,
    pub interface_version: i32,
}

impl Identity {
    pub fn simulator(kind: &str, interface_version: i32) -> Self {
        Self {
            name: format!("{} Simulator", kind),
            description: format!("In-process {} simulator", kind.to_lowercase()),
            driver_info: format!("rust_conform {} simulator", kind.to_lowercase()),
            driver_version: env!("CARGO_PKG_VERSION").to_string(),
            interface_version,
        }
    }
}

/// Connection flag and transport delay shared by every simulator.
#[derive(Debug)]
pub struct SimulatorLink {
    identity: Identity,
    connected: AtomicBool,
    latency: Duration,
}

impl SimulatorLink {
    pub fn new(identity: Identity, latency: Duration) -> Self {
        Self {
            identity,
            connected: AtomicBool::new(false),
            latency,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Simulate one round trip.
    pub async fn round_trip(&self) {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
    }

    /// Round trip for a member that needs a connection.
    ///
    /// # Errors
    /// `InvalidOperation` when not connected.
    pub async fn transact(&self, member: &str) -> DeviceResult<()> {
        self.round_trip().await;
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DeviceError::invalid_operation(format!(
                "{}: device is not connected",
                member
            )))
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

/// Implements [`super::Device`] for a simulator holding a `link: SimulatorLink` field.
macro_rules! impl_simulated_device {
    ($simulator:ty) => {
        #[async_trait::async_trait]
        impl $crate::hardware::Device for $simulator {
            async fn connected(&self) -> $crate::hardware::DeviceResult<bool> {
                self.link.round_trip().await;
                Ok(self.link.is_connected())
            }

            async fn set_connected(&self, connected: bool) -> $crate::hardware::DeviceResult<()> {
                self.link.round_trip().await;
                self.link.set_connected(connected);
                tracing::debug!(device = %self.link.identity().name, connected, "Connection changed");
                Ok(())
            }

            async fn name(&self) -> $crate::hardware::DeviceResult<String> {
                self.link.round_trip().await;
                Ok(self.link.identity().name.clone())
            }

            async fn description(&self) -> $crate::hardware::DeviceResult<String> {
                self.link.round_trip().await;
                Ok(self.link.identity().description.clone())
            }

            async fn driver_info(&self) -> $crate::hardware::DeviceResult<String> {
                self.link.round_trip().await;
                Ok(self.link.identity().driver_info.clone())
            }

            async fn driver_version(&self) -> $crate::hardware::DeviceResult<String> {
                self.link.round_trip().await;
                Ok(self.link.identity().driver_version.clone())
            }

            async fn interface_version(&self) -> $crate::hardware::DeviceResult<i32> {
                self.link.round_trip().await;
                Ok(self.link.identity().interface_version)
            }
        }
    };
}
pub(crate) use impl_simulated_device;

/// Straight-line travel between two values, evaluated against the tokio clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    from: f64,
    to: f64,
    started: Instant,
    duration: Duration,
}

impl Motion {
    pub fn at_rest(position: f64) -> Self {
        Self {
            from: position,
            to: position,
            started: Instant::now(),
            duration: Duration::ZERO,
        }
    }

    /// Start travelling from `from` to `to` at `speed` units per second.
    pub fn start(from: f64, to: f64, speed: f64) -> Self {
        let duration = if speed > 0.0 {
            Duration::from_secs_f64((to - from).abs() / speed)
        } else {
            Duration::ZERO
        };
        Self {
            from,
            to,
            started: Instant::now(),
            duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn target(&self) -> f64 {
        self.to
    }

    pub fn is_moving(&self) -> bool {
        self.started.elapsed() < self.duration
    }

    pub fn current(&self) -> f64 {
        if self.duration.is_zero() {
            return self.to;
        }
        let fraction =
            (self.started.elapsed().as_secs_f64() / self.duration.as_secs_f64()).min(1.0);
        self.from + (self.to - self.from) * fraction
    }

    /// Stop where the motion currently is.
    pub fn halt(&mut self) {
        *self = Self::at_rest(self.current());
    }
}

/// State change that takes `duration` to settle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition<S: Copy> {
    settled: S,
    pending: Option<(S, Instant, Duration)>,
}

impl<S: Copy> Transition<S> {
    pub fn new(state: S) -> Self {
        Self {
            settled: state,
            pending: None,
        }
    }

    pub fn begin(&mut self, target: S, duration: Duration) {
        self.settled = self.current(self.settled);
        self.pending = Some((target, Instant::now(), duration));
    }

    pub fn set(&mut self, state: S) {
        self.settled = state;
        self.pending = None;
    }

    pub fn in_progress(&self) -> bool {
        matches!(self.pending, Some((_, started, duration)) if started.elapsed() < duration)
    }

    /// The state now, or `busy` while the transition is under way.
    pub fn current(&self, busy: S) -> S {
        match self.pending {
            Some((_, started, duration)) if started.elapsed() < duration => busy,
            Some((target, _, _)) => target,
            None => self.settled,
        }
    }
}

/// Wait out an operation when simulating synchronous completion.
pub(crate) async fn complete(mode: CompletionMode, duration: Duration) {
    if mode == CompletionMode::Synchronous && !duration.is_zero() {
        sleep(duration).await;
    }
}
