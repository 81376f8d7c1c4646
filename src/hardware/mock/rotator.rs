//! Rotator simulator
//!
//! Slews along the shortest arc at a fixed rate. The mechanical angle is the
//! physical state; the sky position is the mechanical angle plus the offset
//! set by `sync`.

use super::{complete, impl_simulated_device, CompletionMode, Identity, Motion, SimulatorLink};
use crate::conformance::tolerance::wrap;
use crate::hardware::{DeviceError, DeviceResult, Rotator};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Behaviour knobs for [`RotatorSimulator`].
#[derive(Debug, Clone, PartialEq)]
pub struct RotatorSimulatorConfig {
    pub can_reverse: bool,
    /// Let `Reverse` work even though `CanReverse` is false (a contract violation).
    pub reverse_without_capability: bool,
    pub speed_deg_per_sec: f64,
    /// `None` makes `StepSize` raise NotImplemented.
    pub step_size: Option<f64>,
    pub completion: CompletionMode,
    /// Degrees added to every arrival position.
    pub landing_error: f64,
    /// Moves start but never finish until halted.
    pub stall: bool,
    pub latency: Duration,
}

impl Default for RotatorSimulatorConfig {
    fn default() -> Self {
        Self {
            can_reverse: true,
            reverse_without_capability: false,
            speed_deg_per_sec: 10.0,
            step_size: Some(0.1),
            completion: CompletionMode::Asynchronous,
            landing_error: 0.0,
            stall: false,
            latency: super::DEFAULT_LATENCY,
        }
    }
}

#[derive(Debug)]
struct RotatorState {
    /// Mechanical angle, unwrapped during a slew.
    motion: Motion,
    /// Sky minus mechanical.
    sync_offset: f64,
    /// Last requested sky position.
    target: f64,
    reverse: bool,
    stalled: bool,
}

impl RotatorState {
    fn mechanical(&self) -> f64 {
        wrap(self.motion.current(), 360.0)
    }

    fn sky(&self) -> f64 {
        wrap(self.motion.current() + self.sync_offset, 360.0)
    }

    fn is_moving(&self) -> bool {
        self.stalled || self.motion.is_moving()
    }
}

/// In-process rotator.
///
/// # Example
///
/// ```rust,ignore
/// let rotator = RotatorSimulator::new(RotatorSimulatorConfig::default());
/// rotator.set_connected(true).await?;
/// rotator.move_absolute(90.0).await?; // returns at once, IsMoving for ~9 s
/// ```
pub struct RotatorSimulator {
    link: SimulatorLink,
    config: RotatorSimulatorConfig,
    state: RwLock<RotatorState>,
}

impl RotatorSimulator {
    pub fn new(config: RotatorSimulatorConfig) -> Self {
        Self {
            link: SimulatorLink::new(Identity::simulator("Rotator", 3), config.latency),
            config,
            state: RwLock::new(RotatorState {
                motion: Motion::at_rest(0.0),
                sync_offset: 0.0,
                target: 0.0,
                reverse: false,
                stalled: false,
            }),
        }
    }

    fn check_angle(member: &str, angle: f64) -> DeviceResult<()> {
        if angle.is_finite() && (0.0..360.0).contains(&angle) {
            Ok(())
        } else {
            Err(DeviceError::invalid_value(format!(
                "{}: {} is outside [0, 360)",
                member, angle
            )))
        }
    }

    fn check_reverse_supported(&self) -> DeviceResult<()> {
        if self.config.can_reverse || self.config.reverse_without_capability {
            Ok(())
        } else {
            Err(DeviceError::not_implemented("Reverse"))
        }
    }

    /// Slew the mechanical axis to `mechanical` and record the sky target.
    async fn slew(&self, member: &str, mechanical: f64, sky_target: f64) -> DeviceResult<()> {
        let duration = {
            let mut state = self.state.write().await;
            if state.is_moving() {
                return Err(DeviceError::invalid_operation(format!(
                    "{}: rotator is already moving",
                    member
                )));
            }
            let from = state.motion.current();
            let shortest = wrap(mechanical - wrap(from, 360.0) + 180.0, 360.0) - 180.0;
            let to = from + shortest + self.config.landing_error;
            state.motion = Motion::start(from, to, self.config.speed_deg_per_sec);
            state.target = wrap(sky_target, 360.0);
            state.stalled = self.config.stall;
            debug!(
                member,
                from = wrap(from, 360.0),
                to = wrap(to, 360.0),
                "Rotator slewing"
            );
            state.motion.duration()
        };
        if !self.config.stall {
            complete(self.config.completion, duration).await;
        }
        Ok(())
    }
}

impl Default for RotatorSimulator {
    fn default() -> Self {
        Self::new(RotatorSimulatorConfig::default())
    }
}

impl_simulated_device!(RotatorSimulator);

#[async_trait]
impl Rotator for RotatorSimulator {
    async fn can_reverse(&self) -> DeviceResult<bool> {
        self.link.transact("CanReverse").await?;
        Ok(self.config.can_reverse)
    }

    async fn reverse(&self) -> DeviceResult<bool> {
        self.link.transact("Reverse").await?;
        self.check_reverse_supported()?;
        Ok(self.state.read().await.reverse)
    }

    async fn set_reverse(&self, reverse: bool) -> DeviceResult<()> {
        self.link.transact("Reverse").await?;
        self.check_reverse_supported()?;
        self.state.write().await.reverse = reverse;
        Ok(())
    }

    async fn is_moving(&self) -> DeviceResult<bool> {
        self.link.transact("IsMoving").await?;
        Ok(self.state.read().await.is_moving())
    }

    async fn position(&self) -> DeviceResult<f64> {
        self.link.transact("Position").await?;
        Ok(self.state.read().await.sky())
    }

    async fn target_position(&self) -> DeviceResult<f64> {
        self.link.transact("TargetPosition").await?;
        Ok(self.state.read().await.target)
    }

    async fn mechanical_position(&self) -> DeviceResult<f64> {
        self.link.transact("MechanicalPosition").await?;
        Ok(self.state.read().await.mechanical())
    }

    async fn step_size(&self) -> DeviceResult<f64> {
        self.link.transact("StepSize").await?;
        self.config
            .step_size
            .ok_or_else(|| DeviceError::not_implemented("StepSize"))
    }

    async fn halt(&self) -> DeviceResult<()> {
        self.link.transact("Halt").await?;
        let mut state = self.state.write().await;
        state.motion.halt();
        state.stalled = false;
        debug!(position = state.sky(), "Rotator halted");
        Ok(())
    }

    async fn move_absolute(&self, position: f64) -> DeviceResult<()> {
        self.link.transact("MoveAbsolute").await?;
        Self::check_angle("MoveAbsolute", position)?;
        let offset = self.state.read().await.sync_offset;
        self.slew("MoveAbsolute", position - offset, position).await
    }

    async fn move_relative(&self, offset: f64) -> DeviceResult<()> {
        self.link.transact("MoveRelative").await?;
        if !offset.is_finite() {
            return Err(DeviceError::invalid_value(format!(
                "MoveRelative: {} is not a finite offset",
                offset
            )));
        }
        let (sky, sync_offset) = {
            let state = self.state.read().await;
            (state.sky(), state.sync_offset)
        };
        let target = sky + offset;
        self.slew("MoveRelative", target - sync_offset, target).await
    }

    async fn move_mechanical(&self, position: f64) -> DeviceResult<()> {
        self.link.transact("MoveMechanical").await?;
        Self::check_angle("MoveMechanical", position)?;
        let offset = self.state.read().await.sync_offset;
        self.slew("MoveMechanical", position, position + offset).await
    }

    async fn sync(&self, position: f64) -> DeviceResult<()> {
        self.link.transact("Sync").await?;
        Self::check_angle("Sync", position)?;
        let mut state = self.state.write().await;
        if state.is_moving() {
            return Err(DeviceError::invalid_operation("Sync: rotator is moving"));
        }
        state.sync_offset = position - state.mechanical();
        state.target = position;
        debug!(position, offset = state.sync_offset, "Rotator synced");
        Ok(())
    }
}
