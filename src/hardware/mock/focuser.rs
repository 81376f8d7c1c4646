//! Focuser simulator
//!
//! Absolute mode moves to a step number; relative mode moves by an offset and
//! keeps its position private, as relative hardware does.

use super::{complete, impl_simulated_device, CompletionMode, Identity, Motion, SimulatorLink};
use crate::hardware::{DeviceError, DeviceResult, Focuser};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Behaviour knobs for [`FocuserSimulator`].
#[derive(Debug, Clone, PartialEq)]
pub struct FocuserSimulatorConfig {
    pub absolute: bool,
    pub max_step: i32,
    pub max_increment: i32,
    pub initial_position: i32,
    pub speed_steps_per_sec: f64,
    /// Microns per step; `None` makes `StepSize` raise NotImplemented.
    pub step_size: Option<f64>,
    pub temp_comp_available: bool,
    /// Degrees Celsius; `None` makes `Temperature` raise NotImplemented.
    pub temperature: Option<f64>,
    pub completion: CompletionMode,
    /// Steps added to every arrival position.
    pub landing_error: i32,
    pub latency: Duration,
}

impl Default for FocuserSimulatorConfig {
    fn default() -> Self {
        Self {
            absolute: true,
            max_step: 50_000,
            max_increment: 50_000,
            initial_position: 25_000,
            speed_steps_per_sec: 1_000.0,
            step_size: Some(20.0),
            temp_comp_available: true,
            temperature: Some(12.5),
            completion: CompletionMode::Asynchronous,
            landing_error: 0,
            latency: super::DEFAULT_LATENCY,
        }
    }
}

#[derive(Debug)]
struct FocuserState {
    motion: Motion,
    temp_comp: bool,
}

/// In-process focuser.
pub struct FocuserSimulator {
    link: SimulatorLink,
    config: FocuserSimulatorConfig,
    state: RwLock<FocuserState>,
}

impl FocuserSimulator {
    pub fn new(config: FocuserSimulatorConfig) -> Self {
        Self {
            link: SimulatorLink::new(Identity::simulator("Focuser", 3), config.latency),
            state: RwLock::new(FocuserState {
                motion: Motion::at_rest(config.initial_position as f64),
                temp_comp: false,
            }),
            config,
        }
    }

    fn check_target(&self, position: i32) -> DeviceResult<()> {
        if self.config.absolute {
            if !(0..=self.config.max_step).contains(&position) {
                return Err(DeviceError::invalid_value(format!(
                    "Move: {} is outside [0, {}]",
                    position, self.config.max_step
                )));
            }
        } else if position.unsigned_abs() > self.config.max_increment.unsigned_abs() {
            return Err(DeviceError::invalid_value(format!(
                "Move: offset {} exceeds MaxIncrement {}",
                position, self.config.max_increment
            )));
        }
        Ok(())
    }
}

impl Default for FocuserSimulator {
    fn default() -> Self {
        Self::new(FocuserSimulatorConfig::default())
    }
}

impl_simulated_device!(FocuserSimulator);

#[async_trait]
impl Focuser for FocuserSimulator {
    async fn absolute(&self) -> DeviceResult<bool> {
        self.link.transact("Absolute").await?;
        Ok(self.config.absolute)
    }

    async fn is_moving(&self) -> DeviceResult<bool> {
        self.link.transact("IsMoving").await?;
        Ok(self.state.read().await.motion.is_moving())
    }

    async fn max_step(&self) -> DeviceResult<i32> {
        self.link.transact("MaxStep").await?;
        Ok(self.config.max_step)
    }

    async fn max_increment(&self) -> DeviceResult<i32> {
        self.link.transact("MaxIncrement").await?;
        Ok(self.config.max_increment)
    }

    async fn position(&self) -> DeviceResult<i32> {
        self.link.transact("Position").await?;
        if !self.config.absolute {
            return Err(DeviceError::not_implemented("Position"));
        }
        Ok(self.state.read().await.motion.current().round() as i32)
    }

    async fn step_size(&self) -> DeviceResult<f64> {
        self.link.transact("StepSize").await?;
        self.config
            .step_size
            .ok_or_else(|| DeviceError::not_implemented("StepSize"))
    }

    async fn temp_comp_available(&self) -> DeviceResult<bool> {
        self.link.transact("TempCompAvailable").await?;
        Ok(self.config.temp_comp_available)
    }

    async fn temp_comp(&self) -> DeviceResult<bool> {
        self.link.transact("TempComp").await?;
        Ok(self.state.read().await.temp_comp)
    }

    async fn set_temp_comp(&self, enabled: bool) -> DeviceResult<()> {
        self.link.transact("TempComp").await?;
        if !self.config.temp_comp_available {
            return Err(DeviceError::not_implemented("TempComp"));
        }
        self.state.write().await.temp_comp = enabled;
        Ok(())
    }

    async fn temperature(&self) -> DeviceResult<f64> {
        self.link.transact("Temperature").await?;
        self.config
            .temperature
            .ok_or_else(|| DeviceError::not_implemented("Temperature"))
    }

    async fn halt(&self) -> DeviceResult<()> {
        self.link.transact("Halt").await?;
        self.state.write().await.motion.halt();
        Ok(())
    }

    async fn move_to(&self, position: i32) -> DeviceResult<()> {
        self.link.transact("Move").await?;
        self.check_target(position)?;
        let duration = {
            let mut state = self.state.write().await;
            if state.motion.is_moving() {
                return Err(DeviceError::invalid_operation("Move: focuser is already moving"));
            }
            let from = state.motion.current();
            let target = if self.config.absolute {
                position as f64
            } else {
                from + position as f64
            };
            let to = target + self.config.landing_error as f64;
            state.motion = Motion::start(from, to, self.config.speed_steps_per_sec);
            debug!(from, to, "Focuser moving");
            state.motion.duration()
        };
        complete(self.config.completion, duration).await;
        Ok(())
    }
}
