//! CoverCalibrator simulator
//!
//! The cover takes `cover_travel` to open or close and reports `Moving`
//! meanwhile. The lamp takes `warm_up` to reach `Ready` and reports
//! `NotReady` meanwhile. Either half can be left out.

use super::{complete, impl_simulated_device, CompletionMode, Identity, SimulatorLink, Transition};
use crate::hardware::{
    CalibratorStatus, CoverCalibrator, CoverStatus, DeviceError, DeviceResult,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Behaviour knobs for [`CoverCalibratorSimulator`].
#[derive(Debug, Clone, PartialEq)]
pub struct CoverCalibratorSimulatorConfig {
    pub cover_present: bool,
    pub calibrator_present: bool,
    pub max_brightness: i32,
    pub cover_travel: Duration,
    pub warm_up: Duration,
    pub completion: CompletionMode,
    pub latency: Duration,
}

impl Default for CoverCalibratorSimulatorConfig {
    fn default() -> Self {
        Self {
            cover_present: true,
            calibrator_present: true,
            max_brightness: 100,
            cover_travel: Duration::from_secs(3),
            warm_up: Duration::from_secs(1),
            completion: CompletionMode::Asynchronous,
            latency: super::DEFAULT_LATENCY,
        }
    }
}

#[derive(Debug)]
struct CoverCalibratorState {
    cover: Transition<CoverStatus>,
    lamp: Transition<CalibratorStatus>,
    brightness: i32,
}

/// In-process cover and flat-field lamp.
pub struct CoverCalibratorSimulator {
    link: SimulatorLink,
    config: CoverCalibratorSimulatorConfig,
    state: RwLock<CoverCalibratorState>,
}

impl CoverCalibratorSimulator {
    pub fn new(config: CoverCalibratorSimulatorConfig) -> Self {
        let cover = if config.cover_present {
            CoverStatus::Closed
        } else {
            CoverStatus::NotPresent
        };
        let lamp = if config.calibrator_present {
            CalibratorStatus::Off
        } else {
            CalibratorStatus::NotPresent
        };
        Self {
            link: SimulatorLink::new(Identity::simulator("CoverCalibrator", 1), config.latency),
            config,
            state: RwLock::new(CoverCalibratorState {
                cover: Transition::new(cover),
                lamp: Transition::new(lamp),
                brightness: 0,
            }),
        }
    }

    fn require_cover(&self, member: &str) -> DeviceResult<()> {
        if self.config.cover_present {
            Ok(())
        } else {
            Err(DeviceError::not_implemented(member))
        }
    }

    fn require_calibrator(&self, member: &str) -> DeviceResult<()> {
        if self.config.calibrator_present {
            Ok(())
        } else {
            Err(DeviceError::not_implemented(member))
        }
    }

    async fn move_cover(&self, member: &str, target: CoverStatus) -> DeviceResult<()> {
        self.link.transact(member).await?;
        self.require_cover(member)?;
        self.state
            .write()
            .await
            .cover
            .begin(target, self.config.cover_travel);
        debug!(member, target = target.as_str(), "Cover moving");
        complete(self.config.completion, self.config.cover_travel).await;
        Ok(())
    }
}

impl Default for CoverCalibratorSimulator {
    fn default() -> Self {
        Self::new(CoverCalibratorSimulatorConfig::default())
    }
}

impl_simulated_device!(CoverCalibratorSimulator);

#[async_trait]
impl CoverCalibrator for CoverCalibratorSimulator {
    async fn cover_state(&self) -> DeviceResult<CoverStatus> {
        self.link.transact("CoverState").await?;
        Ok(self.state.read().await.cover.current(CoverStatus::Moving))
    }

    async fn calibrator_state(&self) -> DeviceResult<CalibratorStatus> {
        self.link.transact("CalibratorState").await?;
        Ok(self.state.read().await.lamp.current(CalibratorStatus::NotReady))
    }

    async fn brightness(&self) -> DeviceResult<i32> {
        self.link.transact("Brightness").await?;
        self.require_calibrator("Brightness")?;
        Ok(self.state.read().await.brightness)
    }

    async fn max_brightness(&self) -> DeviceResult<i32> {
        self.link.transact("MaxBrightness").await?;
        self.require_calibrator("MaxBrightness")?;
        Ok(self.config.max_brightness)
    }

    async fn open_cover(&self) -> DeviceResult<()> {
        self.move_cover("OpenCover", CoverStatus::Open).await
    }

    async fn close_cover(&self) -> DeviceResult<()> {
        self.move_cover("CloseCover", CoverStatus::Closed).await
    }

    async fn halt_cover(&self) -> DeviceResult<()> {
        self.link.transact("HaltCover").await?;
        self.require_cover("HaltCover")?;
        let mut state = self.state.write().await;
        if state.cover.in_progress() {
            state.cover.set(CoverStatus::Unknown);
            debug!("Cover halted mid-travel");
        }
        Ok(())
    }

    async fn calibrator_on(&self, brightness: i32) -> DeviceResult<()> {
        self.link.transact("CalibratorOn").await?;
        self.require_calibrator("CalibratorOn")?;
        if !(0..=self.config.max_brightness).contains(&brightness) {
            return Err(DeviceError::invalid_value(format!(
                "CalibratorOn: brightness {} is outside [0, {}]",
                brightness, self.config.max_brightness
            )));
        }
        {
            let mut state = self.state.write().await;
            state.brightness = brightness;
            state.lamp.begin(CalibratorStatus::Ready, self.config.warm_up);
        }
        debug!(brightness, "Calibrator warming up");
        complete(self.config.completion, self.config.warm_up).await;
        Ok(())
    }

    async fn calibrator_off(&self) -> DeviceResult<()> {
        self.link.transact("CalibratorOff").await?;
        self.require_calibrator("CalibratorOff")?;
        let mut state = self.state.write().await;
        state.brightness = 0;
        state.lamp.set(CalibratorStatus::Off);
        Ok(())
    }
}
