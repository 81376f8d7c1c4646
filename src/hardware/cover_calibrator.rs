//! CoverCalibrator capability trait
//!
//! A motorised dust cover and/or a flat-field light source. Either half may
//! be absent, reported as `NotPresent` by the corresponding state member.

use super::{Device, DeviceResult};
use async_trait::async_trait;

/// Cover state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverStatus {
    NotPresent,
    Closed,
    /// Busy indicator for asynchronous cover operations.
    Moving,
    Open,
    Unknown,
    Error,
}

impl CoverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverStatus::NotPresent => "NotPresent",
            CoverStatus::Closed => "Closed",
            CoverStatus::Moving => "Moving",
            CoverStatus::Open => "Open",
            CoverStatus::Unknown => "Unknown",
            CoverStatus::Error => "Error",
        }
    }
}

/// Calibrator (light source) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibratorStatus {
    NotPresent,
    Off,
    /// Busy indicator while the lamp stabilises.
    NotReady,
    Ready,
    Unknown,
    Error,
}

impl CalibratorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalibratorStatus::NotPresent => "NotPresent",
            CalibratorStatus::Off => "Off",
            CalibratorStatus::NotReady => "NotReady",
            CalibratorStatus::Ready => "Ready",
            CalibratorStatus::Unknown => "Unknown",
            CalibratorStatus::Error => "Error",
        }
    }
}

#[async_trait]
pub trait CoverCalibrator: Device {
    async fn cover_state(&self) -> DeviceResult<CoverStatus>;
    async fn calibrator_state(&self) -> DeviceResult<CalibratorStatus>;
    async fn brightness(&self) -> DeviceResult<i32>;
    async fn max_brightness(&self) -> DeviceResult<i32>;
    async fn open_cover(&self) -> DeviceResult<()>;
    async fn close_cover(&self) -> DeviceResult<()>;
    async fn halt_cover(&self) -> DeviceResult<()>;

    /// # Errors
    /// - `InvalidValue` when `brightness` is outside `[0, max_brightness]`
    async fn calibrator_on(&self, brightness: i32) -> DeviceResult<()>;
    async fn calibrator_off(&self) -> DeviceResult<()>;
}
