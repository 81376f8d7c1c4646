//! Focuser capability trait
//!
//! Absolute focusers move to a step number in `[0, max_step]`; relative
//! focusers move by a signed step offset bounded by `max_increment` and do not
//! report a position.

use super::{Device, DeviceResult};
use async_trait::async_trait;

#[async_trait]
pub trait Focuser: Device {
    async fn absolute(&self) -> DeviceResult<bool>;
    async fn is_moving(&self) -> DeviceResult<bool>;
    async fn max_step(&self) -> DeviceResult<i32>;
    async fn max_increment(&self) -> DeviceResult<i32>;
    async fn position(&self) -> DeviceResult<i32>;
    /// Step size in microns.
    async fn step_size(&self) -> DeviceResult<f64>;
    async fn temp_comp_available(&self) -> DeviceResult<bool>;
    async fn temp_comp(&self) -> DeviceResult<bool>;
    async fn set_temp_comp(&self, enabled: bool) -> DeviceResult<()>;
    /// Ambient temperature in degrees Celsius.
    async fn temperature(&self) -> DeviceResult<f64>;
    async fn halt(&self) -> DeviceResult<()>;

    /// Move to `position` (absolute focuser) or by `position` steps (relative focuser).
    async fn move_to(&self, position: i32) -> DeviceResult<()>;
}
