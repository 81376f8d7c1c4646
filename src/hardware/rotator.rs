//! Rotator capability trait
//!
//! Hardware-agnostic interface for a rotating instrument mount.
//!
//! ## Angles
//! - All angles are degrees in `[0, 360)`
//! - `position` is the sky position angle, `mechanical_position` the raw
//!   mechanical angle; `sync` sets the offset between the two
//!
//! ## Motion
//! Move commands may complete synchronously (return after the move) or
//! asynchronously (return at once while `is_moving` reports `true`). Either
//! convention is legal; the harness discovers which one a driver uses.

use super::{Device, DeviceResult};
use async_trait::async_trait;

#[async_trait]
pub trait Rotator: Device {
    /// Whether the rotator supports the `Reverse` member.
    async fn can_reverse(&self) -> DeviceResult<bool>;
    async fn reverse(&self) -> DeviceResult<bool>;
    async fn set_reverse(&self, reverse: bool) -> DeviceResult<()>;

    /// Busy indicator for asynchronous moves.
    async fn is_moving(&self) -> DeviceResult<bool>;

    async fn position(&self) -> DeviceResult<f64>;
    async fn target_position(&self) -> DeviceResult<f64>;
    async fn mechanical_position(&self) -> DeviceResult<f64>;

    /// Minimum step, in degrees.
    async fn step_size(&self) -> DeviceResult<f64>;

    async fn halt(&self) -> DeviceResult<()>;

    /// Move to a sky position angle.
    ///
    /// # Errors
    /// - `InvalidValue` when `position` is outside `[0, 360)`
    async fn move_absolute(&self, position: f64) -> DeviceResult<()>;

    /// Move by a signed offset from the current position.
    async fn move_relative(&self, offset: f64) -> DeviceResult<()>;

    /// Move to a raw mechanical angle.
    ///
    /// # Errors
    /// - `InvalidValue` when `position` is outside `[0, 360)`
    async fn move_mechanical(&self, position: f64) -> DeviceResult<()>;

    /// Declare the current mechanical angle to be `position` on the sky.
    async fn sync(&self, position: f64) -> DeviceResult<()>;
}
