//! Device handle abstractions.
//!
//! The harness never talks to a transport directly. It drives anything that
//! implements the capability traits in this module: a network client, a local
//! in-process binding, or one of the simulators in [`mock`].
//!
//! Every member returns [`DeviceResult`]. A failure is an explicit tag
//! ([`ErrorKind`]) so the requirement classifier never has to inspect error
//! messages.
//!
//! # Traits
//!
//! - [`Device`] - members common to every category (`Connected`, `Name`, ...)
//! - [`Rotator`] - rotating instrument mount
//! - [`Focuser`] - absolute or relative focuser
//! - [`CoverCalibrator`] - dust cover with optional flat-field light source

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod cover_calibrator;
pub mod focuser;
pub mod mock;
pub mod rotator;

pub use cover_calibrator::{CalibratorStatus, CoverCalibrator, CoverStatus};
pub use focuser::Focuser;
pub use rotator::Rotator;

/// Result type returned by every device member.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Failure category reported by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The member is not implemented by this driver.
    NotImplemented,
    /// An argument or the value being written is outside the member's domain.
    InvalidValue,
    /// The member cannot be used in the device's current state.
    InvalidOperation,
    /// Anything else the driver raised.
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotImplemented => "NotImplemented",
            ErrorKind::InvalidValue => "InvalidValue",
            ErrorKind::InvalidOperation => "InvalidOperation",
            ErrorKind::Other => "Other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by a driver under test.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct DeviceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_implemented(member: &str) -> Self {
        Self::new(ErrorKind::NotImplemented, format!("{} is not implemented", member))
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidValue, message)
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOperation, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }
}

/// Typed value returned by a successful property read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Enumerated state, by name (e.g. `"Open"`, `"NotPresent"`).
    Enum(&'static str),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::Text(s) => write!(f, "{}", s),
            Value::Enum(name) => write!(f, "{}", name),
        }
    }
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract value as f64 (integers are widened)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&'static str> {
        match self {
            Value::Enum(name) => Some(name),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// Device category a sequencer can be instantiated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceCategory {
    Rotator,
    Focuser,
    CoverCalibrator,
}

impl DeviceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCategory::Rotator => "Rotator",
            DeviceCategory::Focuser => "Focuser",
            DeviceCategory::CoverCalibrator => "CoverCalibrator",
        }
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceCategory {
    type Err = crate::error::ConformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "rotator" => Ok(DeviceCategory::Rotator),
            "focuser" => Ok(DeviceCategory::Focuser),
            "cover-calibrator" | "covercalibrator" => Ok(DeviceCategory::CoverCalibrator),
            _ => Err(crate::error::ConformError::UnknownCategory(s.to_string())),
        }
    }
}

/// Members shared by every device category.
#[async_trait::async_trait]
pub trait Device: Send + Sync {
    async fn connected(&self) -> DeviceResult<bool>;
    async fn set_connected(&self, connected: bool) -> DeviceResult<()>;
    async fn name(&self) -> DeviceResult<String>;
    async fn description(&self) -> DeviceResult<String>;
    async fn driver_info(&self) -> DeviceResult<String>;
    async fn driver_version(&self) -> DeviceResult<String>;
    async fn interface_version(&self) -> DeviceResult<i32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_display() {
        let err = DeviceError::invalid_value("angle 405 outside [0, 360)");
        assert_eq!(err.kind, ErrorKind::InvalidValue);
        assert_eq!(err.to_string(), "InvalidValue: angle 405 outside [0, 360)");
    }

    #[test]
    fn test_not_implemented_names_member() {
        let err = DeviceError::not_implemented("Reverse");
        assert_eq!(err.kind, ErrorKind::NotImplemented);
        assert!(err.message.contains("Reverse"));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(3).as_f64(), Some(3.0));
        assert_eq!(Value::from(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::from(true).as_f64(), None);
        assert_eq!(Value::Enum("Open").to_string(), "Open");
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("rotator".parse::<DeviceCategory>().unwrap(), DeviceCategory::Rotator);
        assert_eq!(
            "Cover_Calibrator".parse::<DeviceCategory>().unwrap(),
            DeviceCategory::CoverCalibrator
        );
        assert!("telescope".parse::<DeviceCategory>().is_err());
    }
}
