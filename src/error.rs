//! Custom error types for the application.
//!
//! Two layers of errors exist in the harness and they never mix:
//!
//! - **`DeviceError`** (in [`crate::hardware`]) is what a driver under test returns. It is
//!   *data*: the sequencer classifies it into a verdict and carries on.
//! - **`ConformError`** (this module) is what the harness itself can fail with while
//!   loading configuration, writing a report, or being asked for an unknown device
//!   category. These are propagated with `?` up to the binary.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically parse or type errors in the
//!   TOML file or in `CONFORM_` environment overrides.
//! - **`Configuration`**: Semantic errors caught by validation (e.g. an `ok` tolerance
//!   band wider than the `info` band).
//! - **`Io`**: Wraps `std::io::Error` when writing reports.
//! - **`Report`**: JSON serialization of a report failed.
//! - **`UnknownCategory`**: A device category name that no sequencer exists for.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, ConformError>;

/// Errors raised by the harness itself, as opposed to by a driver under test.
#[derive(Error, Debug)]
pub enum ConformError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report serialization error: {0}")]
    Report(#[from] serde_json::Error),

    #[error("Unknown device category '{0}'")]
    UnknownCategory(String),
}

impl From<figment::Error> for ConformError {
    fn from(err: figment::Error) -> Self {
        ConformError::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConformError::Configuration("ok band wider than info band".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration validation error: ok band wider than info band"
        );
    }

    #[test]
    fn test_unknown_category_display() {
        let err = ConformError::UnknownCategory("telescope".into());
        assert!(err.to_string().contains("telescope"));
    }
}
