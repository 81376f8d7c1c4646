//! Check outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of one check's outcome, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Behaviour matches the interface.
    Ok,
    /// Informational: skipped, or a minor deviation worth noting.
    Info,
    /// The driver violates the interface.
    Issue,
    /// An unexpected failure that could not be classified as a contract violation.
    Error,
}

impl Verdict {
    /// Ok and Info do not count against the driver.
    pub fn is_acceptable(&self) -> bool {
        matches!(self, Verdict::Ok | Verdict::Info)
    }

    /// Upper-case label, as printed in summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Ok => "OK",
            Verdict::Info => "INFO",
            Verdict::Issue => "ISSUE",
            Verdict::Error => "ERROR",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
