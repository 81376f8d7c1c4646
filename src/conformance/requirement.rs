//! Requirement policies and the failure classifier.
//!
//! Every member call is made under a [`RequirementPolicy`] chosen at the call
//! site, often from capability flags gathered earlier in the run. The
//! classifier turns "did it raise, and with what kind" into a [`Verdict`].
//!
//! | Policy | not raised | NotImplemented | InvalidValue | InvalidOperation | Other |
//! |---|---|---|---|---|---|
//! | Mandatory | Ok | Issue | Issue (Ok when expecting it) | Issue | Error |
//! | Optional | Ok | Ok | Issue | Issue | Issue |
//! | MustBeImplemented | Ok | Issue | Issue | Issue | Issue |
//! | MustNotBeImplemented | Issue | Ok | Issue | Issue | Issue |

use super::Verdict;
use crate::hardware::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared expectation for whether a member may legally fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequirementPolicy {
    /// Must work; any failure is a contract violation.
    Mandatory,
    /// May be absent (`NotImplemented`), but must not fail any other way.
    Optional,
    /// A capability flag says the member exists, so it must work.
    MustBeImplemented,
    /// A capability flag says the member does not exist, so it must raise `NotImplemented`.
    MustNotBeImplemented,
}

impl RequirementPolicy {
    /// Pick between two policies on a capability flag.
    pub fn when(capable: bool, present: RequirementPolicy, absent: RequirementPolicy) -> Self {
        if capable {
            present
        } else {
            absent
        }
    }

    /// Name used in record messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementPolicy::Mandatory => "Mandatory",
            RequirementPolicy::Optional => "Optional",
            RequirementPolicy::MustBeImplemented => "MustBeImplemented",
            RequirementPolicy::MustNotBeImplemented => "MustNotBeImplemented",
        }
    }
}

impl fmt::Display for RequirementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a member call outcome.
///
/// `raised` is `None` when the call succeeded. `expecting_invalid_value` marks
/// a call made with a deliberately out-of-domain argument.
pub fn classify(
    policy: RequirementPolicy,
    raised: Option<ErrorKind>,
    expecting_invalid_value: bool,
) -> Verdict {
    use ErrorKind::*;
    use RequirementPolicy::*;

    match (policy, raised) {
        (MustNotBeImplemented, None) => Verdict::Issue,
        (_, None) => Verdict::Ok,

        (Mandatory, Some(InvalidValue)) if expecting_invalid_value => Verdict::Ok,
        (Mandatory, Some(Other)) => Verdict::Error,
        (Mandatory, Some(_)) => Verdict::Issue,

        (Optional, Some(NotImplemented)) => Verdict::Ok,
        (Optional, Some(_)) => Verdict::Issue,

        (MustBeImplemented, Some(_)) => Verdict::Issue,

        (MustNotBeImplemented, Some(NotImplemented)) => Verdict::Ok,
        (MustNotBeImplemented, Some(_)) => Verdict::Issue,
    }
}

/// Human-readable explanation to accompany a classified verdict.
pub fn explain(
    member: &str,
    policy: RequirementPolicy,
    raised: Option<(ErrorKind, &str)>,
    verdict: Verdict,
) -> String {
    match (policy, raised, verdict) {
        (RequirementPolicy::MustNotBeImplemented, None, _) => format!(
            "{} succeeded but the capability flag says it is not supported; \
             capability false but no exception raised",
            member
        ),
        (_, None, _) => format!("{} succeeded", member),
        (_, Some((ErrorKind::NotImplemented, _)), Verdict::Ok) => match policy {
            RequirementPolicy::MustNotBeImplemented => {
                format!("{} correctly reports NotImplemented", member)
            }
            _ => format!("{} is not implemented (optional member)", member),
        },
        (_, Some((ErrorKind::InvalidValue, _)), Verdict::Ok) => {
            format!("{} correctly rejected an invalid value", member)
        }
        (_, Some((kind, message)), _) => format!(
            "{} raised {} under {} policy: {}",
            member, kind, policy, message
        ),
    }
}
