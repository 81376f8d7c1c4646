//! Three-band tolerance comparison, wrap-aware for circular quantities.
//!
//! Physical actuators rarely land exactly on target. Deviations up to the
//! `ok` band pass, up to the `info` band are noted, and anything larger is an
//! Issue.

use super::Verdict;
use serde::{Deserialize, Serialize};

/// Width of the Ok and Info bands, in the quantity's own units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceBand {
    pub ok: f64,
    pub info: f64,
}

impl ToleranceBand {
    pub const fn new(ok: f64, info: f64) -> Self {
        Self { ok, info }
    }

    /// Only an exact match passes.
    pub const fn exact() -> Self {
        Self { ok: 0.0, info: 0.0 }
    }
}

/// One actual-versus-expected comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToleranceSpec {
    pub expected: f64,
    pub actual: f64,
    /// `Some(period)` for quantities that wrap (e.g. 360 for angles).
    pub period: Option<f64>,
    pub band: ToleranceBand,
}

impl ToleranceSpec {
    pub fn linear(expected: f64, actual: f64, band: ToleranceBand) -> Self {
        Self {
            expected,
            actual,
            period: None,
            band,
        }
    }

    pub fn circular(expected: f64, actual: f64, period: f64, band: ToleranceBand) -> Self {
        Self {
            expected,
            actual,
            period: Some(period),
            band,
        }
    }

    pub fn wraps(&self) -> bool {
        self.period.is_some()
    }
}

/// Signed difference `actual - expected`, normalised into `[-P/2, P/2)` when the quantity wraps.
pub fn signed_difference(spec: &ToleranceSpec) -> f64 {
    let d = spec.actual - spec.expected;
    match spec.period {
        Some(period) if period > 0.0 => {
            let half = period / 2.0;
            (d + half).rem_euclid(period) - half
        }
        _ => d,
    }
}

/// Minimal absolute distance between actual and expected.
pub fn deviation(spec: &ToleranceSpec) -> f64 {
    signed_difference(spec).abs()
}

/// Classify a deviation against its tolerance band.
pub fn compare(spec: &ToleranceSpec) -> Verdict {
    let d = deviation(spec);
    if d <= spec.band.ok {
        Verdict::Ok
    } else if d <= spec.band.info {
        Verdict::Info
    } else {
        Verdict::Issue
    }
}

/// Normalise an angle-like value into `[0, period)`.
pub fn wrap(value: f64, period: f64) -> f64 {
    let wrapped = value.rem_euclid(period);
    // rem_euclid can round up to exactly `period` for tiny negative inputs
    if wrapped >= period {
        0.0
    } else {
        wrapped
    }
}
