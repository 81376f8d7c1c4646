//! Verdict collection.
//!
//! The sequencer delivers one [`CheckRecord`] per check to a [`ReportSink`].
//! [`ConformanceReport`] is the in-memory sink used by the binary and the
//! tests: it keeps every record, counts verdicts and exports JSON. How a
//! report is rendered for humans is left to whoever consumes the JSON.

use crate::conformance::Verdict;
use crate::error::AppResult;
use crate::hardware::DeviceCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub category: DeviceCategory,
    /// Check name for display (e.g. "MoveAbsolute 45").
    pub check: String,
    /// Device member the check exercised.
    pub member: String,
    pub verdict: Verdict,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl CheckRecord {
    pub fn new(
        category: DeviceCategory,
        check: impl Into<String>,
        member: impl Into<String>,
        verdict: Verdict,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            check: check.into(),
            member: member.into(),
            verdict,
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Destination for verdict records.
pub trait ReportSink: Send + Sync {
    fn record(&mut self, record: CheckRecord);
}

impl ReportSink for Vec<CheckRecord> {
    fn record(&mut self, record: CheckRecord) {
        self.push(record);
    }
}

/// Number of records per verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictCounts {
    pub ok: usize,
    pub info: usize,
    pub issue: usize,
    pub error: usize,
}

impl VerdictCounts {
    pub fn add(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Ok => self.ok += 1,
            Verdict::Info => self.info += 1,
            Verdict::Issue => self.issue += 1,
            Verdict::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.ok + self.info + self.issue + self.error
    }

    /// True when no Issue or Error was recorded.
    pub fn is_conformant(&self) -> bool {
        self.issue == 0 && self.error == 0
    }
}

impl FromIterator<Verdict> for VerdictCounts {
    fn from_iter<I: IntoIterator<Item = Verdict>>(iter: I) -> Self {
        let mut counts = VerdictCounts::default();
        for verdict in iter {
            counts.add(verdict);
        }
        counts
    }
}

/// All records from one harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConformanceReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Driver identification, filled in by the caller when known.
    pub device: Option<String>,
    pub records: Vec<CheckRecord>,
}

impl Default for ConformanceReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ConformanceReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            device: None,
            records: Vec::new(),
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn counts(&self) -> VerdictCounts {
        self.records.iter().map(|r| r.verdict).collect()
    }

    /// Records with an Issue or Error verdict.
    pub fn failures(&self) -> Vec<&CheckRecord> {
        self.records
            .iter()
            .filter(|r| !r.verdict.is_acceptable())
            .collect()
    }

    /// First record for a given check name.
    pub fn find(&self, check: &str) -> Option<&CheckRecord> {
        self.records.iter().find(|r| r.check == check)
    }

    /// All records for a given device member.
    pub fn for_member<'a>(&'a self, member: &'a str) -> impl Iterator<Item = &'a CheckRecord> + 'a {
        self.records.iter().filter(move |r| r.member == member)
    }

    /// Export report as JSON
    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl ReportSink for ConformanceReport {
    fn record(&mut self, record: CheckRecord) {
        self.records.push(record);
    }
}
