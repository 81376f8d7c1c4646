//! Core library for the rust_conform harness.
//!
//! Drives hardware-control drivers through their published interface and
//! records a verdict (`Ok`, `Info`, `Issue`, `Error`) for every check. The
//! library is used by the `rust_conform` binary and by the integration tests.
//!
//! - [`conformance`] - test-orchestration primitives (classifier, poller,
//!   sync/async detector, tolerance comparator, rate sampler)
//! - [`sequencer`] - per-category test sequences built from those primitives
//! - [`hardware`] - device capability traits and in-process simulators
//! - [`report`] - verdict records and the in-memory report sink
//! - [`config`] and [`logging`] - ambient setup for the binary

pub mod config;
pub mod conformance;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod report;
pub mod sequencer;
