//! Device test sequencer.
//!
//! One [`Sequencer`] drives one device through a fixed, strictly forward
//! series of phases:
//!
//! ```text
//! NotStarted -> RunningPrerequisites -> RunningProperties
//!            -> RunningMethods -> RunningPerformance -> Done
//! ```
//!
//! What is tested in each phase comes from a [`DeviceSuite`]: property checks
//! are data ([`PropertyCheck`] tables), method checks are short async routines
//! built from the helpers on [`Sequencer`], and performance checks are a table
//! of [`PerformanceCheck`]s.
//!
//! Every check produces exactly one verdict record, delivered to the
//! [`ReportSink`]. Nothing a device does aborts a run; only cancellation stops
//! it early, in which case the remaining checks are not executed and the run
//! still ends in `Done`.

use crate::config::CategorySettings;
use crate::conformance::requirement::explain;
use crate::conformance::{
    await_completion, classify, compare, deviation, invoke_and_classify, poll_until_false, sample,
    CancellationSignal, Completion, PollSpec, Predicate, ProgressReader, RequirementPolicy,
    StopReason, ToleranceBand, ToleranceSpec, Verdict, WaitSettings,
};
use crate::hardware::{Device, DeviceCategory, DeviceResult, ErrorKind, Value};
use crate::report::{CheckRecord, ReportSink, VerdictCounts};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use tracing::{debug, error, info, warn};

pub mod common;
pub mod cover_calibrator;
pub mod focuser;
pub mod rotator;

pub use cover_calibrator::CoverCalibratorSuite;
pub use focuser::FocuserSuite;
pub use rotator::RotatorSuite;

/// Sequencer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SequencerState {
    NotStarted,
    RunningPrerequisites,
    RunningProperties,
    RunningMethods,
    RunningPerformance,
    Done,
}

/// Named facts learned during a run that later checks depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Connected,
    CanReverse,
    Absolute,
    MaxStep,
    TempCompAvailable,
    CoverPresent,
    CalibratorPresent,
    MaxBrightnessOk,
}

/// Capability flags owned by one run.
///
/// A flag is *set* once its producing check has succeeded, and then carries
/// the value that check learned. Unset flags block dependent checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityFlags {
    flags: HashMap<Capability, bool>,
}

impl CapabilityFlags {
    pub fn set(&mut self, capability: Capability, value: bool) {
        self.flags.insert(capability, value);
    }

    pub fn is_set(&self, capability: Capability) -> bool {
        self.flags.contains_key(&capability)
    }

    pub fn get(&self, capability: Capability) -> Option<bool> {
        self.flags.get(&capability).copied()
    }

    /// Value of a flag, false when unset.
    pub fn value(&self, capability: Capability) -> bool {
        self.get(capability).unwrap_or(false)
    }

    pub fn first_missing(&self, required: &[Capability]) -> Option<Capability> {
        required.iter().copied().find(|c| !self.is_set(*c))
    }
}

/// Mutable per-run state: capability flags and the last good reading of each property.
#[derive(Debug, Default)]
pub struct RunContext {
    pub flags: CapabilityFlags,
    pub readings: HashMap<&'static str, Value>,
}

impl RunContext {
    pub fn reading(&self, member: &str) -> Option<&Value> {
        self.readings.get(member)
    }
}

/// Outcome of judging a successfully read value.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgement {
    pub verdict: Verdict,
    pub message: String,
    /// Value for the produced flag when it is not simply the read value.
    pub flag: Option<bool>,
}

impl Judgement {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Ok,
            message: message.into(),
            flag: None,
        }
    }

    pub fn issue(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Issue,
            message: message.into(),
            flag: None,
        }
    }

    pub fn with_flag(mut self, flag: bool) -> Self {
        self.flag = Some(flag);
        self
    }
}

/// Reads one member and returns it as a [`Value`].
pub type Reader<D> = for<'d> fn(&'d D) -> BoxFuture<'d, DeviceResult<Value>>;

/// Chooses a requirement policy from the flags known so far.
pub type PolicySelector = fn(&CapabilityFlags) -> RequirementPolicy;

/// Judges a value that was read successfully.
pub type Judge = fn(&Value, &RunContext) -> Judgement;

/// One row of a property table.
pub struct PropertyCheck<D: ?Sized> {
    pub member: &'static str,
    pub requires: &'static [Capability],
    pub policy: PolicySelector,
    pub read: Reader<D>,
    pub judge: Judge,
    pub produces: Option<Capability>,
}

/// One row of a performance table.
pub struct PerformanceCheck<D: ?Sized> {
    pub member: &'static str,
    pub requires: &'static [Capability],
    pub read: Reader<D>,
}

/// Everything one device category contributes to a run.
#[async_trait]
pub trait DeviceSuite: Send + Sync + 'static {
    type Device: Device + ?Sized + 'static;

    const CATEGORY: DeviceCategory;

    fn properties() -> Vec<PropertyCheck<Self::Device>>;

    async fn methods(seq: &mut Sequencer<'_, Self::Device>);

    fn performance_checks() -> Vec<PerformanceCheck<Self::Device>>;

    /// Run every phase against `device`.
    async fn run(
        device: &Self::Device,
        settings: CategorySettings,
        cancel: &CancellationSignal,
        sink: &mut dyn ReportSink,
    ) -> RunSummary
    where
        Self: Sized,
    {
        Sequencer::new(device, settings, cancel.clone(), sink)
            .run::<Self>()
            .await
    }
}

/// What a finished run reports back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub category: DeviceCategory,
    pub state: SequencerState,
    pub cancelled: bool,
    pub counts: VerdictCounts,
    pub checks_run: usize,
}

impl RunSummary {
    pub fn is_conformant(&self) -> bool {
        !self.cancelled && self.counts.is_conformant()
    }
}

/// How to watch a command until it completes.
pub struct Monitor<'a> {
    /// Busy indicator; `None` when the device has none.
    pub busy: Option<Predicate<'a>>,
    pub progress: Option<ProgressReader<'a>>,
    pub wait: WaitSettings,
    /// Stops the device when the wait times out.
    pub halt: Option<BoxFuture<'a, DeviceResult<()>>>,
}

impl<'a> Monitor<'a> {
    pub fn new(busy: Predicate<'a>, wait: WaitSettings) -> Self {
        Self {
            busy: Some(busy),
            progress: None,
            wait,
            halt: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressReader<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_halt(mut self, halt: BoxFuture<'a, DeviceResult<()>>) -> Self {
        self.halt = Some(halt);
        self
    }
}

/// Drives one device through its suite.
pub struct Sequencer<'a, D: ?Sized> {
    device: &'a D,
    settings: CategorySettings,
    cancel: CancellationSignal,
    sink: &'a mut dyn ReportSink,
    context: RunContext,
    state: SequencerState,
    counts: VerdictCounts,
    checks_run: usize,
}

impl<'a, D: Device + ?Sized + 'static> Sequencer<'a, D> {
    pub fn new(
        device: &'a D,
        settings: CategorySettings,
        cancel: CancellationSignal,
        sink: &'a mut dyn ReportSink,
    ) -> Self {
        Self {
            device,
            settings,
            cancel,
            sink,
            context: RunContext::default(),
            state: SequencerState::NotStarted,
            counts: VerdictCounts::default(),
            checks_run: 0,
        }
    }

    pub fn device(&self) -> &'a D {
        self.device
    }

    pub fn settings(&self) -> &CategorySettings {
        &self.settings
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn flags(&self) -> &CapabilityFlags {
        &self.context.flags
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run all phases of suite `S`.
    pub async fn run<S>(mut self) -> RunSummary
    where
        S: DeviceSuite<Device = D>,
    {
        info!(category = %S::CATEGORY, "Conformance run starting");

        self.advance(SequencerState::RunningPrerequisites);
        common::connect(&mut self).await;

        self.advance(SequencerState::RunningProperties);
        for check in common::properties::<S::Device>() {
            self.check_property(&check).await;
        }
        for check in S::properties() {
            self.check_property(&check).await;
        }

        if self.settings.run_methods {
            self.advance(SequencerState::RunningMethods);
            S::methods(&mut self).await;
        }

        if self.settings.run_performance {
            self.advance(SequencerState::RunningPerformance);
            for metric in S::performance_checks() {
                self.run_performance(&metric).await;
            }
        }

        self.advance(SequencerState::Done);
        common::disconnect(&mut self).await;

        let summary = RunSummary {
            category: S::CATEGORY,
            state: self.state,
            cancelled: self.cancel.is_cancelled(),
            counts: self.counts,
            checks_run: self.checks_run,
        };
        info!(
            category = %summary.category,
            checks = summary.checks_run,
            ok = summary.counts.ok,
            info = summary.counts.info,
            issues = summary.counts.issue,
            errors = summary.counts.error,
            cancelled = summary.cancelled,
            "Conformance run finished"
        );
        summary
    }

    fn advance(&mut self, next: SequencerState) {
        debug_assert!(next > self.state, "sequencer states only move forward");
        if next > self.state {
            info!(from = ?self.state, to = ?next, "Sequencer phase");
            self.state = next;
        }
    }

    // ------------------------------------------------------------------
    // Micro-protocol
    // ------------------------------------------------------------------

    /// Guard a top-level check. Returns false when the run is cancelled or a
    /// prerequisite flag is unset; the latter is recorded as an Info skip.
    pub fn begin(&mut self, check: &str, member: &str, requires: &[Capability]) -> bool {
        if self.cancel.is_cancelled() {
            debug!(check, "Skipping check, run cancelled");
            return false;
        }
        if let Some(missing) = self.context.flags.first_missing(requires) {
            self.emit(
                check,
                member,
                Verdict::Info,
                format!("Skipped: prerequisite {:?} not established", missing),
            );
            return false;
        }
        self.checks_run += 1;
        true
    }

    /// Record a verdict.
    pub fn emit(&mut self, check: &str, member: &str, verdict: Verdict, message: impl Into<String>) {
        let message = message.into();
        match verdict {
            Verdict::Ok | Verdict::Info => info!(%verdict, check, "{}", message),
            Verdict::Issue => warn!(%verdict, check, "{}", message),
            Verdict::Error => error!(%verdict, check, "{}", message),
        }
        self.counts.add(verdict);
        self.sink.record(CheckRecord::new(
            self.settings.category,
            check,
            member,
            verdict,
            message,
        ));
    }

    /// Set a capability flag directly.
    pub fn set_flag(&mut self, capability: Capability, value: bool) {
        debug!(?capability, value, "Capability established");
        self.context.flags.set(capability, value);
    }

    fn emit_failure(
        &mut self,
        check: &str,
        member: &str,
        policy: RequirementPolicy,
        kind: ErrorKind,
        message: &str,
        expecting_invalid_value: bool,
    ) -> Verdict {
        let verdict = classify(policy, Some(kind), expecting_invalid_value);
        let text = explain(member, policy, Some((kind, message)), verdict);
        self.emit(check, member, verdict, text);
        verdict
    }

    /// Read and judge one property row.
    pub async fn check_property(&mut self, check: &PropertyCheck<D>) -> Option<Value> {
        if !self.begin(check.member, check.member, check.requires) {
            return None;
        }
        let policy = (check.policy)(&self.context.flags);

        match (check.read)(self.device).await {
            Ok(value) => {
                let verdict = classify(policy, None, false);
                if verdict != Verdict::Ok {
                    let text = explain(check.member, policy, None, verdict);
                    self.emit(check.member, check.member, verdict, text);
                    return Some(value);
                }

                let judgement = (check.judge)(&value, &self.context);
                self.emit(check.member, check.member, judgement.verdict, judgement.message);
                if judgement.verdict.is_acceptable() {
                    if let Some(capability) = check.produces {
                        let flag = judgement.flag.or(value.as_bool()).unwrap_or(true);
                        self.set_flag(capability, flag);
                    }
                    self.context.readings.insert(check.member, value.clone());
                }
                Some(value)
            }
            Err(err) => {
                self.emit_failure(check.member, check.member, policy, err.kind, &err.message, false);
                None
            }
        }
    }

    /// Call a member and classify the outcome. Records a verdict either way.
    pub async fn invoke<T, F>(
        &mut self,
        check: &str,
        member: &str,
        policy: RequirementPolicy,
        call: F,
    ) -> Option<T>
    where
        F: Future<Output = DeviceResult<T>> + Send,
    {
        match call.await {
            Ok(value) => {
                let verdict = classify(policy, None, false);
                let text = if verdict == Verdict::Ok {
                    format!("{} succeeded", member)
                } else {
                    explain(member, policy, None, verdict)
                };
                self.emit(check, member, verdict, text);
                Some(value)
            }
            Err(err) => {
                self.emit_failure(check, member, policy, err.kind, &err.message, false);
                None
            }
        }
    }

    /// Call a member that only records a verdict when it fails.
    pub async fn invoke_quietly<T, F>(
        &mut self,
        check: &str,
        member: &str,
        policy: RequirementPolicy,
        call: F,
    ) -> Option<T>
    where
        F: Future<Output = DeviceResult<T>> + Send,
    {
        match call.await {
            Ok(value) => Some(value),
            Err(err) => {
                self.emit_failure(check, member, policy, err.kind, &err.message, false);
                None
            }
        }
    }

    /// Call a member with a deliberately invalid argument. Success is an
    /// Issue; `InvalidValue` is the expected outcome.
    pub async fn invoke_expecting_invalid<T, F>(
        &mut self,
        check: &str,
        member: &str,
        argument: impl Display,
        call: F,
    ) -> Verdict
    where
        F: Future<Output = DeviceResult<T>> + Send,
    {
        let policy = RequirementPolicy::Mandatory;
        match call.await {
            Ok(_) => {
                self.emit(
                    check,
                    member,
                    Verdict::Issue,
                    format!("{} accepted invalid value {} without raising InvalidValue", member, argument),
                );
                Verdict::Issue
            }
            Err(err) if err.kind == ErrorKind::InvalidValue => {
                self.emit(
                    check,
                    member,
                    Verdict::Ok,
                    format!("{} rejected invalid value {} with InvalidValue", member, argument),
                );
                Verdict::Ok
            }
            Err(err) => self.emit_failure(check, member, policy, err.kind, &err.message, true),
        }
    }

    /// Issue a command that may complete synchronously or asynchronously and
    /// wait for it to finish.
    ///
    /// Returns `None` when the command itself failed. A timed-out wait halts
    /// the device through `monitor.halt` so later checks start from rest.
    ///
    /// Callers handle `MustNotBeImplemented` members with [`Sequencer::invoke`].
    pub async fn command<F>(
        &mut self,
        check: &str,
        member: &str,
        policy: RequirementPolicy,
        call: F,
        monitor: Monitor<'a>,
    ) -> Option<Completion>
    where
        F: Future<Output = DeviceResult<()>> + Send,
    {
        debug_assert_ne!(policy, RequirementPolicy::MustNotBeImplemented);
        let detection = match invoke_and_classify(call, self.settings.async_threshold).await {
            Ok(((), detection)) => detection,
            Err(err) => {
                self.emit_failure(check, member, policy, err.kind, &err.message, false);
                return None;
            }
        };

        let completion = await_completion(
            member,
            detection,
            monitor.busy,
            monitor.progress,
            monitor.wait,
            &self.cancel,
        )
        .await;
        if completion != Completion::Cancelled {
            self.emit(check, member, completion.verdict(), completion.describe(member));
        }
        if let (Completion::TimedOut { .. }, Some(halt)) = (&completion, monitor.halt) {
            match halt.await {
                Ok(()) => debug!(check, "Halted after timeout"),
                Err(err) => debug!(check, error = %err, "Halt after timeout failed"),
            }
        }
        Some(completion)
    }

    /// Wait for a busy indicator to clear without issuing a command.
    ///
    /// Records an Issue on timeout; returns whether the device came to rest.
    pub async fn wait_until_idle(
        &mut self,
        check: &str,
        member: &str,
        busy: Predicate<'a>,
        wait: WaitSettings,
    ) -> bool {
        let spec = PollSpec::from_predicate(format!("{} idle", member), busy)
            .interval(wait.interval)
            .timeout(wait.timeout);
        match poll_until_false(spec, &self.cancel).await {
            Ok(outcome) => match outcome.stopped {
                StopReason::Predicate => true,
                StopReason::Cancelled => false,
                StopReason::Timeout => {
                    self.emit(
                        check,
                        member,
                        Verdict::Issue,
                        format!(
                            "{} still busy after {:.1}s",
                            member,
                            outcome.elapsed.as_secs_f64()
                        ),
                    );
                    false
                }
            },
            Err(err) => {
                debug!(check, error = %err, "Busy indicator unreadable, assuming idle");
                true
            }
        }
    }

    /// Read a numeric member and compare it with `expected`.
    pub async fn verify_quantity<F>(
        &mut self,
        check: &str,
        member: &str,
        expected: f64,
        read: F,
        period: Option<f64>,
        band: ToleranceBand,
    ) -> Option<f64>
    where
        F: Future<Output = DeviceResult<f64>> + Send,
    {
        let actual = self
            .invoke_quietly(check, member, RequirementPolicy::Mandatory, read)
            .await?;
        let spec = match period {
            Some(period) => ToleranceSpec::circular(expected, actual, period, band),
            None => ToleranceSpec::linear(expected, actual, band),
        };
        let verdict = compare(&spec);
        let message = format!(
            "{} expected {}, read {} (deviation {:.3}, ok within {}, info within {})",
            member,
            expected,
            actual,
            deviation(&spec),
            band.ok,
            band.info
        );
        self.emit(check, member, verdict, message);
        Some(actual)
    }

    /// Read a member and check it equals `expected`.
    pub async fn verify_state<T, F>(&mut self, check: &str, member: &str, expected: T, read: F) -> bool
    where
        T: PartialEq + std::fmt::Debug + Send,
        F: Future<Output = DeviceResult<T>> + Send,
    {
        let Some(actual) = self
            .invoke_quietly(check, member, RequirementPolicy::Mandatory, read)
            .await
        else {
            return false;
        };
        if actual == expected {
            self.emit(check, member, Verdict::Ok, format!("{} is {:?} as expected", member, actual));
            true
        } else {
            self.emit(
                check,
                member,
                Verdict::Issue,
                format!("{} is {:?}, expected {:?}", member, actual, expected),
            );
            false
        }
    }

    /// Measure the transaction rate of one member.
    pub async fn run_performance(&mut self, metric: &PerformanceCheck<D>) {
        let check = format!("{} Performance", metric.member);
        if !self.begin(&check, metric.member, metric.requires) {
            return;
        }
        let device = self.device;
        let read = metric.read;
        match sample(|| read(device), self.settings.performance_window, &self.cancel).await {
            Ok(outcome) if outcome.cancelled => {
                debug!(check = %check, "Sampling cancelled");
            }
            Ok(outcome) => {
                let band = outcome.band();
                self.emit(
                    &check,
                    metric.member,
                    band.verdict(),
                    format!(
                        "{} transaction rate {:.1}/s over {:.1}s ({})",
                        metric.member,
                        outcome.rate(),
                        outcome.elapsed.as_secs_f64(),
                        band.as_str()
                    ),
                );
            }
            Err(err) => {
                self.emit_failure(
                    &check,
                    metric.member,
                    RequirementPolicy::Optional,
                    err.kind,
                    &err.message,
                    false,
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Wait settings
    // ------------------------------------------------------------------

    /// Wait bounds for motion and cover operations.
    pub fn operation_wait(&self) -> WaitSettings {
        WaitSettings {
            interval: self.settings.poll_interval,
            timeout: self.settings.operation_timeout,
        }
    }

    /// Wait bounds for calibrator warm-up.
    pub fn calibrator_wait(&self) -> WaitSettings {
        WaitSettings {
            interval: self.settings.poll_interval,
            timeout: self.settings.calibrator_timeout,
        }
    }
}

// ----------------------------------------------------------------------
// Judges shared by the property tables
// ----------------------------------------------------------------------

/// Accept any value.
pub fn accept(value: &Value, _: &RunContext) -> Judgement {
    Judgement::ok(format!("{}", value))
}

/// Strings must be non-empty.
pub fn non_empty(value: &Value, _: &RunContext) -> Judgement {
    match value {
        Value::Text(text) if !text.trim().is_empty() => Judgement::ok(text.clone()),
        other => Judgement::issue(format!("expected a non-empty string, got '{}'", other)),
    }
}

/// Numbers must be zero or greater.
pub fn non_negative(value: &Value, _: &RunContext) -> Judgement {
    match value.as_f64() {
        Some(n) if n >= 0.0 => Judgement::ok(format!("{}", value)),
        _ => Judgement::issue(format!("expected a non-negative number, got {}", value)),
    }
}

/// Numbers must be strictly positive.
pub fn positive(value: &Value, _: &RunContext) -> Judgement {
    match value.as_f64() {
        Some(n) if n > 0.0 => Judgement::ok(format!("{}", value)),
        _ => Judgement::issue(format!("expected a positive number, got {}", value)),
    }
}

/// Angles must lie in `[0, 360)`.
pub fn angle(value: &Value, _: &RunContext) -> Judgement {
    match value.as_f64() {
        Some(a) if (0.0..360.0).contains(&a) => Judgement::ok(format!("{}", value)),
        _ => Judgement::issue(format!("{} is outside [0, 360)", value)),
    }
}
