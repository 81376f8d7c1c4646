//! Shared test-orchestration primitives.
//!
//! These recur, with only device-specific parameters, in every device
//! sequencer:
//!
//! - [`requirement`] - classify device failures against a requirement policy
//! - [`poller`] - bounded, cancellable waits on a predicate
//! - [`detector`] - discover synchronous versus asynchronous command completion
//! - [`tolerance`] - three-band comparison, wrap-aware for angles
//! - [`sampler`] - transaction-rate measurement

pub mod cancel;
pub mod detector;
pub mod poller;
pub mod requirement;
pub mod sampler;
pub mod tolerance;
pub mod verdict;

pub use cancel::CancellationSignal;
pub use detector::{
    await_completion, invoke_and_classify, AsyncDetection, Completion, WaitSettings,
    DEFAULT_ASYNC_THRESHOLD,
};
pub use poller::{poll_until_false, PollOutcome, PollSpec, Predicate, ProgressReader, StopReason};
pub use requirement::{classify, RequirementPolicy};
pub use sampler::{sample, RateBand, SampleOutcome};
pub use tolerance::{compare, deviation, ToleranceBand, ToleranceSpec};
pub use verdict::Verdict;
