//! Observability helpers: the in-memory event journal plus optional spans and counters.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (on by default) to emit structured spans named `bearer_guard.flow` with
//!   the `flow` and `stage` fields, and to mirror every journal entry as a `tracing` event.
//! - Enable `metrics` to increment the `bearer_guard_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod journal;
mod metrics;
mod tracing;

pub use journal::*;
pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authenticated request through the executor.
	Request,
	/// Request that skips authentication.
	PublicRequest,
	/// Recovery cycle run by the coordinator.
	Recovery,
	/// Single replay after a recovered 401.
	Replay,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Request => "request",
			FlowKind::PublicRequest => "public_request",
			FlowKind::Recovery => "recovery",
			FlowKind::Replay => "replay",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
