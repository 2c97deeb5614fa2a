// self
use crate::{
	classify::ErrorCategory,
	obs::{FlowKind, FlowOutcome},
};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"bearer_guard_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records one failed attempt, labeled by category and whether it will be retried.
pub fn record_attempt_failure(category: ErrorCategory, retrying: bool) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"bearer_guard_attempt_failure_total",
			"category" => category.as_str(),
			"retrying" => if retrying { "true" } else { "false" }
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (category, retrying);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_are_safe_without_a_global_recorder() {
		record_flow_outcome(FlowKind::Replay, FlowOutcome::Failure);
		record_attempt_failure(ErrorCategory::Server, true);
	}
}
