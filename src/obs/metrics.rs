// self
use crate::obs::{FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"downscoped_credentials_flow_total",
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

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::obs::record_result;

	#[test]
	fn recording_is_a_noop_without_a_recorder() {
		record_flow_outcome(FlowKind::TokenInfo, FlowOutcome::Attempt);
		record_result::<(), ()>(FlowKind::Refresh, &Err(()));
	}
}
