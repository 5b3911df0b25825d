//! Optional observability helpers for credential refreshes.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `downscoped_credentials.flow` with the `flow`
//!   (refresh or endpoint call), `stage` (call site), and `reason` fields.
//! - Enable `metrics` to increment the `downscoped_credentials_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::{_prelude::*, sts::StsEndpointKind};

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Full downscoped refresh (root refresh, exchange, optional token-info lookup).
	Refresh,
	/// Token-exchange POST.
	TokenExchange,
	/// Token-info GET used when the exchange omits `expires_in`.
	TokenInfo,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Refresh => "refresh",
			FlowKind::TokenExchange => "token_exchange",
			FlowKind::TokenInfo => "token_info",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl From<StsEndpointKind> for FlowKind {
	fn from(kind: StsEndpointKind) -> Self {
		match kind {
			StsEndpointKind::TokenExchange => FlowKind::TokenExchange,
			StsEndpointKind::TokenInfo => FlowKind::TokenInfo,
		}
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

/// Records the terminal outcome of `result` for `kind`.
pub fn record_result<T, E>(kind: FlowKind, result: &Result<T, E>) {
	match result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => record_flow_outcome(kind, FlowOutcome::Failure),
	}
}
