//! Optional observability helpers for relay operations.
//!
//! # Feature Flags
//!
//! - `tracing` (default) emits spans named `oauth2_token_relay.op` carrying `op` and `stage`
//!   fields, plus `warn` events for failures the scheduler swallows.
//! - `metrics` increments the `oauth2_token_relay_op_total` counter for every
//!   attempt/success/failure, labeled by `op` and `outcome`.

mod metrics;
mod tracing;

pub use self::{metrics::*, tracing::*};

// self
use crate::_prelude::*;

/// Relay operations observed by spans and counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
	/// Client-credentials exchange against the issuer.
	AcquireToken,
	/// One scheduler tick (acquire then write).
	RefreshTick,
	/// Outbound call to the protected API.
	Invoke,
	/// Inbound bearer-token validation.
	Authorize,
}
impl OperationKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationKind::AcquireToken => "acquire_token",
			OperationKind::RefreshTick => "refresh_tick",
			OperationKind::Invoke => "invoke",
			OperationKind::Authorize => "authorize",
		}
	}
}
impl Display for OperationKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationOutcome {
	/// Entry to a relay operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller or swallowed by the scheduler.
	Failure,
}
impl OperationOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationOutcome::Attempt => "attempt",
			OperationOutcome::Success => "success",
			OperationOutcome::Failure => "failure",
		}
	}
}
impl Display for OperationOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records the outcome of `result` for `kind` and hands it back unchanged.
pub(crate) fn record_result<T, E>(kind: OperationKind, result: Result<T, E>) -> Result<T, E> {
	match &result {
		Ok(_) => record_operation_outcome(kind, OperationOutcome::Success),
		Err(_) => record_operation_outcome(kind, OperationOutcome::Failure),
	}

	result
}
