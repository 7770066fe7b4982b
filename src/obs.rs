//! Optional observability helpers for broker flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `copilot_broker.flow` with the `flow` (operation)
//!   and `stage` (call site) fields, plus debug/warn events for poll signals and provider failures.
//! - Enable `metrics` to increment the `copilot_broker_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`, plus
//!   `copilot_broker_device_poll_signal_total` (by `signal`) and
//!   `copilot_broker_session_lookup_total` (by `source`).

mod metrics;
mod tracing;

pub use self::metrics::*;
pub use self::tracing::*;

// self
use crate::_prelude::*;

/// Broker operations observed by the instrumentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Device code + user code issuance.
	DeviceAuthorization,
	/// Device code polling against the access token endpoint.
	DevicePoll,
	/// Primary credential to session token exchange.
	SessionToken,
	/// Chat completion request.
	ChatCompletion,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::DeviceAuthorization => "device_authorization",
			FlowKind::DevicePoll => "device_poll",
			FlowKind::SessionToken => "session_token",
			FlowKind::ChatCompletion => "chat_completion",
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
	/// Entry to a broker helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Bounded poll window elapsed without a decision.
	Pending,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Pending => "pending",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
