// self
use crate::obs::{FlowKind, FlowOutcome};

/// How a session token lookup was satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionLookup {
	/// Served from the cache without a network call.
	CacheHit,
	/// Required a primary-to-session exchange.
	Exchange,
}
impl SessionLookup {
	/// Returns a stable label suitable for metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			SessionLookup::CacheHit => "cache_hit",
			SessionLookup::Exchange => "exchange",
		}
	}
}

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"copilot_broker_flow_total",
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

/// Counts a device poll that kept the request outstanding, labeled by the provider's signal
/// (`authorization_pending` or `slow_down`).
pub fn record_poll_signal_total(signal: &'static str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("copilot_broker_device_poll_signal_total", "signal" => signal)
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = signal;
	}
}

/// Counts a session token lookup by how it was satisfied.
pub fn record_session_lookup(lookup: SessionLookup) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("copilot_broker_session_lookup_total", "source" => lookup.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = lookup;
	}
}
