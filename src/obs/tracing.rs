// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by broker flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("copilot_broker.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a debug event for a non-terminal device poll signal.
pub fn record_poll_signal(signal: &'static str, attempt: u32, interval: Duration) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(signal, attempt, interval_secs = interval.whole_seconds(), "Device poll.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (signal, attempt, interval);
	}
}

/// Emits a debug event when a session token is served without a network call.
pub fn record_session_cache_hit(remaining: Duration) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(
			remaining_secs = remaining.whole_seconds(),
			"Session token served from cache."
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = remaining;
	}
}

/// Emits a warning for a failure reported by a provider endpoint.
pub fn record_provider_failure(kind: FlowKind, error: &Error) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(flow = kind.as_str(), error = %error, "Provider call failed.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, error);
	}
}
