// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for session token lookups.
#[derive(Debug, Default)]
pub struct SessionMetrics {
	hits: AtomicU64,
	exchanges: AtomicU64,
	failures: AtomicU64,
}
impl SessionMetrics {
	/// Returns the number of lookups served from the cache.
	pub fn hits(&self) -> u64 {
		self.hits.load(Ordering::Relaxed)
	}

	/// Returns the number of exchange requests sent to the provider.
	pub fn exchanges(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	/// Returns the number of failed exchanges.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_hit(&self) {
		self.hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_exchange(&self) {
		self.exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
