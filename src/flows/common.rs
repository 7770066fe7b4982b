//! Shared helpers for flow implementations (sleeping between polls).

// self
use crate::_prelude::*;

/// Boxed future returned by [`Sleeper::sleep`].
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Suspends the polling task between device-flow attempts.
///
/// Hosts on a runtime other than tokio supply their own implementation. The returned future must
/// be cancel-safe: dropping it abandons the wait with no other effect.
pub trait Sleeper
where
	Self: 'static + Send + Sync,
{
	/// Returns a future that resolves once `duration` has elapsed.
	fn sleep(&self, duration: Duration) -> SleepFuture;
}

/// Sleeper backed by the tokio timer.
#[cfg(feature = "tokio")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;
#[cfg(feature = "tokio")]
impl Sleeper for TokioSleeper {
	fn sleep(&self, duration: Duration) -> SleepFuture {
		Box::pin(tokio::time::sleep(duration.unsigned_abs()))
	}
}

pub(crate) fn default_sleeper() -> Option<Arc<dyn Sleeper>> {
	#[cfg(feature = "tokio")]
	{
		Some(Arc::new(TokioSleeper))
	}
	#[cfg(not(feature = "tokio"))]
	{
		None
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[cfg(feature = "tokio")]
	#[tokio::test(start_paused = true)]
	async fn tokio_sleeper_waits_on_the_runtime_clock() {
		let start = tokio::time::Instant::now();

		TokioSleeper.sleep(Duration::seconds(5)).await;

		assert!(start.elapsed() >= std::time::Duration::from_secs(5));
	}
}
