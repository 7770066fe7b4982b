//! Device authorization grant models (RFC 8628).

// std
use std::time::Instant;
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Interval used when the provider omits one (RFC 8628 §3.2).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::seconds(5);
/// Smallest interval the poller will ever sleep for.
pub const MIN_POLL_INTERVAL: Duration = Duration::seconds(1);

/// Opaque device verification code; redacted in every formatter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCode(TokenSecret);
impl DeviceCode {
	/// Wraps a device code issued by the provider.
	pub fn new(value: impl Into<String>) -> Self {
		Self(TokenSecret::new(value))
	}

	/// Returns the raw code. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		self.0.expose()
	}
}

/// Result of the device authorization request.
///
/// Immutable once issued. The user code and verification URI are shown to the person approving
/// the request while the device code and interval feed the poller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceAuthorization {
	/// Code the poller exchanges for a primary credential.
	pub device_code: DeviceCode,
	/// Short code the user types at the verification URI.
	pub user_code: String,
	/// Page where the user enters the code.
	pub verification_uri: Url,
	/// Verification URI with the user code pre-filled, when the provider supplies one.
	pub verification_uri_complete: Option<Url>,
	/// Minimum delay between polls.
	pub interval: Duration,
	/// Lifetime of the device code.
	pub expires_in: Duration,
	/// Local instant the authorization was received.
	pub issued_at: OffsetDateTime,
}
impl DeviceAuthorization {
	/// Absolute instant after which the device code can no longer be redeemed.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.issued_at + self.expires_in
	}

	/// Returns `true` once the device code has lapsed.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at()
	}

	/// Starting interval for a polling session tied to this authorization.
	pub fn poll_interval(&self) -> PollInterval {
		PollInterval::new(self.interval)
	}
}

/// Caller-owned polling interval threaded through repeated [`poll_for_token`] calls.
///
/// The interval only ever grows: each `slow_down` response adds the provider's increment and the
/// adjustment persists for the rest of the acquisition attempt. The instant of the most recent poll
/// travels with it, so a re-invocation first waits out whatever part of the interval is left.
///
/// [`poll_for_token`]: crate::flows::Broker::poll_for_token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollInterval {
	delay: Duration,
	last_poll_at: Option<Instant>,
}
impl PollInterval {
	/// Creates an interval, clamping anything below one second.
	pub fn new(interval: Duration) -> Self {
		Self { delay: interval.max(MIN_POLL_INTERVAL), last_poll_at: None }
	}

	/// Builds an interval from the provider's optional `interval` field.
	pub fn from_provider_secs(secs: Option<u64>) -> Self {
		match secs {
			Some(secs) =>
				Self::new(Duration::seconds(i64::from(u32::try_from(secs).unwrap_or(u32::MAX)))),
			None => Self::new(DEFAULT_POLL_INTERVAL),
		}
	}

	/// Current delay between polls.
	pub fn current(&self) -> Duration {
		self.delay
	}

	/// Applies a `slow_down` signal.
	pub fn slow_down(&mut self, increment: Duration) {
		self.delay = self.delay.saturating_add(increment.max(Duration::ZERO));
	}

	/// Time left at `now` before the next poll may be sent; zero before the first poll.
	pub fn remaining_wait(&self, now: Instant) -> Duration {
		let Some(last_poll_at) = self.last_poll_at else {
			return Duration::ZERO;
		};
		let elapsed =
			Duration::try_from(now.saturating_duration_since(last_poll_at)).unwrap_or(Duration::MAX);

		self.delay.saturating_sub(elapsed).max(Duration::ZERO)
	}

	pub(crate) fn mark_polled(&mut self, at: Instant) {
		self.last_poll_at = Some(at);
	}
}
impl Default for PollInterval {
	fn default() -> Self {
		Self::new(DEFAULT_POLL_INTERVAL)
	}
}

/// OAuth `error` codes the token endpoint returns while a device code is outstanding.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeviceErrorCode {
	/// The user has not approved the request yet.
	AuthorizationPending,
	/// The client polls too fast; grow the interval.
	SlowDown,
	/// The device code lapsed.
	ExpiredToken,
	/// The user declined the request.
	AccessDenied,
	/// Any other code; treated as terminal.
	Unrecognized(String),
}
impl DeviceErrorCode {
	/// Wire representation of the code.
	pub fn as_str(&self) -> &str {
		match self {
			Self::AuthorizationPending => "authorization_pending",
			Self::SlowDown => "slow_down",
			Self::ExpiredToken => "expired_token",
			Self::AccessDenied => "access_denied",
			Self::Unrecognized(code) => code,
		}
	}

	/// Returns `true` when polling should continue.
	pub fn is_pending(&self) -> bool {
		matches!(self, Self::AuthorizationPending | Self::SlowDown)
	}
}
impl From<&str> for DeviceErrorCode {
	fn from(value: &str) -> Self {
		match value {
			"authorization_pending" => Self::AuthorizationPending,
			"slow_down" => Self::SlowDown,
			"expired_token" => Self::ExpiredToken,
			"access_denied" => Self::AccessDenied,
			other => Self::Unrecognized(other.to_owned()),
		}
	}
}
impl Display for DeviceErrorCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
