//! Short-lived session token minted from a primary credential.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Unix timestamps above this value are interpreted as milliseconds.
const MILLISECOND_THRESHOLD: i64 = 10_000_000_000;

/// Session bearer token owned by the session cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecondaryToken {
	/// Bearer token presented to the chat completion endpoint.
	pub token: TokenSecret,
	/// Absolute expiry reported by the provider.
	pub expires_at: OffsetDateTime,
	/// Provider hint for when to refresh, when supplied.
	pub refresh_in: Option<Duration>,
}
impl SecondaryToken {
	/// Returns `true` when the token stays valid for longer than `margin` past `now`.
	pub fn is_fresh_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
		now + margin < self.expires_at
	}

	/// Time left before expiry, clamped to zero.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - now;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}
}

/// Wire representation of `expires_at`: unix seconds or milliseconds, as a number or a string.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum UnixTimestamp {
	Integer(i64),
	Float(f64),
	Text(String),
}
impl UnixTimestamp {
	/// Converts the raw value into an absolute instant, or `None` when it is not numeric.
	pub(crate) fn to_datetime(&self) -> Option<OffsetDateTime> {
		let raw = match self {
			Self::Integer(value) => *value,
			Self::Float(value) if value.is_finite() => *value as i64,
			Self::Float(_) => return None,
			Self::Text(value) => value.trim().parse::<i64>().ok()?,
		};
		let secs = if raw > MILLISECOND_THRESHOLD { raw / 1_000 } else { raw };

		OffsetDateTime::from_unix_timestamp(secs).ok()
	}
}
