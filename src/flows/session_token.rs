//! Session token cache with singleflight refresh.
//!
//! [`Broker::get_valid_token`] converts the caller's primary credential into a short-lived bearer
//! token. The cache holds one token bound to the fingerprint of the credential that minted it and
//! serves it until it would expire within the refresh margin. Refreshes are serialized behind an
//! async mutex and re-check the slot after acquiring it, so a burst of callers facing an empty or
//! stale cache produces one exchange.

mod metrics;

pub use metrics::SessionMetrics;

// crates.io
use oauth2::http::Method;
// self
use crate::{
	_prelude::*,
	auth::{PrimaryCredential, SecondaryToken, TokenSecret, UnixTimestamp},
	flows::Broker,
	http::ProviderHttpClient,
	oauth::{self, ProviderRequest, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan, SessionLookup},
};

/// Default refresh margin applied before a session token's expiry.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::minutes(5);

#[derive(Clone, Debug)]
struct CachedSession {
	fingerprint: String,
	token: SecondaryToken,
}

/// Internally synchronized slot holding the current session token.
///
/// Readers always observe a whole token; `{token, expires_at}` pairs are replaced together.
#[derive(Debug)]
pub struct SessionTokenCache {
	margin: Duration,
	slot: RwLock<Option<CachedSession>>,
	refresh_guard: AsyncMutex<()>,
	metrics: SessionMetrics,
}
impl SessionTokenCache {
	/// Creates an empty cache refreshing `margin` ahead of expiry (negative clamps to zero).
	pub fn new(margin: Duration) -> Self {
		Self {
			margin: margin.max(Duration::ZERO),
			slot: RwLock::new(None),
			refresh_guard: AsyncMutex::new(()),
			metrics: SessionMetrics::default(),
		}
	}

	/// Refresh margin in effect.
	pub fn margin(&self) -> Duration {
		self.margin
	}

	/// Lookup and exchange counters.
	pub fn metrics(&self) -> &SessionMetrics {
		&self.metrics
	}

	/// Drops the cached token so the next lookup performs an exchange.
	pub fn invalidate(&self) {
		self.slot.write().take();
	}

	/// Returns the cached token's expiry, if a token is cached.
	pub fn cached_expiry(&self) -> Option<OffsetDateTime> {
		self.slot.read().as_ref().map(|cached| cached.token.expires_at)
	}

	fn fresh(&self, fingerprint: &str, now: OffsetDateTime) -> Option<SecondaryToken> {
		self.slot
			.read()
			.as_ref()
			.filter(|cached| {
				cached.fingerprint == fingerprint && cached.token.is_fresh_at(now, self.margin)
			})
			.map(|cached| cached.token.clone())
	}

	fn hit(&self, fingerprint: &str) -> Option<SecondaryToken> {
		let now = OffsetDateTime::now_utc();
		let token = self.fresh(fingerprint, now)?;

		self.metrics.record_hit();
		obs::record_session_lookup(SessionLookup::CacheHit);
		obs::record_session_cache_hit(token.remaining_at(now));

		Some(token)
	}

	fn store(&self, fingerprint: String, token: SecondaryToken) {
		*self.slot.write() = Some(CachedSession { fingerprint, token });
	}
}
impl Default for SessionTokenCache {
	fn default() -> Self {
		Self::new(DEFAULT_REFRESH_MARGIN)
	}
}

#[derive(Deserialize)]
struct SessionTokenResponse {
	#[serde(default)]
	token: Option<String>,
	#[serde(default)]
	expires_at: Option<UnixTimestamp>,
	#[serde(default)]
	refresh_in: Option<i64>,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns a session token valid for at least the cache's refresh margin.
	///
	/// Serves the cached token when it was minted for `primary` and is still fresh; otherwise
	/// performs one exchange and replaces the cached value. A failed exchange leaves the previous
	/// value in place.
	pub async fn get_valid_token(&self, primary: &PrimaryCredential) -> Result<SecondaryToken> {
		const KIND: FlowKind = FlowKind::SessionToken;

		let span = FlowSpan::new(KIND, "get_valid_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let cache = self.session_cache();
				let fingerprint = primary.fingerprint();

				if let Some(token) = cache.hit(&fingerprint) {
					return Ok(token);
				}

				let _singleflight = cache.refresh_guard.lock().await;

				// Another caller may have refreshed while this one waited for the guard.
				if let Some(token) = cache.hit(&fingerprint) {
					return Ok(token);
				}

				cache.metrics.record_exchange();
				obs::record_session_lookup(SessionLookup::Exchange);

				match self.exchange_session_token(primary).await {
					Ok(token) => {
						cache.store(fingerprint, token.clone());

						Ok(token)
					},
					Err(err) => {
						cache.metrics.record_failure();

						Err(err)
					},
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(err) => {
				obs::record_provider_failure(KIND, err);
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	async fn exchange_session_token(&self, primary: &PrimaryCredential) -> Result<SecondaryToken> {
		let quirks = &self.descriptor.quirks;
		let request =
			ProviderRequest::new(Method::GET, &self.descriptor.endpoints.session_token, quirks)?
				.authorization(&quirks.session_token_scheme, primary.access_token.expose())?
				.empty()?;
		let response = oauth::dispatch(
			self.http_client.as_ref(),
			self.transport_mapper.as_ref(),
			FlowKind::SessionToken,
			request,
		)
		.await?;

		if !response.is_success() {
			return Err(Error::TokenExchangeFailed {
				status: response.status,
				body: response.body_text(),
				retry_after: response.retry_after,
			});
		}

		let payload = response.decode::<SessionTokenResponse>()?;
		let token = payload
			.token
			.filter(|token| !token.is_empty())
			.ok_or_else(|| response.invalid_payload("token is missing or empty"))?;
		let expires_at = payload
			.expires_at
			.as_ref()
			.and_then(UnixTimestamp::to_datetime)
			.ok_or_else(|| response.invalid_payload("expires_at is missing or not a timestamp"))?;

		if expires_at <= OffsetDateTime::now_utc() {
			return Err(response.invalid_payload("expires_at is already in the past").into());
		}

		Ok(SecondaryToken {
			token: TokenSecret::new(token),
			expires_at,
			refresh_in: payload.refresh_in.filter(|secs| *secs > 0).map(Duration::seconds),
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn token(value: &str, expires_at: OffsetDateTime) -> SecondaryToken {
		SecondaryToken { token: TokenSecret::new(value), expires_at, refresh_in: None }
	}

	#[test]
	fn cache_binds_tokens_to_the_minting_credential() {
		let cache = SessionTokenCache::default();
		let now = OffsetDateTime::now_utc();

		cache.store("fp-a".into(), token("sec1", now + Duration::seconds(1_800)));

		assert_eq!(cache.fresh("fp-a", now).map(|t| t.token), Some(TokenSecret::new("sec1")));
		assert!(cache.fresh("fp-b", now).is_none());
	}

	#[test]
	fn tokens_inside_the_margin_are_stale() {
		let cache = SessionTokenCache::default();
		let now = OffsetDateTime::now_utc();

		cache.store("fp".into(), token("sec1", now + Duration::seconds(200)));

		assert!(cache.fresh("fp", now).is_none());
		assert!(cache.cached_expiry().is_some());

		cache.invalidate();

		assert!(cache.cached_expiry().is_none());
	}

	#[test]
	fn negative_margins_clamp_to_zero() {
		let cache = SessionTokenCache::new(Duration::minutes(-1));

		assert_eq!(cache.margin(), Duration::ZERO);
	}
}
