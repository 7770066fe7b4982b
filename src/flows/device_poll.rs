//! Bounded device token polling (RFC 8628 §3.4 and §3.5).
//!
//! [`Broker::poll_for_token`] exchanges a device code for the primary credential. Each call polls
//! until the provider resolves the request or the caller's `max_wait` budget would be exceeded by
//! the next sleep, in which case it yields [`PollOutcome::Pending`] and the caller re-invokes it
//! later with the same [`PollInterval`]. The interval remembers the last poll, so re-invocations
//! never poll sooner than the interval allows. The future holds no state outside the caller's
//! interval, so dropping it at any await point abandons the attempt cleanly.

// std
use std::time::Instant;
// crates.io
use oauth2::http::Method;
// self
use crate::{
	_prelude::*,
	auth::{DeviceCode, DeviceErrorCode, PollInterval, PrimaryCredential, TokenSecret},
	flows::Broker,
	http::ProviderHttpClient,
	oauth::{self, ProviderRequest, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Result of one bounded polling window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
	/// The user approved the request.
	Authorized(PrimaryCredential),
	/// The budget ran out before the provider resolved the request.
	Pending,
}

/// Classified response of a single token poll.
enum PollSignal {
	Authorized(PrimaryCredential),
	Continue(DeviceErrorCode),
}

#[derive(Deserialize)]
struct TokenPollResponse {
	#[serde(default)]
	access_token: Option<serde_json::Value>,
	#[serde(default)]
	token_type: Option<String>,
	#[serde(default)]
	scope: Option<String>,
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
	#[serde(default)]
	error_uri: Option<String>,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Polls the token endpoint until the device code resolves or `max_wait` is spent.
	///
	/// The budget is consumed by sleeps only: before each sleep the poller checks that the
	/// accumulated wait plus the current interval fits within `max_wait`, otherwise it returns
	/// [`PollOutcome::Pending`] without sleeping. When `interval` has already polled, the call first
	/// waits out the rest of the interval, or returns `Pending` without a request if that wait does
	/// not fit the budget. A fresh interval with a zero budget polls exactly once. `slow_down`
	/// responses grow `interval` in place so the adjustment carries into later calls.
	pub async fn poll_for_token(
		&self,
		device_code: &DeviceCode,
		interval: &mut PollInterval,
		max_wait: Duration,
	) -> Result<PollOutcome> {
		const KIND: FlowKind = FlowKind::DevicePoll;

		let span = FlowSpan::new(KIND, "poll_for_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.poll_until(device_code, interval, max_wait)).await;

		match &result {
			Ok(PollOutcome::Authorized(_)) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Ok(PollOutcome::Pending) => obs::record_flow_outcome(KIND, FlowOutcome::Pending),
			Err(err) => {
				obs::record_provider_failure(KIND, err);
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	async fn poll_until(
		&self,
		device_code: &DeviceCode,
		interval: &mut PollInterval,
		max_wait: Duration,
	) -> Result<PollOutcome> {
		let sleeper = self.sleeper()?;
		let mut waited = interval.remaining_wait(Instant::now());
		let mut attempt = 0_u32;

		if waited.is_positive() {
			if waited > max_wait {
				return Ok(PollOutcome::Pending);
			}

			sleeper.sleep(waited).await;
		}

		loop {
			attempt = attempt.saturating_add(1);

			interval.mark_polled(Instant::now());

			match self.request_device_token(device_code).await? {
				PollSignal::Authorized(credential) => return Ok(PollOutcome::Authorized(credential)),
				PollSignal::Continue(code) => {
					if code == DeviceErrorCode::SlowDown {
						interval.slow_down(self.descriptor.quirks.slow_down_increment);
					}

					let signal = signal_label(&code);

					obs::record_poll_signal(signal, attempt, interval.current());
					obs::record_poll_signal_total(signal);
				},
			}

			let delay = interval.current();
			let next = waited.saturating_add(delay);

			if next > max_wait {
				return Ok(PollOutcome::Pending);
			}

			sleeper.sleep(delay).await;

			waited = next;
		}
	}

	async fn request_device_token(&self, device_code: &DeviceCode) -> Result<PollSignal> {
		const KIND: FlowKind = FlowKind::DevicePoll;

		let request = ProviderRequest::new(
			Method::POST,
			&self.descriptor.endpoints.device_token,
			&self.descriptor.quirks,
		)?
		.form(&[
			("client_id", self.client_id.as_str()),
			("device_code", device_code.expose()),
			("grant_type", DEVICE_CODE_GRANT_TYPE),
		])?;
		let response = oauth::dispatch(
			self.http_client.as_ref(),
			self.transport_mapper.as_ref(),
			KIND,
			request,
		)
		.await?;
		let payload = match response.decode::<TokenPollResponse>() {
			Ok(payload) => payload,
			Err(_) if !response.is_success() => return Err(response.unexpected_status().into()),
			Err(err) => return Err(err.into()),
		};

		match payload.access_token {
			Some(serde_json::Value::String(token)) if !token.is_empty() =>
				return Ok(PollSignal::Authorized(PrimaryCredential {
					access_token: TokenSecret::new(token),
					token_type: payload.token_type,
					scope: payload.scope,
				})),
			None | Some(serde_json::Value::Null) => (),
			Some(_) =>
				return Err(response.invalid_payload("access_token is not a non-empty string").into()),
		}

		let Some(code) = payload.error.as_deref().map(DeviceErrorCode::from) else {
			return Err(if response.is_success() {
				response.invalid_payload("neither access_token nor error is present").into()
			} else {
				response.unexpected_status().into()
			});
		};

		if code.is_pending() {
			return Ok(PollSignal::Continue(code));
		}
		if code == DeviceErrorCode::ExpiredToken {
			return Err(Error::ExpiredDeviceCode);
		}

		Err(Error::AuthorizationDenied {
			code: code.as_str().to_owned(),
			description: payload.error_description,
			uri: payload.error_uri,
		})
	}
}

fn signal_label(code: &DeviceErrorCode) -> &'static str {
	match code {
		DeviceErrorCode::SlowDown => "slow_down",
		_ => "authorization_pending",
	}
}
