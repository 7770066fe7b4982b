//! Device authorization request: obtains the device code, user code, and polling interval.

// crates.io
use oauth2::http::Method;
// self
use crate::{
	_prelude::*,
	auth::{DeviceAuthorization, DeviceCode, PollInterval},
	flows::Broker,
	http::ProviderHttpClient,
	oauth::{self, ProviderRequest, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

#[derive(Deserialize)]
struct DeviceAuthorizationResponse {
	device_code: String,
	user_code: String,
	verification_uri: Url,
	#[serde(default)]
	verification_uri_complete: Option<Url>,
	#[serde(default)]
	interval: Option<u64>,
	expires_in: u64,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Requests a fresh device code + user code pair from the provider.
	///
	/// Sends exactly one request. Any non-success status or unusable body surfaces as
	/// [`Error::Transport`] and is never retried here.
	pub async fn begin_device_authorization(&self) -> Result<DeviceAuthorization> {
		const KIND: FlowKind = FlowKind::DeviceAuthorization;

		let span = FlowSpan::new(KIND, "begin_device_authorization");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.request_device_authorization()).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(err) => {
				obs::record_provider_failure(KIND, err);
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	async fn request_device_authorization(&self) -> Result<DeviceAuthorization> {
		let quirks = &self.descriptor.quirks;
		let scope = self.scope.join(quirks.scope_delimiter);
		let mut form = vec![("client_id", self.client_id.as_str())];

		if let Some(scope) = scope.as_deref() {
			form.push(("scope", scope));
		}

		let request = ProviderRequest::new(
			Method::POST,
			&self.descriptor.endpoints.device_authorization,
			quirks,
		)?
		.form(&form)?;
		let response = oauth::dispatch(
			self.http_client.as_ref(),
			self.transport_mapper.as_ref(),
			FlowKind::DeviceAuthorization,
			request,
		)
		.await?;

		if !response.is_success() {
			return Err(response.unexpected_status().into());
		}

		let payload = response.decode::<DeviceAuthorizationResponse>()?;

		if payload.device_code.is_empty() {
			return Err(response.invalid_payload("device_code is empty").into());
		}
		if payload.user_code.is_empty() {
			return Err(response.invalid_payload("user_code is empty").into());
		}

		Ok(DeviceAuthorization {
			device_code: DeviceCode::new(payload.device_code),
			user_code: payload.user_code,
			verification_uri: payload.verification_uri,
			verification_uri_complete: payload.verification_uri_complete,
			interval: PollInterval::from_provider_secs(payload.interval).current(),
			expires_in: Duration::seconds(i64::from(
				u32::try_from(payload.expires_in).unwrap_or(u32::MAX),
			)),
			issued_at: OffsetDateTime::now_utc(),
		})
	}
}
