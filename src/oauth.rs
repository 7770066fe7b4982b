//! Request construction, dispatch, and transport error mapping shared by every flow.

pub use oauth2;

// crates.io
use oauth2::{
	HttpClientError, HttpRequest,
	http::{
		HeaderValue, Method,
		header::{AUTHORIZATION, CONTENT_TYPE},
		request::Builder as RequestBuilder,
	},
};
use serde::de::DeserializeOwned;
use url::form_urlencoded::Serializer as FormSerializer;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
	http::{ProviderHttpClient, ResponseMetadata, ResponseMetadataSlot},
	obs::FlowKind,
	provider::ProviderQuirks,
};

const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
const CONTENT_TYPE_JSON: &str = "application/json";

/// Maps HTTP transport failures into broker [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a broker error.
	fn map_transport_error(
		&self,
		flow: FlowKind,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		flow: FlowKind,
		_metadata: Option<&ResponseMetadata>,
		error: HttpClientError<ReqwestError>,
	) -> Error {
		match error {
			HttpClientError::Reqwest(inner) if inner.is_builder() =>
				ConfigError::from(*inner).into(),
			HttpClientError::Reqwest(inner) => TransportError::network(flow, *inner).into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) =>
				TransportError::Io(std::io::Error::other(message)).into(),
			_ => TransportError::Io(std::io::Error::other("Unrecognized HTTP client failure."))
				.into(),
		}
	}
}

/// Builder for one provider request carrying the provider's identity headers.
pub(crate) struct ProviderRequest(RequestBuilder);
impl ProviderRequest {
	pub(crate) fn new(method: Method, url: &Url, quirks: &ProviderQuirks) -> Result<Self> {
		Self(RequestBuilder::new().method(method).uri(url.as_str()))
			.header("accept", CONTENT_TYPE_JSON)?
			.header("user-agent", &quirks.user_agent)
	}

	pub(crate) fn header(self, name: &'static str, value: &str) -> Result<Self> {
		let value = HeaderValue::from_str(value)
			.map_err(|source| ConfigError::InvalidHeader { name, source })?;

		Ok(Self(self.0.header(name, value)))
	}

	/// Adds an `Authorization` header that transports mark as sensitive.
	pub(crate) fn authorization(self, scheme: &str, secret: &str) -> Result<Self> {
		let mut value = HeaderValue::from_str(&format!("{scheme} {secret}"))
			.map_err(|source| ConfigError::InvalidHeader { name: "authorization", source })?;

		value.set_sensitive(true);

		Ok(Self(self.0.header(AUTHORIZATION, value)))
	}

	pub(crate) fn form(self, pairs: &[(&str, &str)]) -> Result<HttpRequest> {
		let body = FormSerializer::new(String::new()).extend_pairs(pairs).finish();

		self.finish(Some(CONTENT_TYPE_FORM), body.into_bytes())
	}

	pub(crate) fn json<T>(self, payload: &T) -> Result<HttpRequest>
	where
		T: ?Sized + Serialize,
	{
		let body = serde_json::to_vec(payload).map_err(ConfigError::from)?;

		self.finish(Some(CONTENT_TYPE_JSON), body)
	}

	pub(crate) fn empty(self) -> Result<HttpRequest> {
		self.finish(None, Vec::new())
	}

	fn finish(self, content_type: Option<&'static str>, body: Vec<u8>) -> Result<HttpRequest> {
		let builder = match content_type {
			Some(value) => self.0.header(CONTENT_TYPE, value),
			None => self.0,
		};

		builder.body(body).map_err(|e| ConfigError::from(e).into())
	}
}

/// Status, raw body, and Retry-After hint of a provider response.
#[derive(Clone, Debug)]
pub(crate) struct ProviderResponse {
	pub(crate) flow: FlowKind,
	pub(crate) status: u16,
	pub(crate) body: Vec<u8>,
	pub(crate) retry_after: Option<Duration>,
}
impl ProviderResponse {
	pub(crate) fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	pub(crate) fn body_text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Decodes the body, reporting the failing JSON path on error.
	pub(crate) fn decode<T>(&self) -> Result<T, TransportError>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de).map_err(|source| {
			TransportError::MalformedResponse { flow: self.flow, status: self.status, source }
		})
	}

	pub(crate) fn unexpected_status(&self) -> TransportError {
		TransportError::UnexpectedStatus {
			flow: self.flow,
			status: self.status,
			body: self.body_text(),
		}
	}

	pub(crate) fn invalid_payload(&self, reason: &'static str) -> TransportError {
		TransportError::InvalidPayload { flow: self.flow, status: self.status, reason }
	}
}

/// Sends one request through the injected transport; exactly one attempt.
pub(crate) async fn dispatch<C, M>(
	http_client: &C,
	mapper: &M,
	flow: FlowKind,
	request: HttpRequest,
) -> Result<ProviderResponse>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let meta = ResponseMetadataSlot::default();
	let handle = http_client.with_metadata(meta.clone());
	let response = oauth2::AsyncHttpClient::call(&handle, request)
		.await
		.map_err(|err| mapper.map_transport_error(flow, meta.take().as_ref(), err))?;
	let status = response.status().as_u16();
	let retry_after = meta.take().and_then(|meta| meta.retry_after);

	Ok(ProviderResponse { flow, status, body: response.into_body(), retry_after })
}
