//! Broker-level error types shared across the device flow, session cache, and chat issuer.

// self
use crate::{_prelude::*, obs::FlowKind};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
///
/// Every variant is a typed outcome the caller can act on (retry, re-authenticate, or report);
/// none of them is fatal to the hosting process.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (network, unexpected status, or malformed payload).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The device code lapsed before the user approved it; restart from device authorization.
	#[error("Device code expired before authorization completed.")]
	ExpiredDeviceCode,
	/// The provider ended the device flow with a terminal error (e.g. `access_denied`).
	#[error("Provider denied the device authorization: {code}.")]
	AuthorizationDenied {
		/// Provider-supplied OAuth `error` code.
		code: String,
		/// Provider-supplied `error_description`, when present.
		description: Option<String>,
		/// Provider-supplied `error_uri`, when present.
		uri: Option<String>,
	},
	/// The session token endpoint rejected the primary credential.
	#[error("Session token exchange failed with HTTP {status}.")]
	TokenExchangeFailed {
		/// HTTP status code returned by the exchange endpoint.
		status: u16,
		/// Response body kept for diagnostics.
		body: String,
		/// Back-off requested through `Retry-After`, when the transport reported one.
		retry_after: Option<Duration>,
	},
	/// The chat completion endpoint returned a non-success status.
	#[error("Completion request failed with HTTP {status}.")]
	CompletionRequestFailed {
		/// HTTP status code returned by the completion endpoint.
		status: u16,
		/// Response body kept for diagnostics.
		body: String,
		/// Back-off requested through `Retry-After`, when the transport reported one.
		retry_after: Option<Duration>,
	},
}
impl Error {
	/// Returns `true` when the caller must restart from device authorization.
	pub fn requires_new_device_code(&self) -> bool {
		matches!(self, Self::ExpiredDeviceCode | Self::AuthorizationDenied { .. })
	}

	/// Returns `true` when the primary credential should be considered revoked.
	pub fn is_unauthorized(&self) -> bool {
		matches!(self, Self::TokenExchangeFailed { status: 401 | 403, .. })
	}

	/// Back-off the provider asked for before the next exchange or completion attempt.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::TokenExchangeFailed { retry_after, .. }
			| Self::CompletionRequestFailed { retry_after, .. } => *retry_after,
			_ => None,
		}
	}
}

/// Configuration and request-construction failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A header value could not be encoded.
	#[error("Header `{name}` has an invalid value.")]
	InvalidHeader {
		/// Header name.
		name: &'static str,
		/// Underlying encoding failure.
		#[source]
		source: oauth2::http::header::InvalidHeaderValue,
	},
	/// Request payload could not be serialized.
	#[error("Request payload could not be serialized.")]
	EncodeRequest(#[from] serde_json::Error),
	/// Device-flow polling needs a sleeper and none is configured.
	#[error("No sleeper is configured; enable the `tokio` feature or call `Broker::with_sleeper`.")]
	MissingSleeper,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, unexpected responses). Never retried internally.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the {flow} endpoint.")]
	Network {
		/// Flow whose endpoint was being called.
		flow: FlowKind,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling a provider endpoint.")]
	Io(#[from] std::io::Error),
	/// Endpoint answered with a status the flow does not understand.
	#[error("The {flow} endpoint returned HTTP {status}.")]
	UnexpectedStatus {
		/// Flow whose endpoint was being called.
		flow: FlowKind,
		/// HTTP status code.
		status: u16,
		/// Response body kept for diagnostics.
		body: String,
	},
	/// Endpoint responded with JSON that could not be decoded.
	#[error("The {flow} endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Flow whose endpoint was being called.
		flow: FlowKind,
		/// HTTP status code.
		status: u16,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Endpoint responded with JSON that decodes but violates the protocol.
	#[error("The {flow} endpoint returned an unusable payload: {reason}.")]
	InvalidPayload {
		/// Flow whose endpoint was being called.
		flow: FlowKind,
		/// HTTP status code.
		status: u16,
		/// What was missing or ambiguous.
		reason: &'static str,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(flow: FlowKind, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { flow, source: Box::new(src) }
	}

	/// HTTP status attached to the failure, when a response was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::UnexpectedStatus { status, .. }
			| Self::MalformedResponse { status, .. }
			| Self::InvalidPayload { status, .. } => Some(*status),
			Self::Network { .. } | Self::Io(_) => None,
		}
	}
}
