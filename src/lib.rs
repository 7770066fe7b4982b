//! Device-flow credential broker for GitHub Copilot: RFC 8628 polling, cached session tokens, and
//! chat completions over an injected HTTP transport.

#![deny(clippy::all, missing_docs)]
#![cfg_attr(not(test), deny(unused_crate_dependencies))]

pub mod auth;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		task::{Context, Poll},
	};
	// crates.io
	use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse, http::StatusCode};
	// self
	use crate::{
		error::TransportError,
		flows::{Broker, SleepFuture, Sleeper},
		http::{ProviderHttpClient, ResponseMetadata, ResponseMetadataSlot},
		oauth::TransportErrorMapper,
		obs::FlowKind,
		provider::ProviderDescriptor,
	};
	#[cfg(feature = "reqwest")]
	use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

	/// Broker type alias used by reqwest-backed integration tests.
	#[cfg(feature = "reqwest")]
	pub type ReqwestTestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;
	/// Broker type alias used by scripted-transport tests.
	pub type ScriptedTestBroker = Broker<ScriptedHttpClient, ScriptedErrorMapper>;

	/// Client identifier used by every test broker.
	pub const TEST_CLIENT_ID: &str = "test-device-client";

	/// Sleeper that records requested durations and resolves immediately.
	#[derive(Clone, Debug, Default)]
	pub struct RecordingSleeper(Arc<Mutex<Vec<Duration>>>);
	impl RecordingSleeper {
		/// Returns every duration requested so far, in order.
		pub fn recorded(&self) -> Vec<Duration> {
			self.0.lock().clone()
		}
	}
	impl Sleeper for RecordingSleeper {
		fn sleep(&self, duration: Duration) -> SleepFuture {
			self.0.lock().push(duration);

			Box::pin(async {})
		}
	}

	/// Request captured by [`ScriptedHttpClient`].
	#[derive(Clone, Debug)]
	pub struct RecordedRequest {
		/// HTTP method.
		pub method: String,
		/// Absolute request URI.
		pub uri: String,
		/// Header pairs in insertion order.
		pub headers: Vec<(String, String)>,
		/// Body decoded as UTF-8.
		pub body: String,
	}
	impl RecordedRequest {
		/// Returns the first value of header `name` (case-insensitive).
		pub fn header(&self, name: &str) -> Option<&str> {
			self.headers
				.iter()
				.find(|(key, _)| key.eq_ignore_ascii_case(name))
				.map(|(_, value)| value.as_str())
		}
	}

	/// Raised when a test sends more requests than it scripted responses for.
	#[derive(Debug, ThisError)]
	#[error("The scripted transport has no response left for {uri}.")]
	pub struct ScriptExhausted {
		/// URI of the unscripted request.
		pub uri: String,
	}

	#[derive(Debug, Default)]
	struct Script {
		responses: VecDeque<(u16, String)>,
		requests: Vec<RecordedRequest>,
	}

	/// In-process transport replaying queued responses in order and recording every request.
	///
	/// Each response is delivered after yielding to the executor once so concurrent callers
	/// interleave the way they would against a real network.
	#[derive(Clone, Debug, Default)]
	pub struct ScriptedHttpClient(Arc<Mutex<Script>>);
	impl ScriptedHttpClient {
		/// Queues a response with `status` and a JSON `body`.
		pub fn push(&self, status: u16, body: impl Into<String>) -> &Self {
			self.0.lock().responses.push_back((status, body.into()));

			self
		}

		/// Every request sent so far, in order.
		pub fn requests(&self) -> Vec<RecordedRequest> {
			self.0.lock().requests.clone()
		}

		/// Number of requests sent so far.
		pub fn calls(&self) -> usize {
			self.0.lock().requests.len()
		}

		/// Number of queued responses not yet consumed.
		pub fn remaining(&self) -> usize {
			self.0.lock().responses.len()
		}
	}
	impl ProviderHttpClient for ScriptedHttpClient {
		type Handle = ScriptedHandle;
		type TransportError = ScriptExhausted;

		fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
			ScriptedHandle { script: self.0.clone(), slot }
		}
	}

	/// Handle returned by [`ScriptedHttpClient`].
	#[derive(Debug)]
	pub struct ScriptedHandle {
		script: Arc<Mutex<Script>>,
		slot: ResponseMetadataSlot,
	}
	impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
		type Error = HttpClientError<ScriptExhausted>;
		type Future =
			Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

		fn call(&'c self, request: HttpRequest) -> Self::Future {
			let recorded = RecordedRequest {
				method: request.method().to_string(),
				uri: request.uri().to_string(),
				headers: request
					.headers()
					.iter()
					.map(|(name, value)| {
						(name.to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned())
					})
					.collect(),
				body: String::from_utf8_lossy(request.body()).into_owned(),
			};
			let next = {
				let mut script = self.script.lock();
				let next = script.responses.pop_front();

				script.requests.push(recorded.clone());

				next
			};
			let slot = self.slot.clone();

			Box::pin(async move {
				YieldOnce(false).await;

				let Some((status, body)) = next else {
					return Err(HttpClientError::Reqwest(Box::new(ScriptExhausted {
						uri: recorded.uri,
					})));
				};

				slot.store(ResponseMetadata { status: Some(status), retry_after: None });

				let mut response = HttpResponse::new(body.into_bytes());

				*response.status_mut() =
					StatusCode::from_u16(status).map_err(|e| HttpClientError::Http(e.into()))?;

				Ok(response)
			})
		}
	}

	/// Maps scripted transport failures into network errors.
	#[derive(Clone, Debug, Default)]
	pub struct ScriptedErrorMapper;
	impl TransportErrorMapper<ScriptExhausted> for ScriptedErrorMapper {
		fn map_transport_error(
			&self,
			flow: FlowKind,
			_metadata: Option<&ResponseMetadata>,
			error: HttpClientError<ScriptExhausted>,
		) -> Error {
			match error {
				HttpClientError::Reqwest(inner) => TransportError::network(flow, *inner).into(),
				other => TransportError::Io(std::io::Error::other(other.to_string())).into(),
			}
		}
	}

	struct YieldOnce(bool);
	impl Future for YieldOnce {
		type Output = ();

		fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
			if self.0 {
				return Poll::Ready(());
			}

			self.0 = true;

			cx.waker().wake_by_ref();

			Poll::Pending
		}
	}

	/// Builds a descriptor whose endpoints all live under `base` (e.g. an `httpmock` server).
	pub fn mock_descriptor(base: &str) -> ProviderDescriptor {
		let endpoint = |path: &str| {
			Url::parse(&format!("{}{path}", base.trim_end_matches('/')))
				.expect("Failed to parse mock provider URL.")
		};

		ProviderDescriptor::builder()
			.device_authorization_endpoint(endpoint("/login/device/code"))
			.device_token_endpoint(endpoint("/login/oauth/access_token"))
			.session_token_endpoint(endpoint("/copilot_internal/v2/token"))
			.chat_completions_endpoint(endpoint("/chat/completions"))
			.build()
			.expect("Failed to build mock provider descriptor.")
	}

	/// Constructs a scripted [`Broker`] whose sleeps are recorded instead of awaited.
	pub fn build_scripted_test_broker() -> (ScriptedTestBroker, ScriptedHttpClient, RecordingSleeper)
	{
		let transport = ScriptedHttpClient::default();
		let sleeper = RecordingSleeper::default();
		let broker = Broker::with_http_client(
			mock_descriptor("https://provider.test"),
			TEST_CLIENT_ID,
			transport.clone(),
			ScriptedErrorMapper,
		)
		.with_sleeper(Arc::new(sleeper.clone()));

		(broker, transport, sleeper)
	}

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Constructs a reqwest-backed [`Broker`] whose sleeps are recorded instead of awaited.
	#[cfg(feature = "reqwest")]
	pub fn build_reqwest_test_broker(
		descriptor: ProviderDescriptor,
	) -> (ReqwestTestBroker, RecordingSleeper) {
		let sleeper = RecordingSleeper::default();
		let broker = Broker::with_http_client(
			descriptor,
			TEST_CLIENT_ID,
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.with_sleeper(Arc::new(sleeper.clone()));

		(broker, sleeper)
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
