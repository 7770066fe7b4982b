//! Demonstrates plugging a non-reqwest transport, error mapper, and sleeper into the broker.
//!
//! 1. Implement [`ProviderHttpClient`] so the transport records [`ResponseMetadata`] via the
//!    provided [`ResponseMetadataSlot`].
//! 2. Provide a [`TransportErrorMapper`] that understands the transport's own error type.
//! 3. Supply a [`Sleeper`] so polling works without relying on the tokio timer.
//! 4. Observe the session token cache answering repeated lookups without new exchanges.

// std
use std::{
	collections::VecDeque,
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	future::Future,
	pin::Pin,
	sync::{Arc, Mutex},
	time::Duration as StdDuration,
};
// crates.io
use color_eyre::{Result, eyre::eyre};
use time::{Duration, OffsetDateTime};
// self
use copilot_broker::{
	auth::{DeviceCode, PollInterval},
	error::{Error, TransportError},
	flows::{Broker, PollOutcome, SleepFuture, Sleeper},
	http::{ProviderHttpClient, ResponseMetadata, ResponseMetadataSlot},
	oauth::{
		TransportErrorMapper,
		oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse, http::StatusCode},
	},
	obs::FlowKind,
	provider::ProviderDescriptor,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let expires_at = (OffsetDateTime::now_utc() + Duration::minutes(30)).unix_timestamp();
	let transport = CannedHttpClient::new([
		(200, r#"{"error":"authorization_pending"}"#.to_owned()),
		(200, r#"{"error":"slow_down"}"#.to_owned()),
		(200, r#"{"access_token":"gho_canned"}"#.to_owned()),
		(200, format!(r#"{{"token":"canned-session","expires_at":{expires_at}}}"#)),
	]);
	let broker: Broker<CannedHttpClient, CannedErrorMapper> = Broker::with_http_client(
		ProviderDescriptor::github_copilot()?,
		"demo-client",
		transport.clone(),
		CannedErrorMapper,
	)
	.with_sleeper(Arc::new(ThreadSleeper));
	let mut interval = PollInterval::new(Duration::seconds(1));
	let outcome = broker
		.poll_for_token(&DeviceCode::new("canned-device"), &mut interval, Duration::seconds(30))
		.await?;
	let PollOutcome::Authorized(primary) = outcome else {
		return Err(eyre!("The canned script should authorize within the budget."));
	};

	println!("Authorized after slowing down to {} between polls.", interval.current());

	for _ in 0..3 {
		let session = broker.get_valid_token(&primary).await?;

		println!("Session token valid until {}.", session.expires_at);
	}

	println!(
		"Exchanges: {}, cache hits: {}.",
		broker.session_cache().metrics().exchanges(),
		broker.session_cache().metrics().hits()
	);

	broker.session_cache().invalidate();

	match broker.get_valid_token(&primary).await {
		Ok(_) => println!("The canned transport unexpectedly produced another session."),
		Err(e) => println!("Transport error mapped by the broker: {e}."),
	}

	Ok(())
}

/// Sleeper that parks a blocking-pool thread instead of using the tokio timer.
struct ThreadSleeper;
impl Sleeper for ThreadSleeper {
	fn sleep(&self, duration: Duration) -> SleepFuture {
		let duration = duration.unsigned_abs().min(StdDuration::from_millis(50));

		Box::pin(async move {
			let _ = tokio::task::spawn_blocking(move || std::thread::sleep(duration)).await;
		})
	}
}

#[derive(Debug)]
enum CannedTransportError {
	ScriptExhausted,
}
impl Display for CannedTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::ScriptExhausted => write!(f, "No canned response left"),
		}
	}
}
impl StdError for CannedTransportError {}

#[derive(Clone, Default)]
struct CannedHttpClient(Arc<Mutex<VecDeque<(u16, String)>>>);
impl CannedHttpClient {
	fn new(responses: impl IntoIterator<Item = (u16, String)>) -> Self {
		Self(Arc::new(Mutex::new(responses.into_iter().collect())))
	}
}
impl ProviderHttpClient for CannedHttpClient {
	type Handle = CannedHandle;
	type TransportError = CannedTransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		CannedHandle { responses: self.0.clone(), slot }
	}
}

struct CannedHandle {
	responses: Arc<Mutex<VecDeque<(u16, String)>>>,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for CannedHandle {
	type Error = HttpClientError<CannedTransportError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, _request: HttpRequest) -> Self::Future {
		let next = self.responses.lock().ok().and_then(|mut responses| responses.pop_front());
		let slot = self.slot.clone();

		Box::pin(async move {
			let (status, body) = next.ok_or_else(|| {
				HttpClientError::Reqwest(Box::new(CannedTransportError::ScriptExhausted))
			})?;
			let mut response = HttpResponse::new(body.into_bytes());

			*response.status_mut() =
				StatusCode::from_u16(status).map_err(|e| HttpClientError::Http(e.into()))?;

			slot.store(ResponseMetadata { status: Some(status), retry_after: None });

			Ok(response)
		})
	}
}

struct CannedErrorMapper;
impl TransportErrorMapper<CannedTransportError> for CannedErrorMapper {
	fn map_transport_error(
		&self,
		flow: FlowKind,
		_metadata: Option<&ResponseMetadata>,
		error: HttpClientError<CannedTransportError>,
	) -> Error {
		match error {
			HttpClientError::Reqwest(inner) => TransportError::network(flow, *inner).into(),
			other => TransportError::Io(std::io::Error::other(other.to_string())).into(),
		}
	}
}
