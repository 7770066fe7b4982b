//! Walks through the whole device flow against a local mock of the GitHub and Copilot endpoints.
//!
//! 1. Request a device code and show the user code + verification URI.
//! 2. Poll the token endpoint within a bounded window until the user approves.
//! 3. Hand the primary credential to a chat client, which exchanges it for a session token on
//!    demand and sends one completion.

// crates.io
use color_eyre::{Result, eyre::eyre};
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use copilot_broker::{
	flows::{Broker, PollOutcome},
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	provider::ProviderDescriptor,
	reqwest::Client,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let expires_at = (OffsetDateTime::now_utc() + Duration::minutes(30)).unix_timestamp();

	server
		.mock_async(|when, then| {
			when.method(POST).path("/login/device/code");
			then.status(200).header("content-type", "application/json").body(
				r#"{"device_code":"demo-device","user_code":"WDJB-MJHT","verification_uri":"https://github.com/login/device","interval":1,"expires_in":900}"#,
			);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/login/oauth/access_token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"gho_demo","token_type":"bearer","scope":"read:user"}"#);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/copilot_internal/v2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(format!(r#"{{"token":"demo-session","expires_at":{expires_at}}}"#));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/chat/completions");
			then.status(200).header("content-type", "application/json").body(
				r#"{"choices":[{"message":{"role":"assistant","content":"Turn on the lights."},"finish_reason":"stop"}]}"#,
			);
		})
		.await;

	let descriptor = ProviderDescriptor::builder()
		.device_authorization_endpoint(Url::parse(&server.url("/login/device/code"))?)
		.device_token_endpoint(Url::parse(&server.url("/login/oauth/access_token"))?)
		.session_token_endpoint(Url::parse(&server.url("/copilot_internal/v2/token"))?)
		.chat_completions_endpoint(Url::parse(&server.url("/chat/completions"))?)
		.build()?;
	// httpmock serves a self-signed certificate.
	let http_client = ReqwestHttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let broker = <Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>>::with_http_client(
		descriptor,
		"demo-client",
		http_client,
		ReqwestTransportErrorMapper,
	);
	let authorization = broker.begin_device_authorization().await?;

	println!(
		"Open {} and enter {} (expires at {}).",
		authorization.verification_uri,
		authorization.user_code,
		authorization.expires_at()
	);

	let mut interval = authorization.poll_interval();
	let primary = loop {
		match broker
			.poll_for_token(&authorization.device_code, &mut interval, Duration::seconds(5))
			.await?
		{
			PollOutcome::Authorized(credential) => break credential,
			PollOutcome::Pending if authorization.is_expired_at(OffsetDateTime::now_utc()) =>
				return Err(eyre!("The device code expired before it was approved.")),
			PollOutcome::Pending => println!("Still waiting for approval..."),
		}
	};

	println!("Authorized; store this credential: {}.", serde_json::to_string(&primary)?);

	let reply = broker.chat(primary).complete("Accendi le luci del soggiorno.").await?;

	println!("Assistant replied: {}.", reply.text);

	if let Some(expires_at) = broker.session_cache().cached_expiry() {
		println!("Session token cached until {expires_at}.");
	}

	Ok(())
}
