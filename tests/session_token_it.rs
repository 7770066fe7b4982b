// crates.io
use httpmock::prelude::*;
// self
use copilot_broker::{_preludet::*, auth::PrimaryCredential, error::TransportError};

fn session_body(token: &str, expires_in: Duration) -> String {
	let expires_at = (OffsetDateTime::now_utc() + expires_in).unix_timestamp();

	format!(r#"{{"token":"{token}","expires_at":{expires_at},"refresh_in":1500}}"#)
}

fn primary() -> PrimaryCredential {
	PrimaryCredential::new("gho_primary")
}

#[tokio::test]
async fn fresh_token_is_served_from_cache() {
	let server = MockServer::start_async().await;
	let (broker, _) = build_reqwest_test_broker(mock_descriptor(&server.base_url()));
	let body = session_body("sec1", Duration::seconds(1_800));
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/copilot_internal/v2/token")
				.header("authorization", "token gho_primary")
				.header("user-agent", "GithubCopilot/1.155.0");
			then.status(200).header("content-type", "application/json").body(&body);
		})
		.await;
	let first = broker.get_valid_token(&primary()).await.expect("First exchange should succeed.");
	let second = broker.get_valid_token(&primary()).await.expect("Cached lookup should succeed.");

	mock.assert_calls_async(1).await;

	assert_eq!(first.token.expose(), "sec1");
	assert_eq!(second, first);
	assert_eq!(first.refresh_in, Some(Duration::seconds(1_500)));
	assert_eq!(broker.session_cache().metrics().exchanges(), 1);
	assert_eq!(broker.session_cache().metrics().hits(), 1);
}

#[tokio::test]
async fn rejected_exchange_reports_status_and_body() {
	let server = MockServer::start_async().await;
	let (broker, _) = build_reqwest_test_broker(mock_descriptor(&server.base_url()));
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/copilot_internal/v2/token");
			then.status(401).body(r#"{"message":"Bad credentials"}"#);
		})
		.await;
	let err = broker.get_valid_token(&primary()).await.expect_err("A 401 must fail the exchange.");

	mock.assert_calls_async(1).await;

	assert!(err.is_unauthorized());
	assert!(matches!(
		err,
		Error::TokenExchangeFailed { status: 401, ref body, .. } if body.contains("Bad credentials")
	));
}

#[tokio::test]
async fn token_inside_the_margin_is_refreshed_once() {
	let (broker, transport, _) = build_scripted_test_broker();

	transport
		.push(200, session_body("sec-stale", Duration::seconds(200)))
		.push(200, session_body("sec-fresh", Duration::seconds(1_800)));

	let stale = broker.get_valid_token(&primary()).await.expect("First exchange should succeed.");

	// The provider's best offer is returned even though it is already inside the margin.
	assert_eq!(stale.token.expose(), "sec-stale");

	let fresh = broker.get_valid_token(&primary()).await.expect("Refresh should succeed.");
	let cached = broker.get_valid_token(&primary()).await.expect("Cached lookup should succeed.");

	assert_eq!(fresh.token.expose(), "sec-fresh");
	assert_eq!(cached, fresh);
	assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn concurrent_callers_share_one_exchange() {
	let (broker, transport, _) = build_scripted_test_broker();

	transport
		.push(200, session_body("sec-a", Duration::seconds(1_800)))
		.push(200, session_body("sec-b", Duration::seconds(3_600)));

	let credential = primary();
	let other = broker.clone();
	let (lhs, rhs, third) = tokio::join!(
		broker.get_valid_token(&credential),
		broker.get_valid_token(&credential),
		other.get_valid_token(&credential),
	);
	let lhs = lhs.expect("First concurrent caller should succeed.");
	let rhs = rhs.expect("Second concurrent caller should succeed.");
	let third = third.expect("Third concurrent caller should succeed.");

	assert_eq!(transport.calls(), 1);
	assert_eq!(lhs, rhs);
	assert_eq!(rhs, third);
	assert_eq!(broker.session_cache().cached_expiry(), Some(lhs.expires_at));
}

#[tokio::test]
async fn concurrent_tasks_never_observe_torn_tokens() {
	let (broker, transport, _) = build_scripted_test_broker();
	let broker = broker.with_refresh_margin(Duration::hours(2));

	for idx in 0..8 {
		transport.push(200, session_body(&format!("sec-{idx}"), Duration::seconds(600 + idx)));
	}

	let tasks = (0..8)
		.map(|_| {
			let broker = broker.clone();

			tokio::spawn(async move { broker.get_valid_token(&primary()).await })
		})
		.collect::<Vec<_>>();
	let mut seen = Vec::new();

	for task in tasks {
		seen.push(
			task.await.expect("Task should not panic.").expect("Every exchange should succeed."),
		);
	}

	// A margin larger than every lifetime forces one exchange per caller.
	assert_eq!(transport.calls(), 8);

	for token in &seen {
		let idx = token
			.token
			.expose()
			.trim_start_matches("sec-")
			.parse::<i64>()
			.expect("Token suffix should be numeric.");
		let expected = OffsetDateTime::now_utc() + Duration::seconds(600 + idx);

		assert!((expected - token.expires_at).abs() < Duration::seconds(5));
	}
}

#[tokio::test]
async fn failed_refresh_keeps_the_previous_token() {
	let (broker, transport, _) = build_scripted_test_broker();

	transport
		.push(200, session_body("sec-old", Duration::seconds(120)))
		.push(503, "upstream unavailable");

	let old = broker.get_valid_token(&primary()).await.expect("First exchange should succeed.");
	let err = broker.get_valid_token(&primary()).await.expect_err("Refresh should fail.");

	assert!(matches!(err, Error::TokenExchangeFailed { status: 503, .. }));
	assert!(!err.is_unauthorized());
	assert_eq!(broker.session_cache().cached_expiry(), Some(old.expires_at));
	assert_eq!(broker.session_cache().metrics().failures(), 1);
}

#[tokio::test]
async fn already_expired_exchanges_are_rejected_and_never_cached() {
	let (broker, transport, _) = build_scripted_test_broker();

	transport
		.push(200, session_body("sec-dead", Duration::seconds(-600)))
		.push(200, session_body("sec-old", Duration::seconds(120)))
		.push(200, session_body("sec-dead", Duration::seconds(-1)));

	let err = broker.get_valid_token(&primary()).await.expect_err("Expired token must be rejected.");

	assert!(matches!(err, Error::Transport(TransportError::InvalidPayload { status: 200, .. })));
	assert!(broker.session_cache().cached_expiry().is_none());

	let old = broker.get_valid_token(&primary()).await.expect("Unexpired token should be served.");
	let err = broker.get_valid_token(&primary()).await.expect_err("Expired refresh must fail.");

	assert_eq!(old.token.expose(), "sec-old");
	assert!(matches!(err, Error::Transport(TransportError::InvalidPayload { .. })));
	assert_eq!(broker.session_cache().cached_expiry(), Some(old.expires_at));
	assert_eq!(broker.session_cache().metrics().failures(), 2);
	assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn tokens_are_bound_to_the_minting_credential() {
	let (broker, transport, _) = build_scripted_test_broker();

	transport
		.push(200, session_body("sec-one", Duration::seconds(1_800)))
		.push(200, session_body("sec-two", Duration::seconds(1_800)));

	let one = broker
		.get_valid_token(&PrimaryCredential::new("gho_one"))
		.await
		.expect("First credential should exchange.");
	let two = broker
		.get_valid_token(&PrimaryCredential::new("gho_two"))
		.await
		.expect("Second credential should exchange.");
	let requests = transport.requests();

	assert_eq!(one.token.expose(), "sec-one");
	assert_eq!(two.token.expose(), "sec-two");
	assert_eq!(requests[0].header("authorization"), Some("token gho_one"));
	assert_eq!(requests[1].header("authorization"), Some("token gho_two"));
}

#[tokio::test]
async fn expiry_accepts_milliseconds_and_strings() {
	let (broker, transport, _) = build_scripted_test_broker();
	let expires_at = (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp();

	transport.push(200, format!(r#"{{"token":"sec-ms","expires_at":{}}}"#, expires_at * 1_000));

	let token = broker.get_valid_token(&primary()).await.expect("Millisecond expiry should parse.");

	assert_eq!(token.expires_at.unix_timestamp(), expires_at);

	broker.session_cache().invalidate();
	transport.push(200, format!(r#"{{"token":"sec-str","expires_at":"{expires_at}"}}"#));

	let token = broker.get_valid_token(&primary()).await.expect("String expiry should parse.");

	assert_eq!(token.token.expose(), "sec-str");
	assert_eq!(token.expires_at.unix_timestamp(), expires_at);
}

#[tokio::test]
async fn malformed_exchange_bodies_are_transport_errors() {
	let (broker, transport, _) = build_scripted_test_broker();

	transport
		.push(200, r#"{"token":"sec1"}"#)
		.push(200, r#"{"token":"","expires_at":1}"#)
		.push(200, "not json");

	for _ in 0..2 {
		let err = broker.get_valid_token(&primary()).await.expect_err("Payload must be rejected.");

		assert!(matches!(err, Error::Transport(TransportError::InvalidPayload { .. })));
	}

	let err = broker.get_valid_token(&primary()).await.expect_err("Payload must be rejected.");

	assert!(matches!(err, Error::Transport(TransportError::MalformedResponse { .. })));
	assert!(broker.session_cache().cached_expiry().is_none());
}
