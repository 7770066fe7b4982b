// crates.io
use httpmock::prelude::*;
// self
use copilot_broker::{
	_preludet::*,
	auth::{DeviceCode, PollInterval, ScopeSet},
	error::TransportError,
	flows::PollOutcome,
	obs::FlowKind,
};

#[tokio::test]
async fn device_authorization_posts_form_and_parses_codes() {
	let server = MockServer::start_async().await;
	let (broker, _) = build_reqwest_test_broker(mock_descriptor(&server.base_url()));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/login/device/code")
				.header("accept", "application/json")
				.form_urlencoded_tuple("client_id", TEST_CLIENT_ID)
				.form_urlencoded_tuple("scope", "read:user");
			then.status(200).header("content-type", "application/json").body(
				r#"{"device_code":"ABC-123","user_code":"WDJB-MJHT","verification_uri":"https://github.com/login/device","interval":5,"expires_in":900}"#,
			);
		})
		.await;
	let authorization = broker
		.begin_device_authorization()
		.await
		.expect("Device authorization should succeed against the mock provider.");

	mock.assert_calls_async(1).await;

	assert_eq!(authorization.device_code, DeviceCode::new("ABC-123"));
	assert_eq!(authorization.user_code, "WDJB-MJHT");
	assert_eq!(authorization.verification_uri.as_str(), "https://github.com/login/device");
	assert_eq!(authorization.interval, Duration::seconds(5));
	assert_eq!(authorization.expires_in, Duration::seconds(900));
	assert!(!authorization.is_expired_at(OffsetDateTime::now_utc()));
}

#[tokio::test]
async fn device_authorization_defaults_missing_interval_and_joins_custom_scopes() {
	let server = MockServer::start_async().await;
	let (broker, _) = build_reqwest_test_broker(mock_descriptor(&server.base_url()));
	let broker = broker.with_scope(
		ScopeSet::new(["read:user", "copilot"]).expect("Test scopes should be valid."),
	);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/login/device/code")
				.form_urlencoded_tuple("scope", "copilot read:user");
			then.status(200).header("content-type", "application/json").body(
				r#"{"device_code":"dev","user_code":"CODE-1","verification_uri":"https://github.com/login/device","verification_uri_complete":"https://github.com/login/device?user_code=CODE-1","expires_in":600}"#,
			);
		})
		.await;
	let authorization =
		broker.begin_device_authorization().await.expect("Device authorization should succeed.");

	mock.assert_calls_async(1).await;

	assert_eq!(authorization.interval, Duration::seconds(5));
	assert_eq!(
		authorization.verification_uri_complete.as_ref().map(Url::as_str),
		Some("https://github.com/login/device?user_code=CODE-1")
	);
}

#[tokio::test]
async fn device_authorization_surfaces_unexpected_status() {
	let server = MockServer::start_async().await;
	let (broker, _) = build_reqwest_test_broker(mock_descriptor(&server.base_url()));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/login/device/code");
			then.status(503).body("unavailable");
		})
		.await;
	let err = broker
		.begin_device_authorization()
		.await
		.expect_err("A 503 response must surface as a transport error.");

	mock.assert_calls_async(1).await;

	match err {
		Error::Transport(TransportError::UnexpectedStatus { flow, status, body }) => {
			assert_eq!(flow, FlowKind::DeviceAuthorization);
			assert_eq!(status, 503);
			assert_eq!(body, "unavailable");
		},
		other => panic!("Unexpected error: {other:?}."),
	}
}

#[tokio::test]
async fn poll_exchanges_device_code_with_grant_type() {
	let server = MockServer::start_async().await;
	let (broker, sleeper) = build_reqwest_test_broker(mock_descriptor(&server.base_url()));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/login/oauth/access_token")
				.form_urlencoded_tuple("client_id", TEST_CLIENT_ID)
				.form_urlencoded_tuple("device_code", "ABC-123")
				.form_urlencoded_tuple("grant_type", "urn:ietf:params:oauth:grant-type:device_code");
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"tok1","token_type":"bearer","scope":"read:user"}"#,
			);
		})
		.await;
	let mut interval = PollInterval::default();
	let outcome = broker
		.poll_for_token(&DeviceCode::new("ABC-123"), &mut interval, Duration::seconds(30))
		.await
		.expect("Poll should succeed against the mock provider.");

	mock.assert_calls_async(1).await;

	let PollOutcome::Authorized(credential) = outcome else {
		panic!("Expected an authorized outcome, got {outcome:?}.");
	};

	assert_eq!(credential.access_token.expose(), "tok1");
	assert_eq!(credential.token_type.as_deref(), Some("bearer"));
	assert_eq!(credential.scope.as_deref(), Some("read:user"));
	assert!(sleeper.recorded().is_empty());
}

#[tokio::test]
async fn pending_with_zero_budget_checks_once() {
	let server = MockServer::start_async().await;
	let (broker, sleeper) = build_reqwest_test_broker(mock_descriptor(&server.base_url()));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/login/oauth/access_token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"error":"authorization_pending"}"#);
		})
		.await;
	let mut interval = PollInterval::default();
	let outcome = broker
		.poll_for_token(&DeviceCode::new("ABC-123"), &mut interval, Duration::ZERO)
		.await
		.expect("Pending poll should not fail.");

	mock.assert_calls_async(1).await;

	assert_eq!(outcome, PollOutcome::Pending);
	assert!(sleeper.recorded().is_empty());
}

#[tokio::test]
async fn rfc_style_access_denied_is_terminal() {
	let server = MockServer::start_async().await;
	let (broker, sleeper) = build_reqwest_test_broker(mock_descriptor(&server.base_url()));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/login/oauth/access_token");
			then.status(400).header("content-type", "application/json").body(
				r#"{"error":"access_denied","error_description":"The user cancelled.","error_uri":"https://docs.github.com/device-flow"}"#,
			);
		})
		.await;
	let mut interval = PollInterval::default();
	let err = broker
		.poll_for_token(&DeviceCode::new("ABC-123"), &mut interval, Duration::minutes(5))
		.await
		.expect_err("access_denied must terminate the poll.");

	mock.assert_calls_async(1).await;

	match err {
		Error::AuthorizationDenied { code, description, uri } => {
			assert_eq!(code, "access_denied");
			assert_eq!(description.as_deref(), Some("The user cancelled."));
			assert_eq!(uri.as_deref(), Some("https://docs.github.com/device-flow"));
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	assert!(sleeper.recorded().is_empty());
}

#[tokio::test]
async fn non_json_error_status_is_a_transport_error() {
	let server = MockServer::start_async().await;
	let (broker, _) = build_reqwest_test_broker(mock_descriptor(&server.base_url()));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/login/oauth/access_token");
			then.status(502).body("<html>bad gateway</html>");
		})
		.await;
	let mut interval = PollInterval::default();
	let err = broker
		.poll_for_token(&DeviceCode::new("ABC-123"), &mut interval, Duration::minutes(5))
		.await
		.expect_err("A non-JSON 502 must fail the poll.");

	mock.assert_calls_async(1).await;

	assert!(matches!(
		err,
		Error::Transport(TransportError::UnexpectedStatus { flow: FlowKind::DevicePoll, status: 502, .. })
	));
}

#[tokio::test]
async fn unreachable_endpoint_maps_to_network_error() {
	let (broker, _) = build_reqwest_test_broker(mock_descriptor("https://127.0.0.1:1"));
	let err = broker
		.begin_device_authorization()
		.await
		.expect_err("A refused connection must surface as a transport error.");

	assert!(matches!(
		err,
		Error::Transport(TransportError::Network { flow: FlowKind::DeviceAuthorization, .. })
	));
}
