// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use httpmock::prelude::*;
use time::macros;
// self
use oauth2_token_relay::{
	_preludet::*,
	clock::ManualClock,
	credentials::{ClientAuthMethod, ClientCredentials},
	error::AuthError,
};

const SCOPE: &str = "tires/create.order";

fn token_body(token: &str, expires_in: Option<u64>) -> String {
	match expires_in {
		Some(expires_in) => format!(
			"{{\"access_token\":\"{token}\",\"token_type\":\"Bearer\",\"expires_in\":{expires_in}}}"
		),
		None => format!("{{\"access_token\":\"{token}\",\"token_type\":\"Bearer\"}}"),
	}
}

#[tokio::test]
async fn basic_auth_grant_stamps_token_with_clock() {
	let server = MockServer::start_async().await;
	let basic = format!("Basic {}", STANDARD.encode("car-orders-client:car-orders-secret"));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/token")
				.header("authorization", basic.as_str())
				.body_includes("grant_type=client_credentials")
				.body_includes("scope=tires%2Fcreate.order");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("issued-token", Some(3_600)));
		})
		.await;
	let clock = ManualClock::new(macros::datetime!(2025-03-01 08:00 UTC));
	let issuer = build_test_issuer().with_clock(Arc::new(clock));
	let credentials = test_credentials(&server.url("/oauth2/token"), SCOPE);
	let token = issuer
		.acquire_token(&credentials)
		.await
		.expect("Client-credentials grant should succeed.");

	assert_eq!(token.token.expose(), "issued-token");
	assert_eq!(token.obtained_at, macros::datetime!(2025-03-01 08:00 UTC));
	assert_eq!(token.expires_in_seconds, 3_600);
	assert_eq!(token.expires_at(), macros::datetime!(2025-03-01 09:00 UTC));

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn grant_without_token_type_is_accepted() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"abc\",\"expires_in\":3600}");
		})
		.await;
	let credentials = test_credentials(&server.url("/oauth2/token"), SCOPE);
	let token = build_test_issuer()
		.acquire_token(&credentials)
		.await
		.expect("A payload carrying only access_token and expires_in should succeed.");

	assert_eq!(token.token.expose(), "abc");
	assert_eq!(token.expires_in_seconds, 3_600);

	mock.assert_async().await;
}

#[tokio::test]
async fn repeated_grants_yield_independent_valid_tokens() {
	let server = MockServer::start_async().await;
	let t0 = macros::datetime!(2025-03-01 08:00 UTC);
	let clock = ManualClock::new(t0);
	let issuer = build_test_issuer().with_clock(Arc::new(clock.clone()));
	let credentials = test_credentials(&server.url("/oauth2/token"), SCOPE);
	let mut first_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"abc\",\"expires_in\":3600}");
		})
		.await;
	let first = issuer.acquire_token(&credentials).await.expect("First grant should succeed.");

	first_mock.assert_calls_async(1).await;
	first_mock.delete_async().await;
	clock.advance(Duration::minutes(1));

	let second_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"def\",\"expires_in\":3600}");
		})
		.await;
	let second = issuer.acquire_token(&credentials).await.expect("Second grant should succeed.");

	second_mock.assert_calls_async(1).await;

	assert_ne!(first.token.expose(), second.token.expose());
	assert_eq!(first.obtained_at, t0);
	assert_eq!(second.obtained_at, t0 + Duration::minutes(1));
	assert_eq!(first.expires_in_seconds, second.expires_in_seconds);

	let now = t0 + Duration::minutes(2);
	let margin = Duration::minutes(10);

	assert!(first.is_fresh_at(now, margin));
	assert!(second.is_fresh_at(now, margin));
}

#[tokio::test]
async fn post_auth_sends_client_id_in_body() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/token")
				.body_includes("client_id=car-orders-client")
				.body_includes("client_secret=car-orders-secret");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("post-token", Some(900)));
		})
		.await;
	let credentials = ClientCredentials::builder("car-orders-client", "car-orders-secret")
		.token_endpoint(
			Url::parse(&server.url("/oauth2/token")).expect("Mock endpoint should parse."),
		)
		.scope(SCOPE)
		.auth_method(ClientAuthMethod::ClientSecretPost)
		.build()
		.expect("Credentials should build.");
	let token = build_test_issuer()
		.acquire_token(&credentials)
		.await
		.expect("Client-credentials grant should succeed.");

	assert_eq!(token.token.expose(), "post-token");

	mock.assert_async().await;
}

#[tokio::test]
async fn missing_expires_in_uses_fallback_lifetime() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("no-lifetime", None));
		})
		.await;
	let credentials = test_credentials(&server.url("/oauth2/token"), SCOPE);
	let token = build_test_issuer()
		.with_fallback_expires_in(120)
		.acquire_token(&credentials)
		.await
		.expect("Grant without expires_in should succeed.");

	assert_eq!(token.expires_in_seconds, 120);

	mock.assert_async().await;
}

#[tokio::test]
async fn rejected_client_maps_to_invalid_credentials() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_client\"}");
		})
		.await;
	let credentials = test_credentials(&server.url("/oauth2/token"), SCOPE);
	let err = build_test_issuer()
		.acquire_token(&credentials)
		.await
		.expect_err("Rejected client should fail.");

	assert!(matches!(err, AuthError::InvalidCredentials { status: Some(401), .. }));
	assert!(!err.is_transient());

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn unavailable_issuer_carries_retry_after() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(503).header("retry-after", "7");
		})
		.await;
	let credentials = test_credentials(&server.url("/oauth2/token"), SCOPE);
	let err = build_test_issuer()
		.acquire_token(&credentials)
		.await
		.expect_err("Unavailable issuer should fail.");

	match err {
		AuthError::Unavailable { status, retry_after, .. } => {
			assert_eq!(status, Some(503));
			assert_eq!(retry_after, Some(Duration::seconds(7)));
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn dated_retry_after_is_measured_against_the_issuer_clock() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(503).header("retry-after", "Sat, 01 Mar 2025 08:02:00 +0000");
		})
		.await;
	let clock = ManualClock::new(macros::datetime!(2025-03-01 08:00 UTC));
	let credentials = test_credentials(&server.url("/oauth2/token"), SCOPE);
	let err = build_test_issuer()
		.with_clock(Arc::new(clock))
		.acquire_token(&credentials)
		.await
		.expect_err("Unavailable issuer should fail.");

	match err {
		AuthError::Unavailable { retry_after, .. } => {
			assert_eq!(retry_after, Some(Duration::minutes(2)));
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn success_without_token_is_malformed() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"token_type\":\"Bearer\",\"expires_in\":3600}");
		})
		.await;
	let credentials = test_credentials(&server.url("/oauth2/token"), SCOPE);
	let err = build_test_issuer()
		.acquire_token(&credentials)
		.await
		.expect_err("A success without access_token should fail.");

	assert!(matches!(err, AuthError::MalformedResponse { .. }));

	mock.assert_async().await;
}

#[tokio::test]
async fn unreachable_issuer_is_unavailable() {
	// Nothing listens on the discard port of the loopback interface.
	let credentials = test_credentials("http://127.0.0.1:9/oauth2/token", SCOPE);
	let err = build_test_issuer()
		.acquire_token(&credentials)
		.await
		.expect_err("Unreachable issuer should fail.");

	assert!(matches!(err, AuthError::Unavailable { status: None, source: Some(_), .. }));
}
