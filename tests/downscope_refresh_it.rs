#![cfg(all(feature = "reqwest", feature = "test"))]

// crates.io
use httpmock::prelude::*;
// self
use downscoped_credentials::{
	_preludet::*,
	credentials::{Credentials, RefreshContext, ReqwestDownscopedCredentials},
	error::{REFRESH_ERROR, RefreshError, TOKEN_INFO_ERROR},
	signer::{self, BearerSigner},
	sts::StsEndpointKind,
};

const EXCHANGE_PATH: &str = "/v2beta1/token";
const TOKEN_INFO_PATH: &str = "/oauth2/v3/tokeninfo";
const EXCHANGE_BODY: &str = "{\"access_token\":\"down-tok\",\"issued_token_type\":\"urn:ietf:params:oauth:token-type:access_token\",\"token_type\":\"Bearer\",\"expires_in\":3600}";
const EXCHANGE_BODY_NO_EXPIRY: &str = "{\"access_token\":\"down-tok\",\"issued_token_type\":\"urn:ietf:params:oauth:token-type:access_token\",\"token_type\":\"Bearer\"}";

fn build_credentials(
	server: &MockServer,
) -> (Arc<MockRootCredentials>, ReqwestDownscopedCredentials<MockRootCredentials>) {
	let root = Arc::new(MockRootCredentials::new("root-tok"));
	let endpoints = mock_endpoints(&server.url(EXCHANGE_PATH), &server.url(TOKEN_INFO_PATH));
	let creds = build_reqwest_test_credentials(root.clone(), bucket_boundary(), endpoints);

	(root, creds)
}

fn assert_expiry_within(creds: &impl Credentials, before: OffsetDateTime, lifetime: Duration) {
	let expiry = creds.expiry().expect("Downscoped credentials always report an expiry.");
	let after = OffsetDateTime::now_utc();

	assert!(expiry >= before + lifetime, "Expiry {expiry} is earlier than expected.");
	assert!(expiry <= after + lifetime, "Expiry {expiry} is later than expected.");
}

#[tokio::test]
async fn exchange_with_expires_in_skips_token_info() {
	let server = MockServer::start_async().await;
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(EXCHANGE_PATH)
				.header("content-type", "application/x-www-form-urlencoded");
			then.status(200).header("content-type", "application/json").body(EXCHANGE_BODY);
		})
		.await;
	let token_info = server
		.mock_async(|when, then| {
			when.method(GET).path(TOKEN_INFO_PATH);
			then.status(200).header("content-type", "application/json").body("{\"expires_in\":60}");
		})
		.await;
	let (root, creds) = build_credentials(&server);

	assert!(creds.is_expired());

	let before = OffsetDateTime::now_utc();

	creds.refresh(&RefreshContext::new()).await.expect("Refresh should succeed.");

	exchange.assert_calls_async(1).await;
	token_info.assert_calls_async(0).await;

	assert_eq!(creds.token().as_ref().map(|token| token.expose()), Some("down-tok"));
	assert!(!creds.is_expired());
	assert_expiry_within(&creds, before, Duration::seconds(3600));
	assert_eq!(root.refreshes(), 1);
	assert_eq!(creds.metrics().successes(), 1);
	assert_eq!(creds.metrics().token_info_lookups(), 0);
}

#[tokio::test]
async fn missing_expires_in_uses_root_token_lifetime() {
	let server = MockServer::start_async().await;
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(EXCHANGE_BODY_NO_EXPIRY);
		})
		.await;
	let token_info = server
		.mock_async(|when, then| {
			when.method(GET).path(TOKEN_INFO_PATH).query_param("access_token", "root-tok");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"azp\":\"client\",\"scope\":\"cloud-platform\",\"expires_in\":1800}");
		})
		.await;
	let (_root, creds) = build_credentials(&server);
	let before = OffsetDateTime::now_utc();
	let token = creds
		.refresh_access_token(&RefreshContext::new().with_reason("fallback"))
		.await
		.expect("Refresh should succeed through the token-info fallback.");

	exchange.assert_calls_async(1).await;
	token_info.assert_calls_async(1).await;

	assert_eq!(token.token.expose(), "down-tok");
	assert_expiry_within(&creds, before, Duration::seconds(1800));
	assert_eq!(creds.metrics().token_info_lookups(), 1);
}

#[tokio::test]
async fn textual_expires_in_is_accepted() {
	let server = MockServer::start_async().await;
	let _exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"down-tok\",\"expires_in\":\"3600\"}");
		})
		.await;
	let (_root, creds) = build_credentials(&server);
	let before = OffsetDateTime::now_utc();

	creds.refresh(&RefreshContext::new()).await.expect("Refresh should succeed.");

	assert_expiry_within(&creds, before, Duration::seconds(3600));
}

#[tokio::test]
async fn exchange_rejection_leaves_state_untouched() {
	let server = MockServer::start_async().await;
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(403)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;
	let token_info = server
		.mock_async(|when, then| {
			when.method(GET).path(TOKEN_INFO_PATH);
			then.status(200).body("{\"expires_in\":1800}");
		})
		.await;
	let (_root, creds) = build_credentials(&server);
	let expiry = creds.expiry();
	let err = creds
		.refresh(&RefreshContext::new())
		.await
		.expect_err("A 403 from the exchange must fail the refresh.");

	exchange.assert_calls_async(1).await;
	token_info.assert_calls_async(0).await;

	assert_eq!(err.to_string(), REFRESH_ERROR);
	assert!(matches!(err, Error::Refresh(RefreshError::TokenExchange { status: 403 })));
	assert!(creds.token().is_none());
	assert_eq!(creds.expiry(), expiry);
	assert!(creds.is_expired());
	assert_eq!(creds.metrics().failures(), 1);
}

#[tokio::test]
async fn token_info_rejection_leaves_state_untouched() {
	let server = MockServer::start_async().await;
	let _exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(EXCHANGE_BODY_NO_EXPIRY);
		})
		.await;
	let token_info = server
		.mock_async(|when, then| {
			when.method(GET).path(TOKEN_INFO_PATH);
			then.status(400).body("{\"error_description\":\"Invalid Value\"}");
		})
		.await;
	let (_root, creds) = build_credentials(&server);
	let err = creds
		.refresh(&RefreshContext::new())
		.await
		.expect_err("A 400 from token info must fail the refresh.");

	token_info.assert_calls_async(1).await;

	assert_eq!(err.to_string(), TOKEN_INFO_ERROR);
	assert!(matches!(err, Error::Refresh(RefreshError::TokenInfo { status: 400 })));
	assert!(creds.token().is_none());
	assert!(creds.is_expired());
}

#[tokio::test]
async fn failed_refresh_keeps_the_previous_token() {
	let server = MockServer::start_async().await;
	let mut exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200).header("content-type", "application/json").body(EXCHANGE_BODY);
		})
		.await;
	let (root, creds) = build_credentials(&server);
	let first = creds
		.refresh_access_token(&RefreshContext::new())
		.await
		.expect("First refresh should succeed.");

	exchange.delete_async().await;
	exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(500).body("backend unavailable");
		})
		.await;

	let err = creds
		.refresh(&RefreshContext::new())
		.await
		.expect_err("Second refresh should fail.");

	exchange.assert_calls_async(1).await;

	assert_eq!(err.to_string(), REFRESH_ERROR);
	assert_eq!(creds.access_token(), Some(first));
	assert_eq!(root.refreshes(), 2);
	assert_eq!(creds.metrics().attempts(), 2);
	assert_eq!(creds.metrics().successes(), 1);
	assert_eq!(creds.metrics().failures(), 1);
}

#[tokio::test]
async fn malformed_exchange_body_is_reported() {
	let server = MockServer::start_async().await;
	let _exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"token_type\":\"Bearer\",\"expires_in\":3600}");
		})
		.await;
	let (_root, creds) = build_credentials(&server);
	let err = creds
		.refresh(&RefreshContext::new())
		.await
		.expect_err("Responses without access_token must fail.");

	assert!(matches!(
		err,
		Error::Refresh(RefreshError::MalformedResponse {
			endpoint: StsEndpointKind::TokenExchange,
			status: 200,
			..
		})
	));
	assert!(creds.token().is_none());
}

#[tokio::test]
async fn root_failure_skips_the_token_service() {
	let server = MockServer::start_async().await;
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200).header("content-type", "application/json").body(EXCHANGE_BODY);
		})
		.await;
	let root = Arc::new(MockRootCredentials::failing("root refresh failed"));
	let creds = build_reqwest_test_credentials(
		root.clone(),
		bucket_boundary(),
		mock_endpoints(&server.url(EXCHANGE_PATH), &server.url(TOKEN_INFO_PATH)),
	);
	let err = creds
		.refresh(&RefreshContext::new())
		.await
		.expect_err("Root failures must fail the refresh.");

	exchange.assert_calls_async(0).await;

	assert!(matches!(err, Error::RootCredential(_)));
	assert_eq!(err.to_string(), "root refresh failed");
	assert_eq!(root.refreshes(), 1);
}

#[tokio::test]
async fn concurrent_callers_share_one_exchange() {
	let server = MockServer::start_async().await;
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(200))
				.body(EXCHANGE_BODY);
		})
		.await;
	let (root, creds) = build_credentials(&server);
	let context = RefreshContext::new();
	let (first, second) = tokio::join!(creds.ensure_fresh(&context), creds.ensure_fresh(&context));
	let first = first.expect("First caller should receive a token.");
	let second = second.expect("Second caller should receive a token.");

	exchange.assert_calls_async(1).await;

	assert_eq!(first, second);
	assert_eq!(root.refreshes(), 1);

	let cached = creds.ensure_fresh(&context).await.expect("Cached token should be reused.");

	exchange.assert_calls_async(1).await;

	assert_eq!(cached, first);
}

#[tokio::test]
async fn signer_attaches_the_downscoped_token() {
	let server = MockServer::start_async().await;
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200).header("content-type", "application/json").body(EXCHANGE_BODY);
		})
		.await;
	let (_root, creds) = build_credentials(&server);
	let request = signer::sign_request(
		&creds,
		&BearerSigner,
		ReqwestClient::new().get("https://storage.googleapis.com/storage/v1/b/b1/o"),
		&RefreshContext::new(),
	)
	.await
	.expect("Signing should refresh and attach the token.")
	.build()
	.expect("Request should build.");

	assert_eq!(
		request.headers().get("authorization").and_then(|value| value.to_str().ok()),
		Some("Bearer down-tok")
	);

	signer::ensure_fresh_token(&creds, &RefreshContext::new())
		.await
		.expect("Fresh token should be reused.");
	exchange.assert_calls_async(1).await;
}

#[tokio::test]
async fn concurrent_signers_share_one_exchange() {
	let server = MockServer::start_async().await;
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(200))
				.body(EXCHANGE_BODY);
		})
		.await;
	let (root, creds) = build_credentials(&server);
	let context = RefreshContext::new();
	let (first, second) = tokio::join!(
		signer::ensure_fresh_token(&creds, &context),
		signer::ensure_fresh_token(&creds, &context)
	);

	assert_eq!(first.expect("First signer should receive a token.").expose(), "down-tok");
	assert_eq!(second.expect("Second signer should receive a token.").expose(), "down-tok");

	exchange.assert_calls_async(1).await;

	assert_eq!(root.refreshes(), 1);
	assert_eq!(creds.metrics().attempts(), 1);
}
