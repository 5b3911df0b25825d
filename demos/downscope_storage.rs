//! Demonstrates downscoping a root token to read-only access on one bucket prefix.
//!
//! With `ROOT_ACCESS_TOKEN` and `BUCKET` set, the demo talks to the production token service.
//! Otherwise it runs against a local mock so it can be tried without Google credentials.

// std
use std::{env, sync::Arc};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use downscoped_credentials::{
	boundary::{AccessBoundary, AccessBoundaryRule, AvailabilityCondition},
	credentials::{Credentials, RefreshContext, ReqwestDownscopedCredentials, StaticCredentials},
	exchange::ReqwestTransportErrorMapper,
	http::ReqwestHttpClient,
	reqwest::Client,
	sts::StsEndpoints,
};

fn bucket_boundary(bucket: &str, prefix: &str) -> Result<AccessBoundary> {
	let rule = AccessBoundaryRule::new(format!("//storage.googleapis.com/projects/_/buckets/{bucket}"))
		.with_permission("inRole:roles/storage.objectViewer")
		.with_condition(
			AvailabilityCondition::new(format!(
				"resource.name.startsWith('projects/_/buckets/{bucket}/objects/{prefix}')"
			))
			.with_title("obj-prefixes"),
		);

	Ok(AccessBoundary::new([rule])?)
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let prefix = env::var("OBJECT_PREFIX").unwrap_or_else(|_| "customer-a".into());
	let context = RefreshContext::new().with_reason("demo");

	if let (Ok(token), Ok(bucket)) = (env::var("ROOT_ACCESS_TOKEN"), env::var("BUCKET")) {
		let root = Arc::new(StaticCredentials::new(token));
		let creds = ReqwestDownscopedCredentials::new(root, bucket_boundary(&bucket, &prefix)?)?;

		creds.refresh(&context).await?;

		println!("Downscoped token expires at {}.", creds.expiry_at());

		return Ok(());
	}

	let server = MockServer::start_async().await;
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path("/v2beta1/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-downscoped\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let endpoints = StsEndpoints::builder()
		.token_exchange_endpoint(Url::parse(&server.url("/v2beta1/token"))?)
		.token_info_endpoint(Url::parse(&server.url("/oauth2/v3/tokeninfo"))?)
		.build()?;
	let http_client = ReqwestHttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(downscoped_credentials::reqwest::redirect::Policy::none())
			.build()?,
	);
	let creds = ReqwestDownscopedCredentials::with_http_client(
		Arc::new(StaticCredentials::new("demo-root")),
		bucket_boundary("demo-bucket", &prefix)?,
		endpoints,
		http_client,
		ReqwestTransportErrorMapper,
	)?;
	let token = creds.ensure_fresh(&context).await?;

	exchange.assert_async().await;

	println!("Downscoped token {} expires at {}.", token.token.expose(), token.expires_at);
	println!("Metrics: {:?}.", creds.metrics());

	Ok(())
}
