//! Downscoped OAuth 2.0 credentials: exchange a root access token for a short-lived token that
//! carries the same identity but only the permissions an access-boundary policy grants.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod boundary;
pub mod credentials;
pub mod error;
pub mod exchange;
pub mod http;
pub mod obs;
pub mod signer;
pub mod sts;
pub mod token;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use parking_lot::Mutex;
	// self
	use crate::{
		boundary::AccessBoundary,
		credentials::{Credentials, CredentialsFuture, RefreshContext, ReqwestDownscopedCredentials},
		exchange::ReqwestTransportErrorMapper,
		http::ReqwestHttpClient,
		sts::StsEndpoints,
		token::TokenSecret,
	};

	/// Policy used across tests: read-only access to a single bucket.
	pub const BUCKET_POLICY: &str = r#"{"accessBoundaryRules":[{"availableResource":"//storage.googleapis.com/projects/_/buckets/b1","availablePermissions":["inRole:roles/storage.objectViewer"]}]}"#;

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds endpoints pointing at a mock server.
	pub fn mock_endpoints(token_exchange: &str, token_info: &str) -> StsEndpoints {
		StsEndpoints::builder()
			.token_exchange_endpoint(
				Url::parse(token_exchange).expect("Mock token exchange endpoint should parse."),
			)
			.token_info_endpoint(
				Url::parse(token_info).expect("Mock token info endpoint should parse."),
			)
			.build()
			.expect("Mock endpoints should pass validation.")
	}

	/// Parses [`BUCKET_POLICY`].
	pub fn bucket_boundary() -> AccessBoundary {
		AccessBoundary::from_json_str(BUCKET_POLICY).expect("Bucket policy fixture should parse.")
	}

	/// Constructs downscoped credentials backed by the reqwest transport used across tests.
	pub fn build_reqwest_test_credentials<R>(
		root: Arc<R>,
		boundary: AccessBoundary,
		endpoints: StsEndpoints,
	) -> ReqwestDownscopedCredentials<R>
	where
		R: ?Sized + Credentials,
	{
		ReqwestDownscopedCredentials::with_http_client(
			root,
			boundary,
			endpoints,
			test_reqwest_http_client(),
			ReqwestTransportErrorMapper,
		)
		.expect("Test credentials should build.")
	}

	/// Error raised by [`MockRootCredentials::failing`].
	#[derive(Debug, ThisError)]
	#[error("{0}")]
	pub struct MockRootError(pub String);

	/// Root credential double that counts refreshes and optionally fails them.
	#[derive(Debug)]
	pub struct MockRootCredentials {
		token: Mutex<Option<TokenSecret>>,
		refreshed_token: String,
		failure: Option<String>,
		refreshes: AtomicUsize,
	}
	impl MockRootCredentials {
		/// Root credential that reports `token` after every refresh.
		pub fn new(token: impl Into<String>) -> Self {
			Self {
				token: Mutex::new(None),
				refreshed_token: token.into(),
				failure: None,
				refreshes: AtomicUsize::new(0),
			}
		}

		/// Root credential whose refresh always fails with `message`.
		pub fn failing(message: impl Into<String>) -> Self {
			Self { failure: Some(message.into()), ..Self::new("unused") }
		}

		/// Number of refresh calls observed so far.
		pub fn refreshes(&self) -> usize {
			self.refreshes.load(Ordering::SeqCst)
		}
	}
	impl Credentials for MockRootCredentials {
		fn token(&self) -> Option<TokenSecret> {
			self.token.lock().clone()
		}

		fn expiry(&self) -> Option<OffsetDateTime> {
			None
		}

		fn refresh<'a>(&'a self, _context: &'a RefreshContext) -> CredentialsFuture<'a, ()> {
			Box::pin(async move {
				self.refreshes.fetch_add(1, Ordering::SeqCst);

				if let Some(message) = &self.failure {
					return Err(Error::root_credential(MockRootError(message.clone())));
				}

				*self.token.lock() = Some(TokenSecret::new(self.refreshed_token.clone()));

				Ok(())
			})
		}
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
	pub use parking_lot::RwLock;
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
#[cfg(test)] use {color_eyre as _, httpmock as _};
