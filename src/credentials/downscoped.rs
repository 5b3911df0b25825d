//! Downscoped credentials: a root credential plus an access-boundary policy.
//!
//! A freshly built [`DownscopedCredentials`] holds no token and reports itself expired. Every
//! refresh runs the same sequence under a single-flight guard:
//!
//! 1. refresh the root credential, returning its error untouched on failure;
//! 2. exchange the root token for a downscoped one at the token-exchange endpoint;
//! 3. when the exchange omits `expires_in`, ask the token-info endpoint how long the root token
//!    has left;
//! 4. swap the new token and its expiry into place in one write.
//!
//! Any failure leaves the previous token and expiry untouched.

// crates.io
#[cfg(feature = "reqwest")] use serde_json::Value;
// self
use crate::{
	_prelude::*,
	boundary::AccessBoundary,
	credentials::{Credentials, CredentialsFuture, RefreshContext, RefreshMetrics},
	error::RefreshError,
	exchange::{StsExchange, TransportErrorMapper},
	http::StsHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	sts::StsEndpoints,
	token::{AccessToken, TokenSecret},
};
#[cfg(feature = "reqwest")]
use crate::{error::ConfigError, exchange::ReqwestTransportErrorMapper, http::ReqwestHttpClient};

/// Downscoped credentials backed by the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestDownscopedCredentials<R> =
	DownscopedCredentials<R, ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Credential whose tokens carry the root's identity but only the boundary's permissions.
///
/// The root is shared, never cloned: other holders of the same `Arc` see its refreshes too.
pub struct DownscopedCredentials<R, C, M>
where
	R: ?Sized + Credentials,
	C: ?Sized + StsHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	root: Arc<R>,
	boundary: AccessBoundary,
	boundary_json: String,
	endpoints: StsEndpoints,
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	created_at: OffsetDateTime,
	state: RwLock<Option<AccessToken>>,
	refresh_guard: AsyncMutex<()>,
	metrics: Arc<RefreshMetrics>,
}
impl<R, C, M> DownscopedCredentials<R, C, M>
where
	R: ?Sized + Credentials,
	C: ?Sized + StsHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds credentials that reuse the caller-provided transport + mapper pair.
	///
	/// No network I/O happens here; the first token is obtained by the first refresh.
	pub fn with_http_client(
		root: Arc<R>,
		boundary: AccessBoundary,
		endpoints: StsEndpoints,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let boundary_json = boundary.to_json()?;

		Ok(Self {
			root,
			boundary,
			boundary_json,
			endpoints,
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			created_at: OffsetDateTime::now_utc(),
			state: RwLock::new(None),
			refresh_guard: AsyncMutex::new(()),
			metrics: Default::default(),
		})
	}

	/// Root credential the downscoped tokens are derived from.
	pub fn root(&self) -> &Arc<R> {
		&self.root
	}

	/// Policy every issued token is limited to.
	pub fn boundary(&self) -> &AccessBoundary {
		&self.boundary
	}

	/// Token-service endpoints used by refreshes.
	pub fn endpoints(&self) -> &StsEndpoints {
		&self.endpoints
	}

	/// Refresh counters for this credential.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Snapshot of the current token and its expiry, if any exchange succeeded.
	pub fn access_token(&self) -> Option<AccessToken> {
		self.state.read().clone()
	}

	/// Expiry of the current token, or the construction instant before the first exchange.
	pub fn expiry_at(&self) -> OffsetDateTime {
		self.state.read().as_ref().map_or(self.created_at, |token| token.expires_at)
	}

	/// Returns `true` when `instant` is at or past the current expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expiry_at()
	}

	/// Runs a refresh unconditionally and returns the new token.
	///
	/// Concurrent calls are serialized; each one still performs its own exchange.
	pub async fn refresh_access_token(&self, context: &RefreshContext) -> Result<AccessToken> {
		let _singleflight = self.refresh_guard.lock().await;

		self.refresh_locked(context).await
	}

	/// Returns the current token, refreshing first if it has expired.
	///
	/// Callers that queue behind an in-flight refresh reuse its result instead of starting
	/// another exchange.
	pub async fn ensure_fresh(&self, context: &RefreshContext) -> Result<AccessToken> {
		if let Some(token) = self.fresh_token() {
			return Ok(token);
		}

		let _singleflight = self.refresh_guard.lock().await;

		if let Some(token) = self.fresh_token() {
			return Ok(token);
		}

		self.refresh_locked(context).await
	}

	fn fresh_token(&self) -> Option<AccessToken> {
		let now = OffsetDateTime::now_utc();

		self.state.read().as_ref().filter(|token| !token.is_expired_at(now)).cloned()
	}

	async fn refresh_locked(&self, context: &RefreshContext) -> Result<AccessToken> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::with_reason(KIND, "refresh_access_token", context.reason.as_deref());

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_attempt();

		let result = span
			.instrument(async {
				self.root.refresh(context).await?;

				let subject_token =
					self.root.token().ok_or(RefreshError::MissingSubjectToken)?;

				StsExchange::new(
					&self.endpoints,
					self.http_client.as_ref(),
					self.transport_mapper.as_ref(),
				)
				.with_metrics(&self.metrics)
				.downscope(&subject_token, &self.boundary_json)
				.await
			})
			.await;

		match &result {
			Ok(token) => {
				*self.state.write() = Some(token.clone());

				self.metrics.record_success();
			},
			Err(_) => self.metrics.record_failure(),
		}

		obs::record_result(KIND, &result);

		result
	}
}
#[cfg(feature = "reqwest")]
impl<R> DownscopedCredentials<R, ReqwestHttpClient, ReqwestTransportErrorMapper>
where
	R: ?Sized + Credentials,
{
	/// Builds credentials against the production token service.
	///
	/// The crate provisions its own reqwest client, configured not to follow redirects.
	pub fn new(root: Arc<R>, boundary: AccessBoundary) -> Result<Self> {
		let endpoints = StsEndpoints::google().map_err(ConfigError::from)?;

		Self::with_endpoints(root, boundary, endpoints)
	}

	/// Builds credentials from a JSON policy document.
	///
	/// Fails with [`ConfigError::MissingAccessBoundaryRules`] when the document lacks the
	/// `accessBoundaryRules` key.
	pub fn from_json(root: Arc<R>, policy: Value) -> Result<Self> {
		Self::new(root, AccessBoundary::from_json_value(policy)?)
	}

	/// Builds credentials against custom endpoints using the default reqwest client.
	pub fn with_endpoints(
		root: Arc<R>,
		boundary: AccessBoundary,
		endpoints: StsEndpoints,
	) -> Result<Self> {
		Self::with_http_client(
			root,
			boundary,
			endpoints,
			ReqwestHttpClient::no_redirects()?,
			ReqwestTransportErrorMapper,
		)
	}
}
impl<R, C, M> Credentials for DownscopedCredentials<R, C, M>
where
	R: ?Sized + Credentials,
	C: ?Sized + StsHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn token(&self) -> Option<TokenSecret> {
		self.state.read().as_ref().map(|token| token.token.clone())
	}

	fn expiry(&self) -> Option<OffsetDateTime> {
		Some(self.expiry_at())
	}

	fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	fn refresh<'a>(&'a self, context: &'a RefreshContext) -> CredentialsFuture<'a, ()> {
		Box::pin(async move { self.refresh_access_token(context).await.map(|_| ()) })
	}

	fn refresh_if_expired<'a>(&'a self, context: &'a RefreshContext) -> CredentialsFuture<'a, ()> {
		Box::pin(async move { self.ensure_fresh(context).await.map(|_| ()) })
	}
}
impl<R, C, M> Debug for DownscopedCredentials<R, C, M>
where
	R: ?Sized + Credentials,
	C: ?Sized + StsHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let token_set = self.state.read().is_some();

		f.debug_struct("DownscopedCredentials")
			.field("boundary", &self.boundary)
			.field("endpoints", &self.endpoints)
			.field("token_set", &token_set)
			.field("expiry", &self.expiry_at())
			.finish()
	}
}
