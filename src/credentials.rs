//! Credential-provider contract shared by root and downscoped credentials.
//!
//! Anything that can report a bearer token, its expiry, and refresh itself implements
//! [`Credentials`]. [`DownscopedCredentials`] is itself a [`Credentials`] implementation built on
//! top of a root one, so consumers never need to know which of the two they were handed.

pub mod downscoped;

mod metrics;

pub use downscoped::*;
pub use metrics::RefreshMetrics;

// self
use crate::{_prelude::*, token::TokenSecret};

/// Boxed future returned by [`Credentials::refresh`].
pub type CredentialsFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Caller-supplied context threaded through a refresh.
///
/// The downscoped credential passes the same context to its root, so transport-specific hints
/// travel through unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshContext {
	/// Optional annotation recorded on refresh spans.
	pub reason: Option<String>,
}
impl RefreshContext {
	/// Creates an empty context.
	pub fn new() -> Self {
		Self::default()
	}

	/// Attaches a reason that flows into tracing spans.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}
}

/// Bearer-token credential contract.
pub trait Credentials
where
	Self: Send + Sync,
{
	/// Current access token, if one has been obtained.
	fn token(&self) -> Option<TokenSecret>;

	/// Instant after which [`Credentials::token`] must not be used, when known.
	fn expiry(&self) -> Option<OffsetDateTime>;

	/// Whether the credential needs a refresh before use.
	///
	/// With a known expiry this is `now >= expiry`; without one, only a missing token counts as
	/// expired.
	fn is_expired(&self) -> bool {
		match self.expiry() {
			Some(expiry) => OffsetDateTime::now_utc() >= expiry,
			None => self.token().is_none(),
		}
	}

	/// Obtains a new access token, replacing the current one on success.
	fn refresh<'a>(&'a self, context: &'a RefreshContext) -> CredentialsFuture<'a, ()>;

	/// Refreshes only when [`Credentials::is_expired`] reports an expired token.
	///
	/// Implementations that serialize refreshes override this so the expiry check and the refresh
	/// run inside the same critical section.
	fn refresh_if_expired<'a>(&'a self, context: &'a RefreshContext) -> CredentialsFuture<'a, ()> {
		Box::pin(async move {
			if self.is_expired() {
				self.refresh(context).await?;
			}

			Ok(())
		})
	}
}
impl<T> Credentials for Arc<T>
where
	T: ?Sized + Credentials,
{
	fn token(&self) -> Option<TokenSecret> {
		(**self).token()
	}

	fn expiry(&self) -> Option<OffsetDateTime> {
		(**self).expiry()
	}

	fn is_expired(&self) -> bool {
		(**self).is_expired()
	}

	fn refresh<'a>(&'a self, context: &'a RefreshContext) -> CredentialsFuture<'a, ()> {
		(**self).refresh(context)
	}

	fn refresh_if_expired<'a>(&'a self, context: &'a RefreshContext) -> CredentialsFuture<'a, ()> {
		(**self).refresh_if_expired(context)
	}
}

/// Root credential wrapping a token issued elsewhere.
///
/// Useful for token brokers that receive the root token from another system. Refreshing is a
/// no-op: once the token expires, a new [`StaticCredentials`] has to be built.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
	token: TokenSecret,
	expiry: Option<OffsetDateTime>,
}
impl StaticCredentials {
	/// Wraps `token` with an unknown expiry.
	pub fn new(token: impl Into<String>) -> Self {
		Self { token: TokenSecret::new(token), expiry: None }
	}

	/// Records the instant the wrapped token expires.
	pub fn with_expiry(mut self, expiry: OffsetDateTime) -> Self {
		self.expiry = Some(expiry);

		self
	}
}
impl Credentials for StaticCredentials {
	fn token(&self) -> Option<TokenSecret> {
		Some(self.token.clone())
	}

	fn expiry(&self) -> Option<OffsetDateTime> {
		self.expiry
	}

	fn refresh<'a>(&'a self, _context: &'a RefreshContext) -> CredentialsFuture<'a, ()> {
		Box::pin(async { Ok(()) })
	}
}
impl Debug for StaticCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StaticCredentials")
			.field("token", &"<redacted>")
			.field("expiry", &self.expiry)
			.finish()
	}
}
