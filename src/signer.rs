//! Consumer side of the credential contract.
//!
//! Downstream clients never talk to the token service; they ask a [`Credentials`] value for a
//! fresh token and attach it to their own requests. Root and downscoped credentials are
//! interchangeable here.

// self
use crate::{
	_prelude::*,
	credentials::{Credentials, RefreshContext},
	error::RefreshError,
	token::TokenSecret,
};

/// Describes how to attach a bearer token to an outbound request without constraining the HTTP
/// client type.
pub trait RequestSignerExt<Request, Error>
where
	Self: Send + Sync,
{
	/// Consumes the provided request and returns it carrying `token`.
	fn attach_token(&self, request: Request, token: &TokenSecret) -> Result<Request, Error>;
}

/// Refreshes `credentials` when expired, then returns the current token.
///
/// Concurrent callers sharing one [`DownscopedCredentials`](crate::credentials::DownscopedCredentials)
/// trigger a single exchange.
pub async fn ensure_fresh_token<C>(credentials: &C, context: &RefreshContext) -> Result<TokenSecret>
where
	C: ?Sized + Credentials,
{
	credentials.refresh_if_expired(context).await?;

	Ok(credentials.token().ok_or(RefreshError::MissingToken)?)
}

/// Obtains a fresh token from `credentials` and attaches it with `signer`.
pub async fn sign_request<C, S, Request>(
	credentials: &C,
	signer: &S,
	request: Request,
	context: &RefreshContext,
) -> Result<Request>
where
	C: ?Sized + Credentials,
	S: ?Sized + RequestSignerExt<Request, Error>,
{
	let token = ensure_fresh_token(credentials, context).await?;

	signer.attach_token(request, &token)
}

/// Signer adding an `Authorization: Bearer` header to reqwest requests.
#[cfg(feature = "reqwest")]
#[derive(Clone, Copy, Debug, Default)]
pub struct BearerSigner;
#[cfg(feature = "reqwest")]
impl RequestSignerExt<reqwest::RequestBuilder, Error> for BearerSigner {
	fn attach_token(
		&self,
		request: reqwest::RequestBuilder,
		token: &TokenSecret,
	) -> Result<reqwest::RequestBuilder> {
		Ok(request.bearer_auth(token.expose()))
	}
}
