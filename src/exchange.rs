//! Token-exchange protocol calls.
//!
//! [`StsExchange`] performs the unauthenticated RFC 8693 POST that trades a root access token for
//! a downscoped one and, when the response carries no `expires_in`, the token-info GET that
//! resolves the lifetime from the root token instead. Nothing here retries: every non-success
//! status becomes a [`RefreshError`] for the caller to classify.

// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
	http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
// self
use crate::{
	_prelude::*,
	credentials::RefreshMetrics,
	error::{RefreshError, TransportError},
	http::StsHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	sts::{
		StsEndpointKind, StsEndpoints, TokenExchangeForm, TokenExchangeResponse,
		TokenInfoResponse, decode_json,
	},
	token::{AccessToken, TokenSecret},
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted while calling `endpoint`.
	fn map_transport_error(&self, endpoint: StsEndpointKind, error: HttpClientError<E>) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		endpoint: StsEndpointKind,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) if inner.is_builder() =>
				crate::error::ConfigError::from(*inner).into(),
			HttpClientError::Reqwest(inner) => TransportError::network(endpoint, *inner).into(),
			HttpClientError::Http(inner) => TransportError::Request(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => TransportError::Other { endpoint, message }.into(),
			_ => TransportError::Other { endpoint, message: "unknown HTTP client error".into() }
				.into(),
		}
	}
}

/// One refresh's worth of token-service calls.
pub struct StsExchange<'a, C, M>
where
	C: ?Sized + StsHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	endpoints: &'a StsEndpoints,
	http_client: &'a C,
	mapper: &'a M,
	metrics: Option<&'a RefreshMetrics>,
}
impl<'a, C, M> StsExchange<'a, C, M>
where
	C: ?Sized + StsHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Binds the endpoints and transport used for the calls.
	pub fn new(endpoints: &'a StsEndpoints, http_client: &'a C, mapper: &'a M) -> Self {
		Self { endpoints, http_client, mapper, metrics: None }
	}

	/// Counts token-info fallbacks in `metrics`.
	pub fn with_metrics(mut self, metrics: &'a RefreshMetrics) -> Self {
		self.metrics = Some(metrics);

		self
	}

	/// Exchanges `subject_token` for a token limited by `access_boundary` (rendered JSON).
	///
	/// Issues one POST, plus one GET when the exchange response omits `expires_in`.
	pub async fn downscope(
		&self,
		subject_token: &TokenSecret,
		access_boundary: &str,
	) -> Result<AccessToken> {
		let form = TokenExchangeForm { subject_token: subject_token.expose(), access_boundary };
		let body = self.exchange(form).await?;
		let lifetime = match body.expires_in {
			Some(expires_in) => expires_in.lifetime()?,
			None => {
				if let Some(metrics) = self.metrics {
					metrics.record_token_info_lookup();
				}

				self.root_token_lifetime(subject_token).await?
			},
		};
		let issued_at = OffsetDateTime::now_utc();

		Ok(AccessToken::new(body.access_token, issued_at, lifetime)?)
	}

	/// Looks up the remaining lifetime of `root_token` on the token-info endpoint.
	pub async fn root_token_lifetime(&self, root_token: &TokenSecret) -> Result<Duration> {
		const KIND: StsEndpointKind = StsEndpointKind::TokenInfo;

		let request = token_info_request(self.endpoints, root_token)?;
		let response = self.send(KIND, request).await?;

		if !response.status().is_success() {
			return Err(RefreshError::TokenInfo { status: response.status().as_u16() }.into());
		}

		let body: TokenInfoResponse = parse_body(KIND, &response)?;

		Ok(body.expires_in.lifetime()?)
	}

	async fn exchange(&self, form: TokenExchangeForm<'_>) -> Result<TokenExchangeResponse> {
		const KIND: StsEndpointKind = StsEndpointKind::TokenExchange;

		let request = token_exchange_request(self.endpoints, form)?;
		let response = self.send(KIND, request).await?;

		if !response.status().is_success() {
			return Err(RefreshError::TokenExchange { status: response.status().as_u16() }.into());
		}

		parse_body(KIND, &response)
	}

	async fn send(&self, endpoint: StsEndpointKind, request: HttpRequest) -> Result<HttpResponse> {
		let kind = FlowKind::from(endpoint);
		let span = FlowSpan::new(kind, "send");

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let handle = self.http_client.handle();
		let result = span
			.instrument(handle.call(request))
			.await
			.map_err(|err| self.mapper.map_transport_error(endpoint, err));

		// Non-success statuses count as failures but still reach the caller as a response so it
		// can pick the endpoint-specific error.
		match &result {
			Ok(response) if response.status().is_success() =>
				obs::record_flow_outcome(kind, FlowOutcome::Success),
			_ => obs::record_flow_outcome(kind, FlowOutcome::Failure),
		}

		result
	}
}

fn token_exchange_request(
	endpoints: &StsEndpoints,
	form: TokenExchangeForm<'_>,
) -> Result<HttpRequest> {
	Request::builder()
		.method(Method::POST)
		.uri(endpoints.token_exchange.as_str())
		.header(CONTENT_TYPE, FORM_CONTENT_TYPE)
		.header(ACCEPT, JSON_CONTENT_TYPE)
		.body(form.encode().into_bytes())
		.map_err(|err| TransportError::from(err).into())
}

fn token_info_request(endpoints: &StsEndpoints, root_token: &TokenSecret) -> Result<HttpRequest> {
	let mut url = endpoints.token_info.clone();

	url.query_pairs_mut().append_pair("access_token", root_token.expose());

	Request::builder()
		.method(Method::GET)
		.uri(url.as_str())
		.header(ACCEPT, JSON_CONTENT_TYPE)
		.body(Vec::new())
		.map_err(|err| TransportError::from(err).into())
}

fn parse_body<T>(endpoint: StsEndpointKind, response: &HttpResponse) -> Result<T>
where
	T: serde::de::DeserializeOwned,
{
	decode_json(response.body()).map_err(|source| {
		RefreshError::MalformedResponse { endpoint, status: response.status().as_u16(), source }
			.into()
	})
}
