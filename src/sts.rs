//! Security Token Service endpoints, wire constants, and request/response shapes.
//!
//! [`StsEndpoints`] is the only configuration the exchange needs. [`StsEndpoints::google`] yields
//! the fixed production endpoints; the builder exists so tests and private deployments can point
//! the exchange somewhere else while keeping the HTTPS requirement.

// crates.io
use serde::{Deserializer, de::DeserializeOwned};
// self
use crate::{_prelude::*, error::RefreshError};

/// Production token-exchange endpoint.
pub const TOKEN_EXCHANGE_ENDPOINT: &str = "https://securetoken.googleapis.com/v2beta1/token";
/// Production token-info endpoint used to resolve a root token's remaining lifetime.
pub const TOKEN_INFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v3/tokeninfo";
/// RFC 8693 token-exchange grant type.
pub const GRANT_TYPE_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
/// RFC 8693 token type identifier for OAuth access tokens.
pub const TOKEN_TYPE_ACCESS_TOKEN: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Identifies which token-service endpoint a call or failure belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StsEndpointKind {
	/// RFC 8693 token-exchange endpoint.
	TokenExchange,
	/// Token-info endpoint.
	TokenInfo,
}
impl StsEndpointKind {
	/// Returns a stable label suitable for messages and span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StsEndpointKind::TokenExchange => "token_exchange",
			StsEndpointKind::TokenInfo => "token_info",
		}
	}
}
impl Display for StsEndpointKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Errors raised while constructing or validating [`StsEndpoints`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StsEndpointsError {
	/// Token-exchange endpoint was not supplied.
	#[error("Missing token exchange endpoint.")]
	MissingTokenExchangeEndpoint,
	/// Token-info endpoint was not supplied.
	#[error("Missing token info endpoint.")]
	MissingTokenInfoEndpoint,
	/// Endpoint URL could not be parsed.
	#[error("The {endpoint} endpoint is not a valid URL.")]
	InvalidUrl {
		/// Which endpoint failed to parse.
		endpoint: StsEndpointKind,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS unless they point at the loopback interface.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: StsEndpointKind,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// Validated token-service endpoint pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StsEndpoints {
	/// Endpoint receiving the token-exchange POST.
	pub token_exchange: Url,
	/// Endpoint answering token-info GETs.
	pub token_info: Url,
}
impl StsEndpoints {
	/// Returns the fixed production endpoints.
	pub fn google() -> Result<Self, StsEndpointsError> {
		Self::builder()
			.token_exchange_endpoint(parse(StsEndpointKind::TokenExchange, TOKEN_EXCHANGE_ENDPOINT)?)
			.token_info_endpoint(parse(StsEndpointKind::TokenInfo, TOKEN_INFO_ENDPOINT)?)
			.build()
	}

	/// Creates an empty builder.
	pub fn builder() -> StsEndpointsBuilder {
		StsEndpointsBuilder::default()
	}

	/// Returns the URL for `kind`.
	pub fn get(&self, kind: StsEndpointKind) -> &Url {
		match kind {
			StsEndpointKind::TokenExchange => &self.token_exchange,
			StsEndpointKind::TokenInfo => &self.token_info,
		}
	}

	fn validate(&self) -> Result<(), StsEndpointsError> {
		validate_endpoint(StsEndpointKind::TokenExchange, &self.token_exchange)?;
		validate_endpoint(StsEndpointKind::TokenInfo, &self.token_info)?;

		Ok(())
	}
}

/// Builder for [`StsEndpoints`].
#[derive(Debug, Default)]
pub struct StsEndpointsBuilder {
	/// Token-exchange endpoint.
	pub token_exchange: Option<Url>,
	/// Token-info endpoint.
	pub token_info: Option<Url>,
}
impl StsEndpointsBuilder {
	/// Sets the token-exchange endpoint.
	pub fn token_exchange_endpoint(mut self, url: Url) -> Self {
		self.token_exchange = Some(url);

		self
	}

	/// Sets the token-info endpoint.
	pub fn token_info_endpoint(mut self, url: Url) -> Self {
		self.token_info = Some(url);

		self
	}

	/// Consumes the builder and validates the resulting endpoints.
	pub fn build(self) -> Result<StsEndpoints, StsEndpointsError> {
		let token_exchange =
			self.token_exchange.ok_or(StsEndpointsError::MissingTokenExchangeEndpoint)?;
		let token_info = self.token_info.ok_or(StsEndpointsError::MissingTokenInfoEndpoint)?;
		let endpoints = StsEndpoints { token_exchange, token_info };

		endpoints.validate()?;

		Ok(endpoints)
	}
}

/// Form fields of a token-exchange request.
#[derive(Clone, Copy)]
pub(crate) struct TokenExchangeForm<'a> {
	pub(crate) subject_token: &'a str,
	pub(crate) access_boundary: &'a str,
}
impl TokenExchangeForm<'_> {
	/// Encodes the request as `application/x-www-form-urlencoded`.
	pub(crate) fn encode(&self) -> String {
		url::form_urlencoded::Serializer::new(String::new())
			.append_pair("grant_type", GRANT_TYPE_TOKEN_EXCHANGE)
			.append_pair("subject_token_type", TOKEN_TYPE_ACCESS_TOKEN)
			.append_pair("requested_token_type", TOKEN_TYPE_ACCESS_TOKEN)
			.append_pair("subject_token", self.subject_token)
			.append_pair("access_boundary", self.access_boundary)
			.finish()
	}
}
impl Debug for TokenExchangeForm<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenExchangeForm")
			.field("subject_token", &"<redacted>")
			.field("access_boundary", &self.access_boundary)
			.finish()
	}
}

/// Token-exchange response body; unknown fields such as `token_type` are ignored.
#[derive(Deserialize)]
pub(crate) struct TokenExchangeResponse {
	pub(crate) access_token: String,
	#[serde(default)]
	pub(crate) expires_in: Option<ExpiresIn>,
}

/// Token-info response body.
#[derive(Deserialize)]
pub(crate) struct TokenInfoResponse {
	pub(crate) expires_in: ExpiresIn,
}

/// Lifetime in seconds as sent by the token service: a JSON number or a decimal string.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ExpiresIn {
	Signed(i64),
	Unsigned(u64),
	Float(f64),
	Text(String),
}
impl ExpiresIn {
	/// Converts the raw value into a strictly positive duration.
	pub(crate) fn lifetime(&self) -> Result<Duration, RefreshError> {
		let seconds = match self {
			Self::Signed(value) => *value,
			Self::Unsigned(value) =>
				i64::try_from(*value).map_err(|_| RefreshError::ExpiresInOutOfRange)?,
			Self::Float(value) => {
				if !value.is_finite() {
					return Err(RefreshError::InvalidExpiresIn { value: value.to_string() });
				}
				if value.abs() >= i64::MAX as f64 {
					return Err(RefreshError::ExpiresInOutOfRange);
				}

				value.trunc() as i64
			},
			Self::Text(raw) => parse_text_seconds(raw)?,
		};

		if seconds <= 0 {
			return Err(RefreshError::NonPositiveExpiresIn);
		}

		Ok(Duration::seconds(seconds))
	}
}
impl<'de> Deserialize<'de> for ExpiresIn {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		#[derive(Deserialize)]
		#[serde(untagged)]
		enum Raw {
			Signed(i64),
			Unsigned(u64),
			Float(f64),
			Text(String),
		}

		Ok(match Raw::deserialize(deserializer)? {
			Raw::Signed(value) => Self::Signed(value),
			Raw::Unsigned(value) => Self::Unsigned(value),
			Raw::Float(value) => Self::Float(value),
			Raw::Text(value) => Self::Text(value),
		})
	}
}

/// Decodes a JSON body, keeping the path of the first offending field.
pub(crate) fn decode_json<T>(body: &[u8]) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut de)
}

fn parse_text_seconds(raw: &str) -> Result<i64, RefreshError> {
	let trimmed = raw.trim();

	if let Ok(value) = trimmed.parse::<i64>() {
		return Ok(value);
	}
	if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
		return Err(RefreshError::ExpiresInOutOfRange);
	}

	Err(RefreshError::InvalidExpiresIn { value: raw.to_owned() })
}

fn parse(endpoint: StsEndpointKind, raw: &str) -> Result<Url, StsEndpointsError> {
	Url::parse(raw).map_err(|source| StsEndpointsError::InvalidUrl { endpoint, source })
}

fn validate_endpoint(endpoint: StsEndpointKind, url: &Url) -> Result<(), StsEndpointsError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(StsEndpointsError::InsecureEndpoint { endpoint, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(url::Host::Ipv4(addr)) => addr.is_loopback(),
		Some(url::Host::Ipv6(addr)) => addr.is_loopback(),
		None => false,
	}
}
