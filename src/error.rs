//! Crate-level error types shared by policy parsing, the token exchange, and credential refreshes.

// self
use crate::{
	_prelude::*,
	sts::{StsEndpointKind, StsEndpointsError},
};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error used to carry foreign failures without losing their source chain.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Message reported when the token-exchange endpoint rejects the request.
pub const REFRESH_ERROR: &str = "Unable to acquire downscoped credentials";
/// Message reported when the token-info fallback cannot resolve the root token lifetime.
pub const TOKEN_INFO_ERROR: &str = "Unable to determine root token expiry time";

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem; never retried.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The exchange or its expiry lookup failed.
	#[error(transparent)]
	Refresh(#[from] RefreshError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Failure raised by a root credential while refreshing itself.
	///
	/// Downscoped credentials return this value exactly as the root produced it.
	#[error("{0}")]
	RootCredential(#[source] BoxError),
}
impl Error {
	/// Wraps a root credential's own failure.
	pub fn root_credential(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::RootCredential(Box::new(src))
	}
}

/// Configuration and validation failures raised before any network call.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Policy document does not carry the `accessBoundaryRules` key.
	#[error("Access boundary policy is missing accessBoundaryRules key.")]
	MissingAccessBoundaryRules,
	/// Policy document carries an empty rule list.
	#[error("Access boundary policy must contain at least one rule.")]
	EmptyAccessBoundaryRules,
	/// Policy document could not be decoded.
	#[error("Access boundary policy is malformed.")]
	InvalidAccessBoundary {
		/// Structured parsing failure, including the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Policy could not be rendered as JSON.
	#[error("Access boundary policy could not be serialized.")]
	BoundarySerialize(#[source] serde_json::Error),
	/// Token service endpoints failed validation.
	#[error(transparent)]
	InvalidEndpoints(#[from] StsEndpointsError),
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures of the token exchange itself. None of them are retried.
#[derive(Debug, ThisError)]
pub enum RefreshError {
	/// Token-exchange endpoint answered with a non-success status.
	#[error("{}", REFRESH_ERROR)]
	TokenExchange {
		/// HTTP status returned by the endpoint.
		status: u16,
	},
	/// Token-info endpoint answered with a non-success status.
	#[error("{}", TOKEN_INFO_ERROR)]
	TokenInfo {
		/// HTTP status returned by the endpoint.
		status: u16,
	},
	/// Response body was not the expected JSON document.
	#[error("The {endpoint} endpoint returned a malformed response.")]
	MalformedResponse {
		/// Endpoint that produced the body.
		endpoint: StsEndpointKind,
		/// HTTP status returned alongside the body.
		status: u16,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Root credential held no access token once its refresh returned.
	#[error("Root credential holds no access token after refresh.")]
	MissingSubjectToken,
	/// Credentials held no access token once their refresh returned.
	#[error("Credentials hold no access token after refresh.")]
	MissingToken,
	/// `expires_in` was present but not a number of seconds.
	#[error("The expires_in value `{value}` is not a number of seconds.")]
	InvalidExpiresIn {
		/// Raw value received from the endpoint.
		value: String,
	},
	/// `expires_in` was zero or negative.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// `expires_in` does not fit the supported time range.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the {endpoint} endpoint.")]
	Network {
		/// Endpoint being called.
		endpoint: StsEndpointKind,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// HTTP request could not be assembled.
	#[error("HTTP request could not be built.")]
	Request(#[from] oauth2::http::Error),
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token service.")]
	Io(#[from] std::io::Error),
	/// HTTP client failed without a structured error.
	#[error("HTTP client error occurred while calling the {endpoint} endpoint: {message}.")]
	Other {
		/// Endpoint being called.
		endpoint: StsEndpointKind,
		/// Client-supplied description.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: StsEndpointKind,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint, source: Box::new(src) }
	}
}
