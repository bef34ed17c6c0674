//! Relay-level error types shared across the issuer, cache, caller, and resource server.

// self
use crate::_prelude::*;

/// Relay-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical relay error exposed by top-level helpers.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Issuer-side failure while acquiring a token.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Consumer-side failure while calling the protected API.
	#[error(transparent)]
	Call(#[from] CallError),
	/// Resource-server rejection of an inbound request.
	#[error(transparent)]
	Validation(#[from] ValidationError),
}

/// Configuration and validation failures raised while wiring the relay.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// An endpoint URL could not be parsed.
	#[error("The {endpoint} endpoint is not a valid URL.")]
	InvalidEndpoint {
		/// Which endpoint failed to parse.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS (loopback hosts excepted).
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// A required setting was not supplied.
	#[error("Missing required setting `{name}`.")]
	MissingSetting {
		/// Setting (or environment variable) name.
		name: &'static str,
	},
	/// A setting was supplied but could not be interpreted.
	#[error("Setting `{name}` is invalid: {reason}.")]
	InvalidSetting {
		/// Setting (or environment variable) name.
		name: &'static str,
		/// Human-readable explanation.
		reason: String,
	},
	/// Client identifier or secret is empty.
	#[error("Client credentials are incomplete: {field} is empty.")]
	IncompleteCredentials {
		/// Offending field name.
		field: &'static str,
	},
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Identifier validation failed.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// The refresh period does not leave the cached token fresh between ticks.
	#[error(
		"Refresh period of {period} must be shorter than the token lifetime {lifetime} minus the safety margin {margin}."
	)]
	RefreshPeriodTooLong {
		/// Scheduler period.
		period: Duration,
		/// Expected token lifetime.
		lifetime: Duration,
		/// Freshness margin subtracted from the lifetime.
		margin: Duration,
	},
	/// A duration setting must be strictly positive.
	#[error("The {name} duration must be positive.")]
	NonPositiveDuration {
		/// Setting name.
		name: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Issuer-side failures surfaced by the token issuer client.
///
/// The issuer never retries; the scheduler decides whether the next tick tries again.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// The issuer rejected the client (HTTP 401/403 or an `invalid_client`-style error).
	#[error("Issuer rejected the client credentials: {reason}.")]
	InvalidCredentials {
		/// Provider- or relay-supplied reason string.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The issuer could not be reached or answered with a server-side failure.
	#[error("Issuer is unavailable: {message}.")]
	Unavailable {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
		/// Transport-level cause, if any.
		#[source]
		source: Option<BoxError>,
	},
	/// The issuer answered successfully but the payload lacks a usable token.
	#[error("Issuer returned a malformed token response: {message}.")]
	MalformedResponse {
		/// Summary of what was wrong with the payload.
		message: String,
		/// Structured parsing failure, if the body was not valid JSON for a token response.
		#[source]
		source: Option<serde_path_to_error::Error<serde_json::Error>>,
	},
	/// Local misconfiguration detected while preparing the exchange.
	#[error(transparent)]
	Config(#[from] ConfigError),
}
impl AuthError {
	/// Builds an [`AuthError::Unavailable`] with a transport cause.
	pub fn unavailable_from(
		message: impl Into<String>,
		status: Option<u16>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Unavailable {
			message: message.into(),
			status,
			retry_after: None,
			source: Some(Box::new(src)),
		}
	}

	/// Returns `true` when a later attempt may succeed without a configuration change.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Unavailable { .. })
	}

	/// HTTP status code observed from the issuer, when one was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::InvalidCredentials { status, .. } | Self::Unavailable { status, .. } => *status,
			_ => None,
		}
	}
}

/// Consumer-side failures raised by the authenticated caller.
///
/// None of these are retried inside the relay.
#[derive(Debug, ThisError)]
pub enum CallError {
	/// The token slot has never been written.
	#[error("No cached access token is available.")]
	NoToken,
	/// The token slot holds a token whose freshness window has elapsed.
	#[error("The cached access token went stale at {stale_at}.")]
	StaleToken {
		/// Instant at which the cached token stopped being fresh.
		stale_at: OffsetDateTime,
	},
	/// The protected API rejected the bearer token (HTTP 401).
	#[error("The protected API rejected the access token.")]
	Unauthorized,
	/// The protected API accepted the token but refused the operation (HTTP 403).
	#[error("The protected API refused the operation for this token.")]
	Forbidden,
	/// The protected API answered with a status outside the success and auth ranges.
	#[error("The protected API answered with status {status}.")]
	UnexpectedStatus {
		/// HTTP status code.
		status: u16,
		/// Response body, verbatim.
		body: String,
	},
	/// The request never produced an HTTP response.
	#[error("Network failure while calling the protected API.")]
	NetworkFailure {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Reading the token slot failed.
	#[error(transparent)]
	Storage(#[from] crate::store::StoreError),
	/// Local misconfiguration detected while preparing the request.
	#[error(transparent)]
	Config(#[from] ConfigError),
}
impl CallError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::NetworkFailure { source: Box::new(src) }
	}
}
impl From<ReqwestError> for CallError {
	fn from(e: ReqwestError) -> Self {
		if e.is_builder() { ConfigError::from(e).into() } else { Self::network(e) }
	}
}

/// Resource-server rejections produced while authorizing an inbound request.
#[derive(Debug, ThisError)]
pub enum ValidationError {
	/// No bearer token was presented.
	#[error("Request carries no bearer token.")]
	MissingToken,
	/// The token failed signature, issuer, expiry, or usage checks.
	#[error("Access token is invalid: {reason}.")]
	InvalidToken {
		/// Why the token was rejected.
		reason: String,
	},
	/// The token is valid but lacks the scope the operation requires.
	#[error("Access token lacks the required scope `{required}`.")]
	InsufficientScope {
		/// Scope the called operation requires.
		required: String,
	},
	/// The signing keys could not be retrieved.
	#[error("Signing keys could not be retrieved: {message}.")]
	KeySet {
		/// Summary of the retrieval failure.
		message: String,
	},
}
impl ValidationError {
	/// HTTP status the resource server answers with for this rejection.
	pub fn status(&self) -> u16 {
		match self {
			Self::InsufficientScope { .. } => 403,
			Self::MissingToken | Self::InvalidToken { .. } | Self::KeySet { .. } => 401,
		}
	}

	pub(crate) fn invalid(reason: impl Display) -> Self {
		Self::InvalidToken { reason: reason.to_string() }
	}
}
impl From<jsonwebtoken::errors::Error> for ValidationError {
	fn from(e: jsonwebtoken::errors::Error) -> Self {
		Self::invalid(e)
	}
}
