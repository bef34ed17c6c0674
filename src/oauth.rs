//! Internal `oauth2` client facade for the client-credentials grant.

pub use oauth2;

// crates.io
use oauth2::{
	AccessToken, AuthType, Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, RefreshToken, RequestTokenError, Scope, StandardRevocableToken,
	TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{CachedToken, ScopeSet},
	clock::Clock,
	credentials::{ClientAuthMethod, ClientCredentials},
	error::{AuthError, ConfigError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	issuer::{IssuerErrorContext, IssuerErrorKind, IssuerStrategy},
};

type ConfiguredClient = Client<
	BasicErrorResponse,
	IssuedTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AuthError>> + 'a + Send>>;

/// Maps HTTP transport failures into [`AuthError`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into an issuer error.
	fn map_transport_error(
		&self,
		strategy: &dyn IssuerStrategy,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> AuthError;
}

/// Default mapper for reqwest-backed transports.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		strategy: &dyn IssuerStrategy,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> AuthError {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(strategy, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) =>
				AuthError::unavailable_from("I/O failure while calling the issuer", None, inner),
			HttpClientError::Other(message) => AuthError::Unavailable {
				message: format!("HTTP client error while calling the issuer: {message}"),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
				source: None,
			},
			_ => AuthError::Unavailable {
				message: "HTTP client error while calling the issuer".into(),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
				source: None,
			},
		}
	}
}

/// Successful token-endpoint payload.
///
/// Identity providers answering client-credentials grants may send only `access_token` and
/// `expires_in`, so `token_type` defaults to bearer instead of failing the parse.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IssuedTokenResponse {
	access_token: AccessToken,
	#[serde(default = "bearer")]
	token_type: BasicTokenType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	expires_in: Option<u64>,
}
impl TokenResponse for IssuedTokenResponse {
	type TokenType = BasicTokenType;

	fn access_token(&self) -> &AccessToken {
		&self.access_token
	}

	fn token_type(&self) -> &BasicTokenType {
		&self.token_type
	}

	fn expires_in(&self) -> Option<std::time::Duration> {
		self.expires_in.map(std::time::Duration::from_secs)
	}

	fn refresh_token(&self) -> Option<&RefreshToken> {
		None
	}

	fn scopes(&self) -> Option<&Vec<Scope>> {
		None
	}
}

fn bearer() -> BasicTokenType {
	BasicTokenType::Bearer
}

/// Client-credentials exchange bound to one set of credentials.
pub(crate) struct BasicFacade<'t, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredClient,
	http_client: &'t C,
	error_mapper: &'t M,
}
impl<'t, C, M> BasicFacade<'t, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_credentials(
		credentials: &ClientCredentials,
		http_client: &'t C,
		error_mapper: &'t M,
	) -> Result<Self, ConfigError> {
		let token_url = TokenUrl::new(credentials.token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "token", source })?;
		let mut oauth_client: ConfiguredClient = Client::new(ClientId::new(credentials.client_id.clone()))
			.set_client_secret(ClientSecret::new(credentials.client_secret.expose().to_owned()))
			.set_token_uri(token_url);

		if matches!(credentials.auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, http_client, error_mapper })
	}

	/// Runs one client-credentials grant and stamps the result with `clock.now()`.
	pub(crate) fn exchange_client_credentials<'a>(
		&'a self,
		strategy: &'a dyn IssuerStrategy,
		scope: &'a ScopeSet,
		clock: Arc<dyn Clock>,
		fallback_expires_in: u64,
	) -> FacadeFuture<'a, CachedToken> {
		let meta = ResponseMetadataSlot::with_clock(clock.clone());

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let mut request = self.oauth_client.exchange_client_credentials();

			for value in scope.iter() {
				request = request.add_scope(Scope::new(value.to_owned()));
			}

			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(strategy, meta.take(), err, self.error_mapper)
			})?;

			map_token_response(response, clock.now(), fallback_expires_in)
		})
	}
}

fn map_token_response(
	response: IssuedTokenResponse,
	obtained_at: OffsetDateTime,
	fallback_expires_in: u64,
) -> Result<CachedToken, AuthError> {
	let token = response.access_token().secret();

	if token.is_empty() {
		return Err(AuthError::MalformedResponse {
			message: "access_token is empty".into(),
			source: None,
		});
	}

	let expires_in = match response.expires_in() {
		Some(lifetime) => lifetime.as_secs(),
		None => fallback_expires_in,
	};

	if expires_in == 0 || i64::try_from(expires_in).is_err() {
		return Err(AuthError::MalformedResponse {
			message: format!("expires_in of {expires_in} seconds is out of range"),
			source: None,
		});
	}

	Ok(CachedToken::new(token.to_owned(), obtained_at, expires_in))
}

fn map_request_error<E, M>(
	strategy: &dyn IssuerStrategy,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> AuthError
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(strategy, response, meta_ref),
		RequestTokenError::Request(error) => mapper.map_transport_error(strategy, meta_ref, error),
		RequestTokenError::Parse(error, body) => {
			let ctx = context_with_status(meta_ref)
				.with_body_preview(String::from_utf8_lossy(&body));

			match strategy.classify_token_error(&ctx) {
				IssuerErrorKind::MalformedResponse => AuthError::MalformedResponse {
					message: "token response could not be parsed".into(),
					source: Some(error),
				},
				kind => classified(kind, "Issuer returned an unparsable error response".into(), meta_ref),
			}
		},
		RequestTokenError::Other(message) => {
			let ctx = context_with_status(meta_ref).with_body_preview(&message);

			classified(
				strategy.classify_token_error(&ctx),
				format!("Issuer returned an unexpected response: {message}"),
				meta_ref,
			)
		},
	}
}

fn map_server_response_error(
	strategy: &dyn IssuerStrategy,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> AuthError {
	let mut ctx = context_with_status(meta).with_oauth_error(response.error().as_ref());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}

	let message = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_owned(),
	};

	classified(strategy.classify_token_error(&ctx), message, meta)
}

fn classified(kind: IssuerErrorKind, message: String, meta: Option<&ResponseMetadata>) -> AuthError {
	match kind {
		IssuerErrorKind::InvalidCredentials =>
			AuthError::InvalidCredentials { reason: message, status: meta_status(meta) },
		IssuerErrorKind::Unavailable => AuthError::Unavailable {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
			source: None,
		},
		IssuerErrorKind::MalformedResponse => AuthError::MalformedResponse { message, source: None },
	}
}

fn map_reqwest_error(
	strategy: &dyn IssuerStrategy,
	meta: Option<&ResponseMetadata>,
	err: ReqwestError,
) -> AuthError {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}

	let status = meta_status(meta).or_else(|| err.status().map(|code| code.as_u16()));
	let mut ctx = IssuerErrorContext::network_failure();

	if let Some(status) = status {
		ctx = ctx.with_http_status(status);
	}

	let message = if err.is_timeout() {
		"request to the issuer timed out"
	} else {
		"network failure while calling the issuer"
	};

	match classified(strategy.classify_token_error(&ctx), message.into(), meta) {
		AuthError::Unavailable { message, status: _, retry_after, source: _ } =>
			AuthError::Unavailable { message, status, retry_after, source: Some(Box::new(err)) },
		other => other,
	}
}

fn context_with_status(meta: Option<&ResponseMetadata>) -> IssuerErrorContext {
	match meta_status(meta) {
		Some(status) => IssuerErrorContext::default().with_http_status(status),
		None => IssuerErrorContext::default(),
	}
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
