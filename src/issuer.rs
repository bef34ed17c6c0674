//! Token issuer client: one client-credentials grant per call, no retries.
//!
//! Retry policy belongs to the scheduler. The issuer classifies each failure so the scheduler can
//! tell a rejected client apart from a temporarily unavailable issuer.

pub mod strategy;

pub use strategy::*;

// self
use crate::{
	_prelude::*,
	auth::CachedToken,
	clock::{Clock, SystemClock},
	credentials::ClientCredentials,
	error::AuthError,
	http::{ReqwestHttpClient, TokenHttpClient},
	oauth::{BasicFacade, ReqwestTransportErrorMapper, TransportErrorMapper},
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
};

/// Lifetime assumed when the issuer omits `expires_in`; matches the default expected lifetime.
pub const DEFAULT_FALLBACK_EXPIRES_IN: u64 = 3_600;

/// Boxed future returned by [`TokenSource::acquire_token`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<CachedToken, AuthError>> + 'a + Send>>;

/// Anything able to mint a fresh [`CachedToken`] for a set of client credentials.
///
/// The scheduler depends on this seam so tests can substitute scripted issuers.
pub trait TokenSource
where
	Self: Send + Sync,
{
	/// Obtains a new access token.
	fn acquire_token<'a>(&'a self, credentials: &'a ClientCredentials) -> TokenFuture<'a>;
}

/// Issuer client specialized for the crate's default reqwest transport stack.
pub type ReqwestTokenIssuer = TokenIssuer<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Client-credentials issuer client.
#[derive(Clone)]
pub struct TokenIssuer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP transport used for every token request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors.
	pub transport_mapper: Arc<M>,
	/// Error classification strategy.
	pub strategy: Arc<dyn IssuerStrategy>,
	clock: Arc<dyn Clock>,
	fallback_expires_in: u64,
}
impl<C, M> TokenIssuer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an issuer over a caller-provided transport and mapper.
	pub fn with_http_client(http_client: impl Into<Arc<C>>, mapper: impl Into<Arc<M>>) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			strategy: Arc::new(DefaultIssuerStrategy),
			clock: Arc::new(SystemClock),
			fallback_expires_in: DEFAULT_FALLBACK_EXPIRES_IN,
		}
	}

	/// Replaces the error classification strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn IssuerStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Replaces the clock used to stamp `obtained_at`.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Overrides the lifetime assumed when the issuer omits `expires_in`.
	pub fn with_fallback_expires_in(mut self, seconds: u64) -> Self {
		self.fallback_expires_in = seconds;

		self
	}

	/// Performs the client-credentials grant for `credentials`.
	///
	/// On success the token is stamped with the injected clock's `now()`.
	pub async fn acquire_token(
		&self,
		credentials: &ClientCredentials,
	) -> Result<CachedToken, AuthError> {
		const KIND: OperationKind = OperationKind::AcquireToken;

		let span = OperationSpan::new(KIND, "acquire_token");

		obs::record_operation_outcome(KIND, OperationOutcome::Attempt);

		let result = span
			.instrument(async move {
				let facade = BasicFacade::from_credentials(
					credentials,
					self.http_client.as_ref(),
					self.transport_mapper.as_ref(),
				)?;

				facade
					.exchange_client_credentials(
						self.strategy.as_ref(),
						&credentials.scope,
						self.clock.clone(),
						self.fallback_expires_in,
					)
					.await
			})
			.await;

		obs::record_result(KIND, result)
	}
}
impl TokenIssuer<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates an issuer backed by the default reqwest transport.
	pub fn new(http_client: ReqwestHttpClient) -> Self {
		Self::with_http_client(http_client, ReqwestTransportErrorMapper)
	}
}
impl<C, M> TokenSource for TokenIssuer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn acquire_token<'a>(&'a self, credentials: &'a ClientCredentials) -> TokenFuture<'a> {
		Box::pin(TokenIssuer::acquire_token(self, credentials))
	}
}
impl<C, M> Debug for TokenIssuer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenIssuer")
			.field("fallback_expires_in", &self.fallback_expires_in)
			.finish_non_exhaustive()
	}
}
