//! Resource-server side: validate inbound bearer tokens before any business logic runs.
//!
//! A request is authorized when its token verifies against the issuer's keys, carries the
//! expected issuer, has not expired on the injected clock, is an access token, and grants the
//! scope the route requires. Failures map to 401 (authentication) or 403 (authorization) through
//! [`ValidationError::status`].

pub mod claims;
pub mod keys;
pub mod route;

pub use claims::*;
pub use keys::*;
pub use route::*;

// crates.io
use jsonwebtoken::Validation;
use reqwest::Method;
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	error::ValidationError,
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
};

/// Default clock-skew tolerance applied to `exp`.
pub const DEFAULT_LEEWAY: Duration = Duration::seconds(60);

/// Validates inbound bearer tokens for one protected API.
#[derive(Clone)]
pub struct ResourceServer {
	issuer: String,
	keys: KeySet,
	routes: RouteTable,
	clock: Arc<dyn Clock>,
	leeway: Duration,
}
impl ResourceServer {
	/// Creates a server trusting tokens from `issuer` signed by `keys`.
	pub fn new(issuer: impl Into<String>, keys: KeySet, routes: RouteTable) -> Self {
		Self {
			issuer: issuer.into(),
			keys,
			routes,
			clock: Arc::new(SystemClock),
			leeway: DEFAULT_LEEWAY,
		}
	}

	/// Replaces the clock used for the expiry check.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Overrides the clock-skew tolerance.
	pub fn with_leeway(mut self, leeway: Duration) -> Self {
		self.leeway = leeway;

		self
	}

	/// Route table consulted by [`Self::authorize_request`].
	pub fn routes(&self) -> &RouteTable {
		&self.routes
	}

	/// Verifies `token` and requires it to grant `required_scope`.
	pub async fn authorize(
		&self,
		token: &str,
		required_scope: &str,
	) -> Result<InboundRequestContext, ValidationError> {
		let ctx = self.verify(token).await?;

		if ctx.scopes.contains(required_scope) {
			Ok(ctx)
		} else {
			Err(ValidationError::InsufficientScope { required: required_scope.to_owned() })
		}
	}

	/// Authorizes an inbound request from its method, path, and `Authorization` header.
	///
	/// Unregistered routes are refused with [`ValidationError::InsufficientScope`] once the token
	/// itself verifies.
	pub async fn authorize_request(
		&self,
		method: &Method,
		path: &str,
		authorization: Option<&str>,
	) -> Result<InboundRequestContext, ValidationError> {
		const KIND: OperationKind = OperationKind::Authorize;

		let span = OperationSpan::new(KIND, "authorize_request");

		obs::record_operation_outcome(KIND, OperationOutcome::Attempt);

		let result = span
			.instrument(async move {
				let token = bearer_token(authorization)?;

				match self.routes.required_scope(method, path) {
					Some(scope) => self.authorize(token, scope).await,
					None => {
						self.verify(token).await?;

						Err(ValidationError::InsufficientScope { required: format!("{method} {path}") })
					},
				}
			})
			.await;

		obs::record_result(KIND, result)
	}

	async fn verify(&self, token: &str) -> Result<InboundRequestContext, ValidationError> {
		let header = jsonwebtoken::decode_header(token)?;
		let kid = header.kid.as_deref().ok_or_else(|| ValidationError::invalid("missing `kid`"))?;
		let key = self.keys.decoding_key(kid).await?;

		if !key.algorithms.contains(&header.alg) {
			return Err(ValidationError::invalid(format!(
				"algorithm {:?} is not permitted for signing key `{kid}`",
				header.alg
			)));
		}

		let mut validation = Validation::new(header.alg);

		validation.algorithms = key.algorithms.clone();

		validation.set_issuer(&[self.issuer.as_str()]);
		validation.set_required_spec_claims(&["exp", "iss"]);
		validation.validate_aud = false;
		// Expiry is checked against the injected clock below.
		validation.validate_exp = false;

		let claims = jsonwebtoken::decode::<AccessTokenClaims>(token, &key.key, &validation)?.claims;
		let now = self.clock.now().unix_timestamp();

		if claims.exp.saturating_add(self.leeway.whole_seconds()) <= now {
			return Err(ValidationError::invalid("token expired"));
		}
		if let Some(token_use) = claims.token_use.as_deref()
			&& token_use != "access"
		{
			return Err(ValidationError::invalid(format!("`token_use` is `{token_use}`")));
		}

		let scopes = claims.scopes().map_err(ValidationError::invalid)?;
		let principal = claims
			.principal()
			.ok_or_else(|| ValidationError::invalid("missing `client_id` and `sub`"))?
			.to_owned();

		Ok(InboundRequestContext { principal, scopes, claims })
	}
}
impl Debug for ResourceServer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResourceServer")
			.field("issuer", &self.issuer)
			.field("keys", &self.keys)
			.field("routes", &self.routes)
			.field("leeway", &self.leeway)
			.finish()
	}
}

/// Extracts the token from `Authorization: Bearer <token>` or a bare token value.
pub fn bearer_token(authorization: Option<&str>) -> Result<&str, ValidationError> {
	let value = authorization.map(str::trim).filter(|value| !value.is_empty());
	let value = value.ok_or(ValidationError::MissingToken)?;
	let token = match value.split_once(' ') {
		Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
		Some(_) => return Err(ValidationError::invalid("unsupported authorization scheme")),
		None => value,
	};

	if token.is_empty() { Err(ValidationError::MissingToken) } else { Ok(token) }
}
