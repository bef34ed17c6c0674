//! Request signing seam between the cached token and the outbound HTTP client.

// crates.io
use reqwest::RequestBuilder;
// self
use crate::{_prelude::*, auth::CachedToken, error::CallError};

/// Attaches a [`CachedToken`] to an outbound request without constraining the client type.
pub trait RequestSigner<Request, E>
where
	Self: Send + Sync,
{
	/// Consumes the request and returns it with authorization state attached.
	fn attach_token(&self, request: Request, token: &CachedToken) -> Result<Request, E>;
}

/// Signs reqwest requests with `Authorization: Bearer <token>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BearerSigner;
impl RequestSigner<RequestBuilder, CallError> for BearerSigner {
	fn attach_token(
		&self,
		request: RequestBuilder,
		token: &CachedToken,
	) -> Result<RequestBuilder, CallError> {
		Ok(request.bearer_auth(token.token.expose()))
	}
}
