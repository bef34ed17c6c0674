//! Authenticated caller: attaches the cached token to calls against the protected API.
//!
//! The caller never talks to the issuer. It reads the slot, refuses to send anything when the slot
//! is empty or stale, and maps the API's auth rejections to typed errors. Nothing is retried here.

pub mod signer;

pub use signer::*;

// crates.io
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{CachedToken, DomainPair, TokenSecret},
	clock::{Clock, SystemClock},
	credentials::validate_endpoint,
	error::{CallError, ConfigError},
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
	store::TokenCache,
};

/// Header carrying the API key of the protected API's usage plan.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Request against the protected API, relative to the caller's base URL.
#[derive(Clone, Debug)]
pub struct OutboundRequest {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the API base URL (a leading `/` is ignored).
	pub path: String,
	/// Optional JSON body.
	pub body: Option<serde_json::Value>,
	/// Additional headers.
	pub headers: Vec<(String, String)>,
}
impl OutboundRequest {
	/// Creates a request without a body.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), body: None, headers: Vec::new() }
	}

	/// `GET <path>`.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// `POST <path>`.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// `PATCH <path>`.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// Attaches a JSON body.
	pub fn json(mut self, body: impl Into<serde_json::Value>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Adds a header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}
}

/// Successful (2xx) response of the protected API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response body, verbatim.
	pub body: String,
}
impl CallResponse {
	/// Decodes the body as JSON.
	pub fn json<T>(&self) -> Result<T, serde_json::Error>
	where
		T: DeserializeOwned,
	{
		serde_json::from_str(&self.body)
	}
}

/// Caller bound to one domain pair's token slot and one protected API.
#[derive(Clone)]
pub struct AuthenticatedCaller {
	http: ReqwestClient,
	cache: Arc<dyn TokenCache>,
	pair: DomainPair,
	base_url: Url,
	api_key: Option<TokenSecret>,
	signer: Arc<dyn RequestSigner<RequestBuilder, CallError>>,
	clock: Arc<dyn Clock>,
	safety_margin: Duration,
}
impl AuthenticatedCaller {
	/// Creates a caller for the API rooted at `base_url`.
	pub fn new(
		http: ReqwestClient,
		cache: Arc<dyn TokenCache>,
		pair: DomainPair,
		base_url: Url,
		safety_margin: Duration,
	) -> Result<Self, ConfigError> {
		validate_endpoint("resource API", &base_url)?;

		Ok(Self {
			http,
			cache,
			pair,
			base_url: with_trailing_slash(base_url),
			api_key: None,
			signer: Arc::new(BearerSigner),
			clock: Arc::new(SystemClock),
			safety_margin,
		})
	}

	/// Sends `x-api-key: <key>` with every call.
	pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
		self.api_key = Some(TokenSecret::new(key));

		self
	}

	/// Replaces the request signer.
	pub fn with_signer(mut self, signer: Arc<dyn RequestSigner<RequestBuilder, CallError>>) -> Self {
		self.signer = signer;

		self
	}

	/// Replaces the clock used for the freshness check.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Reads the slot and sends `request` with the cached token attached.
	///
	/// Fails with [`CallError::NoToken`] or [`CallError::StaleToken`] without any HTTP call when
	/// the slot is empty or no longer fresh.
	pub async fn invoke(&self, request: OutboundRequest) -> Result<CallResponse, CallError> {
		const KIND: OperationKind = OperationKind::Invoke;

		let span = OperationSpan::new(KIND, "invoke");

		obs::record_operation_outcome(KIND, OperationOutcome::Attempt);

		let result = span
			.instrument(async move {
				let token = self.fresh_token().await?;
				let url = self.base_url.join(request.path.trim_start_matches('/')).map_err(
					|source| ConfigError::InvalidEndpoint { endpoint: "resource API", source },
				)?;
				let mut builder = self.http.request(request.method, url);

				builder = self.signer.attach_token(builder, &token)?;

				if let Some(key) = &self.api_key {
					builder = builder.header(API_KEY_HEADER, key.expose());
				}
				for (name, value) in &request.headers {
					builder = builder.header(name.as_str(), value.as_str());
				}
				if let Some(body) = &request.body {
					builder = builder.json(body);
				}

				let response = builder.send().await?;
				let status = response.status();
				let body = response.text().await?;

				map_status(status, body)
			})
			.await;

		obs::record_result(KIND, result)
	}

	async fn fresh_token(&self) -> Result<CachedToken, CallError> {
		let token = self.cache.read(&self.pair).await?.ok_or(CallError::NoToken)?;

		if token.is_fresh_at(self.clock.now(), self.safety_margin) {
			Ok(token)
		} else {
			Err(CallError::StaleToken { stale_at: token.fresh_until(self.safety_margin) })
		}
	}
}
impl Debug for AuthenticatedCaller {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticatedCaller")
			.field("pair", &self.pair)
			.field("base_url", &self.base_url.as_str())
			.field("api_key_set", &self.api_key.is_some())
			.field("safety_margin", &self.safety_margin)
			.finish_non_exhaustive()
	}
}

fn map_status(status: StatusCode, body: String) -> Result<CallResponse, CallError> {
	match status {
		status if status.is_success() => Ok(CallResponse { status: status.as_u16(), body }),
		StatusCode::UNAUTHORIZED => Err(CallError::Unauthorized),
		StatusCode::FORBIDDEN => Err(CallError::Forbidden),
		status => Err(CallError::UnexpectedStatus { status: status.as_u16(), body }),
	}
}

fn with_trailing_slash(mut url: Url) -> Url {
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	url
}
