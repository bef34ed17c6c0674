//! Error classification hooks for token-endpoint failures.
//!
//! Strategies only see crate-owned data (status codes, OAuth error fields, a body preview) so they
//! stay independent from the HTTP stack.

// self
use crate::_prelude::*;

/// Classifies token-endpoint failures into the [`crate::error::AuthError`] taxonomy.
pub trait IssuerStrategy: Send + Sync {
	/// Maps the observed failure to an error category.
	fn classify_token_error(&self, ctx: &IssuerErrorContext) -> IssuerErrorKind;
}

/// Canonical issuer failure categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssuerErrorKind {
	/// The issuer refused the client or its requested scope.
	InvalidCredentials,
	/// The issuer could not serve the request right now.
	Unavailable,
	/// The issuer answered successfully but the payload is unusable.
	MalformedResponse,
}

/// Context handed to [`IssuerStrategy::classify_token_error`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IssuerErrorContext {
	/// HTTP status code returned by the issuer, when available.
	pub http_status: Option<u16>,
	/// Issuer-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Issuer-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for payloads that did not parse.
	pub body_preview: Option<String>,
	/// Whether the failure happened before any HTTP response arrived.
	pub network_error: bool,
}
impl IssuerErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Context for transport-level failures.
	pub fn network_failure() -> Self {
		Self { network_error: true, ..Default::default() }
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth `error` code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a truncated body preview.
	pub fn with_body_preview(mut self, body: impl AsRef<str>) -> Self {
		let body = body.as_ref();
		let mut preview: String = body.chars().take(Self::BODY_PREVIEW_LIMIT).collect();

		if preview.len() < body.len() {
			preview.push('…');
		}

		self.body_preview = Some(preview);

		self
	}
}

/// Default classification: structured OAuth fields first, then the HTTP status.
///
/// Network failures are always [`IssuerErrorKind::Unavailable`]. A 2xx response that still failed
/// is [`IssuerErrorKind::MalformedResponse`].
#[derive(Debug, Default)]
pub struct DefaultIssuerStrategy;
impl Display for DefaultIssuerStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-issuer-strategy")
	}
}
impl IssuerStrategy for DefaultIssuerStrategy {
	fn classify_token_error(&self, ctx: &IssuerErrorContext) -> IssuerErrorKind {
		if ctx.network_error {
			return IssuerErrorKind::Unavailable;
		}
		if let Some(kind) = ctx.oauth_error.as_deref().and_then(classify_oauth_error) {
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

fn classify_oauth_error(value: &str) -> Option<IssuerErrorKind> {
	const REJECTED: [&str; 6] = [
		"invalid_client",
		"unauthorized_client",
		"invalid_grant",
		"invalid_scope",
		"access_denied",
		"unsupported_grant_type",
	];
	const UNAVAILABLE: [&str; 2] = ["temporarily_unavailable", "server_error"];

	if REJECTED.iter().any(|code| value.eq_ignore_ascii_case(code)) {
		Some(IssuerErrorKind::InvalidCredentials)
	} else if UNAVAILABLE.iter().any(|code| value.eq_ignore_ascii_case(code)) {
		Some(IssuerErrorKind::Unavailable)
	} else {
		None
	}
}

fn classify_status(status: Option<u16>) -> IssuerErrorKind {
	match status {
		Some(200..=299) => IssuerErrorKind::MalformedResponse,
		Some(400 | 401 | 403) => IssuerErrorKind::InvalidCredentials,
		_ => IssuerErrorKind::Unavailable,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn oauth_error_wins_over_status() {
		let strategy = DefaultIssuerStrategy;
		let ctx = IssuerErrorContext::default()
			.with_http_status(400)
			.with_oauth_error("temporarily_unavailable");

		assert_eq!(strategy.classify_token_error(&ctx), IssuerErrorKind::Unavailable);

		let ctx = IssuerErrorContext::default().with_http_status(400).with_oauth_error("invalid_client");

		assert_eq!(strategy.classify_token_error(&ctx), IssuerErrorKind::InvalidCredentials);
	}

	#[test]
	fn status_fallback_matches_taxonomy() {
		let strategy = DefaultIssuerStrategy;
		let classify =
			|status| strategy.classify_token_error(&IssuerErrorContext::default().with_http_status(status));

		assert_eq!(classify(401), IssuerErrorKind::InvalidCredentials);
		assert_eq!(classify(403), IssuerErrorKind::InvalidCredentials);
		assert_eq!(classify(429), IssuerErrorKind::Unavailable);
		assert_eq!(classify(503), IssuerErrorKind::Unavailable);
		assert_eq!(classify(200), IssuerErrorKind::MalformedResponse);
		assert_eq!(
			strategy.classify_token_error(&IssuerErrorContext::network_failure()),
			IssuerErrorKind::Unavailable
		);
	}

	#[test]
	fn body_preview_is_truncated() {
		let ctx = IssuerErrorContext::default().with_body_preview("x".repeat(1_000));
		let preview = ctx.body_preview.expect("Preview should be recorded.");

		assert_eq!(preview.chars().count(), IssuerErrorContext::BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
	}
}
