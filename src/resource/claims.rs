//! Access-token claims and the context handed to protected handlers.

// self
use crate::{_prelude::*, auth::ScopeSet};

/// Claims read from a verified access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
	/// Issuer URL.
	#[serde(default)]
	pub iss: Option<String>,
	/// Subject; for client-credentials tokens this is the client identifier.
	#[serde(default)]
	pub sub: Option<String>,
	/// Client identifier, when the issuer sets it explicitly.
	#[serde(default)]
	pub client_id: Option<String>,
	/// Token usage marker (`access` or `id`), when present.
	#[serde(default)]
	pub token_use: Option<String>,
	/// Space-delimited granted scopes.
	#[serde(default)]
	pub scope: Option<String>,
	/// Expiry as Unix seconds.
	pub exp: i64,
	/// Issued-at as Unix seconds.
	#[serde(default)]
	pub iat: Option<i64>,
}
impl AccessTokenClaims {
	/// Client the token was issued to: `client_id`, falling back to `sub`.
	pub fn principal(&self) -> Option<&str> {
		self.client_id.as_deref().or(self.sub.as_deref())
	}

	/// Parses the `scope` claim; a missing claim yields an empty set.
	pub fn scopes(&self) -> Result<ScopeSet, crate::auth::ScopeValidationError> {
		match self.scope.as_deref() {
			Some(raw) => ScopeSet::from_str(raw),
			None => Ok(ScopeSet::default()),
		}
	}
}

/// Verified caller identity attached to an authorized inbound request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundRequestContext {
	/// Client identifier of the calling domain.
	pub principal: String,
	/// Scopes the token grants.
	pub scopes: ScopeSet,
	/// Full claim set.
	pub claims: AccessTokenClaims,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn principal_prefers_client_id() {
		let claims: AccessTokenClaims = serde_json::from_value(serde_json::json!({
			"sub": "subject",
			"client_id": "car-orders-client",
			"token_use": "access",
			"scope": "tires/create.order tires/cancel.order",
			"exp": 1_735_693_200,
		}))
		.expect("Claims should deserialize.");

		assert_eq!(claims.principal(), Some("car-orders-client"));
		assert_eq!(
			claims.scopes().expect("Scopes should parse.").normalized(),
			"tires/cancel.order tires/create.order"
		);
	}
}
