//! Client-credentials configuration consumed by the token issuer client.
//!
//! Credentials are supplied out-of-band (environment, secrets manager) and never generated by
//! the relay. The builder validates them once so the issuer can trust the values on every tick.

mod builder;

pub use builder::*;

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::ConfigError,
};

/// Path appended to an identity-provider domain to reach its token endpoint.
pub const TOKEN_ENDPOINT_PATH: &str = "/oauth2/token";

/// How the client authenticates itself to the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Immutable client-credentials configuration for one domain pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCredentials {
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// OAuth 2.0 client secret.
	pub client_secret: TokenSecret,
	/// Token endpoint of the resource domain's identity provider.
	#[serde(alias = "authorizationEndpoint")]
	pub token_endpoint: Url,
	/// Scopes requested with every grant.
	#[serde(alias = "requestedScope")]
	pub scope: ScopeSet,
	/// Client authentication mode for the token endpoint.
	#[serde(default)]
	pub auth_method: ClientAuthMethod,
}
impl ClientCredentials {
	/// Creates a new builder for the provided client identifier and secret.
	pub fn builder(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> ClientCredentialsBuilder {
		ClientCredentialsBuilder::new(client_id, client_secret)
	}

	/// Starts a builder whose token endpoint is `<auth_domain>/oauth2/token`.
	pub fn from_auth_domain(
		auth_domain: &str,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Result<ClientCredentialsBuilder, ConfigError> {
		let endpoint =
			format!("{}{TOKEN_ENDPOINT_PATH}", auth_domain.trim_end_matches('/'));
		let url = Url::parse(&endpoint)
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "token", source })?;

		Ok(Self::builder(client_id, client_secret).token_endpoint(url))
	}
}
impl Debug for ClientCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentials")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("token_endpoint", &self.token_endpoint.as_str())
			.field("scope", &self.scope)
			.field("auth_method", &self.auth_method)
			.finish()
	}
}

/// Rejects non-HTTPS endpoints, allowing plain HTTP only for loopback hosts.
pub(crate) fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ConfigError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(ConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain == "localhost",
		Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
		Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn auth_domain_gains_token_path() {
		let creds = ClientCredentials::from_auth_domain(
			"https://tire-orders-auth-user-pool-domain.auth.eu-west-1.amazoncognito.com/",
			"client",
			"secret",
		)
		.expect("Auth domain should parse.")
		.scope("tires/create.order")
		.build()
		.expect("Credentials should build.");

		assert_eq!(
			creds.token_endpoint.as_str(),
			"https://tire-orders-auth-user-pool-domain.auth.eu-west-1.amazoncognito.com/oauth2/token"
		);
	}

	#[test]
	fn loopback_http_is_allowed() {
		let local = Url::parse("http://127.0.0.1:8080/token").expect("URL should parse.");
		let named = Url::parse("http://localhost/token").expect("URL should parse.");
		let remote = Url::parse("http://example.com/token").expect("URL should parse.");
		let sneaky = Url::parse("http://localhost.example.com/token").expect("URL should parse.");

		assert!(validate_endpoint("token", &local).is_ok());
		assert!(validate_endpoint("token", &named).is_ok());
		assert!(matches!(
			validate_endpoint("token", &remote),
			Err(ConfigError::InsecureEndpoint { endpoint: "token", .. })
		));
		assert!(validate_endpoint("token", &sneaky).is_err());
	}

	#[test]
	fn debug_redacts_secret() {
		let creds = ClientCredentials::builder("client", "very-secret")
			.token_endpoint(Url::parse("https://idp.example.com/oauth2/token").expect("URL should parse."))
			.build()
			.expect("Credentials should build.");

		assert!(!format!("{creds:?}").contains("very-secret"));
	}

	#[test]
	fn deserializes_deployment_field_aliases() {
		let creds: ClientCredentials = serde_json::from_value(serde_json::json!({
			"clientId": "client",
			"clientSecret": "secret",
			"authorizationEndpoint": "https://idp.example.com/oauth2/token",
			"requestedScope": ["tires/create.order"],
		}))
		.expect("Credentials should deserialize.");

		assert_eq!(creds.auth_method, ClientAuthMethod::ClientSecretBasic);
		assert!(creds.scope.contains("tires/create.order"));
	}
}
