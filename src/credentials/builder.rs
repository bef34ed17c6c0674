// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	credentials::{ClientAuthMethod, ClientCredentials, validate_endpoint},
	error::ConfigError,
};

/// Builder for [`ClientCredentials`] values.
#[derive(Debug)]
pub struct ClientCredentialsBuilder {
	client_id: String,
	client_secret: TokenSecret,
	token_endpoint: Option<Url>,
	scope: Option<String>,
	auth_method: ClientAuthMethod,
}
impl ClientCredentialsBuilder {
	/// Creates a new builder seeded with the client identifier and secret.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: TokenSecret::new(client_secret),
			token_endpoint: None,
			scope: None,
			auth_method: ClientAuthMethod::default(),
		}
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the requested scope from a space-delimited string; validated by [`Self::build`].
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Overrides the client authentication method.
	pub fn auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.auth_method = method;

		self
	}

	/// Consumes the builder and validates the resulting credentials.
	pub fn build(self) -> Result<ClientCredentials, ConfigError> {
		if self.client_id.trim().is_empty() {
			return Err(ConfigError::IncompleteCredentials { field: "client_id" });
		}
		if self.client_secret.is_empty() {
			return Err(ConfigError::IncompleteCredentials { field: "client_secret" });
		}

		let token_endpoint =
			self.token_endpoint.ok_or(ConfigError::MissingSetting { name: "token_endpoint" })?;

		validate_endpoint("token", &token_endpoint)?;

		let scope = match self.scope.as_deref() {
			Some(raw) => ScopeSet::from_str(raw)?,
			None => ScopeSet::default(),
		};

		Ok(ClientCredentials {
			client_id: self.client_id,
			client_secret: self.client_secret,
			token_endpoint,
			scope,
			auth_method: self.auth_method,
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn endpoint() -> Url {
		Url::parse("https://idp.example.com/oauth2/token").expect("Endpoint fixture should parse.")
	}

	#[test]
	fn builder_rejects_incomplete_credentials() {
		let err = ClientCredentials::builder("", "secret")
			.token_endpoint(endpoint())
			.build()
			.expect_err("Empty client id must be rejected.");

		assert!(matches!(err, ConfigError::IncompleteCredentials { field: "client_id" }));

		let err = ClientCredentials::builder("client", "")
			.token_endpoint(endpoint())
			.build()
			.expect_err("Empty client secret must be rejected.");

		assert!(matches!(err, ConfigError::IncompleteCredentials { field: "client_secret" }));

		let err = ClientCredentials::builder("client", "secret")
			.build()
			.expect_err("Missing endpoint must be rejected.");

		assert!(matches!(err, ConfigError::MissingSetting { name: "token_endpoint" }));
	}

	#[test]
	fn builder_normalizes_scope() {
		let creds = ClientCredentials::builder("client", "secret")
			.token_endpoint(endpoint())
			.scope("tires/create.order  tires/cancel.order")
			.auth_method(ClientAuthMethod::ClientSecretPost)
			.build()
			.expect("Credentials should build.");

		assert_eq!(creds.scope.normalized(), "tires/cancel.order tires/create.order");
		assert_eq!(creds.auth_method, ClientAuthMethod::ClientSecretPost);
	}

	#[test]
	fn builder_rejects_insecure_endpoint() {
		let err = ClientCredentials::builder("client", "secret")
			.token_endpoint(Url::parse("http://idp.example.com/token").expect("URL should parse."))
			.build()
			.expect_err("Plain HTTP to a remote host must be rejected.");

		assert!(matches!(err, ConfigError::InsecureEndpoint { endpoint: "token", .. }));
	}
}
