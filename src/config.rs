//! Relay configuration from JSON or the process environment.
//!
//! Environment variable names follow the deployment the relay was built for: `AUTH_URL` is the
//! identity-provider domain of the resource side (the token endpoint is `<AUTH_URL>/oauth2/token`),
//! `CAR_ORDERS_CLIENT_ID` / `CAR_ORDERS_CLIENT_SECRET` are the caller's app-client credentials,
//! `ORDER_STOCK_SCOPE` is the requested scope, `TIRES_API` / `TIRES_API_KEY` locate the protected
//! API, and `SSM_ORDER_STOCK_TOKEN_PARAM` names the directory holding the token slot files.
//!
//! A validated [`RelayConfig`] builds every relay component: [`RelayConfig::issuer`],
//! [`RelayConfig::token_cache`], [`RelayConfig::scheduler`], [`RelayConfig::caller`], and
//! [`RelayConfig::resource_server`].

// std
use std::path::PathBuf;
// self
use crate::{
	_prelude::*,
	auth::{DomainId, DomainPair, TokenSecret},
	caller::AuthenticatedCaller,
	credentials::{ClientCredentials, validate_endpoint},
	error::ConfigError,
	http::ReqwestHttpClient,
	issuer::{DEFAULT_FALLBACK_EXPIRES_IN, ReqwestTokenIssuer, TokenSource},
	resource::{DEFAULT_JWKS_TTL, KeySet, ResourceServer, RouteTable},
	scheduler::{RefreshPolicy, RefreshScheduler},
	store::{FileStore, MemoryStore, TokenCache},
};

/// Identity-provider domain of the resource side.
pub const ENV_AUTH_URL: &str = "AUTH_URL";
/// Caller's client identifier.
pub const ENV_CLIENT_ID: &str = "CAR_ORDERS_CLIENT_ID";
/// Caller's client secret.
pub const ENV_CLIENT_SECRET: &str = "CAR_ORDERS_CLIENT_SECRET";
/// Space-delimited scope requested with every grant.
pub const ENV_SCOPE: &str = "ORDER_STOCK_SCOPE";
/// Base URL of the protected API.
pub const ENV_RESOURCE_API: &str = "TIRES_API";
/// API key of the protected API's usage plan.
pub const ENV_RESOURCE_API_KEY: &str = "TIRES_API_KEY";
/// Directory holding the token slot files.
pub const ENV_CACHE_DIR: &str = "SSM_ORDER_STOCK_TOKEN_PARAM";
/// Calling domain identifier.
pub const ENV_CALLER_DOMAIN: &str = "RELAY_CALLER_DOMAIN";
/// Resource domain identifier.
pub const ENV_RESOURCE_DOMAIN: &str = "RELAY_RESOURCE_DOMAIN";
/// Issuer URL whose tokens the resource server accepts.
pub const ENV_TOKEN_ISSUER: &str = "TOKEN_ISSUER_URL";
/// Scheduler period in seconds.
pub const ENV_REFRESH_PERIOD: &str = "TOKEN_REFRESH_PERIOD_SECS";
/// Freshness margin in seconds.
pub const ENV_SAFETY_MARGIN: &str = "TOKEN_SAFETY_MARGIN_SECS";
/// Expected issuer-granted lifetime in seconds.
pub const ENV_EXPECTED_LIFETIME: &str = "TOKEN_EXPECTED_LIFETIME_SECS";

const DEFAULT_CALLER_DOMAIN: &str = "car-orders";
const DEFAULT_RESOURCE_DOMAIN: &str = "tire-orders";

/// Complete relay configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
	/// Caller and resource domains.
	pub domain_pair: DomainPair,
	/// Client credentials registered with the resource domain's identity provider.
	pub credentials: ClientCredentials,
	/// Scheduler timing.
	#[serde(default)]
	pub refresh: RefreshSettings,
	/// Protected API the caller talks to.
	pub resource_api: ResourceApiSettings,
	/// Resource-server token validation, for deployments that also serve a protected API.
	#[serde(default)]
	pub resource_server: Option<ResourceServerSettings>,
	/// Directory of the durable token slots; `None` keeps tokens in memory.
	#[serde(default)]
	pub cache_dir: Option<PathBuf>,
}
impl RelayConfig {
	/// Reads the configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_env_with(|name| std::env::var(name).ok())
	}

	/// Reads the configuration through `lookup`, then validates it.
	pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let get = |name: &'static str| lookup(name).filter(|value| !value.trim().is_empty());
		let require = |name: &'static str| get(name).ok_or(ConfigError::MissingSetting { name });
		let secs = |name: &'static str| -> Result<Option<u64>, ConfigError> {
			get(name)
				.map(|raw| {
					raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidSetting {
						name,
						reason: e.to_string(),
					})
				})
				.transpose()
		};
		let domain_pair = DomainPair::new(
			DomainId::new(get(ENV_CALLER_DOMAIN).as_deref().unwrap_or(DEFAULT_CALLER_DOMAIN))?,
			DomainId::new(get(ENV_RESOURCE_DOMAIN).as_deref().unwrap_or(DEFAULT_RESOURCE_DOMAIN))?,
		);
		let mut builder = ClientCredentials::from_auth_domain(
			&require(ENV_AUTH_URL)?,
			require(ENV_CLIENT_ID)?,
			require(ENV_CLIENT_SECRET)?,
		)?;

		if let Some(scope) = get(ENV_SCOPE) {
			builder = builder.scope(scope);
		}

		let credentials = builder.build()?;
		let mut refresh = RefreshSettings::default();

		if let Some(period) = secs(ENV_REFRESH_PERIOD)? {
			refresh.period_secs = period;
		}

		refresh.safety_margin_secs = secs(ENV_SAFETY_MARGIN)?;

		if let Some(lifetime) = secs(ENV_EXPECTED_LIFETIME)? {
			refresh.expected_lifetime_secs = lifetime;
		}

		let base_url = parse_url(ENV_RESOURCE_API, &require(ENV_RESOURCE_API)?)?;
		let resource_server = get(ENV_TOKEN_ISSUER)
			.map(|issuer| -> Result<_, ConfigError> {
				Ok(ResourceServerSettings {
					issuer: parse_url(ENV_TOKEN_ISSUER, &issuer)?,
					jwks_uri: None,
					jwks_ttl_secs: default_jwks_ttl_secs(),
				})
			})
			.transpose()?;
		let config = Self {
			domain_pair,
			credentials,
			refresh,
			resource_api: ResourceApiSettings {
				base_url,
				api_key: get(ENV_RESOURCE_API_KEY).map(TokenSecret::new),
			},
			resource_server,
			cache_dir: get(ENV_CACHE_DIR).map(PathBuf::from),
		};

		config.validate()?;

		Ok(config)
	}

	/// Checks everything deserialization alone cannot.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.credentials.client_id.trim().is_empty() {
			return Err(ConfigError::IncompleteCredentials { field: "client_id" });
		}
		if self.credentials.client_secret.is_empty() {
			return Err(ConfigError::IncompleteCredentials { field: "client_secret" });
		}

		validate_endpoint("token", &self.credentials.token_endpoint)?;
		validate_endpoint("resource API", &self.resource_api.base_url)?;

		if let Some(server) = &self.resource_server {
			validate_endpoint("issuer", &server.issuer)?;

			if let Some(uri) = &server.jwks_uri {
				validate_endpoint("JWKS", uri)?;
			}
		}
		if self.refresh.fallback_expires_in_secs == 0 {
			return Err(ConfigError::NonPositiveDuration { name: "fallback expires_in" });
		}

		let policy = self.refresh.policy()?;

		policy.validate()?;

		// A token stamped with the fallback lifetime must stay fresh across one period too.
		let fallback = seconds("fallback_expires_in_secs", self.refresh.fallback_expires_in_secs)?;

		if !policy.holds_for(fallback) {
			return Err(ConfigError::RefreshPeriodTooLong {
				period: policy.period,
				lifetime: fallback,
				margin: policy.safety_margin,
			});
		}

		Ok(())
	}

	/// Issuer client honoring the configured fallback lifetime.
	pub fn issuer(&self, http: ReqwestHttpClient) -> ReqwestTokenIssuer {
		ReqwestTokenIssuer::new(http).with_fallback_expires_in(self.refresh.fallback_expires_in_secs)
	}

	/// Opens the token cache: a [`FileStore`] when a directory is configured, memory otherwise.
	pub fn token_cache(&self) -> Result<Arc<dyn TokenCache>> {
		Ok(match &self.cache_dir {
			Some(dir) => Arc::new(FileStore::open(dir)?),
			None => Arc::new(MemoryStore::default()),
		})
	}

	/// Scheduler refreshing this pair's slot with the configured timing.
	pub fn scheduler(
		&self,
		source: Arc<dyn TokenSource>,
		cache: Arc<dyn TokenCache>,
	) -> Result<RefreshScheduler, ConfigError> {
		RefreshScheduler::new(
			source,
			cache,
			self.credentials.clone(),
			self.domain_pair.clone(),
			self.refresh.policy()?,
		)
	}

	/// Caller for the protected API, reading the slot the scheduler fills.
	pub fn caller(
		&self,
		http: ReqwestClient,
		cache: Arc<dyn TokenCache>,
	) -> Result<AuthenticatedCaller, ConfigError> {
		let caller = AuthenticatedCaller::new(
			http,
			cache,
			self.domain_pair.clone(),
			self.resource_api.base_url.clone(),
			self.refresh.safety_margin()?,
		)?;

		Ok(match &self.resource_api.api_key {
			Some(key) => caller.with_api_key(key.expose()),
			None => caller,
		})
	}

	/// Resource server validating inbound tokens for `routes`.
	///
	/// Fails with [`ConfigError::MissingSetting`] when no resource-server settings are present.
	pub fn resource_server(
		&self,
		http: ReqwestClient,
		routes: RouteTable,
	) -> Result<ResourceServer, ConfigError> {
		let settings = self
			.resource_server
			.as_ref()
			.ok_or(ConfigError::MissingSetting { name: ENV_TOKEN_ISSUER })?;

		Ok(ResourceServer::new(settings.issuer_claim(), settings.key_set(http)?, routes))
	}
}

/// Scheduler timing in whole seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshSettings {
	/// Interval between ticks.
	pub period_secs: u64,
	/// Freshness margin; defaults to one period.
	pub safety_margin_secs: Option<u64>,
	/// Lifetime the issuer is expected to grant.
	pub expected_lifetime_secs: u64,
	/// Bound on one tick.
	pub tick_timeout_secs: u64,
	/// Lifetime assumed when the issuer omits `expires_in`.
	pub fallback_expires_in_secs: u64,
}
impl RefreshSettings {
	/// Converts the settings into a [`RefreshPolicy`].
	pub fn policy(&self) -> Result<RefreshPolicy, ConfigError> {
		let period = seconds("period_secs", self.period_secs)?;

		Ok(RefreshPolicy {
			period,
			safety_margin: match self.safety_margin_secs {
				Some(margin) => seconds("safety_margin_secs", margin)?,
				None => period,
			},
			expected_lifetime: seconds("expected_lifetime_secs", self.expected_lifetime_secs)?,
			tick_timeout: seconds("tick_timeout_secs", self.tick_timeout_secs)?,
		})
	}

	/// Freshness margin as a [`Duration`].
	pub fn safety_margin(&self) -> Result<Duration, ConfigError> {
		Ok(self.policy()?.safety_margin)
	}
}
impl Default for RefreshSettings {
	fn default() -> Self {
		let policy = RefreshPolicy::default();

		Self {
			period_secs: policy.period.whole_seconds().unsigned_abs(),
			safety_margin_secs: None,
			expected_lifetime_secs: policy.expected_lifetime.whole_seconds().unsigned_abs(),
			tick_timeout_secs: policy.tick_timeout.whole_seconds().unsigned_abs(),
			fallback_expires_in_secs: DEFAULT_FALLBACK_EXPIRES_IN,
		}
	}
}

/// Location and credentials of the protected API.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceApiSettings {
	/// Base URL, e.g. the API stage URL.
	pub base_url: Url,
	/// Usage-plan API key sent as `x-api-key`.
	#[serde(default)]
	pub api_key: Option<TokenSecret>,
}

/// Token validation settings of a resource server.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceServerSettings {
	/// Expected `iss` claim.
	pub issuer: Url,
	/// JWKS location; defaults to `<issuer>/.well-known/jwks.json`.
	#[serde(default)]
	pub jwks_uri: Option<Url>,
	/// Key-set cache lifetime.
	#[serde(default = "default_jwks_ttl_secs")]
	pub jwks_ttl_secs: u64,
}
impl ResourceServerSettings {
	/// Expected `iss` value, without a trailing slash.
	pub fn issuer_claim(&self) -> &str {
		self.issuer.as_str().trim_end_matches('/')
	}

	/// Builds the remote key set described by these settings.
	pub fn key_set(&self, http: ReqwestClient) -> Result<KeySet, ConfigError> {
		let ttl = seconds("jwks_ttl_secs", self.jwks_ttl_secs)?;

		match &self.jwks_uri {
			Some(uri) => KeySet::remote(http, uri.clone(), ttl),
			None => KeySet::for_issuer(http, &self.issuer, ttl),
		}
	}
}

fn default_jwks_ttl_secs() -> u64 {
	DEFAULT_JWKS_TTL.whole_seconds().unsigned_abs()
}

fn seconds(name: &'static str, value: u64) -> Result<Duration, ConfigError> {
	i64::try_from(value).map(Duration::seconds).map_err(|_| ConfigError::InvalidSetting {
		name,
		reason: format!("{value} seconds is out of range"),
	})
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw.trim())
		.map_err(|e| ConfigError::InvalidSetting { name, reason: e.to_string() })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn env(pairs: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<&'static str, &'static str> = pairs.iter().copied().collect();

		move |name: &str| map.get(name).map(|value| (*value).to_owned())
	}

	const BASE: [(&str, &str); 6] = [
		(ENV_AUTH_URL, "https://tire-orders.auth.eu-west-1.amazoncognito.com"),
		(ENV_CLIENT_ID, "car-orders-client"),
		(ENV_CLIENT_SECRET, "car-orders-secret"),
		(ENV_SCOPE, "tires/create.order"),
		(ENV_RESOURCE_API, "https://tires.example.com/prod/"),
		(ENV_CACHE_DIR, "/tmp/order-stock"),
	];

	#[test]
	fn env_config_uses_deployment_defaults() {
		let config = RelayConfig::from_env_with(env(&BASE)).expect("Config should load.");

		assert_eq!(config.domain_pair.cache_key(), "car-orders:tire-orders/token");
		assert_eq!(
			config.credentials.token_endpoint.as_str(),
			"https://tire-orders.auth.eu-west-1.amazoncognito.com/oauth2/token"
		);
		assert!(config.credentials.scope.contains("tires/create.order"));
		assert_eq!(config.refresh.period_secs, 600);
		assert_eq!(
			config.refresh.policy().expect("Policy should convert.").safety_margin,
			Duration::minutes(10)
		);
		assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/order-stock")));
		assert!(config.resource_api.api_key.is_none());
		assert!(config.resource_server.is_none());
	}

	#[test]
	fn missing_variables_are_named() {
		let err = RelayConfig::from_env_with(env(&BASE[1..])).expect_err("AUTH_URL is required.");

		assert!(matches!(err, ConfigError::MissingSetting { name: ENV_AUTH_URL }));
	}

	#[test]
	fn refresh_period_must_leave_a_fresh_window() {
		let mut pairs = BASE.to_vec();

		pairs.push((ENV_REFRESH_PERIOD, "1800"));
		pairs.push((ENV_SAFETY_MARGIN, "1800"));

		let err = RelayConfig::from_env_with(env(&pairs))
			.expect_err("A period eating the whole lifetime must be rejected.");

		assert!(matches!(err, ConfigError::RefreshPeriodTooLong { .. }));

		let mut pairs = BASE.to_vec();

		pairs.push((ENV_REFRESH_PERIOD, "ten minutes"));

		assert!(matches!(
			RelayConfig::from_env_with(env(&pairs)),
			Err(ConfigError::InvalidSetting { name: ENV_REFRESH_PERIOD, .. })
		));
	}

	#[test]
	fn fallback_lifetime_must_outlast_one_period() {
		let mut config = RelayConfig::from_env_with(env(&BASE)).expect("Config should load.");

		assert_eq!(config.refresh.fallback_expires_in_secs, 3_600);

		config.refresh.fallback_expires_in_secs = 300;

		assert!(matches!(
			config.validate(),
			Err(ConfigError::RefreshPeriodTooLong { lifetime, .. }) if lifetime == Duration::minutes(5)
		));

		config.refresh.fallback_expires_in_secs = 0;

		assert!(matches!(config.validate(), Err(ConfigError::NonPositiveDuration { .. })));
	}

	#[test]
	fn config_builds_every_component() {
		let dir = std::env::temp_dir()
			.join(format!("oauth2_token_relay_config_{}", std::process::id()));
		let mut pairs = BASE.to_vec();

		pairs.push((ENV_RESOURCE_API_KEY, "usage-plan-key"));
		pairs.push((ENV_TOKEN_ISSUER, "https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_tires"));

		let mut config = RelayConfig::from_env_with(env(&pairs)).expect("Config should load.");

		config.cache_dir = None;

		let cache = config.token_cache().expect("In-memory cache should open.");
		let issuer = config.issuer(ReqwestHttpClient::default());

		assert!(format!("{issuer:?}").contains("fallback_expires_in: 3600"));
		assert!(config.scheduler(Arc::new(issuer), cache.clone()).is_ok());
		assert!(config.caller(ReqwestClient::new(), cache).is_ok());
		assert!(config.resource_server(ReqwestClient::new(), RouteTable::new()).is_ok());

		config.cache_dir = Some(dir.clone());

		assert!(config.token_cache().is_ok());
		assert!(dir.is_dir(), "Opening the file cache creates its directory.");

		config.resource_server = None;

		assert!(matches!(
			config.resource_server(ReqwestClient::new(), RouteTable::new()),
			Err(ConfigError::MissingSetting { name: ENV_TOKEN_ISSUER })
		));

		std::fs::remove_dir_all(&dir).expect("Temporary cache directory should be removed.");
	}

	#[test]
	fn json_config_deserializes_and_validates() {
		let config: RelayConfig = serde_json::from_value(serde_json::json!({
			"domainPair": { "caller": "tire-orders", "resource": "car-orders" },
			"credentials": {
				"clientId": "tire-orders-client",
				"clientSecret": "tire-orders-secret",
				"tokenEndpoint": "https://car-orders.auth.eu-west-1.amazoncognito.com/oauth2/token",
				"scope": ["cars/complete.order"],
				"authMethod": "client_secret_post",
			},
			"refresh": { "periodSecs": 300 },
			"resourceApi": { "baseUrl": "https://cars.example.com/prod/", "apiKey": "key" },
			"resourceServer": { "issuer": "https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_abc" },
		}))
		.expect("Config should deserialize.");

		assert!(config.validate().is_ok());
		assert_eq!(config.refresh.expected_lifetime_secs, 3_600);
		assert_eq!(config.refresh.safety_margin().expect("Margin should convert."), Duration::minutes(5));

		let server = config.resource_server.as_ref().expect("Resource server settings should load.");

		assert_eq!(server.jwks_ttl_secs, 3_600);
		assert_eq!(server.issuer_claim(), "https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_abc");
		assert!(server.key_set(ReqwestClient::new()).is_ok());
	}
}
