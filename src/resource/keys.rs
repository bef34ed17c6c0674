//! Signing keys used to verify inbound access tokens.
//!
//! Remote key sets are fetched from the issuer's JWKS document and cached for a TTL. A token whose
//! `kid` is missing from the cached set triggers an on-demand refetch, at most once per cooldown,
//! which covers issuer key rotation without letting a stream of forged `kid`s hammer the issuer.
//! Failed fetches back off exponentially and keep serving the last good set in the meantime.

// crates.io
use jsonwebtoken::{
	Algorithm, DecodingKey,
	jwk::{AlgorithmParameters, Jwk, JwkSet},
};
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	credentials::validate_endpoint,
	error::{ConfigError, ValidationError},
	obs::{self, OperationKind},
};

/// Path of the JWKS document below an issuer URL.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";
/// Default lifetime of a fetched key set.
pub const DEFAULT_JWKS_TTL: Duration = Duration::hours(1);
/// Minimum spacing between refetches triggered by unknown `kid`s.
pub const DEFAULT_ON_DEMAND_COOLDOWN: Duration = Duration::minutes(1);
/// Upper bound on the retry delay after consecutive failed fetches.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::hours(1);

const BACKOFF_BASE: Duration = Duration::minutes(1);

const RSA_ALGORITHMS: [Algorithm; 6] = [
	Algorithm::RS256,
	Algorithm::RS384,
	Algorithm::RS512,
	Algorithm::PS256,
	Algorithm::PS384,
	Algorithm::PS512,
];
const EC_ALGORITHMS: [Algorithm; 2] = [Algorithm::ES256, Algorithm::ES384];
const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
const OKP_ALGORITHMS: [Algorithm; 1] = [Algorithm::EdDSA];

/// Decoding key plus the algorithms its JWK permits.
///
/// The permitted set comes from the key (`alg`, or the `kty` family when `alg` is absent), never
/// from the token header.
#[derive(Clone)]
pub struct VerificationKey {
	/// Key material.
	pub key: DecodingKey,
	/// Algorithms a token signed with this key may declare.
	pub algorithms: Vec<Algorithm>,
}
impl Debug for VerificationKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("VerificationKey")
			.field("algorithms", &self.algorithms)
			.finish_non_exhaustive()
	}
}

/// Verification keys, either fixed or fetched from the issuer.
#[derive(Clone)]
pub struct KeySet(KeySource);

#[derive(Clone)]
enum KeySource {
	Static(Arc<JwkSet>),
	Remote(Arc<RemoteKeys>),
}

#[derive(Default)]
struct RemoteState {
	keys: Option<Arc<JwkSet>>,
	last_attempt: Option<OffsetDateTime>,
	last_on_demand: Option<OffsetDateTime>,
	consecutive_failures: u32,
}

struct RemoteKeys {
	http: ReqwestClient,
	uri: Url,
	ttl: Duration,
	on_demand_cooldown: Duration,
	max_backoff: Duration,
	clock: Arc<dyn Clock>,
	state: Mutex<RemoteState>,
	fetch_lock: AsyncMutex<()>,
}
impl RemoteKeys {
	fn backoff(&self, failures: u32) -> Duration {
		let factor = 2_i32.pow(failures.min(10));

		(BACKOFF_BASE * factor).min(self.max_backoff)
	}

	fn due(&self, state: &RemoteState, now: OffsetDateTime) -> bool {
		match state.last_attempt {
			None => true,
			Some(last) if state.consecutive_failures == 0 => now >= last.saturating_add(self.ttl),
			Some(last) => now >= last.saturating_add(self.backoff(state.consecutive_failures)),
		}
	}

	/// Current key set, refreshed when the TTL (or the failure backoff) has elapsed.
	async fn keys(&self) -> Result<Arc<JwkSet>, ValidationError> {
		let stale = {
			let state = self.state.lock();

			match &state.keys {
				Some(keys) if !self.due(&state, self.clock.now()) => return Ok(keys.clone()),
				keys => keys.clone(),
			}
		};
		// Another task is already refreshing; a stale set beats queueing behind it.
		let _fetching = match (&stale, self.fetch_lock.try_lock()) {
			(_, Some(guard)) => guard,
			(Some(keys), None) => return Ok(keys.clone()),
			(None, None) => self.fetch_lock.lock().await,
		};

		{
			let state = self.state.lock();

			if let Some(keys) = &state.keys
				&& !self.due(&state, self.clock.now())
			{
				return Ok(keys.clone());
			}
			if state.keys.is_none() && !self.due(&state, self.clock.now()) {
				return Err(ValidationError::KeySet {
					message: format!("{} is backing off after failed fetches", self.uri),
				});
			}
		}

		match self.refresh().await {
			Ok(keys) => Ok(keys),
			Err(e) => match stale {
				Some(keys) => {
					obs::report_failure(OperationKind::Authorize, &e);

					Ok(keys)
				},
				None => Err(e),
			},
		}
	}

	/// Refetches after `kid` missed the cached set, unless a refetch ran within the cooldown.
	async fn keys_for_unknown(
		&self,
		kid: &str,
		seen: &Arc<JwkSet>,
	) -> Result<Option<Arc<JwkSet>>, ValidationError> {
		let _fetching = self.fetch_lock.lock().await;

		{
			let mut state = self.state.lock();
			let now = self.clock.now();

			// A concurrent refetch may already have picked up the rotated key.
			if let Some(keys) = &state.keys
				&& !Arc::ptr_eq(keys, seen)
				&& keys.find(kid).is_some()
			{
				return Ok(Some(keys.clone()));
			}
			if let Some(last) = state.last_on_demand
				&& now < last.saturating_add(self.on_demand_cooldown)
			{
				return Ok(None);
			}

			state.last_on_demand = Some(now);
		}

		obs::report_warning(
			OperationKind::Authorize,
			&format!("signing key `{kid}` is not cached; refetching {}", self.uri),
		);

		self.refresh().await.map(Some)
	}

	async fn refresh(&self) -> Result<Arc<JwkSet>, ValidationError> {
		let result = self.fetch().await;
		let mut state = self.state.lock();

		state.last_attempt = Some(self.clock.now());

		match result {
			Ok(keys) => {
				let keys = Arc::new(keys);

				state.keys = Some(keys.clone());
				state.consecutive_failures = 0;

				Ok(keys)
			},
			Err(e) => {
				state.consecutive_failures = state.consecutive_failures.saturating_add(1);

				Err(e)
			},
		}
	}

	async fn fetch(&self) -> Result<JwkSet, ValidationError> {
		let failure = |e: ReqwestError| ValidationError::KeySet {
			message: format!("failed to fetch {}: {e}", self.uri),
		};

		self.http
			.get(self.uri.clone())
			.send()
			.await
			.and_then(|response| response.error_for_status())
			.map_err(failure)?
			.json::<JwkSet>()
			.await
			.map_err(failure)
	}
}

impl KeySet {
	/// Fixed key set, typically injected by tests.
	pub fn from_jwks(keys: JwkSet) -> Self {
		Self(KeySource::Static(Arc::new(keys)))
	}

	/// Key set fetched from `jwks_uri` and cached for `ttl`.
	pub fn remote(http: ReqwestClient, jwks_uri: Url, ttl: Duration) -> Result<Self, ConfigError> {
		Self::remote_with_clock(http, jwks_uri, ttl, Arc::new(SystemClock))
	}

	/// Like [`Self::remote`], with the TTL, cooldown, and backoff measured on `clock`.
	pub fn remote_with_clock(
		http: ReqwestClient,
		jwks_uri: Url,
		ttl: Duration,
		clock: Arc<dyn Clock>,
	) -> Result<Self, ConfigError> {
		validate_endpoint("JWKS", &jwks_uri)?;

		if !ttl.is_positive() {
			return Err(ConfigError::NonPositiveDuration { name: "JWKS TTL" });
		}

		Ok(Self(KeySource::Remote(Arc::new(RemoteKeys {
			http,
			uri: jwks_uri,
			ttl,
			on_demand_cooldown: DEFAULT_ON_DEMAND_COOLDOWN,
			max_backoff: DEFAULT_MAX_BACKOFF,
			clock,
			state: Default::default(),
			fetch_lock: AsyncMutex::new(()),
		}))))
	}

	/// Key set published at `<issuer>/.well-known/jwks.json`.
	pub fn for_issuer(http: ReqwestClient, issuer: &Url, ttl: Duration) -> Result<Self, ConfigError> {
		let uri = Url::parse(&format!("{}{JWKS_PATH}", issuer.as_str().trim_end_matches('/')))
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "JWKS", source })?;

		Self::remote(http, uri, ttl)
	}

	/// Overrides the spacing between refetches triggered by unknown `kid`s.
	///
	/// Has no effect on a static key set.
	pub fn with_on_demand_cooldown(self, cooldown: Duration) -> Self {
		self.map_remote(|remote| remote.on_demand_cooldown = cooldown)
	}

	/// Overrides the cap on the retry delay after failed fetches.
	///
	/// Has no effect on a static key set.
	pub fn with_max_backoff(self, max_backoff: Duration) -> Self {
		self.map_remote(|remote| remote.max_backoff = max_backoff)
	}

	fn map_remote(self, f: impl FnOnce(&mut RemoteKeys)) -> Self {
		match self.0 {
			KeySource::Remote(mut remote) => {
				// Builders run before the set is shared; a shared set keeps its settings.
				if let Some(remote) = Arc::get_mut(&mut remote) {
					f(remote);
				}

				Self(KeySource::Remote(remote))
			},
			source => Self(source),
		}
	}

	/// Resolves the verification key for `kid`.
	///
	/// A remote set that does not know `kid` is refetched once per cooldown window.
	pub async fn decoding_key(&self, kid: &str) -> Result<VerificationKey, ValidationError> {
		let unknown = || ValidationError::invalid(format!("unknown signing key `{kid}`"));

		match &self.0 {
			KeySource::Static(keys) => find_key(keys, kid)?.ok_or_else(unknown),
			KeySource::Remote(remote) => {
				let keys = remote.keys().await?;

				if let Some(key) = find_key(&keys, kid)? {
					return Ok(key);
				}

				match remote.keys_for_unknown(kid, &keys).await? {
					Some(refreshed) => find_key(&refreshed, kid)?.ok_or_else(unknown),
					None => Err(unknown()),
				}
			},
		}
	}
}
impl Debug for KeySet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match &self.0 {
			KeySource::Static(keys) =>
				f.debug_struct("KeySet").field("static_keys", &keys.keys.len()).finish(),
			KeySource::Remote(remote) => f
				.debug_struct("KeySet")
				.field("jwks_uri", &remote.uri.as_str())
				.field("ttl", &remote.ttl)
				.field("on_demand_cooldown", &remote.on_demand_cooldown)
				.finish(),
		}
	}
}

fn find_key(keys: &JwkSet, kid: &str) -> Result<Option<VerificationKey>, ValidationError> {
	let Some(jwk) = keys.find(kid) else {
		return Ok(None);
	};
	let unusable = |reason: String| ValidationError::KeySet {
		message: format!("signing key `{kid}` is unusable: {reason}"),
	};
	let key = DecodingKey::from_jwk(jwk).map_err(|e| unusable(e.to_string()))?;

	Ok(Some(VerificationKey { key, algorithms: permitted_algorithms(jwk).map_err(unusable)? }))
}

fn permitted_algorithms(jwk: &Jwk) -> Result<Vec<Algorithm>, String> {
	let family: &[Algorithm] = match &jwk.algorithm {
		AlgorithmParameters::RSA(_) => &RSA_ALGORITHMS,
		AlgorithmParameters::EllipticCurve(_) => &EC_ALGORITHMS,
		AlgorithmParameters::OctetKey(_) => &HMAC_ALGORITHMS,
		AlgorithmParameters::OctetKeyPair(_) => &OKP_ALGORITHMS,
	};

	match jwk.common.key_algorithm {
		None => Ok(family.to_vec()),
		Some(declared) => {
			let alg = Algorithm::from_str(&declared.to_string())
				.map_err(|_| format!("`alg` {declared} cannot sign tokens"))?;

			if family.contains(&alg) {
				Ok(vec![alg])
			} else {
				Err(format!("`alg` {declared} does not match the key type"))
			}
		},
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn jwks(kid: &str, alg: Option<&str>) -> JwkSet {
		let mut key = serde_json::json!({ "kty": "oct", "kid": kid, "k": "c2VjcmV0" });

		if let Some(alg) = alg {
			key["alg"] = alg.into();
		}

		serde_json::from_value(serde_json::json!({ "keys": [key] }))
			.expect("JWKS fixture should deserialize.")
	}

	#[tokio::test]
	async fn static_set_resolves_known_kid_only() {
		let keys = KeySet::from_jwks(jwks("k1", Some("HS256")));
		let key = keys.decoding_key("k1").await.expect("Known kid should resolve.");

		assert_eq!(key.algorithms, vec![Algorithm::HS256]);

		let err = match keys.decoding_key("k2").await {
			Ok(_) => panic!("Unknown kid must be rejected."),
			Err(e) => e,
		};

		assert!(matches!(err, ValidationError::InvalidToken { .. }));
	}

	#[tokio::test]
	async fn algorithms_come_from_the_key() {
		let keys = KeySet::from_jwks(jwks("k1", None));
		let key = keys.decoding_key("k1").await.expect("Key without alg should resolve.");

		assert_eq!(key.algorithms, HMAC_ALGORITHMS.to_vec());

		let mismatched = KeySet::from_jwks(jwks("k1", Some("RS256")));

		assert!(matches!(
			mismatched.decoding_key("k1").await,
			Err(ValidationError::KeySet { .. })
		));
	}

	#[test]
	fn backoff_doubles_up_to_the_cap() {
		let keys = KeySet::remote(
			ReqwestClient::new(),
			Url::parse("https://keys.example.com/jwks.json").expect("URI should parse."),
			DEFAULT_JWKS_TTL,
		)
		.expect("Key set should build.");
		let KeySource::Remote(remote) = &keys.0 else {
			panic!("Remote key set expected.");
		};

		assert_eq!(remote.backoff(0), Duration::minutes(1));
		assert_eq!(remote.backoff(1), Duration::minutes(2));
		assert_eq!(remote.backoff(3), Duration::minutes(8));
		assert_eq!(remote.backoff(100), DEFAULT_MAX_BACKOFF);
	}

	#[test]
	fn issuer_url_gains_jwks_path() {
		let issuer = Url::parse("https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_abc/")
			.expect("Issuer should parse.");
		let keys = KeySet::for_issuer(ReqwestClient::new(), &issuer, DEFAULT_JWKS_TTL)
			.expect("Key set should build.");

		assert!(format!("{keys:?}").contains(
			"https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_abc/.well-known/jwks.json"
		));
	}

	#[test]
	fn remote_set_requires_https() {
		let uri = Url::parse("http://keys.example.com/jwks.json").expect("URI should parse.");

		assert!(matches!(
			KeySet::remote(ReqwestClient::new(), uri, DEFAULT_JWKS_TTL),
			Err(ConfigError::InsecureEndpoint { .. })
		));
	}
}
