//! The cached access token and its freshness rule.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Access token parked in the cache slot between scheduler ticks.
///
/// Stored as `{ "token", "obtainedAt", "expiresInSeconds" }` with `obtainedAt` in Unix
/// seconds. A token is *fresh* at `now` iff
/// `now < obtainedAt + expiresInSeconds - safetyMargin`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedToken {
	/// Opaque bearer string; callers must avoid logging it.
	pub token: TokenSecret,
	/// Instant the issuer handed the token out.
	#[serde(with = "time::serde::timestamp")]
	pub obtained_at: OffsetDateTime,
	/// Lifetime reported by the issuer at issuance.
	pub expires_in_seconds: u64,
}
impl CachedToken {
	/// Creates a token obtained at `obtained_at` that lives for `expires_in_seconds`.
	pub fn new(
		token: impl Into<String>,
		obtained_at: OffsetDateTime,
		expires_in_seconds: u64,
	) -> Self {
		Self { token: TokenSecret::new(token), obtained_at, expires_in_seconds }
	}

	/// Lifetime as a [`Duration`], saturating at the largest representable value.
	pub fn lifetime(&self) -> Duration {
		Duration::seconds(i64::try_from(self.expires_in_seconds).unwrap_or(i64::MAX))
	}

	/// Instant the issuer considers the token expired.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.obtained_at.saturating_add(self.lifetime())
	}

	/// Last instant (exclusive) at which the token still counts as fresh.
	pub fn fresh_until(&self, safety_margin: Duration) -> OffsetDateTime {
		self.expires_at().saturating_sub(safety_margin)
	}

	/// Returns `true` while `now` is inside the freshness window.
	pub fn is_fresh_at(&self, now: OffsetDateTime, safety_margin: Duration) -> bool {
		now < self.fresh_until(safety_margin)
	}

	/// Returns `true` once the issuer-reported lifetime has elapsed.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at()
	}

	/// Time left until expiry; negative once expired.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Duration {
		self.expires_at() - now
	}
}
impl Debug for CachedToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CachedToken")
			.field("token", &"<redacted>")
			.field("obtained_at", &self.obtained_at)
			.field("expires_in_seconds", &self.expires_in_seconds)
			.finish()
	}
}
