//! Refresh timing knobs and the startup invariant tying them together.

// self
use crate::{_prelude::*, error::ConfigError};

/// Default scheduler period (10 minutes).
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::minutes(10);
/// Default token lifetime the issuer is expected to grant (60 minutes).
pub const DEFAULT_EXPECTED_LIFETIME: Duration = Duration::minutes(60);
/// Default bound on a single tick.
pub const DEFAULT_TICK_TIMEOUT: Duration = Duration::seconds(30);

/// Timing parameters of the refresh scheduler.
///
/// A cached token must stay fresh until the next tick writes a replacement, so the policy requires
/// `period < expected_lifetime - safety_margin`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshPolicy {
	/// Interval between ticks.
	pub period: Duration,
	/// Buffer subtracted from a token's expiry when judging freshness.
	pub safety_margin: Duration,
	/// Token lifetime the issuer is expected to grant.
	pub expected_lifetime: Duration,
	/// Upper bound on one acquire-and-write tick.
	pub tick_timeout: Duration,
}
impl RefreshPolicy {
	/// Policy with the given period and the margin defaulted to one period.
	pub fn with_period(period: Duration) -> Self {
		Self {
			period,
			safety_margin: period,
			expected_lifetime: DEFAULT_EXPECTED_LIFETIME,
			tick_timeout: DEFAULT_TICK_TIMEOUT,
		}
	}

	/// Checks the startup invariant.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.period.is_positive() {
			return Err(ConfigError::NonPositiveDuration { name: "refresh period" });
		}
		if !self.tick_timeout.is_positive() {
			return Err(ConfigError::NonPositiveDuration { name: "tick timeout" });
		}
		if self.safety_margin.is_negative() {
			return Err(ConfigError::InvalidSetting {
				name: "safety_margin",
				reason: "must not be negative".into(),
			});
		}
		if !self.holds_for(self.expected_lifetime) {
			return Err(ConfigError::RefreshPeriodTooLong {
				period: self.period,
				lifetime: self.expected_lifetime,
				margin: self.safety_margin,
			});
		}

		Ok(())
	}

	/// Returns `true` when a token living `lifetime` stays fresh across one period.
	pub fn holds_for(&self, lifetime: Duration) -> bool {
		self.period < lifetime.saturating_sub(self.safety_margin)
	}

	pub(crate) fn period_std(&self) -> std::time::Duration {
		std::time::Duration::try_from(self.period).unwrap_or(std::time::Duration::ZERO)
	}

	pub(crate) fn tick_timeout_std(&self) -> std::time::Duration {
		std::time::Duration::try_from(self.tick_timeout).unwrap_or(std::time::Duration::ZERO)
	}
}
impl Default for RefreshPolicy {
	fn default() -> Self {
		Self::with_period(DEFAULT_REFRESH_PERIOD)
	}
}
