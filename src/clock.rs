//! Injectable time sources.
//!
//! Freshness checks and token stamping read "now" from a [`Clock`] so tests can walk a
//! token across its freshness boundary without waiting on the wall clock.

// self
use crate::_prelude::*;

/// Source of the current UTC instant.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current instant.
	fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Manually advanced clock for deterministic tests and simulations.
///
/// Clones share the same instant.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<OffsetDateTime>>);
impl ManualClock {
	/// Creates a clock frozen at `start`.
	pub fn new(start: OffsetDateTime) -> Self {
		Self(Arc::new(Mutex::new(start)))
	}

	/// Moves the clock forward (or backward, for negative durations).
	pub fn advance(&self, by: Duration) {
		*self.0.lock() += by;
	}

	/// Jumps to an absolute instant.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.0.lock() = instant;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn manual_clock_clones_share_state() {
		let clock = ManualClock::new(macros::datetime!(2025-01-01 00:00 UTC));
		let shared = clock.clone();

		clock.advance(Duration::minutes(10));

		assert_eq!(shared.now(), macros::datetime!(2025-01-01 00:10 UTC));

		shared.set(macros::datetime!(2025-06-01 12:00 UTC));

		assert_eq!(clock.now(), macros::datetime!(2025-06-01 12:00 UTC));
	}
}
