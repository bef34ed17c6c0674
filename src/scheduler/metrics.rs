// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::_prelude::*;

/// Thread-safe counters for scheduler ticks.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	consecutive_failures: AtomicU64,
	last_success: Mutex<Option<OffsetDateTime>>,
}
impl RefreshMetrics {
	/// Returns the total number of ticks started.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of ticks that wrote a token.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed ticks.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of failed ticks since the last success.
	pub fn consecutive_failures(&self) -> u64 {
		self.consecutive_failures.load(Ordering::Relaxed)
	}

	/// Instant of the last successful tick.
	pub fn last_success(&self) -> Option<OffsetDateTime> {
		*self.last_success.lock()
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self, at: OffsetDateTime) {
		self.success.fetch_add(1, Ordering::Relaxed);
		self.consecutive_failures.store(0, Ordering::Relaxed);
		*self.last_success.lock() = Some(at);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
		self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
	}
}
