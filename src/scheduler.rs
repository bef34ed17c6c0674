//! Periodic token refresh.
//!
//! Each tick acquires a token from the issuer and writes it into the cache slot. A failed tick is
//! reported and swallowed: the slot keeps its previous token and the next tick tries again.

mod metrics;
pub mod policy;

pub use metrics::*;
pub use policy::*;

// crates.io
use tokio::{
	task::{JoinError, JoinHandle},
	time::{MissedTickBehavior, interval, timeout},
};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	auth::{CachedToken, DomainPair},
	clock::{Clock, SystemClock},
	credentials::ClientCredentials,
	error::{AuthError, ConfigError},
	issuer::TokenSource,
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
	store::TokenCache,
};

/// Result of a single scheduler tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
	/// A new token was written to the slot.
	Refreshed {
		/// Expiry reported by the issuer for the new token.
		expires_at: OffsetDateTime,
	},
	/// The tick failed; the slot was left untouched.
	Failed,
}

/// Drives the acquire-then-write cycle for one domain pair.
#[derive(Clone)]
pub struct RefreshScheduler {
	source: Arc<dyn TokenSource>,
	cache: Arc<dyn TokenCache>,
	credentials: ClientCredentials,
	pair: DomainPair,
	policy: RefreshPolicy,
	clock: Arc<dyn Clock>,
	metrics: Arc<RefreshMetrics>,
	tick_lock: Arc<AsyncMutex<()>>,
}
impl RefreshScheduler {
	/// Builds a scheduler after validating `policy`.
	pub fn new(
		source: Arc<dyn TokenSource>,
		cache: Arc<dyn TokenCache>,
		credentials: ClientCredentials,
		pair: DomainPair,
		policy: RefreshPolicy,
	) -> Result<Self, ConfigError> {
		policy.validate()?;

		Ok(Self {
			source,
			cache,
			credentials,
			pair,
			policy,
			clock: Arc::new(SystemClock),
			metrics: Default::default(),
			tick_lock: Default::default(),
		})
	}

	/// Replaces the clock used to timestamp successful ticks.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Tick counters.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Active refresh policy.
	pub fn policy(&self) -> &RefreshPolicy {
		&self.policy
	}

	/// Runs one tick, reporting instead of returning any failure.
	pub async fn tick(&self) -> TickOutcome {
		match self.refresh_now().await {
			Ok(token) => TickOutcome::Refreshed { expires_at: token.expires_at() },
			Err(e) => {
				obs::report_failure(OperationKind::RefreshTick, &e);

				TickOutcome::Failed
			},
		}
	}

	/// Runs one tick immediately and returns its result.
	///
	/// Ticks are serialized, so an on-demand refresh never overlaps the periodic loop.
	pub async fn refresh_now(&self) -> Result<CachedToken> {
		const KIND: OperationKind = OperationKind::RefreshTick;

		let span = OperationSpan::new(KIND, "refresh_now");

		obs::record_operation_outcome(KIND, OperationOutcome::Attempt);
		self.metrics.record_attempt();

		let result = span
			.instrument(async {
				let _serialized = self.tick_lock.lock().await;

				// The write is all-or-nothing, so abandoning it at the deadline leaves no partial slot.
				timeout(self.policy.tick_timeout_std(), self.acquire_and_write())
					.await
					.map_err(|_| AuthError::Unavailable {
						message: format!(
							"refresh tick exceeded the {} tick timeout",
							self.policy.tick_timeout
						),
						status: None,
						retry_after: None,
						source: None,
					})?
			})
			.await;

		match &result {
			Ok(_) => self.metrics.record_success(self.clock.now()),
			Err(_) => self.metrics.record_failure(),
		}

		obs::record_result(KIND, result)
	}

	async fn acquire_and_write(&self) -> Result<CachedToken> {
		let token = self.source.acquire_token(&self.credentials).await?;

		if !self.policy.holds_for(token.lifetime()) {
			obs::report_warning(
				OperationKind::RefreshTick,
				&format!(
					"issuer granted a {} lifetime; the {} refresh period no longer keeps {} fresh",
					token.lifetime(),
					self.policy.period,
					self.pair
				),
			);
		}

		self.cache.write(&self.pair, token.clone()).await?;

		Ok(token)
	}

	/// Ticks every period until `shutdown` is cancelled. The first tick runs immediately.
	pub async fn run(&self, shutdown: CancellationToken) {
		let mut ticker = interval(self.policy.period_std());

		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

		loop {
			tokio::select! {
				biased;
				_ = shutdown.cancelled() => break,
				_ = ticker.tick() => {
					tokio::select! {
						biased;
						_ = shutdown.cancelled() => break,
						_ = self.tick() => {},
					}
				},
			}
		}
	}

	/// Spawns [`Self::run`] onto the current Tokio runtime.
	pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
		let shutdown = CancellationToken::new();
		let token = shutdown.clone();
		let join = tokio::spawn(async move { self.run(token).await });

		SchedulerHandle { shutdown, join }
	}
}
impl Debug for RefreshScheduler {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshScheduler")
			.field("pair", &self.pair)
			.field("policy", &self.policy)
			.field("credentials", &self.credentials)
			.finish_non_exhaustive()
	}
}

/// Handle to a spawned scheduler loop.
#[derive(Debug)]
pub struct SchedulerHandle {
	shutdown: CancellationToken,
	join: JoinHandle<()>,
}
impl SchedulerHandle {
	/// Token that stops the loop when cancelled.
	pub fn shutdown_token(&self) -> CancellationToken {
		self.shutdown.clone()
	}

	/// Stops the loop and waits for it to exit.
	pub async fn shutdown(self) -> Result<(), JoinError> {
		self.shutdown.cancel();

		self.join.await
	}
}
