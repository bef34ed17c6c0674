//! Thread-safe in-memory [`TokenCache`] for tests and single-process deployments.

// self
use crate::{
	_prelude::*,
	auth::{CachedToken, DomainPair},
	store::{StoreFuture, TokenCache},
};

type SlotMap = Arc<RwLock<HashMap<String, CachedToken>>>;

/// In-process token slots; clones share the same slots.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(SlotMap);
impl MemoryStore {
	/// Number of non-empty slots.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no slot has been written.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl TokenCache for MemoryStore {
	fn write<'a>(&'a self, pair: &'a DomainPair, token: CachedToken) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = pair.cache_key();

		Box::pin(async move {
			map.write().insert(key, token);

			Ok(())
		})
	}

	fn read<'a>(&'a self, pair: &'a DomainPair) -> StoreFuture<'a, Option<CachedToken>> {
		let map = self.0.clone();
		let key = pair.cache_key();

		Box::pin(async move { Ok(map.read().get(&key).cloned()) })
	}
}
