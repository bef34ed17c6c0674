//! Token cache contract and the built-in slot implementations.
//!
//! Every [`DomainPair`] owns exactly one slot. Writers replace the slot wholesale; readers get the
//! last written [`CachedToken`] or `None` when nothing usable was ever written.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{CachedToken, DomainPair},
};

/// Boxed future returned by [`TokenCache`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Single-slot token cache keyed by domain pair.
///
/// `write` must be atomic with respect to concurrent `read`s: a reader observes either the old or
/// the new token, never a mix. Durable implementations make the slot visible to other processes.
pub trait TokenCache
where
	Self: Send + Sync,
{
	/// Replaces the slot for `pair` with `token`.
	fn write<'a>(&'a self, pair: &'a DomainPair, token: CachedToken) -> StoreFuture<'a, ()>;

	/// Returns the slot contents for `pair`, or `None` when the slot is empty.
	fn read<'a>(&'a self, pair: &'a DomainPair) -> StoreFuture<'a, Option<CachedToken>>;
}

/// Error type produced by [`TokenCache`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// The slot contents could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
