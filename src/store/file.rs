//! File-backed [`TokenCache`] shared between the scheduler and caller processes.
//!
//! Every [`DomainPair`] owns one file below the store directory, named after the pair
//! (`car-orders:tire-orders.token.json`) and holding one [`CachedToken`] blob. Writes go to a
//! uniquely named temporary file in the same directory which is then renamed over the slot, so
//! concurrent writers (in this process or another) never share scratch files and readers observe
//! either the old or the new blob. Slots never share a file, so there is no read-modify-write to
//! lose other pairs' tokens. Every read goes back to disk. Blobs that do not decode into a usable
//! token (the seeded `{"token": ""}` placeholder, or a blob missing its freshness metadata) read
//! as empty.

// std
use std::{
	fs,
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// crates.io
use serde_json::Value;
use tempfile::NamedTempFile;
// self
use crate::{
	_prelude::*,
	auth::{CachedToken, DomainPair},
	store::{StoreError, StoreFuture, TokenCache},
};

const SLOT_SUFFIX: &str = ".token.json";

/// Persists one token slot per domain pair inside a directory.
#[derive(Clone, Debug)]
pub struct FileStore {
	dir: PathBuf,
}
impl FileStore {
	/// Opens a store rooted at `dir`, creating the directory when needed.
	///
	/// Slot files are created lazily on the first write.
	pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let dir = dir.into();

		ensure_dir(&dir)?;

		Ok(Self { dir })
	}

	/// Directory holding the slot files.
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Location of the slot file for `pair`.
	pub fn slot_path(&self, pair: &DomainPair) -> PathBuf {
		self.dir.join(format!("{pair}{SLOT_SUFFIX}"))
	}

	fn load(&self, pair: &DomainPair) -> Result<Option<CachedToken>, StoreError> {
		let path = self.slot_path(pair);
		let bytes = match fs::read(&path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
			Err(e) =>
				return Err(StoreError::Backend {
					message: format!("Failed to read {}: {e}", path.display()),
				}),
		};

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(None);
		}

		match serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})? {
			blob @ Value::Object(_) => Ok(decode_slot(blob)),
			_ => Err(StoreError::Serialization {
				message: format!("{} does not hold a JSON object", path.display()),
			}),
		}
	}

	fn persist(&self, pair: &DomainPair, serialized: &[u8]) -> Result<(), StoreError> {
		ensure_dir(&self.dir)?;

		let path = self.slot_path(pair);
		let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| StoreError::Backend {
			message: format!("Failed to create a scratch file in {}: {e}", self.dir.display()),
		})?;

		tmp.write_all(serialized).map_err(|e| StoreError::Backend {
			message: format!("Failed to write {}: {e}", tmp.path().display()),
		})?;
		tmp.as_file().sync_all().map_err(|e| StoreError::Backend {
			message: format!("Failed to sync {}: {e}", tmp.path().display()),
		})?;
		tmp.persist(&path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {}", path.display(), e.error),
		})?;

		Ok(())
	}
}
impl TokenCache for FileStore {
	fn write<'a>(&'a self, pair: &'a DomainPair, token: CachedToken) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let serialized =
				serde_json::to_vec_pretty(&token).map_err(|e| StoreError::Serialization {
					message: format!("Failed to encode token for {pair}: {e}"),
				})?;

			self.persist(pair, &serialized)
		})
	}

	fn read<'a>(&'a self, pair: &'a DomainPair) -> StoreFuture<'a, Option<CachedToken>> {
		Box::pin(async move { self.load(pair) })
	}
}

fn decode_slot(blob: Value) -> Option<CachedToken> {
	serde_json::from_value::<CachedToken>(blob).ok().filter(|token| !token.token.is_empty())
}

fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
	fs::create_dir_all(dir).map_err(|e| StoreError::Backend {
		message: format!("Failed to create store directory {}: {e}", dir.display()),
	})
}
