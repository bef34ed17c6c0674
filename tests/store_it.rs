// std
use std::{env, process};
// crates.io
use time::macros;
// self
use oauth2_token_relay::{
	_preludet::*,
	auth::{CachedToken, DomainId, DomainPair},
	clock::{Clock, ManualClock},
	store::{FileStore, MemoryStore, TokenCache},
};

fn temp_dir(tag: &str) -> std::path::PathBuf {
	env::temp_dir().join(format!(
		"oauth2_token_relay_it_{tag}_{}_{}",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	))
}

async fn assert_slot_semantics(cache: Arc<dyn TokenCache>) {
	let pair = test_domain_pair();

	assert!(
		cache.read(&pair).await.expect("Reading an empty slot should succeed.").is_none(),
		"A slot that was never written must read as empty."
	);

	let first = CachedToken::new("first", macros::datetime!(2025-03-01 08:00 UTC), 3_600);
	let second = CachedToken::new("second", macros::datetime!(2025-03-01 08:10 UTC), 3_600);

	cache.write(&pair, first).await.expect("First write should succeed.");
	cache.write(&pair, second.clone()).await.expect("Second write should succeed.");

	let stored = cache
		.read(&pair)
		.await
		.expect("Reading the slot should succeed.")
		.expect("Slot should hold the last written token.");

	assert_eq!(stored, second, "Writes replace the slot wholesale.");
}

#[tokio::test]
async fn memory_store_keeps_last_write() {
	assert_slot_semantics(Arc::new(MemoryStore::default())).await;
}

#[tokio::test]
async fn file_store_keeps_last_write() {
	let dir = temp_dir("last_write");

	assert_slot_semantics(Arc::new(FileStore::open(&dir).expect("Store should open."))).await;

	let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_store_survives_concurrent_writers_on_separate_handles() {
	const WRITERS: usize = 4;
	const WRITES: usize = 100;

	let dir = temp_dir("concurrent");
	let pairs = (0..WRITERS)
		.map(|n| {
			DomainPair::new(
				DomainId::new("car-orders").expect("Caller fixture should be valid."),
				DomainId::new(format!("tire-orders-{n}")).expect("Resource fixture should be valid."),
			)
		})
		.collect::<Vec<_>>();
	let shared = test_domain_pair();
	let mut tasks = Vec::new();

	for (n, pair) in pairs.iter().cloned().enumerate() {
		let store = FileStore::open(&dir).expect("Writer store should open.");
		let shared = shared.clone();

		tasks.push(tokio::spawn(async move {
			for i in 0..WRITES {
				let token = CachedToken::new(format!("w{n}-{i}"), OffsetDateTime::UNIX_EPOCH, 3_600);

				store.write(&pair, token.clone()).await.expect("Own-slot write should succeed.");
				store.write(&shared, token).await.expect("Shared-slot write should succeed.");
			}
		}));
	}
	for _ in 0..2 {
		let store = FileStore::open(&dir).expect("Reader store should open.");
		let shared = shared.clone();

		tasks.push(tokio::spawn(async move {
			for _ in 0..WRITES {
				if let Some(token) =
					store.read(&shared).await.expect("Reads must never observe a torn slot.")
				{
					assert!(token.token.expose().starts_with('w'));
				}
			}
		}));
	}
	for task in tasks {
		task.await.expect("Store task should not panic.");
	}

	let store = FileStore::open(&dir).expect("Store should reopen.");

	for (n, pair) in pairs.iter().enumerate() {
		let token = store
			.read(pair)
			.await
			.expect("Read should succeed.")
			.expect("Every writer's slot must survive the others.");

		assert_eq!(token.token.expose(), format!("w{n}-{}", WRITES - 1));
	}

	let last = store
		.read(&shared)
		.await
		.expect("Read should succeed.")
		.expect("The shared slot holds the last writer's token.");

	assert!(last.token.expose().ends_with(&format!("-{}", WRITES - 1)));

	let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn slots_are_scoped_to_their_pair() {
	let store = MemoryStore::default();
	let pair = test_domain_pair();
	let other = DomainPair::new(
		DomainId::new("car-orders").expect("Caller fixture should be valid."),
		DomainId::new("paint-orders").expect("Resource fixture should be valid."),
	);

	store
		.write(&pair, CachedToken::new("tires", OffsetDateTime::UNIX_EPOCH, 60))
		.await
		.expect("Write should succeed.");

	assert!(store.read(&other).await.expect("Read should succeed.").is_none());
	assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn stored_token_crosses_freshness_boundary() {
	let store = MemoryStore::default();
	let pair = test_domain_pair();
	let t0 = macros::datetime!(2025-03-01 08:00 UTC);
	let clock = ManualClock::new(t0);
	let margin = Duration::minutes(10);

	store
		.write(&pair, CachedToken::new("boundary", t0, 3_600))
		.await
		.expect("Write should succeed.");

	let token = store
		.read(&pair)
		.await
		.expect("Read should succeed.")
		.expect("Slot should hold the token.");

	clock.advance(Duration::seconds(2_999));

	assert!(token.is_fresh_at(clock.now(), margin));

	clock.advance(Duration::seconds(1));

	assert!(!token.is_fresh_at(clock.now(), margin), "Freshness ends at 3000s with a 600s margin.");
	assert!(!token.is_expired_at(clock.now()));
}
