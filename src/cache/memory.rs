//! Thread-safe in-memory [`CacheStore`] for tests and demos.

// self
use crate::{
	_prelude::*,
	cache::{CacheEntry, CacheFuture, CacheStore},
};

type EntryMap = Arc<RwLock<HashMap<String, CacheEntry>>>;

/// Keeps cache entries in-process; contents die with the process.
#[derive(Clone, Debug, Default)]
pub struct MemoryCacheStore(EntryMap);
impl MemoryCacheStore {
	/// Number of stored entries.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no entries are stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl CacheStore for MemoryCacheStore {
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<CacheEntry>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn put<'a>(&'a self, key: &'a str, entry: CacheEntry) -> CacheFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(key.to_owned(), entry);

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(key);

			Ok(())
		})
	}

	fn clear(&self) -> CacheFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().clear();

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn entry(body: &[u8]) -> CacheEntry {
		CacheEntry {
			status: 200,
			headers: Vec::new(),
			body: body.to_vec(),
			etag: None,
			last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".into()),
			stored_at: OffsetDateTime::now_utc(),
			max_age: None,
		}
	}

	#[tokio::test]
	async fn operations_round_trip() {
		let store = MemoryCacheStore::default();

		assert!(store.is_empty());

		store.put("key", entry(b"value")).await.expect("Put should succeed.");

		assert_eq!(store.len(), 1);
		assert_eq!(
			store
				.get("key")
				.await
				.expect("Get should succeed.")
				.expect("Entry should be present.")
				.body,
			b"value"
		);

		store.delete("key").await.expect("Delete should succeed.");

		assert!(store.get("key").await.expect("Get should succeed.").is_none());

		store.put("other", entry(b"x")).await.expect("Put should succeed.");
		store.clear().await.expect("Clear should succeed.");

		assert!(store.is_empty());
	}
}
