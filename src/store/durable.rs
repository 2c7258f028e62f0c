//! Durable store contract and an in-process reference backend.

// self
use crate::{
	_prelude::*,
	auth::{CacheKey, TokenKey, TokenRecord},
	store::StoreFuture,
};

/// Row/document storage keyed by the identity triple.
///
/// Backed by a relational table or a document collection in production; the broker only
/// needs point lookup, upsert, and the sweep's range query. Implementations map
/// [`TokenRecord`] onto their own schema.
pub trait DurableStore
where
	Self: Send + Sync,
{
	/// Fetches the record stored for `key`, if any.
	fn fetch<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, Option<TokenRecord>>;

	/// Inserts or replaces the record for its identity triple.
	fn upsert(&self, record: TokenRecord) -> StoreFuture<'_, ()>;

	/// Returns every record whose access expiry is at or before `cutoff`, or absent.
	///
	/// Feeds the refresh sweep; rows without an expiry are included because they may be
	/// credential-only seeds that never obtained a token.
	fn expiring(&self, cutoff: OffsetDateTime) -> StoreFuture<'_, Vec<TokenRecord>>;
}

/// Thread-safe in-process [`DurableStore`] for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryDurableStore(Arc<RwLock<HashMap<CacheKey, TokenRecord>>>);
impl MemoryDurableStore {
	/// Number of rows currently held.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no row is held.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl DurableStore for MemoryDurableStore {
	fn fetch<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, Option<TokenRecord>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(&key.cache_key()).cloned()) })
	}

	fn upsert(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(record.key.cache_key(), record);

			Ok(())
		})
	}

	fn expiring(&self, cutoff: OffsetDateTime) -> StoreFuture<'_, Vec<TokenRecord>> {
		let map = self.0.clone();

		Box::pin(async move {
			let rows = map
				.read()
				.values()
				.filter(|record| {
					record.access_expiry.is_none_or(|at| at <= cutoff)
				})
				.cloned()
				.collect();

			Ok(rows)
		})
	}
}
