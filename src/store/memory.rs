//! In-process memory tier: the first stop of every lookup.

// self
use crate::{
	_prelude::*,
	auth::{CacheKey, TokenRecord},
};

/// Thread-safe process-local map from cache key to [`TokenRecord`].
///
/// Reads are TTL-aware; writes merge non-destructively so credential material set at seed
/// time survives later token-only updates. There is no eviction beyond expiry-on-read:
/// key cardinality is bounded by active projects × platforms × subjects, not by request
/// volume, so cold entries are acceptable.
#[derive(Debug, Default)]
pub struct MemoryTier(RwLock<HashMap<CacheKey, TokenRecord>>);
impl MemoryTier {
	/// Returns the record if present and its access token is still valid.
	///
	/// The returned copy has any expired refresh token nulled out.
	pub fn get(&self, key: &CacheKey, now: OffsetDateTime) -> Option<TokenRecord> {
		self.0
			.read()
			.get(key)
			.filter(|record| record.is_valid_at(now))
			.cloned()
			.map(|record| record.sanitized_at(now))
	}

	/// Returns the full record regardless of expiry, including credential material.
	///
	/// Refresh-path use only; never hand this to a caller.
	pub fn get_raw(&self, key: &CacheKey) -> Option<TokenRecord> {
		self.0.read().get(key).cloned()
	}

	/// Merges `record` into the entry for its key.
	///
	/// Token fields always overwrite; the secret is kept from the existing entry when the
	/// incoming record lacks one.
	pub fn merge(&self, record: TokenRecord) {
		let key = record.key.cache_key();
		let mut guard = self.0.write();

		match guard.get_mut(&key) {
			Some(existing) => {
				let secret = record.secret.or_else(|| existing.secret.take());

				*existing = TokenRecord { secret, ..record };
			},
			None => {
				guard.insert(key, record);
			},
		}
	}

	/// Snapshot of every record, for the refresh sweep's staleness scan.
	pub fn snapshot(&self) -> Vec<TokenRecord> {
		self.0.read().values().cloned().collect()
	}

	/// Number of entries currently held.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no entry is held.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
