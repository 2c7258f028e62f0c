//! Distributed cache contract, the JSON wire form it carries, and an in-process
//! reference implementation.

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	clock::{Clock, SystemClock},
	expiry,
};

/// Boxed future returned by distributed-cache implementations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + 'a + Send>>;

/// Error type produced by [`DistributedCache`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CacheError {
	/// The cached payload could not be decoded.
	#[error("Cache payload decode error at `{path}`: {message}.")]
	Decode {
		/// Serde path to the offending field.
		path: String,
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the cache engine.
	#[error("Cache backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// String key/value store with expiring conditional writes.
///
/// The broker needs exactly four primitives: plain get, set-with-expiry (token
/// publication), conditional set-if-absent with expiry (lock acquisition), and an atomic
/// compare-and-delete (ownership-checked lock release). Any Redis-shaped backend can
/// satisfy this contract; [`MemoryCache`] covers tests and single-node deployments.
pub trait DistributedCache
where
	Self: Send + Sync,
{
	/// Fetches the value stored under `key`, if present and unexpired.
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>>;

	/// Stores `value` under `key` with a TTL in whole seconds.
	fn set_with_ttl<'a>(&'a self, key: &'a str, value: String, ttl_secs: u64)
	-> CacheFuture<'a, ()>;

	/// Stores `value` under `key` only if the key is absent; returns `true` on success.
	fn set_if_absent<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl_secs: u64,
	) -> CacheFuture<'a, bool>;

	/// Deletes `key` only if its current value equals `expected`; returns `true` if deleted.
	fn delete_if_equals<'a>(&'a self, key: &'a str, expected: &'a str) -> CacheFuture<'a, bool>;
}

/// JSON wire form published to the distributed cache.
///
/// Expiries travel as unix seconds so every process reads the same unit regardless of its
/// local time representation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
	/// Access token value.
	pub access_token: String,
	/// Access expiry as unix seconds.
	pub access_expiry: Option<i64>,
	/// Refresh token value, user variant only.
	pub refresh_token: Option<String>,
	/// Refresh expiry as unix seconds.
	pub refresh_expiry: Option<i64>,
}
impl CachedToken {
	/// Projects the record fields that are safe to share across processes.
	///
	/// Credential material never enters the distributed cache.
	pub fn from_record(record: &TokenRecord) -> Self {
		Self {
			access_token: record.access_token.expose().to_owned(),
			access_expiry: record.access_expiry.map(OffsetDateTime::unix_timestamp),
			refresh_token: record.refresh_token.as_ref().map(|token| token.expose().to_owned()),
			refresh_expiry: record.refresh_expiry.map(OffsetDateTime::unix_timestamp),
		}
	}

	/// Serializes the wire form.
	pub fn encode(&self) -> Result<String, CacheError> {
		serde_json::to_string(self)
			.map_err(|err| CacheError::Backend { message: err.to_string() })
	}

	/// Deserializes the wire form with path-aware diagnostics.
	pub fn decode(raw: &str) -> Result<Self, CacheError> {
		let mut deserializer = serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(&mut deserializer).map_err(|err| CacheError::Decode {
			path: err.path().to_string(),
			message: err.inner().to_string(),
		})
	}

	/// Rebuilds a [`TokenRecord`] keyed by `key` from the shared fields.
	pub fn into_record(self, key: crate::auth::TokenKey) -> TokenRecord {
		let mut record = TokenRecord::new(key, self.access_token).with_access_expiry(
			self.access_expiry.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok()),
		);

		if let Some(refresh) = self.refresh_token {
			record = record.with_refresh_token(refresh).with_refresh_expiry(
				self.refresh_expiry
					.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok()),
			);
		}

		record
	}
}

type Entries = RwLock<HashMap<String, (String, Option<OffsetDateTime>)>>;

/// In-process [`DistributedCache`] for tests and single-node deployments.
///
/// Honors TTLs through the supplied [`Clock`], so manual-clock tests observe entries
/// expiring without sleeping.
pub struct MemoryCache {
	entries: Entries,
	clock: Arc<dyn Clock>,
}
impl MemoryCache {
	/// Creates a cache reading time from `clock`.
	pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
		Self { entries: RwLock::new(HashMap::new()), clock }
	}

	fn live_value(&self, key: &str) -> Option<String> {
		let now = self.clock.now();
		let guard = self.entries.read();
		let (value, expiry) = guard.get(key)?;

		if expiry::is_expired(*expiry, now) {
			return None;
		}

		Some(value.clone())
	}

	fn expiry_from_ttl(&self, ttl_secs: u64) -> Option<OffsetDateTime> {
		(ttl_secs > 0)
			.then(|| self.clock.now() + Duration::seconds(ttl_secs.min(i64::MAX as u64) as i64))
	}
}
impl Default for MemoryCache {
	fn default() -> Self {
		Self::with_clock(Arc::new(SystemClock))
	}
}
impl Debug for MemoryCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryCache").field("entries", &self.entries.read().len()).finish()
	}
}
impl DistributedCache for MemoryCache {
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>> {
		Box::pin(async move { Ok(self.live_value(key)) })
	}

	fn set_with_ttl<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl_secs: u64,
	) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			let expiry = self.expiry_from_ttl(ttl_secs);

			self.entries.write().insert(key.to_owned(), (value, expiry));

			Ok(())
		})
	}

	fn set_if_absent<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl_secs: u64,
	) -> CacheFuture<'a, bool> {
		Box::pin(async move {
			let now = self.clock.now();
			let expiry = self.expiry_from_ttl(ttl_secs);
			// Liveness check and insert under one write lock, so two racing acquirers
			// can never both observe the key absent.
			let mut guard = self.entries.write();

			if matches!(guard.get(key), Some((_, at)) if !expiry::is_expired(*at, now)) {
				return Ok(false);
			}

			guard.insert(key.to_owned(), (value, expiry));

			Ok(true)
		})
	}

	fn delete_if_equals<'a>(&'a self, key: &'a str, expected: &'a str) -> CacheFuture<'a, bool> {
		Box::pin(async move {
			let now = self.clock.now();
			// Ownership check and removal under one write lock.
			let mut guard = self.entries.write();
			let owned = matches!(
				guard.get(key),
				Some((value, at)) if value == expected && !expiry::is_expired(*at, now)
			);

			if owned {
				guard.remove(key);
			}

			Ok(owned)
		})
	}
}
