//! Cluster-wide refresh mutex built on the distributed cache's conditional writes.
//!
//! The lock is advisory and cooperative: it only protects the refresh *decision*, and the
//! guarantee holds only for participants funneling through the broker's refresh path.
//! Acquisition is set-if-absent with a TTL, so a crashed owner's lock self-releases;
//! release is an atomic compare-and-delete so a lock that expired and was re-acquired by
//! someone else is never deleted by its previous owner.

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, store::DistributedCache};

/// Fixed backoff between acquisition retries.
const RETRY_BACKOFF: StdDuration = StdDuration::from_millis(500);

/// Distributed mutex over one lock key.
///
/// `ttl` must exceed the expected remote-refresh latency; `wait_timeout` bounds how long a
/// caller blocks before giving up, measured from the first acquisition attempt.
pub struct RefreshLock {
	cache: Arc<dyn DistributedCache>,
	ttl: StdDuration,
	wait_timeout: StdDuration,
}
impl RefreshLock {
	/// Creates a lock handle over the provided cache.
	pub fn new(cache: Arc<dyn DistributedCache>, ttl: StdDuration, wait_timeout: StdDuration) -> Self {
		Self { cache, ttl, wait_timeout }
	}

	/// Acquires the lock for `key`, spinning with fixed backoff until the wait timeout.
	///
	/// Returns [`Error::LockTimeout`] once `wait_timeout` elapses; the caller must treat
	/// that as a hard failure and never proceed to an unguarded refresh.
	pub async fn acquire(&self, key: &str) -> Result<LockLease> {
		let owner = format!("{:016x}{:016x}", rand::random::<u64>(), rand::random::<u64>());
		let began = tokio::time::Instant::now();

		loop {
			if self.cache.set_if_absent(key, owner.clone(), self.ttl.as_secs()).await? {
				return Ok(LockLease { key: key.to_owned(), owner });
			}
			if began.elapsed() >= self.wait_timeout {
				tracing::warn!(key, "refresh lock wait timed out");

				return Err(Error::LockTimeout { key: key.to_owned() });
			}

			tokio::time::sleep(RETRY_BACKOFF).await;
		}
	}

	/// Releases `lease` if this owner still holds it.
	///
	/// Returns `false` when the lock already expired and was taken over by another owner.
	pub async fn release(&self, lease: LockLease) -> Result<bool> {
		Ok(self.cache.delete_if_equals(&lease.key, &lease.owner).await?)
	}
}
impl Debug for RefreshLock {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshLock")
			.field("ttl", &self.ttl)
			.field("wait_timeout", &self.wait_timeout)
			.finish()
	}
}

/// Proof of lock ownership handed back by [`RefreshLock::acquire`].
#[derive(Debug)]
pub struct LockLease {
	key: String,
	owner: String,
}
impl LockLease {
	/// Lock key this lease covers.
	pub fn key(&self) -> &str {
		&self.key
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::MemoryCache;

	fn make_lock(cache: &Arc<MemoryCache>, wait_secs: u64) -> RefreshLock {
		RefreshLock::new(
			cache.clone() as Arc<dyn DistributedCache>,
			StdDuration::from_secs(60),
			StdDuration::from_secs(wait_secs),
		)
	}

	#[tokio::test]
	async fn acquire_then_release_round_trips() {
		let cache = Arc::new(MemoryCache::default());
		let lock = make_lock(&cache, 1);
		let lease = lock.acquire("lock_k").await.expect("Uncontended acquire should succeed.");

		assert!(lock.release(lease).await.expect("Release should run."));

		// Released, so a second acquire wins immediately.
		lock.acquire("lock_k").await.expect("Second acquire should succeed after release.");
	}

	#[tokio::test(start_paused = true)]
	async fn contended_acquire_times_out() {
		let cache = Arc::new(MemoryCache::default());

		cache
			.set_with_ttl("lock_k", "foreign-owner".into(), 3_600)
			.await
			.expect("Foreign lock seed should succeed.");

		let lock = make_lock(&cache, 2);
		let err = lock.acquire("lock_k").await.expect_err("Contended acquire should time out.");

		assert!(matches!(err, Error::LockTimeout { ref key } if key == "lock_k"));
	}

	#[tokio::test]
	async fn release_refuses_foreign_lock() {
		let cache = Arc::new(MemoryCache::default());
		let lock = make_lock(&cache, 1);
		let lease = lock.acquire("lock_k").await.expect("Acquire should succeed.");

		// Simulate TTL expiry plus takeover by replacing the value.
		cache
			.set_with_ttl("lock_k", "new-owner".into(), 3_600)
			.await
			.expect("Takeover seed should succeed.");

		assert!(!lock.release(lease).await.expect("Release should run."));
		assert_eq!(
			cache.get("lock_k").await.expect("Get should succeed."),
			Some("new-owner".into())
		);
	}

	#[tokio::test(start_paused = true)]
	async fn waiting_acquire_wins_once_released() {
		let cache = Arc::new(MemoryCache::default());
		let lock = Arc::new(make_lock(&cache, 30));
		let first = lock.acquire("lock_k").await.expect("First acquire should succeed.");
		let contender = {
			let lock = lock.clone();

			tokio::spawn(async move { lock.acquire("lock_k").await })
		};

		tokio::time::sleep(StdDuration::from_secs(1)).await;

		assert!(lock.release(first).await.expect("Release should run."));
		contender
			.await
			.expect("Contender task should not panic.")
			.expect("Contender should acquire after release.");
	}
}
