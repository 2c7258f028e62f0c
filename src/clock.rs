//! Injectable time source shared by the broker, the sweep, and tests.

// self
use crate::_prelude::*;

/// Tells the current UTC instant.
///
/// The broker reads time exclusively through this trait so expiry arithmetic can be
/// exercised deterministically. Production code uses [`SystemClock`].
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current instant according to this clock.
	fn now(&self) -> OffsetDateTime;
}

/// System clock backed by [`OffsetDateTime::now_utc`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Manually advanced clock for deterministic expiry scenarios.
///
/// Shared freely via `Arc`; advancing it is visible to every holder.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<RwLock<OffsetDateTime>>);
impl ManualClock {
	/// Creates a clock frozen at the provided instant.
	pub fn new(now: OffsetDateTime) -> Self {
		Self(Arc::new(RwLock::new(now)))
	}

	/// Replaces the current instant.
	pub fn set(&self, now: OffsetDateTime) {
		*self.0.write() = now;
	}

	/// Moves the clock forward by `delta`.
	pub fn advance(&self, delta: Duration) {
		let mut guard = self.0.write();

		*guard += delta;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.read()
	}
}
