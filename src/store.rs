//! Storage tier contracts and the in-process reference backends.
//!
//! Tiers are pure storage: the broker is their sole mutator, and cross-process mutual
//! exclusion for refresh decisions lives entirely in [`crate::lock`], never here.

pub mod cache;
pub mod durable;
pub mod memory;

pub use cache::{CacheError, CachedToken, DistributedCache, MemoryCache};
pub use durable::{DurableStore, MemoryDurableStore};
pub use memory::MemoryTier;

// self
use crate::_prelude::*;

/// Boxed future returned by durable-store implementations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Error type produced by [`DurableStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
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
