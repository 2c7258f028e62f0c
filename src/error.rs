//! Broker-level error types shared across flows, stores, locks, and providers.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Durable-store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Distributed-cache failure.
	#[error("{0}")]
	Cache(
		#[from]
		#[source]
		crate::store::CacheError,
	),
	/// Remote platform adapter failure.
	#[error("{0}")]
	Provider(
		#[from]
		#[source]
		crate::provider::ProviderError,
	),

	/// Required identity field is missing from the request.
	#[error("Required field `{field}` is missing.")]
	Validation {
		/// Name of the missing field.
		field: &'static str,
	},
	/// Cluster mode is forced on but no distributed cache is wired.
	#[error("Cluster mode is enabled but no distributed cache is configured.")]
	ClusterUnavailable,
	/// The distributed refresh lock was not acquired within the wait timeout.
	///
	/// Transient; the caller may retry the whole request later. The broker never proceeds
	/// to a remote refresh without the lock while cluster mode is active.
	#[error("Refresh lock for `{key}` was not acquired within the wait timeout.")]
	LockTimeout {
		/// Lock key that stayed contended for the full wait window.
		key: String,
	},
	/// No appid/secret pair could be resolved for a platform-credential refresh.
	#[error("No secret could be resolved for appid `{appid}`.")]
	MissingCredential {
		/// Application identifier whose secret is unknown.
		appid: String,
	},
	/// The user's refresh token is absent or expired and no authorization code was supplied.
	#[error("Refresh token is absent or expired; the user must re-authenticate.")]
	ReauthenticationRequired,
}
