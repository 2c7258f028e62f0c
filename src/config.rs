//! Configuration values consumed by the broker core.
//!
//! Loading (files, environment) is the host process's concern; the core only reads the
//! resolved values. All durations are whole seconds.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	tiers::{ClusterMode, TierSelector},
};

/// Tunables for the token lifecycle controller and the refresh sweep.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
	/// Premature-failure margin: seconds subtracted from every provider-reported
	/// lifetime so the cached copy goes stale before the real token dies.
	pub premature_margin_secs: u64,
	/// Distributed lock TTL; must exceed the expected remote-refresh latency.
	pub lock_ttl_secs: u64,
	/// How long a caller blocks waiting for the refresh lock before failing.
	pub lock_wait_timeout_secs: u64,
	/// Cluster operating mode.
	pub cluster_mode: ClusterMode,
	/// Storage tier policy, resolved once at broker build.
	pub tier_policy: Vec<TierSelector>,
	/// Sweep interval; `None` or zero disables the sweep.
	pub sweep_interval_secs: Option<u64>,
	/// Memory-tier TTL used under cluster mode.
	///
	/// Another process may rotate the token before its real expiry, and this process's
	/// local copy cannot observe that; keeping the local TTL short bounds how long a
	/// superseded token is served. Set it at or below the platform's old-token grace
	/// window (most platforms honor the previous token for a few minutes).
	pub cluster_local_ttl_secs: u64,
}
impl BrokerConfig {
	/// Premature-failure margin as a duration.
	pub fn premature_margin(&self) -> Duration {
		Duration::seconds(self.premature_margin_secs.min(i64::MAX as u64) as i64)
	}

	/// Lock TTL for [`crate::lock::RefreshLock`].
	pub fn lock_ttl(&self) -> StdDuration {
		StdDuration::from_secs(self.lock_ttl_secs)
	}

	/// Lock wait timeout for [`crate::lock::RefreshLock`].
	pub fn lock_wait_timeout(&self) -> StdDuration {
		StdDuration::from_secs(self.lock_wait_timeout_secs)
	}

	/// Cluster-mode local cache lifetime as a duration.
	pub fn cluster_local_ttl(&self) -> Duration {
		Duration::seconds(self.cluster_local_ttl_secs.min(i64::MAX as u64) as i64)
	}

	/// Sweep interval, if a positive one is configured.
	pub fn sweep_interval(&self) -> Option<StdDuration> {
		self.sweep_interval_secs.filter(|secs| *secs > 0).map(StdDuration::from_secs)
	}
}
impl Default for BrokerConfig {
	fn default() -> Self {
		Self {
			premature_margin_secs: 5 * 60,
			lock_ttl_secs: 60,
			lock_wait_timeout_secs: 70,
			cluster_mode: ClusterMode::Auto,
			tier_policy: vec![TierSelector::Auto],
			sweep_interval_secs: Some(60),
			cluster_local_ttl_secs: 4 * 60,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn defaults_match_the_documented_values() {
		let config = BrokerConfig::default();

		assert_eq!(config.premature_margin_secs, 300);
		assert_eq!(config.lock_ttl_secs, 60);
		assert_eq!(config.lock_wait_timeout_secs, 70);
		assert_eq!(config.cluster_mode, ClusterMode::Auto);
		assert_eq!(config.tier_policy, vec![TierSelector::Auto]);
		assert_eq!(config.sweep_interval(), Some(StdDuration::from_secs(60)));
		assert_eq!(config.cluster_local_ttl_secs, 240);
	}

	#[test]
	fn deserialization_fills_missing_fields() {
		let config: BrokerConfig = serde_json::from_str(
			"{\"cluster_mode\":\"off\",\"tier_policy\":[\"memory\",\"relational\"],\"sweep_interval_secs\":0}",
		)
		.expect("Partial config should deserialize with defaults.");

		assert_eq!(config.cluster_mode, ClusterMode::Off);
		assert_eq!(config.tier_policy, vec![TierSelector::Memory, TierSelector::Relational]);
		assert_eq!(config.sweep_interval(), None);
		assert_eq!(config.premature_margin_secs, 300);
	}
}
