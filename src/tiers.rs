//! Storage tier policy and its one-time resolution.

// self
use crate::_prelude::*;

/// Cluster operating mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMode {
	/// Coordinate refreshes through the distributed lock; fail if no cache is wired.
	On,
	/// Never coordinate; suitable for single-process deployments with long local TTLs.
	Off,
	/// Coordinate iff a distributed cache is wired.
	#[default]
	Auto,
}

/// One entry of the configured tier policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierSelector {
	/// Memory always, plus distributed cache when wired, else a durable fallback.
	#[default]
	Auto,
	/// Every wired tier.
	All,
	/// Process-local memory tier.
	Memory,
	/// Distributed cache tier.
	Distributed,
	/// Relational durable store.
	Relational,
	/// Document durable store.
	Document,
}

/// Resolved, process-lifetime decision of which tiers receive writes.
///
/// Computed once at broker build from the configured policy and which backends are
/// actually wired; it never changes while the process runs. Under `auto`, the durable
/// stores are fallbacks only—memory + distributed cache wins over memory + durable store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageTierSet {
	/// Memory tier active.
	pub memory: bool,
	/// Distributed cache active.
	pub distributed: bool,
	/// Relational durable store active.
	pub relational: bool,
	/// Document durable store active.
	pub document: bool,
}
impl StorageTierSet {
	/// Resolves the policy against the wired backends.
	pub fn resolve(
		policy: &[TierSelector],
		has_distributed: bool,
		has_relational: bool,
		has_document: bool,
	) -> Self {
		let wants = |selector| policy.contains(&selector);
		let memory = wants(TierSelector::Auto)
			|| wants(TierSelector::All)
			|| wants(TierSelector::Memory);
		let distributed = has_distributed
			&& (wants(TierSelector::Auto)
				|| wants(TierSelector::All)
				|| wants(TierSelector::Distributed));
		let relational = has_relational
			&& (wants(TierSelector::All)
				|| wants(TierSelector::Relational)
				|| (wants(TierSelector::Auto) && !distributed));
		let document = has_document
			&& (wants(TierSelector::All)
				|| wants(TierSelector::Document)
				|| (wants(TierSelector::Auto) && !distributed));

		Self { memory, distributed, relational, document }
	}

	/// Returns `true` if at least one tier is active.
	pub fn any(&self) -> bool {
		self.memory || self.distributed || self.relational || self.document
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn auto_prefers_distributed_over_durable() {
		let set = StorageTierSet::resolve(&[TierSelector::Auto], true, true, true);

		assert!(set.memory);
		assert!(set.distributed);
		assert!(!set.relational);
		assert!(!set.document);
	}

	#[test]
	fn auto_falls_back_to_durable_without_distributed() {
		let set = StorageTierSet::resolve(&[TierSelector::Auto], false, true, false);

		assert!(set.memory);
		assert!(!set.distributed);
		assert!(set.relational);
	}

	#[test]
	fn all_activates_every_wired_backend() {
		let set = StorageTierSet::resolve(&[TierSelector::All], true, true, true);

		assert_eq!(
			set,
			StorageTierSet { memory: true, distributed: true, relational: true, document: true }
		);
	}

	#[test]
	fn explicit_subset_skips_memory() {
		let set = StorageTierSet::resolve(&[TierSelector::Relational], false, true, false);

		assert!(!set.memory);
		assert!(set.relational);
		assert!(set.any());
	}

	#[test]
	fn explicit_backend_requires_wiring() {
		let set = StorageTierSet::resolve(&[TierSelector::Distributed], false, false, false);

		assert!(!set.any());
	}
}
