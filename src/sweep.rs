//! Background refresh sweep: rotates tokens shortly before they expire so callers
//! rarely pay refresh latency inline.
//!
//! Best-effort only. Each candidate refresh runs as its own task whose failure is logged
//! and isolated; correctness never depends on the sweep because the inline path refreshes
//! on demand anyway.

// std
use std::{collections::HashSet, time::Duration as StdDuration};
// self
use crate::{
	_prelude::*,
	flows::{Broker, Lookup, TokenRequest},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Periodic scanner driving proactive refreshes across one or more brokers.
///
/// Register the brokers to cover, then [`spawn`](Self::spawn) the loop. Candidates come
/// from two sources per broker: stale memory entries and the durable stores' expiring
/// rows. Each candidate goes through the broker's normal lock-guarded refresh path, so
/// sweeps from several processes still cost one remote exchange per key.
pub struct RefreshSweep {
	brokers: Vec<Arc<Broker>>,
	interval: Option<StdDuration>,
}
impl RefreshSweep {
	/// Creates a sweep firing every `interval`; `None` disables it.
	pub fn new(interval: Option<StdDuration>) -> Self {
		Self { brokers: Vec::new(), interval }
	}

	/// Registers a broker to cover.
	pub fn register(mut self, broker: Arc<Broker>) -> Self {
		self.brokers.push(broker);

		self
	}

	/// Spawns the sweep loop, or returns `None` when there is nothing to do (no
	/// interval, or no registered broker with an active storage tier).
	pub fn spawn(self) -> Option<tokio::task::JoinHandle<()>> {
		let enabled =
			self.interval.is_some() && self.brokers.iter().any(|broker| broker.tiers().any());

		enabled.then(|| tokio::spawn(self.run()))
	}

	async fn run(self) {
		let Some(period) = self.interval else {
			return;
		};
		let mut ticker = tokio::time::interval(period);

		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

		loop {
			ticker.tick().await;

			match self.tick().await {
				Ok(count) => tracing::debug!(count, "refresh sweep tick completed"),
				Err(err) => {
					// A tick-level failure means a store scan itself broke; stop the
					// loop rather than hammering a broken backend every interval.
					tracing::error!(error = %err, "refresh sweep aborted");

					break;
				},
			}
		}
	}

	/// Runs one sweep pass and returns how many refresh tasks it spawned.
	///
	/// Individual refresh failures are isolated in their tasks; an error here means a
	/// store scan failed.
	pub async fn tick(&self) -> Result<usize> {
		let span = FlowSpan::new(FlowKind::Sweep, "tick");

		obs::record_flow_outcome(FlowKind::Sweep, FlowOutcome::Attempt);

		let result = span.instrument(self.tick_inner()).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(FlowKind::Sweep, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(FlowKind::Sweep, FlowOutcome::Failure),
		}

		result
	}

	async fn tick_inner(&self) -> Result<usize> {
		let mut spawned = 0;

		for broker in &self.brokers {
			let now = broker.now();
			let mut candidates = Vec::new();

			if broker.tiers().memory {
				candidates.extend(
					broker
						.memory()
						.snapshot()
						.into_iter()
						.filter(|record| record.is_stale_at(now)),
				);
			}
			for store in broker.active_durable_stores() {
				candidates.extend(store.expiring(now).await?);
			}

			// The same key may surface from several tiers; refresh it once.
			let mut seen = HashSet::new();

			for record in candidates {
				if !seen.insert(record.key.cache_key()) {
					continue;
				}
				// Entries without refresh material are skipped, not failed; a later
				// inline request can still supply the credentials.
				if broker.flow().sweep_materials(&record, now).is_none() {
					continue;
				}

				let request = sweep_request(&record);
				let key = record.key.clone();
				let prior = Lookup { token: None, record: Some(record) };
				let broker = broker.clone();

				tokio::spawn(async move {
					if let Err(err) = broker.refresh(request, prior).await {
						tracing::warn!(key = %key, error = %err, "sweep refresh failed");
					}
				});

				spawned += 1;
			}
		}

		Ok(spawned)
	}
}
impl Debug for RefreshSweep {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshSweep")
			.field("brokers", &self.brokers.len())
			.field("interval", &self.interval)
			.finish()
	}
}

fn sweep_request(record: &crate::auth::TokenRecord) -> TokenRequest {
	let mut request = TokenRequest::new(record.key.clone());

	// Carry the stale token so a refresh that loses the distributed lock race adopts the
	// winner's rotation instead of fetching again.
	if !record.access_token.expose().is_empty() {
		request = request.with_now_token(record.access_token.expose());
	}

	request
}
