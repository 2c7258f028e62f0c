//! Refresh sweep: candidate aggregation, deduplication, skipping, and failure isolation.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use time::{Duration, OffsetDateTime, macros};
// self
use token_relay::{
	auth::{PlatformId, ProjectId, SubjectId, TokenKey, TokenRecord},
	clock::{Clock, ManualClock},
	config::BrokerConfig,
	flows::{AppCredentialFlow, Broker, TokenRequest},
	provider::{AppCredentialProvider, IssuedToken, ProviderError, ProviderFuture},
	store::{DurableStore, MemoryCache, MemoryDurableStore},
	sweep::RefreshSweep,
	tiers::TierSelector,
};

const NOW: OffsetDateTime = macros::datetime!(2025-06-01 12:00 UTC);

struct CountingProvider {
	calls: AtomicUsize,
}
impl CountingProvider {
	fn new() -> Arc<Self> {
		Arc::new(Self { calls: AtomicUsize::new(0) })
	}

	fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl AppCredentialProvider for CountingProvider {
	fn fetch_token<'a>(
		&'a self,
		appid: &'a str,
		secret: &'a str,
	) -> ProviderFuture<'a, IssuedToken> {
		Box::pin(async move {
			if secret != "YYY" {
				return Err(ProviderError::Rejected {
					code: "40001".into(),
					message: "invalid credential".into(),
				});
			}

			self.calls.fetch_add(1, Ordering::SeqCst);

			Ok(IssuedToken::new(format!("fresh-{appid}"), 7_200))
		})
	}
}

fn make_key(subject: &str) -> TokenKey {
	TokenKey::new(
		ProjectId::new("1").expect("Project fixture should be valid."),
		PlatformId::new("wechat").expect("Platform fixture should be valid."),
		SubjectId::new(subject).expect("Subject fixture should be valid."),
	)
}

/// Broker writing to every wired tier, so sweep candidates surface from several sources.
fn make_broker(provider: Arc<CountingProvider>, clock: &ManualClock) -> Arc<Broker> {
	let config = BrokerConfig { tier_policy: vec![TierSelector::All], ..Default::default() };

	Arc::new(
		Broker::builder(Arc::new(AppCredentialFlow::new(provider)), config)
			.distributed_cache(Arc::new(MemoryCache::with_clock(Arc::new(clock.clone()))))
			.relational_store(Arc::new(MemoryDurableStore::default()) as Arc<dyn DurableStore>)
			.clock(Arc::new(clock.clone()))
			.build(),
	)
}

/// Waits for the detached refresh tasks spawned by a tick to settle.
async fn settle<F>(done: F)
where
	F: Fn() -> bool,
{
	for _ in 0..200 {
		if done() {
			return;
		}

		tokio::time::sleep(StdDuration::from_millis(1)).await;
	}
}

#[tokio::test]
async fn stale_entries_from_all_tiers_refresh_once() {
	let provider = CountingProvider::new();
	let clock = ManualClock::new(NOW);
	let broker = make_broker(provider.clone(), &clock);

	broker
		.get(TokenRequest::new(make_key("XXX")).with_secret("YYY"))
		.await
		.expect("Initial exchange should succeed.");
	assert_eq!(provider.calls(), 1);

	// Past expiry the key is stale in memory AND expiring in the durable store; the
	// sweep must still refresh it exactly once.
	clock.advance(Duration::seconds(7_200));

	let sweep = RefreshSweep::new(Some(StdDuration::from_secs(60))).register(broker.clone());
	let spawned = sweep.tick().await.expect("Tick should succeed.");

	assert_eq!(spawned, 1);

	settle(|| provider.calls() == 2).await;

	assert_eq!(provider.calls(), 2);

	let refreshed = broker
		.memory()
		.get(&make_key("XXX").cache_key(), clock.now())
		.expect("Refreshed record should be valid again.");

	assert_eq!(refreshed.access_token.expose(), "fresh-XXX");
}

#[tokio::test]
async fn entries_without_credentials_are_skipped() {
	let provider = CountingProvider::new();
	let clock = ManualClock::new(NOW);
	let broker = make_broker(provider.clone(), &clock);

	// Stale record with no secret: nothing to refresh with, so the sweep skips it.
	broker.memory().merge(
		TokenRecord::new(make_key("orphan"), "old")
			.with_access_expiry(Some(NOW - Duration::seconds(1))),
	);

	let sweep = RefreshSweep::new(Some(StdDuration::from_secs(60))).register(broker.clone());

	assert_eq!(sweep.tick().await.expect("Tick should succeed."), 0);
	assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn live_entries_are_left_alone() {
	let provider = CountingProvider::new();
	let clock = ManualClock::new(NOW);
	let broker = make_broker(provider.clone(), &clock);

	broker
		.get(TokenRequest::new(make_key("XXX")).with_secret("YYY"))
		.await
		.expect("Initial exchange should succeed.");

	let sweep = RefreshSweep::new(Some(StdDuration::from_secs(60))).register(broker.clone());

	assert_eq!(sweep.tick().await.expect("Tick should succeed."), 0);
	assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn one_failing_key_does_not_block_the_rest() {
	let provider = CountingProvider::new();
	let clock = ManualClock::new(NOW);
	let broker = make_broker(provider.clone(), &clock);
	let stale = |subject: &str, secret: &str| {
		TokenRecord::new(make_key(subject), "old")
			.with_access_expiry(Some(NOW - Duration::seconds(1)))
			.with_secret(secret)
	};

	broker.memory().merge(stale("good", "YYY"));
	broker.memory().merge(stale("bad", "WRONG"));

	let sweep = RefreshSweep::new(Some(StdDuration::from_secs(60))).register(broker.clone());
	let spawned = sweep.tick().await.expect("Tick should succeed.");

	assert_eq!(spawned, 2);

	settle(|| {
		broker.memory().get(&make_key("good").cache_key(), clock.now()).is_some()
	})
	.await;

	let good = broker
		.memory()
		.get(&make_key("good").cache_key(), clock.now())
		.expect("Good key should have refreshed.");

	assert_eq!(good.access_token.expose(), "fresh-good");
	// The bad key stays stale; its failure was logged and isolated.
	assert!(broker.memory().get(&make_key("bad").cache_key(), clock.now()).is_none());
}

#[tokio::test]
async fn sweep_spawns_only_when_it_has_work() {
	let provider = CountingProvider::new();
	let clock = ManualClock::new(NOW);
	let broker = make_broker(provider, &clock);

	assert!(RefreshSweep::new(None).register(broker.clone()).spawn().is_none());
	assert!(RefreshSweep::new(Some(StdDuration::from_secs(60))).spawn().is_none());

	let handle = RefreshSweep::new(Some(StdDuration::from_secs(60)))
		.register(broker)
		.spawn()
		.expect("Sweep with work should spawn.");

	handle.abort();
}
