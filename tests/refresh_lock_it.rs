//! Refresh coordination: in-process singleflight, the distributed lock, and
//! follower adoption of a rotation done by another process.

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
	auth::{PlatformId, ProjectId, SubjectId, TokenKey},
	clock::ManualClock,
	config::BrokerConfig,
	error::Error,
	flows::{AppCredentialFlow, Broker, Lookup, TokenRequest},
	provider::{AppCredentialProvider, IssuedToken, ProviderFuture},
	store::{DistributedCache, MemoryCache},
};

const NOW: OffsetDateTime = macros::datetime!(2025-06-01 12:00 UTC);

/// Adapter that counts exchanges and yields before answering, so concurrent callers
/// genuinely overlap.
struct SlowProvider {
	calls: AtomicUsize,
}
impl SlowProvider {
	fn new() -> Arc<Self> {
		Arc::new(Self { calls: AtomicUsize::new(0) })
	}

	fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl AppCredentialProvider for SlowProvider {
	fn fetch_token<'a>(
		&'a self,
		_appid: &'a str,
		_secret: &'a str,
	) -> ProviderFuture<'a, IssuedToken> {
		Box::pin(async move {
			tokio::time::sleep(StdDuration::from_millis(10)).await;

			let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

			Ok(IssuedToken::new(format!("T{n}"), 7_200))
		})
	}
}

fn make_key() -> TokenKey {
	TokenKey::new(
		ProjectId::new("1").expect("Project fixture should be valid."),
		PlatformId::new("wechat").expect("Platform fixture should be valid."),
		SubjectId::new("XXX").expect("Subject fixture should be valid."),
	)
}

fn make_broker(
	provider: Arc<SlowProvider>,
	cache: Arc<MemoryCache>,
	clock: &ManualClock,
	config: BrokerConfig,
) -> Arc<Broker> {
	Arc::new(
		Broker::builder(Arc::new(AppCredentialFlow::new(provider)), config)
			.distributed_cache(cache)
			.clock(Arc::new(clock.clone()))
			.build(),
	)
}

#[tokio::test]
async fn concurrent_requests_cost_one_exchange() {
	let provider = SlowProvider::new();
	let clock = ManualClock::new(NOW);
	let cache = Arc::new(MemoryCache::with_clock(Arc::new(clock.clone())));
	let broker = make_broker(provider.clone(), cache, &clock, BrokerConfig::default());
	let request = || broker.get(TokenRequest::new(make_key()).with_secret("YYY"));
	let (a, b, c, d) = tokio::join!(request(), request(), request(), request());
	let tokens = [
		a.expect("Request should succeed."),
		b.expect("Request should succeed."),
		c.expect("Request should succeed."),
		d.expect("Request should succeed."),
	];

	assert!(tokens.iter().all(|grant| grant.access_token == "T1"));
	assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn sibling_process_reads_the_published_token() {
	let provider = SlowProvider::new();
	let clock = ManualClock::new(NOW);
	let cache = Arc::new(MemoryCache::with_clock(Arc::new(clock.clone())));
	let winner = make_broker(provider.clone(), cache.clone(), &clock, BrokerConfig::default());
	let sibling = make_broker(provider.clone(), cache, &clock, BrokerConfig::default());

	winner
		.get(TokenRequest::new(make_key()).with_secret("YYY"))
		.await
		.expect("Winner exchange should succeed.");

	// The sibling's memory tier is empty; the distributed cache serves it.
	let grant = sibling
		.get(TokenRequest::new(make_key()))
		.await
		.expect("Sibling read should succeed.");

	assert_eq!(grant.access_token, "T1");
	assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn follower_adopts_a_rotation_done_elsewhere() {
	let provider = SlowProvider::new();
	let clock = ManualClock::new(NOW);
	let cache = Arc::new(MemoryCache::with_clock(Arc::new(clock.clone())));
	let winner = make_broker(provider.clone(), cache.clone(), &clock, BrokerConfig::default());
	let follower = make_broker(provider.clone(), cache, &clock, BrokerConfig::default());

	winner
		.get(TokenRequest::new(make_key()).with_secret("YYY"))
		.await
		.expect("Winner exchange should succeed.");

	// The follower believed `T0` was current; the cache now holds `T1`, so the refresh
	// path adopts it without another exchange.
	let request = TokenRequest::new(make_key()).with_secret("YYY").with_now_token("T0");
	let grant = follower
		.refresh(request, Lookup::default())
		.await
		.expect("Follower refresh should adopt.");

	assert_eq!(grant.access_token, "T1");
	assert_eq!(provider.calls(), 1);

	// Adoption lands in the follower's memory under the short cluster-local lifetime.
	let local = follower
		.memory()
		.get_raw(&make_key().cache_key())
		.expect("Adopted record should be in memory.");

	assert_eq!(local.access_expiry, Some(NOW + Duration::seconds(240)));
}

#[tokio::test]
async fn matching_now_token_refreshes_for_real() {
	let provider = SlowProvider::new();
	let clock = ManualClock::new(NOW);
	let cache = Arc::new(MemoryCache::with_clock(Arc::new(clock.clone())));
	let broker = make_broker(provider.clone(), cache, &clock, BrokerConfig::default());

	broker
		.get(TokenRequest::new(make_key()).with_secret("YYY"))
		.await
		.expect("First exchange should succeed.");

	// The cached value equals the caller's `now_token`: nobody rotated, so the refresh
	// must hit the provider. Forced, because this process still holds T1 in memory.
	let request =
		TokenRequest::new(make_key()).with_secret("YYY").with_now_token("T1").force_refresh();
	let grant = broker
		.refresh(request, Lookup::default())
		.await
		.expect("Real refresh should succeed.");

	assert_eq!(grant.access_token, "T2");
	assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn contended_lock_times_out_without_touching_memory() {
	let provider = SlowProvider::new();
	let clock = ManualClock::new(NOW);
	let cache = Arc::new(MemoryCache::with_clock(Arc::new(clock.clone())));

	// Another process holds the refresh lock for this key.
	cache
		.set_with_ttl("lock_1_wechat_XXX", "foreign-owner".into(), 3_600)
		.await
		.expect("Foreign lock seed should succeed.");

	let config = BrokerConfig { lock_wait_timeout_secs: 2, ..Default::default() };
	let broker = make_broker(provider.clone(), cache, &clock, config);
	let err = broker
		.get(TokenRequest::new(make_key()).with_secret("YYY"))
		.await
		.expect_err("Contended lock should time out.");

	assert!(matches!(err, Error::LockTimeout { ref key } if key == "lock_1_wechat_XXX"));
	assert_eq!(provider.calls(), 0);
	assert!(broker.memory().is_empty());
}

#[tokio::test]
async fn refresh_lock_is_released_afterwards() {
	let provider = SlowProvider::new();
	let clock = ManualClock::new(NOW);
	let cache = Arc::new(MemoryCache::with_clock(Arc::new(clock.clone())));
	let broker = make_broker(provider.clone(), cache.clone(), &clock, BrokerConfig::default());

	broker
		.get(TokenRequest::new(make_key()).with_secret("YYY"))
		.await
		.expect("Exchange should succeed.");

	assert_eq!(
		cache.get("lock_1_wechat_XXX").await.expect("Lock read should succeed."),
		None
	);
}
