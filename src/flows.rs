//! Token lifecycle controller: tiered lookup, lock-guarded refresh, multi-tier write-back.
//!
//! One generic [`Broker`] engine owns the orchestration—lookup order, the distributed
//! lock protocol, normalization, and persistence—while everything variant-specific
//! (validation, credential resolution, which adapter call to make) lives behind the
//! [`TokenFlow`] capability contract. The two variants are
//! [`AppCredentialFlow`](app_credential::AppCredentialFlow) and
//! [`UserOauthFlow`](user_oauth::UserOauthFlow).

pub mod app_credential;
pub mod user_oauth;

mod refresh;

pub use app_credential::AppCredentialFlow;
pub use user_oauth::UserOauthFlow;

// self
use crate::{
	_prelude::*,
	auth::{CacheKey, TokenKey, TokenRecord, TokenSecret},
	clock::{Clock, SystemClock},
	config::BrokerConfig,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{IssuedToken, ProviderFuture},
	store::{CachedToken, DistributedCache, DurableStore, MemoryTier},
	tiers::{ClusterMode, StorageTierSet},
};

/// One token request, shared by both flow variants.
#[derive(Clone, Debug)]
pub struct TokenRequest {
	/// Identity triple of the requested token.
	pub key: TokenKey,
	/// App secret supplied inline (platform-credential variant).
	pub secret: Option<TokenSecret>,
	/// Authorization code for a first login (user variant).
	pub code: Option<String>,
	/// Access token the caller believed current.
	///
	/// During a lock-guarded refresh the winner re-reads the distributed cache: a cached
	/// value differing from `now_token` means another process already refreshed, and the
	/// cached value is adopted instead of calling the provider. Absent `now_token`, the
	/// remote fetch always proceeds.
	pub now_token: Option<String>,
	/// Forces a refresh even when a valid token is cached.
	pub force: bool,
	/// Returns expiry/refresh metadata alongside the access token.
	pub extended: bool,
}
impl TokenRequest {
	/// Creates a request for the provided identity triple.
	pub fn new(key: TokenKey) -> Self {
		Self { key, secret: None, code: None, now_token: None, force: false, extended: false }
	}

	/// Supplies the app secret inline.
	pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
		self.secret = Some(TokenSecret::new(secret));

		self
	}

	/// Supplies a first-login authorization code.
	pub fn with_code(mut self, code: impl Into<String>) -> Self {
		self.code = Some(code.into());

		self
	}

	/// Declares the access token the caller believed current.
	pub fn with_now_token(mut self, token: impl Into<String>) -> Self {
		self.now_token = Some(token.into());

		self
	}

	/// Forces the broker to bypass cached tokens.
	pub fn force_refresh(mut self) -> Self {
		self.force = true;

		self
	}

	/// Requests expiry/refresh metadata in the response.
	pub fn extended(mut self) -> Self {
		self.extended = true;

		self
	}
}

/// Token handed back to a caller.
///
/// By default only the bare access token is populated; metadata fields are filled for
/// [`TokenRequest::extended`] requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
	/// Current access token.
	pub access_token: String,
	/// Access expiry, extended requests only.
	pub access_expiry: Option<OffsetDateTime>,
	/// Refresh token, extended requests only (never an expired one).
	pub refresh_token: Option<String>,
	/// Refresh expiry, extended requests only.
	pub refresh_expiry: Option<OffsetDateTime>,
}
impl TokenGrant {
	fn from_record(record: &TokenRecord, extended: bool) -> Self {
		let access_token = record.access_token.expose().to_owned();

		if extended {
			Self {
				access_token,
				access_expiry: record.access_expiry,
				refresh_token: record.refresh_token.as_ref().map(|token| token.expose().to_owned()),
				refresh_expiry: record.refresh_expiry,
			}
		} else {
			Self { access_token, access_expiry: None, refresh_token: None, refresh_expiry: None }
		}
	}
}

/// Result of the tiered lookup, fed into the refresh path.
#[derive(Clone, Debug, Default)]
pub struct Lookup {
	/// Valid access token, when some tier produced one.
	pub token: Option<String>,
	/// Recovered record carrying credential/refresh material for a later refresh.
	pub record: Option<TokenRecord>,
}

/// Credential material resolved for one remote refresh.
#[derive(Clone, Debug)]
pub enum RefreshMaterials {
	/// Platform-credential pair.
	AppCredential {
		/// Application identifier (the key's subject).
		appid: String,
		/// Application secret.
		secret: TokenSecret,
	},
	/// First-login authorization code.
	AuthorizationCode(String),
	/// Live refresh token.
	RefreshToken(TokenSecret),
}

/// Capability contract a token variant supplies to the [`Broker`] engine.
pub trait TokenFlow
where
	Self: Send + Sync,
{
	/// Flow kind label for spans and metrics.
	fn kind(&self) -> FlowKind;

	/// Validates variant-specific request parameters.
	fn validate(&self, request: &TokenRequest) -> Result<()>;

	/// Resolves the material a remote refresh needs, or fails with the variant's
	/// credential error.
	fn refresh_materials(
		&self,
		request: &TokenRequest,
		prior: &Lookup,
		now: OffsetDateTime,
	) -> Result<RefreshMaterials>;

	/// Calls the platform adapter with the resolved material.
	fn fetch_remote<'a>(
		&'a self,
		request: &'a TokenRequest,
		materials: RefreshMaterials,
	) -> ProviderFuture<'a, IssuedToken>;

	/// Material for a sweep-driven refresh of `record`, or `None` to skip the entry.
	fn sweep_materials(
		&self,
		record: &TokenRecord,
		now: OffsetDateTime,
	) -> Option<RefreshMaterials>;
}

/// Token lifecycle controller for one flow variant.
///
/// Shares its memory tier and backends freely with sibling brokers (the cache key embeds
/// the platform, so records never collide). The storage tier set is resolved once at
/// build and reused for the process lifetime.
pub struct Broker {
	flow: Arc<dyn TokenFlow>,
	memory: Arc<MemoryTier>,
	cache: Option<Arc<dyn DistributedCache>>,
	relational: Option<Arc<dyn DurableStore>>,
	document: Option<Arc<dyn DurableStore>>,
	tiers: StorageTierSet,
	config: BrokerConfig,
	clock: Arc<dyn Clock>,
	flow_guards: Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>,
}
impl Broker {
	/// Starts building a broker for the provided flow variant.
	pub fn builder(flow: Arc<dyn TokenFlow>, config: BrokerConfig) -> BrokerBuilder {
		BrokerBuilder {
			flow,
			config,
			memory: None,
			cache: None,
			relational: None,
			document: None,
			clock: None,
		}
	}

	/// Resolved storage tier set.
	pub fn tiers(&self) -> StorageTierSet {
		self.tiers
	}

	/// Process-local memory tier.
	pub fn memory(&self) -> &Arc<MemoryTier> {
		&self.memory
	}

	/// Flow variant driving this broker.
	pub fn flow(&self) -> &Arc<dyn TokenFlow> {
		&self.flow
	}

	pub(crate) fn now(&self) -> OffsetDateTime {
		self.clock.now()
	}

	pub(crate) fn active_durable_stores(&self) -> Vec<&Arc<dyn DurableStore>> {
		let mut stores = Vec::new();

		if self.tiers.relational {
			if let Some(store) = &self.relational {
				stores.push(store);
			}
		}
		if self.tiers.document {
			if let Some(store) = &self.document {
				stores.push(store);
			}
		}

		stores
	}

	/// Returns a valid access token, refreshing through the lock-guarded path on
	/// miss/expiry or when the caller forces it.
	pub async fn get(&self, request: TokenRequest) -> Result<TokenGrant> {
		let kind = self.flow.kind();
		let span = FlowSpan::new(kind, "get");

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.flow.validate(&request)?;

				let lookup = self.lookup(&request).await?;

				if !request.force {
					if let (Some(_), Some(record)) = (&lookup.token, &lookup.record) {
						return Ok(TokenGrant::from_record(record, request.extended));
					}
				}

				self.refresh_inner(&request, lookup).await
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(kind, FlowOutcome::Failure),
		}

		result
	}

	/// Seeds a record into the active tiers without contacting the provider.
	///
	/// Used for pre-provisioning credentials (or importing an externally issued token);
	/// the next `get` then refreshes through the normal path.
	pub async fn seed(&self, record: TokenRecord) -> Result<()> {
		let now = self.clock.now();

		if self.tiers.memory {
			self.memory.merge(record.clone());
		}
		if self.tiers.relational {
			if let Some(store) = &self.relational {
				store.upsert(record.clone()).await?;
			}
		}
		if self.tiers.document {
			if let Some(store) = &self.document {
				store.upsert(record.clone()).await?;
			}
		}
		if self.tiers.distributed && record.is_valid_at(now) {
			self.publish_to_cache(&record, now).await?;
		}

		Ok(())
	}

	/// Consults memory, then the distributed cache, then the durable stores, stopping at
	/// the first valid hit. A miss still recovers whatever credential/refresh material
	/// the lower tiers hold, so the refresh path does not re-query them.
	async fn lookup(&self, request: &TokenRequest) -> Result<Lookup> {
		let now = self.clock.now();
		let key = request.key.cache_key();

		// 1 - process memory.
		if self.tiers.memory {
			if let Some(record) = self.memory.get(&key, now) {
				return Ok(Lookup {
					token: Some(record.access_token.expose().to_owned()),
					record: Some(record),
				});
			}
		}
		// 2 - distributed cache; entries expire with the token, so presence means valid.
		if let Some(cache) = &self.cache {
			if let Some(raw) = cache.get(key.as_str()).await? {
				let record =
					CachedToken::decode(&raw)?.into_record(request.key.clone()).sanitized_at(now);

				return Ok(Lookup {
					token: Some(record.access_token.expose().to_owned()),
					record: Some(record),
				});
			}
		}
		// 3 - durable stores, relational first.
		for store in [self.relational.as_ref(), self.document.as_ref()].into_iter().flatten() {
			if let Some(record) = store.fetch(&request.key).await? {
				let record = record.sanitized_at(now);

				if record.is_valid_at(now) {
					return Ok(Lookup {
						token: Some(record.access_token.expose().to_owned()),
						record: Some(record),
					});
				}

				// Stale row: keep it for its credential/refresh material.
				return Ok(Lookup { token: None, record: Some(record) });
			}
		}

		// No tier hit; the raw memory entry may still hold credential material.
		let record = if self.tiers.memory { self.memory.get_raw(&key) } else { None };

		Ok(Lookup { token: None, record: record.map(|record| record.sanitized_at(now)) })
	}

	fn flow_guard(&self, key: &CacheKey) -> Arc<AsyncMutex<()>> {
		let mut guards = self.flow_guards.lock();

		guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	fn cluster_cache(&self) -> Result<Option<&Arc<dyn DistributedCache>>> {
		match self.config.cluster_mode {
			ClusterMode::On => self.cache.as_ref().map(Some).ok_or(Error::ClusterUnavailable),
			ClusterMode::Auto => Ok(self.cache.as_ref()),
			ClusterMode::Off => Ok(None),
		}
	}
}
impl Debug for Broker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("flow", &self.flow.kind())
			.field("tiers", &self.tiers)
			.field("config", &self.config)
			.finish()
	}
}

/// Builder wiring a [`Broker`]'s backends together.
pub struct BrokerBuilder {
	flow: Arc<dyn TokenFlow>,
	config: BrokerConfig,
	memory: Option<Arc<MemoryTier>>,
	cache: Option<Arc<dyn DistributedCache>>,
	relational: Option<Arc<dyn DurableStore>>,
	document: Option<Arc<dyn DurableStore>>,
	clock: Option<Arc<dyn Clock>>,
}
impl BrokerBuilder {
	/// Shares an existing memory tier (sibling brokers should share one).
	pub fn memory(mut self, memory: Arc<MemoryTier>) -> Self {
		self.memory = Some(memory);

		self
	}

	/// Wires the distributed cache backend.
	pub fn distributed_cache(mut self, cache: Arc<dyn DistributedCache>) -> Self {
		self.cache = Some(cache);

		self
	}

	/// Wires the relational durable store.
	pub fn relational_store(mut self, store: Arc<dyn DurableStore>) -> Self {
		self.relational = Some(store);

		self
	}

	/// Wires the document durable store.
	pub fn document_store(mut self, store: Arc<dyn DurableStore>) -> Self {
		self.document = Some(store);

		self
	}

	/// Overrides the time source (defaults to the system clock).
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);

		self
	}

	/// Resolves the storage tier set and builds the broker.
	pub fn build(self) -> Broker {
		let tiers = StorageTierSet::resolve(
			&self.config.tier_policy,
			self.cache.is_some(),
			self.relational.is_some(),
			self.document.is_some(),
		);

		Broker {
			flow: self.flow,
			memory: self.memory.unwrap_or_default(),
			cache: self.cache,
			relational: self.relational,
			document: self.document,
			tiers,
			config: self.config,
			clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
			flow_guards: Mutex::new(HashMap::new()),
		}
	}
}
