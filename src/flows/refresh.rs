//! Lock-guarded refresh path shared by every flow variant.
//!
//! Ordering per key: in-process singleflight guard first, then the distributed lock, then
//! a winner-side cache re-read. A holder whose `now_token` differs from the re-read value
//! adopts the rotated token instead of calling the provider, so each expiry costs the
//! cluster exactly one remote exchange.

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	expiry,
	flows::{Broker, Lookup, RefreshMaterials, TokenGrant, TokenRequest},
	lock::RefreshLock,
	obs::{self, FlowOutcome, FlowSpan},
	provider::IssuedToken,
	store::{CachedToken, DistributedCache},
};

impl Broker {
	/// Runs the lock-guarded refresh path directly, bypassing the tiered lookup.
	///
	/// `prior` carries whatever credential/refresh material the caller already holds; the
	/// sweep feeds the stale record itself.
	pub async fn refresh(&self, request: TokenRequest, prior: Lookup) -> Result<TokenGrant> {
		let kind = self.flow.kind();
		let span = FlowSpan::new(kind, "refresh");

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let result = span.instrument(self.refresh_inner(&request, prior)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(kind, FlowOutcome::Failure),
		}

		result
	}

	pub(crate) async fn refresh_inner(
		&self,
		request: &TokenRequest,
		prior: Lookup,
	) -> Result<TokenGrant> {
		self.flow.validate(request)?;

		let key = request.key.cache_key();
		let guard = self.flow_guard(&key);
		let _singleflight = guard.lock().await;

		// Another task in this process may have finished the same refresh while this one
		// waited on the guard.
		if !request.force && self.tiers.memory {
			if let Some(record) = self.memory.get(&key, self.now()) {
				return Ok(TokenGrant::from_record(&record, request.extended));
			}
		}

		let Some(cache) = self.cluster_cache()? else {
			return self.refresh_remote(request, &prior).await;
		};
		let lock =
			RefreshLock::new(cache.clone(), self.config.lock_ttl(), self.config.lock_wait_timeout());
		// A timeout here is a hard failure; no tier is touched without the lock.
		let lease = lock.acquire(&key.lock_key()).await?;
		let outcome = self.refresh_locked(request, &prior, cache).await;

		if let Err(err) = lock.release(lease).await {
			tracing::warn!(key = %key, error = %err, "refresh lock release failed");
		}

		outcome
	}

	/// Refresh body executed while holding the distributed lock.
	async fn refresh_locked(
		&self,
		request: &TokenRequest,
		prior: &Lookup,
		cache: &Arc<dyn DistributedCache>,
	) -> Result<TokenGrant> {
		let key = request.key.cache_key();

		// Re-read under the lock: a cached value differing from the caller's `now_token`
		// means another process already rotated the token. Without `now_token` there is
		// nothing to compare against and the remote fetch proceeds.
		if let Some(now_token) = &request.now_token {
			if let Some(raw) = cache.get(key.as_str()).await? {
				let cached = CachedToken::decode(&raw)?;

				if cached.access_token != *now_token {
					return Ok(self.adopt_rotated(request, cached));
				}
			}
		}

		self.refresh_remote(request, prior).await
	}

	/// Adopts a token rotated by another process: memory-only write under the
	/// cluster-local TTL, no provider call, no durable write (the winner did that).
	fn adopt_rotated(&self, request: &TokenRequest, cached: CachedToken) -> TokenGrant {
		let now = self.now();
		let record = cached.into_record(request.key.clone()).sanitized_at(now);

		tracing::debug!(key = %request.key, "adopting token rotated by another process");

		if self.tiers.memory {
			let mut local = record.clone();

			local.access_expiry = Some(now + self.config.cluster_local_ttl());

			self.memory.merge(local);
		}

		TokenGrant::from_record(&record, request.extended)
	}

	async fn refresh_remote(&self, request: &TokenRequest, prior: &Lookup) -> Result<TokenGrant> {
		let materials = self.resolve_materials(request, prior).await?;
		let issued = self.flow.fetch_remote(request, materials.clone()).await?;
		// Lifetimes anchor at the response time, not the request time.
		let now = self.now();
		let record = self.normalize(request, &materials, issued, now);

		self.persist(&record, now).await?;

		Ok(TokenGrant::from_record(&record, request.extended))
	}

	/// Resolves refresh material, walking every tier that may hold it.
	///
	/// The flow first sees the request parameters and the prior lookup; when those fail,
	/// the remaining tiers are consulted one record at a time. The prior hit may have
	/// come from a tier that strips credential material (the distributed cache never
	/// carries secrets), while a durable row or the raw memory entry still holds it.
	async fn resolve_materials(
		&self,
		request: &TokenRequest,
		prior: &Lookup,
	) -> Result<RefreshMaterials> {
		let now = self.now();
		let err = match self.flow.refresh_materials(request, prior, now) {
			Ok(materials) => return Ok(materials),
			Err(err) => err,
		};

		for record in self.fallback_records(request).await? {
			let fallback = Lookup { token: None, record: Some(record) };

			if let Ok(materials) = self.flow.refresh_materials(request, &fallback, now) {
				return Ok(materials);
			}
		}

		Err(err)
	}

	/// Candidate records for material recovery: durable rows first, relational before
	/// document, then the raw memory entry.
	async fn fallback_records(&self, request: &TokenRequest) -> Result<Vec<TokenRecord>> {
		let now = self.now();
		let mut records = Vec::new();

		for store in [self.relational.as_ref(), self.document.as_ref()].into_iter().flatten() {
			if let Some(record) = store.fetch(&request.key).await? {
				records.push(record.sanitized_at(now));
			}
		}
		if self.tiers.memory {
			if let Some(record) = self.memory.get_raw(&request.key.cache_key()) {
				records.push(record.sanitized_at(now));
			}
		}

		Ok(records)
	}

	/// Converts provider-reported lifetimes into absolute expiries, shortened by the
	/// premature-failure margin, and re-attaches credential material for later refreshes.
	fn normalize(
		&self,
		request: &TokenRequest,
		materials: &RefreshMaterials,
		issued: IssuedToken,
		now: OffsetDateTime,
	) -> TokenRecord {
		let margin = self.config.premature_margin();
		let mut record = TokenRecord::new(request.key.clone(), issued.access_token)
			.with_access_expiry(expiry::absolute_expiry(issued.lifetime_secs, margin, now));

		if let Some(refresh) = issued.refresh_token {
			record = record.with_refresh_token(refresh).with_refresh_expiry(
				issued
					.refresh_lifetime_secs
					.and_then(|secs| expiry::absolute_expiry(secs, margin, now)),
			);
		}
		if let RefreshMaterials::AppCredential { secret, .. } = materials {
			record = record.with_secret(secret.expose());
		}

		record
	}

	/// Writes the normalized record to every active tier.
	async fn persist(&self, record: &TokenRecord, now: OffsetDateTime) -> Result<()> {
		if self.tiers.memory {
			let mut local = record.clone();

			// While a distributed cache is in play, a sibling process may rotate the
			// token before its real expiry; the local copy must go stale first.
			if self.cluster_cache()?.is_some() {
				let local_expiry = now + self.config.cluster_local_ttl();

				local.access_expiry =
					Some(local.access_expiry.map_or(local_expiry, |at| at.min(local_expiry)));
			}

			self.memory.merge(local);
		}
		if self.tiers.distributed {
			self.publish_to_cache(record, now).await?;
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

		Ok(())
	}

	/// Publishes `record` to the distributed cache with a TTL matching its expiry.
	///
	/// Records without an expiry are not published: a cache entry needs a TTL, and memory
	/// plus the durable stores already keep non-expiring tokens.
	pub(crate) async fn publish_to_cache(
		&self,
		record: &TokenRecord,
		now: OffsetDateTime,
	) -> Result<()> {
		let Some(cache) = &self.cache else {
			return Ok(());
		};
		let Some(at) = record.access_expiry else {
			return Ok(());
		};
		let ttl = expiry::cache_ttl_secs(at, now);

		if ttl == 0 {
			return Ok(());
		}

		cache
			.set_with_ttl(
				record.key.cache_key().as_str(),
				CachedToken::from_record(record).encode()?,
				ttl,
			)
			.await?;

		Ok(())
	}
}
