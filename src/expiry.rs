//! Expiry arithmetic shared by every tier.
//!
//! All lifetimes and TTLs crossing a tier boundary are whole seconds; all instants are UTC.
//! The premature-failure margin makes the cached copy go stale slightly before the provider
//! invalidates the real token, so a refresh always finishes while the old token still works.
//! The margin must stay below the provider's real lifetime or every token looks expired.

// self
use crate::_prelude::*;

/// Converts a remote-reported lifetime into an absolute expiry instant.
///
/// Returns `None` for a zero lifetime, which providers use for tokens without expiry.
pub fn absolute_expiry(
	lifetime_secs: u64,
	margin: Duration,
	now: OffsetDateTime,
) -> Option<OffsetDateTime> {
	if lifetime_secs == 0 {
		return None;
	}

	let lifetime = Duration::seconds(lifetime_secs.min(i64::MAX as u64) as i64);

	Some(now + lifetime - margin)
}

/// Returns `true` iff `expiry` is set and has passed.
///
/// An absent expiry means "never expires" for this predicate.
pub fn is_expired(expiry: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
	matches!(expiry, Some(at) if at <= now)
}

/// Remaining whole seconds until `expiry`, clamped to zero.
///
/// Used as the distributed cache TTL so the cache entry dies together with the token.
pub fn cache_ttl_secs(expiry: OffsetDateTime, now: OffsetDateTime) -> u64 {
	let remaining = expiry - now;

	if remaining.is_positive() { remaining.whole_seconds() as u64 } else { 0 }
}
