//! Canonical token record shared by every storage tier.

// self
use crate::{_prelude::*, auth::{key::TokenKey, secret::TokenSecret}, expiry};

/// One cached token identified by its [`TokenKey`].
///
/// Created on the first successful refresh, mutated in place on every later refresh, and
/// never explicitly deleted—records go stale by expiry and are superseded by the next
/// refresh. Platform-credential records also carry the app `secret` so the broker can
/// re-derive credentials when the token itself is missing (the appid is the key's
/// subject). User records carry the rotated refresh token and its expiry.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenRecord {
	/// Identity triple of this record.
	pub key: TokenKey,
	/// Current access token; an empty value marks a credential-only seed record.
	pub access_token: TokenSecret,
	/// Absolute access expiry; `None` means the token never expires.
	pub access_expiry: Option<OffsetDateTime>,
	/// Refresh token, if the platform issued one (user variant only).
	pub refresh_token: Option<TokenSecret>,
	/// Absolute refresh-token expiry.
	pub refresh_expiry: Option<OffsetDateTime>,
	/// App secret retained for platform-credential refreshes.
	pub secret: Option<TokenSecret>,
}
impl TokenRecord {
	/// Creates a record holding just an access token.
	pub fn new(key: TokenKey, access_token: impl Into<String>) -> Self {
		Self {
			key,
			access_token: TokenSecret::new(access_token),
			access_expiry: None,
			refresh_token: None,
			refresh_expiry: None,
			secret: None,
		}
	}

	/// Creates a credential-only seed record (no token yet).
	pub fn seed(key: TokenKey, secret: impl Into<String>) -> Self {
		let mut record = Self::new(key, "");

		record.secret = Some(TokenSecret::new(secret));

		record
	}

	/// Sets the absolute access expiry.
	pub fn with_access_expiry(mut self, expiry: Option<OffsetDateTime>) -> Self {
		self.access_expiry = expiry;

		self
	}

	/// Sets the refresh token.
	pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the absolute refresh-token expiry.
	pub fn with_refresh_expiry(mut self, expiry: Option<OffsetDateTime>) -> Self {
		self.refresh_expiry = expiry;

		self
	}

	/// Sets the app secret.
	pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
		self.secret = Some(TokenSecret::new(secret));

		self
	}

	/// Returns `true` if the record holds a non-empty access token that has not expired.
	pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
		!self.access_token.expose().is_empty() && !expiry::is_expired(self.access_expiry, now)
	}

	/// Returns `true` if the record must trigger a refresh before use.
	pub fn is_stale_at(&self, now: OffsetDateTime) -> bool {
		!self.is_valid_at(now)
	}

	/// Returns `true` if the refresh token exists and has not expired.
	pub fn has_usable_refresh_token(&self, now: OffsetDateTime) -> bool {
		self.refresh_token.is_some() && !expiry::is_expired(self.refresh_expiry, now)
	}

	/// Returns a copy with an expired refresh token nulled out.
	///
	/// A present-but-expired refresh token must never reach a caller.
	pub fn sanitized_at(mut self, now: OffsetDateTime) -> Self {
		if self.refresh_token.is_some() && expiry::is_expired(self.refresh_expiry, now) {
			self.refresh_token = None;
			self.refresh_expiry = None;
		}

		self
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("key", &self.key)
			.field("access_token", &"<redacted>")
			.field("access_expiry", &self.access_expiry)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_expiry", &self.refresh_expiry)
			.field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}
