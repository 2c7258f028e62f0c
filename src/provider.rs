//! Platform adapter contracts: the broker's only view of a remote identity provider.
//!
//! Per-platform wire clients live outside this crate; they plug in through these traits
//! and hand back a normalized [`IssuedToken`]. Adapters must signal transport failures
//! (non-success HTTP status, network errors) distinctly from provider-reported error
//! codes, and should carry their own bounded request timeout.

// self
use crate::{_prelude::*, auth::TokenKey};

/// Boxed future returned by platform adapters.
pub type ProviderFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, ProviderError>> + 'a + Send>>;

/// Normalized token response shared by both refresh variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedToken {
	/// Newly issued access token.
	pub access_token: String,
	/// Provider-reported lifetime in seconds; zero means the token never expires.
	pub lifetime_secs: u64,
	/// Rotated refresh token, user variant only.
	pub refresh_token: Option<String>,
	/// Refresh-token lifetime in seconds.
	pub refresh_lifetime_secs: Option<u64>,
}
impl IssuedToken {
	/// Creates a platform-credential response (token + lifetime only).
	pub fn new(access_token: impl Into<String>, lifetime_secs: u64) -> Self {
		Self {
			access_token: access_token.into(),
			lifetime_secs,
			refresh_token: None,
			refresh_lifetime_secs: None,
		}
	}

	/// Attaches a rotated refresh token and its lifetime.
	pub fn with_refresh(mut self, token: impl Into<String>, lifetime_secs: u64) -> Self {
		self.refresh_token = Some(token.into());
		self.refresh_lifetime_secs = Some(lifetime_secs);

		self
	}
}

/// Failure reported by a platform adapter.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ProviderError {
	/// Transport-level failure: network error or non-success HTTP status.
	#[error("Platform transport error (status {status:?}): {message}.")]
	Transport {
		/// HTTP status code, when one was received.
		status: Option<u16>,
		/// Human-readable error payload.
		message: String,
	},
	/// Provider-level rejection carrying the platform's own error code.
	#[error("Platform rejected the request ({code}): {message}.")]
	Rejected {
		/// Provider error code (e.g. Wechat's `40013`).
		code: String,
		/// Provider error message.
		message: String,
	},
}

/// Adapter for the platform-credential variant.
///
/// Exchanges a long-lived `(appid, secret)` pair for a short-lived access token.
pub trait AppCredentialProvider
where
	Self: Send + Sync,
{
	/// Requests a fresh token for the credential pair.
	fn fetch_token<'a>(&'a self, appid: &'a str, secret: &'a str)
	-> ProviderFuture<'a, IssuedToken>;
}

/// Adapter for the user-OAuth variant.
pub trait UserOauthProvider
where
	Self: Send + Sync,
{
	/// First login: exchanges an authorization code for a token pair.
	fn exchange_code<'a>(
		&'a self,
		key: &'a TokenKey,
		code: &'a str,
	) -> ProviderFuture<'a, IssuedToken>;

	/// Renewal: trades a live refresh token for a rotated token pair.
	fn refresh_token<'a>(
		&'a self,
		key: &'a TokenKey,
		refresh_token: &'a str,
	) -> ProviderFuture<'a, IssuedToken>;
}
