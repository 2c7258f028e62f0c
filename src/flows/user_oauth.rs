//! User-OAuth variant: a first login exchanges an authorization code; later refreshes
//! trade the rotated refresh token. No usable material means the user must come back.

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	flows::{Lookup, RefreshMaterials, TokenFlow, TokenRequest},
	obs::FlowKind,
	provider::{IssuedToken, ProviderError, ProviderFuture, UserOauthProvider},
};

/// Token flow for per-user OAuth tokens.
pub struct UserOauthFlow {
	provider: Arc<dyn UserOauthProvider>,
}
impl UserOauthFlow {
	/// Creates the flow over a platform adapter.
	pub fn new(provider: Arc<dyn UserOauthProvider>) -> Self {
		Self { provider }
	}
}
impl Debug for UserOauthFlow {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UserOauthFlow").finish()
	}
}
impl TokenFlow for UserOauthFlow {
	fn kind(&self) -> FlowKind {
		FlowKind::UserOauth
	}

	fn validate(&self, request: &TokenRequest) -> Result<()> {
		if matches!(request.code.as_deref(), Some("")) {
			return Err(Error::Validation { field: "code" });
		}

		Ok(())
	}

	fn refresh_materials(
		&self,
		request: &TokenRequest,
		prior: &Lookup,
		now: OffsetDateTime,
	) -> Result<RefreshMaterials> {
		// A first-login code always wins over stored refresh material.
		if let Some(code) = &request.code {
			return Ok(RefreshMaterials::AuthorizationCode(code.clone()));
		}

		prior
			.record
			.as_ref()
			.filter(|record| record.has_usable_refresh_token(now))
			.and_then(|record| record.refresh_token.clone())
			.map(RefreshMaterials::RefreshToken)
			.ok_or(Error::ReauthenticationRequired)
	}

	fn fetch_remote<'a>(
		&'a self,
		request: &'a TokenRequest,
		materials: RefreshMaterials,
	) -> ProviderFuture<'a, IssuedToken> {
		Box::pin(async move {
			match materials {
				RefreshMaterials::AuthorizationCode(code) =>
					self.provider.exchange_code(&request.key, &code).await,
				RefreshMaterials::RefreshToken(token) =>
					self.provider.refresh_token(&request.key, token.expose()).await,
				// App-credential material cannot drive a user exchange.
				RefreshMaterials::AppCredential { .. } => Err(ProviderError::Rejected {
					code: "invalid_materials".into(),
					message: "user-oauth flow received app-credential material".into(),
				}),
			}
		})
	}

	fn sweep_materials(
		&self,
		record: &TokenRecord,
		now: OffsetDateTime,
	) -> Option<RefreshMaterials> {
		record
			.has_usable_refresh_token(now)
			.then(|| record.refresh_token.clone())
			.flatten()
			.map(RefreshMaterials::RefreshToken)
	}
}
