//! Platform-credential variant: a long-lived `(appid, secret)` pair buys short-lived
//! access tokens, Wechat/Feishu style. The appid is the key's subject.

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	flows::{Lookup, RefreshMaterials, TokenFlow, TokenRequest},
	obs::FlowKind,
	provider::{AppCredentialProvider, IssuedToken, ProviderError, ProviderFuture},
};

/// Token flow refreshing with an app credential pair.
pub struct AppCredentialFlow {
	provider: Arc<dyn AppCredentialProvider>,
}
impl AppCredentialFlow {
	/// Creates the flow over a platform adapter.
	pub fn new(provider: Arc<dyn AppCredentialProvider>) -> Self {
		Self { provider }
	}
}
impl Debug for AppCredentialFlow {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AppCredentialFlow").finish()
	}
}
impl TokenFlow for AppCredentialFlow {
	fn kind(&self) -> FlowKind {
		FlowKind::AppCredential
	}

	fn validate(&self, request: &TokenRequest) -> Result<()> {
		if matches!(request.secret.as_ref(), Some(secret) if secret.expose().is_empty()) {
			return Err(Error::Validation { field: "secret" });
		}

		Ok(())
	}

	fn refresh_materials(
		&self,
		request: &TokenRequest,
		prior: &Lookup,
		_now: OffsetDateTime,
	) -> Result<RefreshMaterials> {
		let appid = request.key.subject.to_string();
		// Resolution order: inline request parameter, then whatever credential the tiered
		// lookup recovered from storage.
		let secret = request
			.secret
			.clone()
			.or_else(|| prior.record.as_ref().and_then(|record| record.secret.clone()))
			.ok_or_else(|| Error::MissingCredential { appid: appid.clone() })?;

		Ok(RefreshMaterials::AppCredential { appid, secret })
	}

	fn fetch_remote<'a>(
		&'a self,
		_request: &'a TokenRequest,
		materials: RefreshMaterials,
	) -> ProviderFuture<'a, IssuedToken> {
		Box::pin(async move {
			match materials {
				RefreshMaterials::AppCredential { appid, secret } =>
					self.provider.fetch_token(&appid, secret.expose()).await,
				// User-flow material cannot drive a credential exchange.
				_ => Err(ProviderError::Rejected {
					code: "invalid_materials".into(),
					message: "app-credential flow received user-flow material".into(),
				}),
			}
		})
	}

	fn sweep_materials(
		&self,
		record: &TokenRecord,
		_now: OffsetDateTime,
	) -> Option<RefreshMaterials> {
		let secret = record.secret.clone()?;

		Some(RefreshMaterials::AppCredential { appid: record.key.subject.to_string(), secret })
	}
}
