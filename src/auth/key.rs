//! Identity triple and deterministic cache-key derivation.

// self
use crate::{
	_prelude::*,
	auth::id::{PlatformId, ProjectId, SubjectId},
};

/// Prefix that turns a value cache key into its companion lock key.
const LOCK_PREFIX: &str = "lock_";

/// Identity triple `(project, platform, subject)` naming one token record.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct TokenKey {
	/// Project that owns the record.
	pub project: ProjectId,
	/// Issuing platform.
	pub platform: PlatformId,
	/// App identifier (platform-credential) or user identifier (user tokens).
	pub subject: SubjectId,
}
impl TokenKey {
	/// Builds a key from the identity triple.
	pub fn new(project: ProjectId, platform: PlatformId, subject: SubjectId) -> Self {
		Self { project, platform, subject }
	}

	/// Derives the cache key shared by every tier.
	pub fn cache_key(&self) -> CacheKey {
		CacheKey(format!("{}_{}_{}", self.project, self.platform, self.subject))
	}
}
impl Display for TokenKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}/{}/{}", self.project, self.platform, self.subject)
	}
}

/// Deterministic string key `project_platform_subject`.
///
/// The same derivation keys the memory tier, the distributed cache, and (prefixed) the
/// refresh lock: two requests with an equal key serialize their remote refresh, while
/// different keys never block each other.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct CacheKey(String);
impl CacheKey {
	/// Returns the key's string view.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Returns the companion lock key (`lock_` + value key).
	pub fn lock_key(&self) -> String {
		format!("{LOCK_PREFIX}{}", self.0)
	}
}
impl AsRef<str> for CacheKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
