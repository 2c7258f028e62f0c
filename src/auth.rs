//! Identity types, cache-key derivation, and the canonical token record.

pub mod id;
pub mod key;
pub mod record;
pub mod secret;

pub use id::{IdentifierError, PlatformId, ProjectId, SubjectId};
pub use key::{CacheKey, TokenKey};
pub use record::TokenRecord;
pub use secret::TokenSecret;
