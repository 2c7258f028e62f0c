//! Tiered access-token broker—layered memory/distributed-cache/durable lookups, cluster-safe
//! refresh locks, and background expiry sweeps behind one polymorphic flow contract.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod expiry;
pub mod flows;
pub mod lock;
pub mod obs;
pub mod provider;
pub mod store;
pub mod sweep;
pub mod tiers;

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}

#[cfg(test)] use color_eyre as _;
