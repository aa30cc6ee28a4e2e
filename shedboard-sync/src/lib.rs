//! shedboard-sync library interface
//!
//! Keeps a local read model of the club's boat-booking site: logs in,
//! discovers the fleet, fetches a week of bookings per boat, groups the
//! boats for display and serves the result from a single-flight cache.
//!
//! [`CacheOrchestrator`] is the entry point for the serving layer.

pub mod error;
pub mod models;
pub mod services;
pub mod settings;
pub mod utils;

pub use crate::error::RefreshError;
pub use crate::models::{CacheEntry, CachedView};
pub use crate::services::{CacheHealth, CacheOrchestrator, CacheState};
pub use crate::settings::SyncSettings;
