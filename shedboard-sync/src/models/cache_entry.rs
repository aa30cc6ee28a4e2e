//! Published cache snapshots

use super::{AssetId, BookingOutcome};
use crate::services::grouping::GroupedAssets;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable snapshot produced by one successful refresh cycle
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub assets: GroupedAssets,
    pub bookings: BTreeMap<AssetId, BookingOutcome>,
    pub expires_at: DateTime<Utc>,
    pub metadata: EntryMetadata,
}

/// Cycle statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryMetadata {
    pub asset_count: usize,
    pub booking_count: usize,
    pub failed_asset_count: usize,
    pub skipped_record_count: usize,
    pub window_start: NaiveDate,
    pub window_days: u32,
    pub cycle_at: DateTime<Utc>,
    pub cycle_duration_ms: u64,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// What callers of the orchestrator receive
#[derive(Debug, Clone, Serialize)]
pub struct CachedView {
    pub entry: Arc<CacheEntry>,
    /// Set when a refresh could not replace this entry
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_reason: Option<String>,
}

impl CachedView {
    pub fn fresh(entry: Arc<CacheEntry>) -> Self {
        Self {
            entry,
            stale: false,
            stale_reason: None,
        }
    }

    pub fn stale(entry: Arc<CacheEntry>, reason: Option<String>) -> Self {
        Self {
            entry,
            stale: true,
            stale_reason: reason,
        }
    }
}
