//! Cache orchestrator
//!
//! The only entry point the serving layer uses.
//!
//! # State Progression
//! EMPTY → REFRESHING → FRESH → STALE ↻
//!
//! - `get(false)` on a fresh entry returns it without touching the network
//! - otherwise one refresh cycle runs (login → discovery → bookings → grouping)
//!   and every caller arriving while it runs awaits that same cycle
//! - a failed cycle leaves the previous entry in place and serves it marked
//!   stale; with no previous entry the error goes back to the callers
//! - expiry is checked lazily on `get`, there is no timer
//!
//! Entries are immutable. A successful cycle builds a new [`CacheEntry`] and
//! swaps it in under the slot lock, so nobody can observe a half-built one.

use crate::error::RefreshError;
use crate::models::{AssetId, BookingOutcome, CacheEntry, CachedView, EntryMetadata};
use crate::services::asset_discovery::AssetDiscovery;
use crate::services::booking_fetcher::{BookingFetcher, BookingWindow, FetchResults};
use crate::services::grouping::group_and_sort;
use crate::services::session_client::SessionClient;
use crate::settings::{SyncSettings, MAX_CACHE_TTL};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use shedboard_common::time::{Clock, SystemClock};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::task::JoinError;
use tracing::{error, info, warn};

type SharedRefresh = Shared<BoxFuture<'static, Result<CachedView, RefreshError>>>;

/// Observable cache state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Empty,
    Refreshing,
    Fresh,
    Stale,
}

/// Health summary for the serving layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheHealth {
    pub is_cached: bool,
    pub state: CacheState,
    pub expires_at: Option<DateTime<Utc>>,
    /// Time since the cached cycle ran
    pub age_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Default)]
struct CacheSlot {
    current: Option<Arc<CacheEntry>>,
    in_flight: Option<SharedRefresh>,
    /// Error of the latest cycle, cleared by the next success
    last_error: Option<RefreshError>,
}

impl CacheSlot {
    fn fresh_entry(&self, now: DateTime<Utc>) -> Option<Arc<CacheEntry>> {
        if self.last_error.is_some() {
            return None;
        }
        self.current
            .as_ref()
            .filter(|entry| !entry.is_expired_at(now))
            .map(Arc::clone)
    }
}

/// One full login → discovery → fetch → group pass
struct RefreshPipeline {
    session_client: Arc<SessionClient>,
    discovery: AssetDiscovery,
    fetcher: BookingFetcher,
    window_days: u32,
    club_offset: FixedOffset,
}

impl RefreshPipeline {
    fn new(settings: &SyncSettings) -> Self {
        let session_client = Arc::new(SessionClient::new(settings));
        Self {
            discovery: AssetDiscovery::new(Arc::clone(&session_client)),
            fetcher: BookingFetcher::new(
                Arc::clone(&session_client),
                settings.batch_size,
                settings.batch_delay,
            ),
            session_client,
            window_days: settings.window_days,
            club_offset: settings.club_offset,
        }
    }

    async fn run(
        &self,
        clock: &dyn Clock,
        ttl: ChronoDuration,
    ) -> Result<CacheEntry, RefreshError> {
        let started = Instant::now();
        let cycle_at = clock.now();
        info!("Refresh cycle starting");

        let session = self.session_client.ensure_session().await?;
        let assets = self.discovery.discover(&session).await?;

        let window = BookingWindow::new(
            cycle_at.with_timezone(&self.club_offset).date_naive(),
            self.window_days,
        );
        let results = self.fetcher.fetch_all(&session, &assets, &window).await;

        if !assets.is_empty() && results.values().all(|r| r.is_err()) {
            return Err(RefreshError::AllFetchesFailed(assets.len()));
        }

        let bookings = into_outcomes(results);
        let metadata = EntryMetadata {
            asset_count: assets.len(),
            booking_count: bookings.values().map(|o| o.bookings().len()).sum(),
            failed_asset_count: bookings.values().filter(|o| o.is_failed()).count(),
            skipped_record_count: bookings.values().map(BookingOutcome::skipped).sum(),
            window_start: window.start,
            window_days: window.days,
            cycle_at,
            cycle_duration_ms: started.elapsed().as_millis() as u64,
        };

        Ok(CacheEntry {
            assets: group_and_sort(assets),
            bookings,
            expires_at: expiry_after(clock.now(), ttl),
            metadata,
        })
    }
}

/// `now + ttl`, saturating at the latest representable instant
fn expiry_after(now: DateTime<Utc>, ttl: ChronoDuration) -> DateTime<Utc> {
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn into_outcomes(results: FetchResults) -> BTreeMap<AssetId, BookingOutcome> {
    results
        .into_iter()
        .map(|(asset_id, result)| {
            let outcome = match result {
                Ok(calendar) => BookingOutcome::Loaded {
                    bookings: calendar.bookings,
                    skipped: calendar.skipped,
                },
                Err(e) => BookingOutcome::Failed {
                    error: e.to_string(),
                },
            };
            (asset_id, outcome)
        })
        .collect()
}

struct Inner {
    pipeline: RefreshPipeline,
    clock: Arc<dyn Clock>,
    ttl: ChronoDuration,
    slot: Mutex<CacheSlot>,
}

impl Inner {
    fn lock_slot(&self) -> MutexGuard<'_, CacheSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run a cycle and publish its outcome
    async fn refresh(self: Arc<Self>) -> Result<CachedView, RefreshError> {
        let outcome = self.pipeline.run(self.clock.as_ref(), self.ttl).await;
        self.publish(outcome)
    }

    /// Result of the spawned cycle task
    ///
    /// A task that died before publishing counts as a failed cycle.
    fn settle(
        &self,
        joined: Result<Result<CachedView, RefreshError>, JoinError>,
    ) -> Result<CachedView, RefreshError> {
        match joined {
            Ok(result) => result,
            Err(join_error) => self.publish(Err(RefreshError::Aborted(join_error.to_string()))),
        }
    }

    fn publish(&self, outcome: Result<CacheEntry, RefreshError>) -> Result<CachedView, RefreshError> {
        let mut slot = self.lock_slot();
        slot.in_flight = None;

        match outcome {
            Ok(entry) => {
                let entry = Arc::new(entry);
                info!(
                    assets = entry.metadata.asset_count,
                    bookings = entry.metadata.booking_count,
                    failed_assets = entry.metadata.failed_asset_count,
                    duration_ms = entry.metadata.cycle_duration_ms,
                    expires_at = %entry.expires_at,
                    "Cache entry published"
                );
                slot.current = Some(Arc::clone(&entry));
                slot.last_error = None;
                Ok(CachedView::fresh(entry))
            }
            Err(e) => {
                slot.last_error = Some(e.clone());
                match slot.current.as_ref() {
                    Some(previous) => {
                        warn!(error = %e, "Refresh failed, serving stale entry");
                        Ok(CachedView::stale(Arc::clone(previous), Some(e.to_string())))
                    }
                    None => {
                        error!(error = %e, "Refresh failed with nothing cached");
                        Err(e)
                    }
                }
            }
        }
    }
}

/// Cache orchestrator service
#[derive(Clone)]
pub struct CacheOrchestrator {
    inner: Arc<Inner>,
}

impl CacheOrchestrator {
    pub fn new(settings: &SyncSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: &SyncSettings, clock: Arc<dyn Clock>) -> Self {
        let ttl = ChronoDuration::from_std(settings.cache_ttl.min(MAX_CACHE_TTL))
            .unwrap_or_else(|_| ChronoDuration::days(365));

        Self {
            inner: Arc::new(Inner {
                pipeline: RefreshPipeline::new(settings),
                clock,
                ttl,
                slot: Mutex::new(CacheSlot::default()),
            }),
        }
    }

    /// Return the cached dataset, refreshing first if it is missing, stale or `force_refresh` is set
    ///
    /// Errors only when a refresh fails and nothing was ever cached.
    pub async fn get(&self, force_refresh: bool) -> Result<CachedView, RefreshError> {
        let refresh = {
            let mut slot = self.inner.lock_slot();

            if !force_refresh {
                if let Some(entry) = slot.fresh_entry(self.inner.clock.now()) {
                    return Ok(CachedView::fresh(entry));
                }
            }

            match slot.in_flight.as_ref() {
                Some(in_flight) => in_flight.clone(),
                None => {
                    let refresh = self.start_refresh();
                    slot.in_flight = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }

    /// Spawn a refresh cycle
    ///
    /// The cycle runs as its own task, so callers giving up on `get` do not
    /// cancel it halfway.
    fn start_refresh(&self) -> SharedRefresh {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(Arc::clone(&inner).refresh());

        async move { inner.settle(handle.await) }.boxed().shared()
    }

    pub fn state(&self) -> CacheState {
        let slot = self.inner.lock_slot();
        let now = self.inner.clock.now();

        if slot.in_flight.is_some() {
            return CacheState::Refreshing;
        }
        match slot.current.as_ref() {
            None => CacheState::Empty,
            Some(_) if slot.fresh_entry(now).is_some() => CacheState::Fresh,
            Some(_) => CacheState::Stale,
        }
    }

    pub fn health(&self) -> CacheHealth {
        let state = self.state();
        let slot = self.inner.lock_slot();
        let now = self.inner.clock.now();

        CacheHealth {
            is_cached: slot.current.is_some(),
            state,
            expires_at: slot.current.as_ref().map(|entry| entry.expires_at),
            age_ms: slot.current.as_ref().map(|entry| {
                (now - entry.metadata.cycle_at).num_milliseconds().max(0) as u64
            }),
            last_error: slot.last_error.as_ref().map(|e| e.to_string()),
        }
    }
}
