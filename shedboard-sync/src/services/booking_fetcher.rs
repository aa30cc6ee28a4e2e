//! Per-boat booking calendar fetcher
//!
//! One request per boat, issued in batches: requests inside a batch run
//! concurrently, batches run one after another with a pause in between so
//! the upstream rate limiter stays quiet. A failing boat only affects its own
//! entry in the result map.

use crate::models::{Asset, AssetId, Booking};
use crate::services::session_client::{RequestError, Session, SessionClient};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use futures::future::join_all;
use reqwest::Method;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CALENDAR_PATH_PREFIX: &str = "/bookings/retrieve-calendar";

const WINDOW_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Per-boat fetch failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Upstream returned status {0}")]
    Status(u16),

    #[error("Malformed calendar payload: {0}")]
    Malformed(String),
}

impl From<RequestError> for FetchError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Timeout(msg) => FetchError::Timeout(msg),
            other => FetchError::Request(other.to_string()),
        }
    }
}

/// Half-open range of club-local days `[start, start + days)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingWindow {
    pub start: NaiveDate,
    pub days: u32,
}

impl BookingWindow {
    pub fn new(start: NaiveDate, days: u32) -> Self {
        Self { start, days }
    }

    /// First day after the window
    pub fn end(&self) -> NaiveDate {
        self.start + ChronoDuration::days(i64::from(self.days))
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let midnight = |day: NaiveDate| day.and_hms_opt(0, 0, 0).map(|dt| dt.format(WINDOW_TIME_FORMAT).to_string());
        vec![
            ("start", midnight(self.start).unwrap_or_default()),
            ("end", midnight(self.end()).unwrap_or_default()),
        ]
    }
}

/// Bookings parsed from one calendar response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetCalendar {
    pub bookings: Vec<Booking>,
    /// Records dropped as malformed
    pub skipped: usize,
}

/// Fetch results keyed by boat
pub type FetchResults = BTreeMap<AssetId, Result<AssetCalendar, FetchError>>;

#[derive(Debug, Deserialize)]
struct RawBooking {
    start: Option<String>,
    end: Option<String>,
    title: Option<String>,
    #[serde(alias = "memberName")]
    member_name: Option<String>,
    #[serde(rename = "extendedProps")]
    extended_props: Option<RawExtendedProps>,
}

#[derive(Debug, Deserialize)]
struct RawExtendedProps {
    #[serde(alias = "memberName")]
    member_name: Option<String>,
}

/// Parse a calendar response body
///
/// The body must be a JSON array. Individual records that cannot be turned
/// into a [`Booking`] are skipped and counted.
pub fn parse_calendar(body: &str) -> Result<AssetCalendar, FetchError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    let serde_json::Value::Array(records) = value else {
        return Err(FetchError::Malformed("expected a JSON array of bookings".to_string()));
    };

    let mut calendar = AssetCalendar::default();
    for record in records {
        match serde_json::from_value::<RawBooking>(record)
            .ok()
            .and_then(booking_from_raw)
        {
            Some(booking) => calendar.bookings.push(booking),
            None => calendar.skipped += 1,
        }
    }

    calendar
        .bookings
        .sort_by(|a, b| (a.date, a.start).cmp(&(b.date, b.start)));
    Ok(calendar)
}

fn booking_from_raw(raw: RawBooking) -> Option<Booking> {
    let start = parse_local_datetime(raw.start.as_deref()?)?;
    let end = parse_local_datetime(raw.end.as_deref()?)?;

    // Same-day bookings only; anything else is not something a member can book
    if start.date() != end.date() || start >= end {
        return None;
    }

    let member_name = raw
        .extended_props
        .and_then(|props| props.member_name)
        .or(raw.member_name)
        .or(raw.title)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())?;

    Some(Booking {
        date: start.date(),
        start: start.time(),
        end: end.time(),
        member_name,
    })
}

/// Parse a wall-clock timestamp, ignoring any offset suffix
fn parse_local_datetime(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
    ];

    let s = s.trim();
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_local()))
}

/// Booking fetcher service
pub struct BookingFetcher {
    session_client: Arc<SessionClient>,
    batch_size: usize,
    batch_delay: Duration,
}

impl BookingFetcher {
    pub fn new(session_client: Arc<SessionClient>, batch_size: usize, batch_delay: Duration) -> Self {
        Self {
            session_client,
            batch_size: batch_size.max(1),
            batch_delay,
        }
    }

    /// Fetch every boat's calendar for `window`
    ///
    /// Never fails as a whole: each boat gets its own `Ok` or `Err` entry.
    pub async fn fetch_all(
        &self,
        session: &Arc<Session>,
        assets: &[Asset],
        window: &BookingWindow,
    ) -> FetchResults {
        let start_time = Instant::now();
        let mut results = FetchResults::new();

        for (batch_idx, batch) in assets.chunks(self.batch_size).enumerate() {
            if batch_idx > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            debug!(batch = batch_idx, size = batch.len(), "Fetching booking batch");

            let fetches = batch.iter().map(|asset| async move {
                (asset.id, self.fetch_one(session, asset.id, window).await)
            });

            for (asset_id, result) in join_all(fetches).await {
                if let Err(e) = &result {
                    warn!(asset_id, error = %e, "Booking fetch failed");
                }
                results.insert(asset_id, result);
            }
        }

        let failed = results.values().filter(|r| r.is_err()).count();
        info!(
            assets = assets.len(),
            failed,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Booking fetch complete"
        );
        results
    }

    async fn fetch_one(
        &self,
        session: &Arc<Session>,
        asset_id: AssetId,
        window: &BookingWindow,
    ) -> Result<AssetCalendar, FetchError> {
        let path = format!("{}/{}", CALENDAR_PATH_PREFIX, asset_id);
        let response = self
            .session_client
            .request(session, Method::GET, &path, &window.query())
            .await?;

        if !response.status.is_success() {
            return Err(FetchError::Status(response.status.as_u16()));
        }

        let calendar = parse_calendar(&response.body)?;
        if calendar.skipped > 0 {
            debug!(asset_id, skipped = calendar.skipped, "Skipped malformed booking records");
        }
        Ok(calendar)
    }
}
