//! Bookings fetched per boat

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// A single booking in club-local wall-clock time
///
/// `start < end` always holds; records violating it are dropped at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub member_name: String,
}

/// Result of fetching one boat's calendar within a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BookingOutcome {
    Loaded {
        bookings: Vec<Booking>,
        /// Malformed records dropped while parsing
        skipped: usize,
    },
    Failed {
        error: String,
    },
}

impl BookingOutcome {
    pub fn bookings(&self) -> &[Booking] {
        match self {
            BookingOutcome::Loaded { bookings, .. } => bookings,
            BookingOutcome::Failed { .. } => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, BookingOutcome::Failed { .. })
    }

    pub fn skipped(&self) -> usize {
        match self {
            BookingOutcome::Loaded { skipped, .. } => *skipped,
            BookingOutcome::Failed { .. } => 0,
        }
    }
}
