//! Data models for the booking mirror

pub mod asset;
pub mod booking;
pub mod cache_entry;

pub use asset::{Asset, AssetAttributes, AssetId, BoatType, Classification, SweepRig};
pub use booking::{Booking, BookingOutcome};
pub use cache_entry::{CacheEntry, CachedView, EntryMetadata};
