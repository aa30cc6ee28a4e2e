//! Pipeline services, leaves first

pub mod name_classifier;
pub mod session_client;
pub mod asset_discovery;
pub mod booking_fetcher;
pub mod grouping;
pub mod cache_orchestrator;

pub use asset_discovery::{AssetDiscovery, DiscoveryError};
pub use booking_fetcher::{BookingFetcher, BookingWindow, FetchError};
pub use cache_orchestrator::{CacheHealth, CacheOrchestrator, CacheState};
pub use grouping::{group_and_sort, GroupedAssets, GroupedList, TypeGroup};
pub use name_classifier::classify;
pub use session_client::{AuthError, RequestError, Session, SessionClient};
