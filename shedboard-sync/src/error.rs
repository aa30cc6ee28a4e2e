//! Refresh cycle errors
//!
//! Component errors live next to their components; this is the cycle-level
//! error the orchestrator hands back when there is no earlier entry to fall
//! back on.

use crate::services::asset_discovery::DiscoveryError;
use crate::services::session_client::{AuthError, RequestError};
use thiserror::Error;

/// Why a refresh cycle produced no new cache entry
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Boat discovery failed: {0}")]
    Discovery(DiscoveryError),

    /// Every boat's calendar fetch failed
    #[error("All {0} booking fetches failed")]
    AllFetchesFailed(usize),

    /// The refresh task ended without producing a result
    #[error("Refresh task aborted: {0}")]
    Aborted(String),
}

impl From<DiscoveryError> for RefreshError {
    /// A login failure during discovery is still a login failure
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::Request(RequestError::Auth(auth)) => RefreshError::Auth(auth),
            other => RefreshError::Discovery(other),
        }
    }
}
