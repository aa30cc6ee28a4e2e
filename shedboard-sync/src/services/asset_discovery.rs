//! Boat discovery from the bookings listing page
//!
//! The listing page carries one element per boat with `data-boat-id` and
//! `data-boat-name` attributes. All knowledge of that markup lives in
//! [`parse_asset_blocks`]; everything downstream works on [`AssetBlock`]s.

use crate::models::{Asset, AssetId};
use crate::services::name_classifier::classify;
use crate::services::session_client::{RequestError, Session, SessionClient};
use crate::utils::html::opening_tags;
use reqwest::Method;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub const LISTING_PATH: &str = "/bookings";

const ID_ATTRIBUTE: &str = "data-boat-id";
const NAME_ATTRIBUTE: &str = "data-boat-name";

/// Listing fetch or parse failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("Listing request failed: {0}")]
    Request(#[from] RequestError),

    #[error("Listing page returned status {0}")]
    Status(u16),

    #[error("Listing page not parseable: {0}")]
    Unparseable(String),
}

/// One boat block as found in the markup, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBlock {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Pull boat blocks out of the listing page
///
/// Any element carrying either marker attribute counts as a block. A page
/// without a single tag is not HTML and is reported as unparseable.
pub fn parse_asset_blocks(html: &str) -> Result<Vec<AssetBlock>, DiscoveryError> {
    let mut saw_markup = false;
    let mut blocks = Vec::new();

    for tag in opening_tags(html) {
        saw_markup = true;
        if !(tag.has_attr(ID_ATTRIBUTE) || tag.has_attr(NAME_ATTRIBUTE)) {
            continue;
        }
        blocks.push(AssetBlock {
            id: tag.attr(ID_ATTRIBUTE).map(|v| v.trim().to_string()),
            name: tag.attr(NAME_ATTRIBUTE).map(|v| v.trim().to_string()),
        });
    }

    if !saw_markup {
        return Err(DiscoveryError::Unparseable("no HTML markup in response".to_string()));
    }
    Ok(blocks)
}

/// Validate blocks and classify their names
///
/// Blocks without a numeric id or a non-blank name are dropped, as are
/// repeats of an id already seen.
pub fn assets_from_blocks(blocks: Vec<AssetBlock>) -> Vec<Asset> {
    let mut seen: HashSet<AssetId> = HashSet::new();
    let mut assets = Vec::with_capacity(blocks.len());

    for block in blocks {
        let id = block.id.as_deref().and_then(|id| id.parse::<AssetId>().ok());
        let name = block.name.filter(|name| !name.is_empty());

        let (Some(id), Some(name)) = (id, name) else {
            debug!(id = ?block.id, "Discarding incomplete boat block");
            continue;
        };
        if !seen.insert(id) {
            debug!(asset_id = id, "Discarding duplicate boat block");
            continue;
        }

        let attributes = classify(&name);
        assets.push(Asset::new(id, name, attributes));
    }

    assets
}

/// Asset discovery service
pub struct AssetDiscovery {
    session_client: Arc<SessionClient>,
}

impl AssetDiscovery {
    pub fn new(session_client: Arc<SessionClient>) -> Self {
        Self { session_client }
    }

    /// Fetch the listing page and return every bookable boat on it
    ///
    /// An empty fleet is a valid result, not an error.
    pub async fn discover(&self, session: &Arc<Session>) -> Result<Vec<Asset>, DiscoveryError> {
        let response = self
            .session_client
            .request(session, Method::GET, LISTING_PATH, &[])
            .await?;

        if !response.status.is_success() {
            return Err(DiscoveryError::Status(response.status.as_u16()));
        }

        let blocks = parse_asset_blocks(&response.body)?;
        let block_count = blocks.len();
        let assets = assets_from_blocks(blocks);

        info!(
            blocks = block_count,
            assets = assets.len(),
            "Discovered boats"
        );
        Ok(assets)
    }
}
