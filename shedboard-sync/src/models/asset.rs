//! Bookable boats as scraped from the upstream listing

use serde::{Deserialize, Serialize};

/// Upstream-assigned boat identifier, stable across refreshes
pub type AssetId = u64;

/// Hull type derived from the leading name token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoatType {
    Single,
    Double,
    /// Quad or larger
    Quad,
    Unknown,
}

impl BoatType {
    /// Display order within a column: big boats first, unknowns last
    pub fn display_rank(self) -> u8 {
        match self {
            BoatType::Quad => 0,
            BoatType::Double => 1,
            BoatType::Single => 2,
            BoatType::Unknown => 3,
        }
    }

    pub const DISPLAY_ORDER: [BoatType; 4] = [
        BoatType::Quad,
        BoatType::Double,
        BoatType::Single,
        BoatType::Unknown,
    ];
}

/// Who the boat is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Race,
    /// Usable for both racing and training
    Hybrid,
    Training,
}

/// Sweep rigging marker carried after the type token (`/-` or `/+`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepRig {
    Coxless,
    Coxed,
}

/// Structured attributes parsed from a raw boat name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAttributes {
    pub boat_type: BoatType,
    pub classification: Classification,
    /// Crew weight class in kilograms
    pub weight_kg: Option<u32>,
    pub sweep_capable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rig: Option<SweepRig>,
    pub display_name: String,
    pub nickname: Option<String>,
}

/// A bookable boat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    /// Name exactly as scraped
    pub raw_name: String,
    #[serde(flatten)]
    pub attributes: AssetAttributes,
}

impl Asset {
    pub fn new(id: AssetId, raw_name: impl Into<String>, attributes: AssetAttributes) -> Self {
        Self {
            id,
            raw_name: raw_name.into(),
            attributes,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.attributes.display_name
    }

    pub fn boat_type(&self) -> BoatType {
        self.attributes.boat_type
    }

    pub fn classification(&self) -> Classification {
        self.attributes.classification
    }
}
