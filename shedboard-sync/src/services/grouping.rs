//! Display grouping for the shed board
//!
//! Two columns: race boats, and everything else (hybrids count as
//! training). Within a column boats are grouped by hull type in the order
//! quad → double → single → unknown, alphabetically by display name inside
//! each group.

use crate::models::{Asset, BoatType, Classification};
use serde::Serialize;

/// Boats of one hull type within a column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeGroup {
    pub boat_type: BoatType,
    pub assets: Vec<Asset>,
}

/// A column: non-empty type groups in display order
pub type GroupedList = Vec<TypeGroup>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupedAssets {
    pub training: GroupedList,
    pub race: GroupedList,
}

impl GroupedAssets {
    /// All boats in display order, training column first
    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.training
            .iter()
            .chain(self.race.iter())
            .flat_map(|group| group.assets.iter())
    }

    pub fn into_assets(self) -> Vec<Asset> {
        self.training
            .into_iter()
            .chain(self.race)
            .flat_map(|group| group.assets)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split boats into columns and order them for display
pub fn group_and_sort(assets: Vec<Asset>) -> GroupedAssets {
    let (race, training): (Vec<Asset>, Vec<Asset>) = assets
        .into_iter()
        .partition(|asset| asset.classification() == Classification::Race);

    GroupedAssets {
        training: group_column(training),
        race: group_column(race),
    }
}

fn group_column(mut assets: Vec<Asset>) -> GroupedList {
    assets.sort_by(|a, b| {
        a.boat_type()
            .display_rank()
            .cmp(&b.boat_type().display_rank())
            .then_with(|| {
                a.display_name()
                    .to_lowercase()
                    .cmp(&b.display_name().to_lowercase())
            })
            .then_with(|| a.display_name().cmp(b.display_name()))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut groups: GroupedList = Vec::new();
    for asset in assets {
        match groups.last_mut() {
            Some(group) if group.boat_type == asset.boat_type() => group.assets.push(asset),
            _ => groups.push(TypeGroup {
                boat_type: asset.boat_type(),
                assets: vec![asset],
            }),
        }
    }
    groups
}
