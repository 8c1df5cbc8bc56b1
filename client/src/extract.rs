use std::collections::BTreeSet;

use transparence_shared::Level;

use crate::feature::TerritoryFeature;
use crate::renderer::{FeatureFilter, FeatureRenderer};

/// Distinct administrative codes currently loaded, split by level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleCodes {
    pub regions: Vec<String>,
    pub departements: Vec<String>,
    pub communes: Vec<String>,
}

impl VisibleCodes {
    pub fn for_level(&self, level: Level) -> &[String] {
        match level {
            Level::Region => &self.regions,
            Level::Departement => &self.departements,
            Level::Commune => &self.communes,
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty() && self.departements.is_empty() && self.communes.is_empty()
    }
}

/// Collect codes per level from loaded features of one territory.
///
/// Features from another territory, outside the three levels, or without a
/// resolvable code are dropped silently.
pub fn extract_visible_codes(features: &[TerritoryFeature], country_code: &str) -> VisibleCodes {
    let mut by_level: [BTreeSet<String>; 3] = Default::default();

    for feature in features {
        if !feature.matches_country(country_code) {
            continue;
        }
        let Some((level, code)) = feature.admin_key() else {
            continue;
        };
        by_level[level.index()].insert(code);
    }

    let [regions, departements, communes] = by_level.map(|codes| codes.into_iter().collect());
    VisibleCodes {
        regions,
        departements,
        communes,
    }
}

/// Query the renderer for one territory and extract its visible codes.
pub fn visible_codes<R: FeatureRenderer + ?Sized>(
    renderer: &R,
    country_code: &'static str,
) -> VisibleCodes {
    let features = renderer.query_source_features(&FeatureFilter::territory(country_code));
    extract_visible_codes(&features, country_code)
}
