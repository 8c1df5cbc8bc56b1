use crate::feature::{FeatureId, TerritoryFeature};

/// Vector source holding the administrative boundaries.
pub const SOURCE_ID: &str = "statesData";
pub const SOURCE_LAYER: &str = "administrative";
/// Feature property compared against the territory's filter code.
pub const COUNTRY_PROPERTY: &str = "iso_a2";

/// Which loaded features to read back from the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFilter {
    pub source_id: &'static str,
    pub source_layer: &'static str,
    pub country_code: &'static str,
}

impl FeatureFilter {
    pub const fn territory(country_code: &'static str) -> Self {
        Self {
            source_id: SOURCE_ID,
            source_layer: SOURCE_LAYER,
            country_code,
        }
    }
}

/// The parts of the map renderer the choropleth engine drives.
pub trait FeatureRenderer {
    /// Features currently loaded in tiles (on screen or buffered) for `filter`.
    fn query_source_features(&self, filter: &FeatureFilter) -> Vec<TerritoryFeature>;

    /// Set one numeric feature-state entry. Must be a no-op when the feature
    /// has been unloaded since it was queried.
    fn set_feature_state(&mut self, filter: &FeatureFilter, id: &FeatureId, key: &str, value: u8);
}
