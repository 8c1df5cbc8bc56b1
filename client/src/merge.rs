use transparence_shared::{AdministrativeRecord, Level, ScoreAttribute, score_ordinal};

use crate::cache::RecordCache;
use crate::feature::TerritoryFeature;
use crate::renderer::{FeatureFilter, FeatureRenderer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Feature-state writes issued.
    pub written: usize,
    /// Writes that fell back to the worst score because no record is cached.
    pub without_record: usize,
    /// Loaded features that could not be keyed.
    pub skipped: usize,
}

/// Ordinal written for `(level, code)`; worst when the record or score is missing.
pub fn feature_score(
    cache: &RecordCache,
    level: Level,
    code: &str,
    attribute: ScoreAttribute,
) -> u8 {
    score_ordinal(cache.get(level, code).and_then(|record| record.score(attribute)))
}

/// Write the selected score of every loaded feature of the territory into the
/// renderer's feature state, under the attribute's name.
///
/// Reads the loaded features afresh on each call, so it is idempotent for an
/// unchanged cache and tile set.
pub fn update_feature_states<R: FeatureRenderer + ?Sized>(
    renderer: &mut R,
    cache: &RecordCache,
    attribute: ScoreAttribute,
    country_code: &'static str,
) -> MergeStats {
    let filter = FeatureFilter::territory(country_code);
    let features = renderer.query_source_features(&filter);
    let mut stats = MergeStats::default();

    for feature in &features {
        let keyed = feature
            .id
            .as_ref()
            .filter(|_| feature.matches_country(country_code))
            .zip(feature.admin_key());
        let Some((id, (level, code))) = keyed else {
            stats.skipped += 1;
            continue;
        };

        if !cache.contains(level, &code) {
            stats.without_record += 1;
        }
        let value = feature_score(cache, level, &code, attribute);
        renderer.set_feature_state(&filter, id, attribute.as_str(), value);
        stats.written += 1;
    }

    stats
}

/// Cached record behind a hovered or clicked feature.
pub fn record_for_pointer_feature<'a>(
    feature: &TerritoryFeature,
    cache: &'a RecordCache,
) -> Option<&'a AdministrativeRecord> {
    let (level, code) = feature.pointer_key()?;
    cache.get(level, &code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureId;
    use crate::test_support::{MockRenderer, feature, record, region_feature};
    use transparence_shared::TransparencyScore;

    fn cache_with(records: Vec<(Level, &str, Option<TransparencyScore>)>) -> RecordCache {
        let mut cache = RecordCache::new();
        for (level, code, score) in records {
            cache.insert(level, record(level, code, score));
        }
        cache
    }

    #[test]
    fn writes_ordinal_of_cached_score() {
        let mut renderer = MockRenderer::with_features(vec![
            region_feature(1_075, "FR"),
            feature(2, 2, "33", "FR"),
        ]);
        let cache = cache_with(vec![
            (Level::Region, "75", Some(TransparencyScore::A)),
            (Level::Departement, "33", Some(TransparencyScore::C)),
        ]);

        let stats =
            update_feature_states(&mut renderer, &cache, ScoreAttribute::MarchesPublics, "FR");

        assert_eq!(stats.written, 2);
        assert_eq!(stats.without_record, 0);
        assert_eq!(renderer.state(&FeatureId::Number(1_075), "mp_score"), Some(1));
        assert_eq!(renderer.state(&FeatureId::Number(2), "mp_score"), Some(3));
    }

    #[test]
    fn missing_record_or_score_is_worst() {
        let mut renderer = MockRenderer::with_features(vec![
            region_feature(1_075, "FR"),
            region_feature(1_093, "FR"),
        ]);
        let cache = cache_with(vec![(Level::Region, "75", None)]);

        let stats = update_feature_states(&mut renderer, &cache, ScoreAttribute::Subventions, "FR");

        assert_eq!(stats.without_record, 1);
        assert_eq!(renderer.state(&FeatureId::Number(1_075), "subventions_score"), Some(5));
        assert_eq!(renderer.state(&FeatureId::Number(1_093), "subventions_score"), Some(5));
    }

    #[test]
    fn repeated_merge_writes_identical_state() {
        let mut renderer = MockRenderer::with_features(vec![
            region_feature(1_075, "FR"),
            feature(2, 3, "31555", "FR"),
            feature(3, 3, "", "FR"),
        ]);
        let cache = cache_with(vec![(Level::Commune, "31555", Some(TransparencyScore::D))]);

        let first = update_feature_states(&mut renderer, &cache, ScoreAttribute::MarchesPublics, "FR");
        let snapshot = renderer.states.clone();
        let second = update_feature_states(&mut renderer, &cache, ScoreAttribute::MarchesPublics, "FR");

        assert_eq!(first, second);
        assert_eq!(renderer.states, snapshot);
        assert_eq!(first.skipped, 1);
    }

    #[test]
    fn features_of_other_territories_are_left_alone() {
        let mut renderer = MockRenderer::with_features(vec![feature(9, 2, "971", "GP")]);
        let cache = cache_with(vec![(Level::Departement, "971", Some(TransparencyScore::A))]);

        let stats = update_feature_states(&mut renderer, &cache, ScoreAttribute::MarchesPublics, "FR");

        assert_eq!(stats.written, 0);
        assert!(renderer.states.is_empty());
    }

    #[test]
    fn vanished_feature_write_is_a_noop() {
        let mut renderer = MockRenderer::with_features(vec![feature(4, 2, "33", "FR")]);
        renderer.unload_on_query = true;
        let cache = cache_with(vec![(Level::Departement, "33", Some(TransparencyScore::B))]);

        let stats = update_feature_states(&mut renderer, &cache, ScoreAttribute::MarchesPublics, "FR");

        assert_eq!(stats.written, 1);
        assert!(renderer.states.is_empty());
    }

    #[test]
    fn pointer_lookup_uses_layer_fallback() {
        let cache = cache_with(vec![(Level::Commune, "31555", Some(TransparencyScore::B))]);
        let mut picked = feature(5, 0, "31555", "FR");
        picked.level = None;
        picked.layer_id = Some("communes".to_string());

        let found = record_for_pointer_feature(&picked, &cache).map(|r| r.code.as_str());
        assert_eq!(found, Some("31555"));
    }
}
