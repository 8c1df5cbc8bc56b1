use std::fmt;

use transparence_shared::Level;

/// Renderer-internal feature id. Vector tiles may carry numeric or string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeatureId {
    Number(u64),
    Text(String),
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A loaded tile feature of the `administrative` source layer, as read back
/// from the renderer. Only the properties the map engine needs are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerritoryFeature {
    pub id: Option<FeatureId>,
    /// Raw `level` property: 1 region, 2 departement, 3 commune.
    pub level: Option<i64>,
    pub code: Option<String>,
    pub code_insee: Option<String>,
    /// Raw `iso_a2` property.
    pub country_code: Option<String>,
    /// Interactive layer the feature was picked from (pointer events only).
    pub layer_id: Option<String>,
}

impl TerritoryFeature {
    pub fn level(&self) -> Option<Level> {
        self.level.and_then(Level::from_ordinal)
    }

    pub fn matches_country(&self, country_code: &str) -> bool {
        self.country_code.as_deref() == Some(country_code)
    }

    /// `(level, code)` from the tile properties alone. Features outside the
    /// three administrative levels, or without a resolvable code, yield `None`.
    pub fn admin_key(&self) -> Option<(Level, String)> {
        let level = self.level()?;
        let code = self.code_for(level)?;
        Some((level, code))
    }

    /// Like [`Self::admin_key`], but falls back to the picked layer when the
    /// `level` property is missing. Used for hover and click lookups.
    pub fn pointer_key(&self) -> Option<(Level, String)> {
        let level = self
            .level()
            .or_else(|| self.layer_id.as_deref().map(Level::from_layer_id))?;
        let code = self.code_for(level)?;
        Some((level, code))
    }

    fn code_for(&self, level: Level) -> Option<String> {
        match level {
            // The tile source has no usable region code property; the region
            // code is the last two characters of the feature id. This
            // misreads Alsace (67/68 vs the backend's 67A) and is kept as is.
            Level::Region => {
                let id = self.id.as_ref()?.to_string();
                region_code_from_id(&id)
            }
            Level::Departement | Level::Commune => non_empty(self.code.as_deref())
                .or_else(|| non_empty(self.code_insee.as_deref())),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Low-order two characters of a feature id, or the whole id when shorter.
pub fn region_code_from_id(id: &str) -> Option<String> {
    if id.is_empty() {
        return None;
    }
    let start = id
        .char_indices()
        .rev()
        .nth(1)
        .map_or(0, |(index, _)| index);
    Some(id[start..].to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(level: i64) -> TerritoryFeature {
        TerritoryFeature {
            id: Some(FeatureId::Number(1_075)),
            level: Some(level),
            country_code: Some("FR".to_string()),
            ..TerritoryFeature::default()
        }
    }

    #[test]
    fn region_code_is_the_id_suffix() {
        let f = feature(1);
        assert_eq!(f.admin_key(), Some((Level::Region, "75".to_string())));

        let text = TerritoryFeature {
            id: Some(FeatureId::Text("fr-reg-075".to_string())),
            ..f
        };
        assert_eq!(text.admin_key(), Some((Level::Region, "75".to_string())));
    }

    #[test]
    fn region_suffix_keeps_short_ids_and_rejects_empty() {
        assert_eq!(region_code_from_id("5").as_deref(), Some("5"));
        assert_eq!(region_code_from_id("1067").as_deref(), Some("67"));
        assert_eq!(region_code_from_id(""), None);
    }

    #[test]
    fn region_without_id_is_unresolvable() {
        let f = TerritoryFeature {
            id: None,
            ..feature(1)
        };
        assert_eq!(f.admin_key(), None);
    }

    #[test]
    fn commune_code_falls_back_to_code_insee() {
        let mut f = feature(3);
        f.code = Some(String::new());
        f.code_insee = Some("31555".to_string());
        assert_eq!(f.admin_key(), Some((Level::Commune, "31555".to_string())));

        f.code = Some("31069".to_string());
        assert_eq!(f.admin_key(), Some((Level::Commune, "31069".to_string())));
    }

    #[test]
    fn level_outside_range_has_no_key() {
        let mut f = feature(0);
        f.code = Some("31".to_string());
        assert_eq!(f.admin_key(), None);
        f.level = Some(4);
        assert_eq!(f.admin_key(), None);
    }

    #[test]
    fn pointer_key_uses_layer_when_level_missing() {
        let f = TerritoryFeature {
            id: Some(FeatureId::Number(7)),
            level: None,
            code: Some("33".to_string()),
            layer_id: Some("departements".to_string()),
            ..TerritoryFeature::default()
        };
        assert_eq!(f.admin_key(), None);
        assert_eq!(f.pointer_key(), Some((Level::Departement, "33".to_string())));
    }
}
