use serde::{Deserialize, Serialize};

use crate::level::Level;

pub const DEFAULT_TERRITORY: &str = "metropole";

/// Camera state of the map. Pitch and bearing are carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub bearing: f64,
}

impl ViewportState {
    pub const fn new(longitude: f64, latitude: f64, zoom: f64) -> Self {
        Self {
            longitude,
            latitude,
            zoom,
            pitch: 0.0,
            bearing: 0.0,
        }
    }

    /// Same view with zoom bounded by the territory's limits.
    pub fn clamped_to(self, territory: &TerritoryConfig) -> Self {
        let zoom = if self.zoom.is_nan() {
            territory.view_state.zoom
        } else {
            self.zoom.clamp(territory.min_zoom, territory.max_zoom)
        };
        Self { zoom, ..self }
    }
}

/// A selectable map scope: mainland France or one overseas collectivity.
#[derive(Debug, Clone, PartialEq)]
pub struct TerritoryConfig {
    pub key: &'static str,
    pub name: &'static str,
    /// Value of the tile source's `iso_a2` property for this territory.
    pub filter_code: &'static str,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Region → departement breakpoint.
    pub regions_max_zoom: f64,
    /// Departement → commune breakpoint.
    pub departements_max_zoom: f64,
    pub view_state: ViewportState,
}

impl TerritoryConfig {
    /// Level for a zoom value using this territory's breakpoints.
    pub fn level_at(&self, zoom: f64) -> Level {
        if zoom.is_nan() || zoom < self.regions_max_zoom {
            Level::Region
        } else if zoom < self.departements_max_zoom {
            Level::Departement
        } else {
            Level::Commune
        }
    }
}

// Overseas territories are visually much smaller than the mainland, hence the
// higher breakpoints.
pub const TERRITORIES: &[TerritoryConfig] = &[
    TerritoryConfig {
        key: "metropole",
        name: "France métropolitaine",
        filter_code: "FR",
        min_zoom: 4.0,
        max_zoom: 14.0,
        regions_max_zoom: 6.0,
        departements_max_zoom: 8.0,
        view_state: ViewportState::new(2.5, 46.6, 5.0),
    },
    TerritoryConfig {
        key: "guadeloupe",
        name: "Guadeloupe",
        filter_code: "GP",
        min_zoom: 7.0,
        max_zoom: 14.0,
        regions_max_zoom: 9.0,
        departements_max_zoom: 10.0,
        view_state: ViewportState::new(-61.55, 16.25, 8.0),
    },
    TerritoryConfig {
        key: "martinique",
        name: "Martinique",
        filter_code: "MQ",
        min_zoom: 8.0,
        max_zoom: 14.0,
        regions_max_zoom: 10.0,
        departements_max_zoom: 11.0,
        view_state: ViewportState::new(-61.02, 14.64, 9.0),
    },
    TerritoryConfig {
        key: "guyane",
        name: "Guyane",
        filter_code: "GF",
        min_zoom: 5.0,
        max_zoom: 14.0,
        regions_max_zoom: 7.0,
        departements_max_zoom: 8.0,
        view_state: ViewportState::new(-53.1, 3.93, 6.0),
    },
    TerritoryConfig {
        key: "reunion",
        name: "La Réunion",
        filter_code: "RE",
        min_zoom: 8.0,
        max_zoom: 14.0,
        regions_max_zoom: 10.0,
        departements_max_zoom: 11.0,
        view_state: ViewportState::new(55.53, -21.13, 9.0),
    },
    TerritoryConfig {
        key: "mayotte",
        name: "Mayotte",
        filter_code: "YT",
        min_zoom: 9.0,
        max_zoom: 14.0,
        regions_max_zoom: 11.0,
        departements_max_zoom: 12.0,
        view_state: ViewportState::new(45.15, -12.82, 10.0),
    },
];

pub fn territory(key: &str) -> Option<&'static TerritoryConfig> {
    TERRITORIES.iter().find(|t| t.key == key)
}

/// Territory to fall back to when a stored or requested key is unknown.
pub fn territory_or_default(key: &str) -> &'static TerritoryConfig {
    territory(key).unwrap_or(&TERRITORIES[0])
}

/// Administrative level to display for `zoom` in `territory_key`.
///
/// Total: an unknown territory resolves to [`Level::Region`] so a missing
/// breakpoint never blocks rendering.
pub fn resolve_level(zoom: f64, territory_key: &str) -> Level {
    match territory(territory_key) {
        Some(t) => t.level_at(zoom),
        None => Level::Region,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoints_are_ordered_for_every_territory() {
        for t in TERRITORIES {
            assert!(t.min_zoom <= t.regions_max_zoom, "{}", t.key);
            assert!(t.regions_max_zoom < t.departements_max_zoom, "{}", t.key);
            assert!(t.departements_max_zoom <= t.max_zoom, "{}", t.key);
            let v = t.view_state;
            assert!(v.zoom >= t.min_zoom && v.zoom <= t.max_zoom, "{}", t.key);
        }
    }

    #[test]
    fn metropole_scenarios() {
        assert_eq!(resolve_level(5.0, "metropole"), Level::Region);
        assert_eq!(resolve_level(9.0, "metropole"), Level::Commune);
        assert_eq!(resolve_level(6.0, "metropole"), Level::Departement);
        assert_eq!(resolve_level(7.99, "metropole"), Level::Departement);
        assert_eq!(resolve_level(8.0, "metropole"), Level::Commune);
    }

    #[test]
    fn unknown_territory_and_nan_fail_closed_to_region() {
        assert_eq!(resolve_level(12.0, "atlantis"), Level::Region);
        assert_eq!(resolve_level(f64::NAN, "metropole"), Level::Region);
    }

    #[test]
    fn resolution_is_monotonic_in_zoom() {
        for t in TERRITORIES {
            let mut previous = Level::Region;
            let mut zoom = -2.0;
            while zoom <= 24.0 {
                let level = resolve_level(zoom, t.key);
                assert!(level >= previous, "{} regressed at zoom {zoom}", t.key);
                previous = level;
                zoom += 0.05;
            }
            assert_eq!(previous, Level::Commune);
        }
    }

    #[test]
    fn clamping_bounds_zoom_and_keeps_position() {
        let metropole = territory_or_default("metropole");
        let view = ViewportState::new(1.0, 2.0, 20.0).clamped_to(metropole);
        assert_eq!(view.zoom, metropole.max_zoom);
        assert_eq!((view.longitude, view.latitude), (1.0, 2.0));

        let nan = ViewportState::new(1.0, 2.0, f64::NAN).clamped_to(metropole);
        assert_eq!(nan.zoom, metropole.view_state.zoom);
    }

    #[test]
    fn unknown_key_defaults_to_metropole() {
        assert_eq!(territory_or_default("nowhere").key, DEFAULT_TERRITORY);
    }
}
