use serde::{Deserialize, Serialize};

use crate::level::Level;
use crate::score::{ScoreAttribute, TransparencyScore};

/// Backend attributes for one collectivity, keyed by `(level, code)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdministrativeRecord {
    pub level: Level,
    /// INSEE code used to join against tile features. For regions this is
    /// the region code, not the collectivity's own INSEE code.
    pub code: String,
    pub siren: String,
    pub nom: String,
    #[serde(default)]
    pub population: i64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub mp_score: Option<TransparencyScore>,
    #[serde(default)]
    pub subventions_score: Option<TransparencyScore>,
}

impl AdministrativeRecord {
    pub fn score(&self, attribute: ScoreAttribute) -> Option<TransparencyScore> {
        match attribute {
            ScoreAttribute::MarchesPublics => self.mp_score,
            ScoreAttribute::Subventions => self.subventions_score,
        }
    }

    /// Path of the community page opened on click.
    pub fn community_path(&self) -> Option<String> {
        let siren = self.siren.trim();
        if siren.is_empty() {
            return None;
        }
        Some(format!("/community/{siren}"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordsResponse {
    pub records: Vec<AdministrativeRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordsRequest {
    pub codes: Vec<String>,
}

/// Point feature used for the population dot layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub id: String,
    pub name: String,
    pub population: i64,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

/// Records without both coordinates are skipped.
pub fn map_points<'a>(
    records: impl IntoIterator<Item = &'a AdministrativeRecord>,
) -> Vec<MapPoint> {
    records
        .into_iter()
        .filter_map(|record| {
            let (Some(lon), Some(lat)) = (record.longitude, record.latitude) else {
                return None;
            };
            Some(MapPoint {
                id: record.code.clone(),
                name: record.nom.clone(),
                population: record.population,
                coordinates: [lon, lat],
            })
        })
        .collect()
}

/// Population range for one level, as served by `/api/map/population-bounds`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationBounds {
    pub level: Level,
    pub min_population: i64,
    pub max_population: i64,
}

pub const DEFAULT_POPULATION_BOUNDS: (i64, i64) = (0, 1_000_000);

pub fn population_bounds_for_level(bounds: &[PopulationBounds], level: Level) -> (i64, i64) {
    bounds
        .iter()
        .find(|b| b.level == level)
        .map(|b| (b.min_population, b.max_population))
        .unwrap_or(DEFAULT_POPULATION_BOUNDS)
}
