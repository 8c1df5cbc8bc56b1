use std::collections::HashSet;
use std::path::Path;

use transparence_shared::{AdministrativeRecord, Level, PopulationBounds, TransparencyScore};

pub mod postgres {
    pub use sqlx_postgres::PgPoolOptions;
}

pub use sqlx_core::query::query;
pub use sqlx_core::query_as::query_as;
pub use sqlx_postgres::PgPool;

const WORKSPACE_MIGRATIONS_DIR: &str = "server/migrations";
const CRATE_MIGRATIONS_DIR: &str = "./migrations";

fn migrations_path() -> &'static Path {
    let workspace_path = Path::new(WORKSPACE_MIGRATIONS_DIR);
    if workspace_path.exists() {
        return workspace_path;
    }
    Path::new(CRATE_MIGRATIONS_DIR)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx_core::migrate::MigrateError> {
    let migrator = sqlx_core::migrate::Migrator::new(migrations_path()).await?;
    migrator.run(pool).await
}

/// Column of `collectivites` holding the code the map tiles carry for `level`.
/// Regions are keyed by their region INSEE code, not their own `code_insee`.
pub(crate) const fn code_column(level: Level) -> &'static str {
    match level {
        Level::Region => "code_insee_region",
        Level::Departement | Level::Commune => "code_insee",
    }
}

type RecordRow = (
    String,
    String,
    String,
    i64,
    Option<f64>,
    Option<f64>,
    Option<String>,
    Option<String>,
);

fn record_from_row(level: Level, row: RecordRow) -> AdministrativeRecord {
    let (code, siren, nom, population, latitude, longitude, mp_score, subventions_score) = row;
    AdministrativeRecord {
        level,
        code,
        siren,
        nom,
        population,
        latitude,
        longitude,
        mp_score: mp_score.as_deref().and_then(TransparencyScore::parse),
        subventions_score: subventions_score
            .as_deref()
            .and_then(TransparencyScore::parse),
    }
}

/// Load the records of `level` whose code is in `codes`, joined with the
/// scores of `year`. Codes without a collectivity are simply absent.
pub async fn fetch_records(
    pool: &PgPool,
    level: Level,
    codes: &[String],
    year: i32,
) -> Result<Vec<AdministrativeRecord>, sqlx_core::Error> {
    let column = code_column(level);
    let sql = format!(
        "SELECT c.{column}, c.siren, c.nom, COALESCE(c.population, 0)::BIGINT, \
                c.latitude, c.longitude, b.mp_score, b.subventions_score \
         FROM collectivites c \
         LEFT JOIN bareme b ON c.siren = b.siren AND b.annee = $3 \
         WHERE c.{column} = ANY($1) AND c.type = $2 \
         ORDER BY c.{column}, c.population DESC NULLS LAST"
    );
    let rows: Vec<RecordRow> = sqlx::query_as(sql.as_str())
        .bind(codes.to_vec())
        .bind(level.collectivite_type())
        .bind(year)
        .fetch_all(pool)
        .await?;

    // Duplicate codes keep the most populated row.
    let mut seen = HashSet::with_capacity(rows.len());
    Ok(rows
        .into_iter()
        .filter(|row| seen.insert(row.0.clone()))
        .map(|row| record_from_row(level, row))
        .collect())
}

fn level_for_type(collectivite_type: &str) -> Option<Level> {
    Level::ALL
        .into_iter()
        .find(|level| level.collectivite_type() == collectivite_type)
}

pub async fn fetch_population_bounds(
    pool: &PgPool,
) -> Result<Vec<PopulationBounds>, sqlx_core::Error> {
    let types: Vec<&str> = Level::ALL
        .iter()
        .map(|level| level.collectivite_type())
        .collect();
    let rows: Vec<(String, Option<i64>, Option<i64>)> = sqlx::query_as(
        "SELECT type, MIN(population)::BIGINT, MAX(population)::BIGINT \
         FROM collectivites \
         WHERE type = ANY($1) AND population IS NOT NULL \
         GROUP BY type",
    )
    .bind(types)
    .fetch_all(pool)
    .await?;

    let mut bounds: Vec<PopulationBounds> = rows
        .into_iter()
        .filter_map(|(collectivite_type, min, max)| {
            Some(PopulationBounds {
                level: level_for_type(&collectivite_type)?,
                min_population: min?,
                max_population: max?,
            })
        })
        .collect();
    bounds.sort_by_key(|b| b.level);
    Ok(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_match_on_region_code() {
        assert_eq!(code_column(Level::Region), "code_insee_region");
        assert_eq!(code_column(Level::Departement), "code_insee");
        assert_eq!(code_column(Level::Commune), "code_insee");
    }

    #[test]
    fn collectivity_types_map_back_to_levels() {
        assert_eq!(level_for_type("REG"), Some(Level::Region));
        assert_eq!(level_for_type("DEP"), Some(Level::Departement));
        assert_eq!(level_for_type("COM"), Some(Level::Commune));
        assert_eq!(level_for_type("EPCI"), None);
    }

    #[test]
    fn rows_parse_trimmed_uppercase_scores_only() {
        let record = record_from_row(
            Level::Commune,
            (
                "35238".to_string(),
                "213502388".to_string(),
                "Rennes".to_string(),
                222_485,
                Some(48.11),
                Some(-1.68),
                Some(" B ".to_string()),
                Some("b".to_string()),
            ),
        );
        assert_eq!(record.level, Level::Commune);
        assert_eq!(record.mp_score, Some(TransparencyScore::B));
        assert_eq!(record.subventions_score, None);
        assert_eq!(record.community_path().as_deref(), Some("/community/213502388"));
    }
}
