use serde_json::{Value, json};

use transparence_shared::{Level, MapPoint, ScoreAttribute, TerritoryConfig};

use crate::renderer::{COUNTRY_PROPERTY, SOURCE_ID, SOURCE_LAYER};

pub const TILES_JSON_URL: &str = "https://api.maptiler.com/tiles/countries/tiles.json";

const FILL_OPACITY: f64 = 0.85;
const BACKGROUND: &str = "#f4f1ea";

const DOT_MIN_RADIUS: f64 = 6.0;
const DOT_MAX_RADIUS: f64 = 24.0;
const DOT_FILL: &str = "rgba(25, 118, 210, 0.4)";
const DOT_STROKE: &str = "#1976d2";

/// Fill color per score letter, A to E.
pub const SCORE_COLORS: [&str; 5] = ["#1976d2", "#64b5f6", "#b2dfdb", "#ffe082", "#ffb74d"];

pub fn tiles_url(api_key: Option<&str>) -> String {
    match api_key.filter(|k| !k.is_empty()) {
        Some(key) => format!("{TILES_JSON_URL}?key={key}"),
        None => TILES_JSON_URL.to_string(),
    }
}

/// Empty basemap: the choropleth layers are added once the style has loaded.
pub fn base_style() -> Value {
    json!({
        "version": 8,
        "sources": {},
        "layers": [{
            "id": "background",
            "type": "background",
            "paint": { "background-color": BACKGROUND },
        }],
    })
}

pub fn source(tiles_url: &str) -> Value {
    json!({ "type": "vector", "url": tiles_url })
}

pub fn outline_layer_id(level: Level) -> String {
    format!("{}-outline", level.layer_id())
}

/// `[minzoom, maxzoom)` during which `level` is displayed in `territory`.
pub fn zoom_range(level: Level, territory: &TerritoryConfig) -> (f64, f64) {
    match level {
        Level::Region => (0.0, territory.regions_max_zoom),
        Level::Departement => (territory.regions_max_zoom, territory.departements_max_zoom),
        // maxzoom is exclusive in the renderer.
        Level::Commune => (territory.departements_max_zoom, territory.max_zoom + 1.0),
    }
}

pub fn level_filter(level: Level, territory: &TerritoryConfig) -> Value {
    json!([
        "all",
        ["==", ["get", "level"], level.ordinal()],
        ["==", ["get", COUNTRY_PROPERTY], territory.filter_code],
    ])
}

/// Source-side filter used when reading loaded features back.
pub fn country_filter(country_code: &str) -> Value {
    json!(["==", ["get", COUNTRY_PROPERTY], country_code])
}

/// Color ramp over the feature-state ordinal; features not written yet use
/// the worst color.
pub fn fill_color(attribute: ScoreAttribute) -> Value {
    let mut expr = vec![
        json!("interpolate"),
        json!(["linear"]),
        json!(["coalesce", ["feature-state", attribute.as_str()], 5]),
    ];
    for (index, color) in SCORE_COLORS.iter().enumerate() {
        expr.push(json!(index + 1));
        expr.push(json!(color));
    }
    Value::Array(expr)
}

pub fn fill_layer(level: Level, territory: &TerritoryConfig, attribute: ScoreAttribute) -> Value {
    let (minzoom, maxzoom) = zoom_range(level, territory);
    json!({
        "id": level.layer_id(),
        "type": "fill",
        "source": SOURCE_ID,
        "source-layer": SOURCE_LAYER,
        "minzoom": minzoom,
        "maxzoom": maxzoom,
        "filter": level_filter(level, territory),
        "paint": {
            "fill-color": fill_color(attribute),
            "fill-opacity": FILL_OPACITY,
            "fill-outline-color": "#000",
        },
    })
}

pub fn outline_layer(level: Level, territory: &TerritoryConfig) -> Value {
    let (minzoom, maxzoom) = zoom_range(level, territory);
    json!({
        "id": outline_layer_id(level),
        "type": "line",
        "source": SOURCE_ID,
        "source-layer": SOURCE_LAYER,
        "minzoom": minzoom,
        "maxzoom": maxzoom,
        "filter": level_filter(level, territory),
        "paint": {
            "line-color": "black",
            "line-width": if level == Level::Region { 2.0 } else { 1.0 },
            "line-opacity": 1,
        },
    })
}

pub fn dots_source_id(level: Level) -> String {
    format!("{}-dots-source", level.layer_id())
}

pub fn dots_layer_id(level: Level) -> String {
    format!("{}-dots", level.layer_id())
}

/// GeoJSON point collection for the population dots of one level.
pub fn points_data(points: &[MapPoint]) -> Value {
    let features: Vec<Value> = points
        .iter()
        .map(|point| {
            json!({
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": point.coordinates },
                "properties": {
                    "id": point.id,
                    "name": point.name,
                    "population": point.population,
                },
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

pub fn dots_source(points: &[MapPoint]) -> Value {
    json!({ "type": "geojson", "data": points_data(points) })
}

/// Only dots whose population lies within `(min, max)` are drawn.
pub fn population_filter((min, max): (i64, i64)) -> Value {
    json!([
        "all",
        [">=", ["get", "population"], min],
        ["<=", ["get", "population"], max],
    ])
}

/// Radius grows linearly with population across `(min, max)`.
pub fn dot_radius((min, max): (i64, i64)) -> Value {
    // Interpolation stops must be strictly ascending.
    let max = max.max(min + 1);
    json!([
        "interpolate",
        ["linear"],
        ["get", "population"],
        min,
        DOT_MIN_RADIUS,
        max,
        DOT_MAX_RADIUS,
    ])
}

pub fn dots_layer(level: Level, territory: &TerritoryConfig, bounds: (i64, i64)) -> Value {
    let (minzoom, maxzoom) = zoom_range(level, territory);
    json!({
        "id": dots_layer_id(level),
        "type": "circle",
        "source": dots_source_id(level),
        "minzoom": minzoom,
        "maxzoom": maxzoom,
        "filter": population_filter(bounds),
        "paint": {
            "circle-radius": dot_radius(bounds),
            "circle-color": DOT_FILL,
            "circle-stroke-width": 2,
            "circle-stroke-color": DOT_STROKE,
        },
    })
}
