use std::collections::HashSet;
use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use chrono::Utc;
use tracing::{debug, error};
use transparence_shared::{Level, PopulationBounds, RecordsRequest, RecordsResponse};

use crate::config::MAX_CODE_LEN;
use crate::db;
use crate::state::{AppState, CachedRecord};

fn parse_level(raw: &str) -> Result<Level, StatusCode> {
    Level::from_str(raw).map_err(|_| StatusCode::BAD_REQUEST)
}

fn is_valid_code(code: &str) -> bool {
    !code.is_empty() && code.len() <= MAX_CODE_LEN && code.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Trim, validate and deduplicate requested codes, keeping request order.
/// Invalid codes are dropped; nothing left or too many codes is a bad request.
fn normalize_codes<'a>(
    raw: impl IntoIterator<Item = &'a str>,
    max_codes: usize,
) -> Result<Vec<String>, StatusCode> {
    let mut seen = HashSet::new();
    let codes: Vec<String> = raw
        .into_iter()
        .map(str::trim)
        .filter(|code| is_valid_code(code))
        .filter(|code| seen.insert(*code))
        .map(str::to_string)
        .collect();

    if codes.is_empty() || codes.len() > max_codes {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(codes)
}

/// `codes` may be repeated or comma-separated (`?codes=75,92&codes=93`).
fn codes_from_query(params: &[(String, String)]) -> impl Iterator<Item = &str> {
    params
        .iter()
        .filter(|(key, _)| key == "codes")
        .flat_map(|(_, value)| value.split(','))
}

pub async fn get_records(
    State(state): State<AppState>,
    Path(level): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<RecordsResponse>, StatusCode> {
    let level = parse_level(&level)?;
    let codes = normalize_codes(codes_from_query(&params), state.max_codes_per_request)?;
    lookup_records(&state, level, codes).await.map(Json)
}

pub async fn post_records(
    State(state): State<AppState>,
    Path(level): Path<String>,
    Json(request): Json<RecordsRequest>,
) -> Result<Json<RecordsResponse>, StatusCode> {
    let level = parse_level(&level)?;
    let codes = normalize_codes(
        request.codes.iter().map(String::as_str),
        state.max_codes_per_request,
    )?;
    lookup_records(&state, level, codes).await.map(Json)
}

async fn lookup_records(
    state: &AppState,
    level: Level,
    codes: Vec<String>,
) -> Result<RecordsResponse, StatusCode> {
    state.observability.record_records_request();
    let now = Utc::now();
    let ttl = state.record_cache_ttl_secs;

    let mut records = Vec::with_capacity(codes.len());
    let mut misses = Vec::new();
    for code in codes {
        let key = (level, code);
        match state.record_cache.get(&key) {
            Some(cached) if cached.is_fresh(now, ttl) => records.push(cached.record.clone()),
            _ => misses.push(key.1),
        }
    }
    state.observability.record_cache_hits(records.len() as u64);
    state.observability.record_cache_misses(misses.len() as u64);

    if misses.is_empty() {
        return Ok(RecordsResponse { records });
    }

    let Some(pool) = state.db.as_ref() else {
        debug!(%level, misses = misses.len(), "record cache miss with no database configured");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };
    let fetched = db::fetch_records(pool, level, &misses, state.score_year)
        .await
        .map_err(|e| {
            state.observability.record_db_error();
            error!(error = %e, %level, codes = misses.len(), "failed to load records");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    debug!(
        %level,
        requested = misses.len(),
        found = fetched.len(),
        "loaded records from database"
    );

    for record in fetched {
        state.record_cache.insert(
            (level, record.code.clone()),
            CachedRecord {
                record: record.clone(),
                fetched_at: now,
            },
        );
        records.push(record);
    }
    Ok(RecordsResponse { records })
}

pub async fn get_population_bounds(
    State(state): State<AppState>,
) -> Result<(HeaderMap, Json<Vec<PopulationBounds>>), StatusCode> {
    let Some(pool) = state.db.as_ref() else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };
    let bounds = db::fetch_population_bounds(pool).await.map_err(|e| {
        state.observability.record_db_error();
        error!(error = %e, "failed to load population bounds");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );
    Ok((headers, Json(bounds)))
}
