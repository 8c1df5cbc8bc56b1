use std::fmt::Write as _;

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::state::{AppState, ObservabilitySnapshot};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let observability = state.observability.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "database_available": state.db.is_some(),
        "record_cache_size": state.record_cache.len(),
        "record_cache_ttl_secs": state.record_cache_ttl_secs,
        "score_year": state.score_year,
        "observability": {
            "record_requests_total": observability.record_requests_total,
            "record_cache_hits_total": observability.record_cache_hits_total,
            "record_cache_misses_total": observability.record_cache_misses_total,
            "db_errors_total": observability.db_errors_total,
        }
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = render_prometheus_metrics(
        state.record_cache.len(),
        state.db.is_some(),
        state.observability.snapshot(),
    );

    (
        [
            (header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
}

fn write_metric(body: &mut String, name: &str, kind: &str, help: &str, value: u64) {
    let _ = writeln!(body, "# HELP {name} {help}");
    let _ = writeln!(body, "# TYPE {name} {kind}");
    let _ = writeln!(body, "{name} {value}");
}

fn render_prometheus_metrics(
    record_cache_size: usize,
    database_available: bool,
    observability: ObservabilitySnapshot,
) -> String {
    let mut body = String::new();
    write_metric(
        &mut body,
        "transparence_record_cache_size",
        "gauge",
        "Current number of records held in the server cache.",
        record_cache_size as u64,
    );
    write_metric(
        &mut body,
        "transparence_database_available",
        "gauge",
        "Whether a database is configured (1 or 0).",
        u64::from(database_available),
    );
    write_metric(
        &mut body,
        "transparence_record_requests_total",
        "counter",
        "Total /api/map record lookups.",
        observability.record_requests_total,
    );
    write_metric(
        &mut body,
        "transparence_record_cache_hits_total",
        "counter",
        "Total requested codes served from the record cache.",
        observability.record_cache_hits_total,
    );
    write_metric(
        &mut body,
        "transparence_record_cache_misses_total",
        "counter",
        "Total requested codes not found fresh in the record cache.",
        observability.record_cache_misses_total,
    );
    write_metric(
        &mut body,
        "transparence_db_errors_total",
        "counter",
        "Total database failures while serving map requests.",
        observability.db_errors_total,
    );
    body
}
