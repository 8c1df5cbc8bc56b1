use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use transparence_shared::{AdministrativeRecord, Level};

use crate::config::{max_codes_per_request, record_cache_ttl_secs, score_year};

pub type RecordKey = (Level, String);

#[derive(Debug, Clone)]
pub struct CachedRecord {
    pub record: AdministrativeRecord,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRecord {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl_secs: i64) -> bool {
        now.signed_duration_since(self.fetched_at).num_seconds() < ttl_secs
    }
}

#[derive(Clone)]
pub struct AppState {
    /// None when DATABASE_URL is not set; map lookups are then cache-only.
    pub db: Option<PgPool>,
    pub record_cache: Arc<DashMap<RecordKey, CachedRecord>>,
    pub record_cache_ttl_secs: i64,
    pub max_codes_per_request: usize,
    pub score_year: i32,
    pub observability: Arc<ObservabilityCounters>,
}

#[derive(Debug, Default)]
pub struct ObservabilityCounters {
    record_requests_total: AtomicU64,
    record_cache_hits_total: AtomicU64,
    record_cache_misses_total: AtomicU64,
    db_errors_total: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct ObservabilitySnapshot {
    pub record_requests_total: u64,
    pub record_cache_hits_total: u64,
    pub record_cache_misses_total: u64,
    pub db_errors_total: u64,
}

impl ObservabilityCounters {
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            record_requests_total: self.record_requests_total.load(Ordering::Relaxed),
            record_cache_hits_total: self.record_cache_hits_total.load(Ordering::Relaxed),
            record_cache_misses_total: self.record_cache_misses_total.load(Ordering::Relaxed),
            db_errors_total: self.db_errors_total.load(Ordering::Relaxed),
        }
    }

    pub fn record_records_request(&self) {
        self.record_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hits(&self, count: u64) {
        self.record_cache_hits_total
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_cache_misses(&self, count: u64) {
        self.record_cache_misses_total
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_db_error(&self) {
        self.db_errors_total.fetch_add(1, Ordering::Relaxed);
    }
}

impl AppState {
    pub fn new(db: Option<PgPool>) -> Self {
        Self {
            db,
            record_cache: Arc::new(DashMap::new()),
            record_cache_ttl_secs: record_cache_ttl_secs(),
            max_codes_per_request: max_codes_per_request(),
            score_year: score_year(),
            observability: Arc::new(ObservabilityCounters::default()),
        }
    }

    /// Drop cache entries older than the TTL. Returns how many were removed.
    pub fn evict_stale_records(&self, now: DateTime<Utc>) -> usize {
        let before = self.record_cache.len();
        let ttl = self.record_cache_ttl_secs;
        self.record_cache.retain(|_, cached| cached.is_fresh(now, ttl));
        before.saturating_sub(self.record_cache.len())
    }
}
