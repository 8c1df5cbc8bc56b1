use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::config::RECORD_EVICTION_INTERVAL_SECS;
use crate::state::AppState;

pub async fn run(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(RECORD_EVICTION_INTERVAL_SECS));

    loop {
        interval.tick().await;

        let evicted = state.evict_stale_records(Utc::now());
        if evicted > 0 {
            info!(
                evicted,
                remaining = state.record_cache.len(),
                "evicted stale record cache entries"
            );
        }
    }
}
