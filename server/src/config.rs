pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const SERVER_PORT: u16 = 3000;

pub const DEFAULT_RECORD_CACHE_TTL_SECS: i64 = 600; // 10 minutes
pub const RECORD_EVICTION_INTERVAL_SECS: u64 = 120;
pub const DEFAULT_MAX_CODES_PER_REQUEST: usize = 1000;
pub const DEFAULT_SCORE_YEAR: i32 = 2024;

/// Longest administrative code accepted in a request (INSEE codes are 2 to 5
/// characters).
pub const MAX_CODE_LEN: usize = 10;

pub fn db_max_connections() -> u32 {
    std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
}

pub fn server_port() -> u16 {
    std::env::var("SERVER_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(SERVER_PORT)
}

pub fn record_cache_ttl_secs() -> i64 {
    std::env::var("RECORD_CACHE_TTL_SECS")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_RECORD_CACHE_TTL_SECS)
}

pub fn max_codes_per_request() -> usize {
    std::env::var("MAX_CODES_PER_REQUEST")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_CODES_PER_REQUEST)
}

/// Year of the `bareme` scores joined onto records.
pub fn score_year() -> i32 {
    std::env::var("SCORE_YEAR")
        .ok()
        .and_then(|value| value.trim().parse::<i32>().ok())
        .filter(|value| (2000..=2100).contains(value))
        .unwrap_or(DEFAULT_SCORE_YEAR)
}
