use futures::FutureExt;
use futures::future::{LocalBoxFuture, try_join_all};
use thiserror::Error;

use transparence_shared::{
    AdministrativeRecord, Level, PopulationBounds, RecordsRequest, RecordsResponse,
};

pub const RECORDS_API_BASE: &str = "/api/map";

/// Server-side cap on codes per request (`MAX_CODES_PER_REQUEST`).
pub const MAX_CODES_PER_REQUEST: usize = 1000;

/// Failure of one batched records request. Cloned to every caller waiting on
/// the same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("fetch error: {0}")]
    Transport(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("parse error: {0}")]
    Decode(String),
}

pub type FetchResult = Result<Vec<AdministrativeRecord>, FetchError>;
pub type FetchFuture = LocalBoxFuture<'static, FetchResult>;

/// Backend access for administrative records.
pub trait RecordFetcher {
    /// One request for all of `codes` at `level`. Codes without a record are
    /// simply absent from the result.
    fn fetch(&self, level: Level, codes: Vec<String>) -> FetchFuture;
}

/// Fetches records from the map API. Regions and departements go through a
/// GET with a comma-separated code list; communes, which come in the largest
/// batches, are POSTed as JSON in chunks of at most
/// [`MAX_CODES_PER_REQUEST`] codes.
#[derive(Debug, Clone)]
pub struct HttpRecordFetcher {
    base_url: String,
}

impl Default for HttpRecordFetcher {
    fn default() -> Self {
        Self::new(RECORDS_API_BASE)
    }
}

impl HttpRecordFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    pub fn level_url(&self, level: Level) -> String {
        format!("{}/{}", self.base_url, level.as_str())
    }

    pub fn query_url(&self, level: Level, codes: &[String]) -> String {
        format!("{}?codes={}", self.level_url(level), codes.join(","))
    }

    async fn fetch_batch(&self, level: Level, codes: Vec<String>) -> FetchResult {
        let request = match level {
            Level::Commune => gloo_net::http::Request::post(&self.level_url(level))
                .json(&RecordsRequest { codes })
                .map_err(|e| FetchError::Transport(e.to_string()))?,
            Level::Region | Level::Departement => {
                gloo_net::http::Request::get(&self.query_url(level, &codes))
                    .build()
                    .map_err(|e| FetchError::Transport(e.to_string()))?
            }
        };

        let resp = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !resp.ok() {
            return Err(FetchError::Status(resp.status()));
        }

        resp.json::<RecordsResponse>()
            .await
            .map(|body| body.records)
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

impl RecordFetcher for HttpRecordFetcher {
    fn fetch(&self, level: Level, codes: Vec<String>) -> FetchFuture {
        let fetcher = self.clone();
        async move {
            if codes.is_empty() {
                return Ok(Vec::new());
            }

            // Batches above the server cap are split and sent concurrently;
            // any failed chunk fails the whole batch.
            let chunks = codes
                .chunks(MAX_CODES_PER_REQUEST)
                .map(|chunk| fetcher.fetch_batch(level, chunk.to_vec()));
            let records = try_join_all(chunks).await?;
            Ok(records.into_iter().flatten().collect())
        }
        .boxed_local()
    }
}

/// Fetch per-level population bounds used by the legend.
pub async fn fetch_population_bounds(base_url: &str) -> Result<Vec<PopulationBounds>, FetchError> {
    let url = format!("{}/population-bounds", base_url.trim_end_matches('/'));
    let resp = gloo_net::http::Request::get(&url)
        .send()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;

    if !resp.ok() {
        return Err(FetchError::Status(resp.status()));
    }

    resp.json::<Vec<PopulationBounds>>()
        .await
        .map_err(|e| FetchError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_url_joins_codes() {
        let fetcher = HttpRecordFetcher::new("/api/map/");
        assert_eq!(
            fetcher.query_url(Level::Region, &["75".to_string(), "93".to_string()]),
            "/api/map/region?codes=75,93"
        );
        assert_eq!(fetcher.level_url(Level::Commune), "/api/map/commune");
    }

    #[test]
    fn fetch_errors_render_like_the_other_fetchers() {
        assert_eq!(FetchError::Status(502).to_string(), "HTTP 502");
        assert_eq!(
            FetchError::Transport("offline".to_string()).to_string(),
            "fetch error: offline"
        );
    }
}
