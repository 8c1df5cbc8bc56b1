use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared, join_all};
use tracing::{debug, warn};

use transparence_shared::{AdministrativeRecord, Level};

use crate::fetcher::{FetchError, FetchResult, RecordFetcher};

/// Resolves to the number of records the request inserted.
type SharedFetch = Shared<LocalBoxFuture<'static, Result<usize, FetchError>>>;

pub type SharedCache = Rc<RefCell<RecordCache>>;

#[derive(Clone)]
struct InFlight {
    request_id: u64,
    handle: SharedFetch,
}

#[derive(Default)]
struct LevelRecords {
    records: HashMap<String, AdministrativeRecord>,
    in_flight: HashMap<String, InFlight>,
}

/// Session-scoped record store, one map per level.
///
/// Append-only: records are never evicted while the map is open. Codes the
/// backend had no record for are not remembered and will be requested again
/// on a later viewport change.
#[derive(Default)]
pub struct RecordCache {
    levels: [LevelRecords; 3],
    next_request_id: u64,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedCache {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn get(&self, level: Level, code: &str) -> Option<&AdministrativeRecord> {
        self.levels[level.index()].records.get(code)
    }

    pub fn contains(&self, level: Level, code: &str) -> bool {
        self.levels[level.index()].records.contains_key(code)
    }

    #[cfg(test)]
    pub fn len(&self, level: Level) -> usize {
        self.levels[level.index()].records.len()
    }

    #[cfg(test)]
    pub fn is_in_flight(&self, level: Level, code: &str) -> bool {
        self.levels[level.index()].in_flight.contains_key(code)
    }

    pub fn records(&self, level: Level) -> impl Iterator<Item = &AdministrativeRecord> {
        self.levels[level.index()].records.values()
    }

    /// Codes of `codes` not cached yet, deduplicated, in input order.
    /// In-flight codes are included.
    pub fn uncached(&self, level: Level, codes: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        codes
            .iter()
            .filter(|code| !code.is_empty() && !self.contains(level, code))
            .filter(|code| seen.insert(code.as_str()))
            .cloned()
            .collect()
    }

    /// Insert a record under `level`. An existing entry is kept: records are
    /// immutable once fetched.
    pub fn insert(&mut self, level: Level, record: AdministrativeRecord) -> bool {
        let records = &mut self.levels[level.index()].records;
        if records.contains_key(&record.code) {
            return false;
        }
        records.insert(record.code.clone(), record);
        true
    }

    fn finish_fetch(
        &mut self,
        level: Level,
        request_id: u64,
        codes: &[String],
        result: FetchResult,
    ) -> Result<usize, FetchError> {
        let slot = &mut self.levels[level.index()];
        for code in codes {
            if slot
                .in_flight
                .get(code)
                .is_some_and(|entry| entry.request_id == request_id)
            {
                slot.in_flight.remove(code);
            }
        }

        match result {
            Ok(records) => {
                let returned = records.len();
                let mut inserted = 0;
                for record in records {
                    if !record.code.is_empty() && self.insert(level, record) {
                        inserted += 1;
                    }
                }
                debug!(
                    %level,
                    request_id,
                    requested = codes.len(),
                    returned,
                    inserted,
                    "records fetched"
                );
                Ok(inserted)
            }
            Err(e) => {
                warn!(%level, request_id, requested = codes.len(), error = %e, "records fetch failed");
                Err(e)
            }
        }
    }
}

/// Result of one [`ensure_records`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsureOutcome {
    /// Codes this call sent to the backend.
    pub requested: Vec<String>,
    /// Requests started by other callers that this call waited on.
    pub joined: usize,
    /// Records inserted by this call's own request.
    pub inserted: usize,
    pub error: Option<FetchError>,
}

impl EnsureOutcome {
    pub fn is_noop(&self) -> bool {
        self.requested.is_empty() && self.joined == 0
    }
}

/// Make sure records for `codes` at `level` are cached or being fetched, and
/// wait until every relevant request has settled.
///
/// Uncached codes that another call is already fetching are not requested
/// again: this call awaits that request instead. All remaining codes go out
/// in a single batched request. A failed request leaves the cache untouched;
/// the error is reported in the outcome and logged, never propagated.
pub async fn ensure_records(
    cache: SharedCache,
    fetcher: Rc<dyn RecordFetcher>,
    level: Level,
    codes: Vec<String>,
) -> EnsureOutcome {
    let (requested, own, joined) = plan_fetch(&cache, fetcher.as_ref(), level, &codes);

    let mut outcome = EnsureOutcome {
        requested,
        joined: joined.len(),
        ..EnsureOutcome::default()
    };
    if outcome.is_noop() {
        return outcome;
    }

    let own_result = match own {
        Some(handle) => Some(handle.await),
        None => None,
    };
    let joined_results = join_all(joined).await;

    match own_result {
        Some(Ok(inserted)) => outcome.inserted = inserted,
        Some(Err(e)) => outcome.error = Some(e),
        None => {}
    }
    if outcome.error.is_none() {
        outcome.error = joined_results.into_iter().find_map(Result::err);
    }
    outcome
}

/// Split `codes` into a new request and already running ones, registering
/// the new request's codes as in flight. Runs synchronously so that no other
/// caller can observe the codes as neither cached nor in flight.
fn plan_fetch(
    cache: &SharedCache,
    fetcher: &dyn RecordFetcher,
    level: Level,
    codes: &[String],
) -> (Vec<String>, Option<SharedFetch>, Vec<SharedFetch>) {
    let weak = Rc::downgrade(cache);
    let mut guard = cache.borrow_mut();

    let mut to_fetch = Vec::new();
    let mut joined: Vec<InFlight> = Vec::new();
    for code in guard.uncached(level, codes) {
        match guard.levels[level.index()].in_flight.get(&code) {
            Some(entry) => {
                if !joined.iter().any(|j| j.request_id == entry.request_id) {
                    joined.push(entry.clone());
                }
            }
            None => to_fetch.push(code),
        }
    }

    let own = if to_fetch.is_empty() {
        None
    } else {
        guard.next_request_id += 1;
        let request_id = guard.next_request_id;
        let handle = start_fetch(weak, fetcher, level, request_id, to_fetch.clone());
        let in_flight = &mut guard.levels[level.index()].in_flight;
        for code in &to_fetch {
            in_flight.insert(
                code.clone(),
                InFlight {
                    request_id,
                    handle: handle.clone(),
                },
            );
        }
        debug!(%level, request_id, codes = to_fetch.len(), "records request started");
        Some(handle)
    };

    let joined = joined.into_iter().map(|entry| entry.handle).collect();
    (to_fetch, own, joined)
}

fn start_fetch(
    cache: Weak<RefCell<RecordCache>>,
    fetcher: &dyn RecordFetcher,
    level: Level,
    request_id: u64,
    codes: Vec<String>,
) -> SharedFetch {
    let request = fetcher.fetch(level, codes.clone());
    async move {
        let result = request.await;
        match cache.upgrade() {
            Some(cache) => cache
                .borrow_mut()
                .finish_fetch(level, request_id, &codes, result),
            // The map was torn down while the request was running.
            None => result.map(|_| 0),
        }
    }
    .boxed_local()
    .shared()
}
