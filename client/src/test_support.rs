use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use futures::FutureExt;
use futures::channel::oneshot;

use transparence_shared::{AdministrativeRecord, Level, TransparencyScore};

use crate::feature::{FeatureId, TerritoryFeature};
use crate::fetcher::{FetchError, FetchFuture, FetchResult, RecordFetcher};
use crate::renderer::{FeatureFilter, FeatureRenderer};

pub fn codes(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn record(level: Level, code: &str, score: Option<TransparencyScore>) -> AdministrativeRecord {
    AdministrativeRecord {
        level,
        code: code.to_string(),
        siren: format!("2{code:0>8}"),
        nom: format!("Collectivite {code}"),
        population: 10_000,
        latitude: None,
        longitude: None,
        mp_score: score,
        subventions_score: score,
    }
}

pub fn feature(id: u64, level: i64, code: &str, country: &str) -> TerritoryFeature {
    TerritoryFeature {
        id: Some(FeatureId::Number(id)),
        level: Some(level),
        code: Some(code.to_string()),
        country_code: Some(country.to_string()),
        ..TerritoryFeature::default()
    }
}

pub fn region_feature(id: u64, country: &str) -> TerritoryFeature {
    TerritoryFeature {
        id: Some(FeatureId::Number(id)),
        level: Some(1),
        country_code: Some(country.to_string()),
        ..TerritoryFeature::default()
    }
}

/// Answers immediately from a fixed record set.
#[derive(Default)]
pub struct StaticFetcher {
    records: Vec<AdministrativeRecord>,
    requests: RefCell<Vec<(Level, Vec<String>)>>,
    failing: Cell<bool>,
}

impl StaticFetcher {
    pub fn new(records: Vec<AdministrativeRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<(Level, Vec<String>)> {
        self.requests.borrow().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }
}

impl RecordFetcher for StaticFetcher {
    fn fetch(&self, level: Level, codes: Vec<String>) -> FetchFuture {
        self.requests.borrow_mut().push((level, codes.clone()));
        let result = if self.failing.get() {
            Err(FetchError::Status(503))
        } else {
            Ok(self
                .records
                .iter()
                .filter(|r| r.level == level && codes.contains(&r.code))
                .cloned()
                .collect())
        };
        futures::future::ready(result).boxed_local()
    }
}

/// Each request stays pending until the test resolves it by index.
#[derive(Default)]
pub struct ControlledFetcher {
    requests: RefCell<Vec<(Level, Vec<String>)>>,
    senders: RefCell<Vec<Option<oneshot::Sender<FetchResult>>>>,
}

impl ControlledFetcher {
    pub fn requests(&self) -> Vec<(Level, Vec<String>)> {
        self.requests.borrow().clone()
    }

    pub fn resolve(&self, index: usize, result: FetchResult) {
        let sender = self
            .senders
            .borrow_mut()
            .get_mut(index)
            .and_then(Option::take)
            .expect("request pending at index");
        let _ = sender.send(result);
    }
}

impl RecordFetcher for ControlledFetcher {
    fn fetch(&self, level: Level, codes: Vec<String>) -> FetchFuture {
        let (tx, rx) = oneshot::channel();
        self.requests.borrow_mut().push((level, codes));
        self.senders.borrow_mut().push(Some(tx));
        async move {
            rx.await
                .unwrap_or_else(|_| Err(FetchError::Transport("request dropped".to_string())))
        }
        .boxed_local()
    }
}

/// In-memory renderer: a set of loaded features plus their feature state.
#[derive(Default)]
pub struct MockRenderer {
    pub loaded: RefCell<Vec<TerritoryFeature>>,
    pub states: HashMap<(FeatureId, String), u8>,
    pub writes: usize,
    pub queries: Cell<usize>,
    /// Simulates tiles unloading between the query and the writes.
    pub unload_on_query: bool,
}

impl MockRenderer {
    pub fn with_features(features: Vec<TerritoryFeature>) -> Self {
        Self {
            loaded: RefCell::new(features),
            ..Self::default()
        }
    }

    pub fn state(&self, id: &FeatureId, key: &str) -> Option<u8> {
        self.states.get(&(id.clone(), key.to_string())).copied()
    }
}

impl FeatureRenderer for MockRenderer {
    fn query_source_features(&self, filter: &FeatureFilter) -> Vec<TerritoryFeature> {
        self.queries.set(self.queries.get() + 1);
        let features: Vec<TerritoryFeature> = self
            .loaded
            .borrow()
            .iter()
            .filter(|f| f.matches_country(filter.country_code))
            .cloned()
            .collect();
        if self.unload_on_query {
            self.loaded.borrow_mut().clear();
        }
        features
    }

    fn set_feature_state(&mut self, _filter: &FeatureFilter, id: &FeatureId, key: &str, value: u8) {
        self.writes += 1;
        let loaded = self
            .loaded
            .borrow()
            .iter()
            .any(|f| f.id.as_ref() == Some(id));
        if loaded {
            self.states.insert((id.clone(), key.to_string()), value);
        }
    }
}
