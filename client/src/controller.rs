use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use tracing::{debug, warn};

use transparence_shared::{
    AdministrativeRecord, DEFAULT_TERRITORY, Level, MapPoint, ScoreAttribute, TerritoryConfig,
    ViewportState, map_points, territory, territory_or_default,
};

use crate::cache::{EnsureOutcome, RecordCache, SharedCache, ensure_records};
use crate::debounce::{DEFAULT_WINDOW_MS, Debouncer};
use crate::extract::visible_codes;
use crate::feature::TerritoryFeature;
use crate::fetcher::{FetchError, RecordFetcher};
use crate::merge::{MergeStats, record_for_pointer_feature, update_feature_states};
use crate::renderer::FeatureRenderer;

/// Input to [`MapController::dispatch`]: renderer events, UI selections, and
/// completions of tasks the controller handed out earlier.
#[derive(Debug, Clone)]
pub enum MapEvent {
    Load,
    Move(ViewportState),
    MoveEnd,
    /// Timer wake-up for the debounced recolor pass.
    Tick,
    Hover {
        x: f64,
        y: f64,
        features: Vec<TerritoryFeature>,
    },
    HoverOut,
    Click(Vec<TerritoryFeature>),
    SelectTerritory(String),
    SelectScore(ScoreAttribute),
    RecordsSettled {
        level: Level,
        outcome: EnsureOutcome,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HoverInfo {
    pub x: f64,
    pub y: f64,
    pub level: Level,
    pub record: Option<AdministrativeRecord>,
}

/// Output of a dispatch for the page to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEffect {
    ViewportChanged(ViewportState),
    LevelChanged(Level),
    LoadingChanged(bool),
    Hover(Option<HoverInfo>),
    OpenCommunity { url: String },
    RecordsUpdated(Level),
    /// A records request failed; the codes are retried on the next move.
    FetchFailed { level: Level, error: FetchError },
}

/// Background work to spawn on the local executor. Its result must be fed
/// back into [`MapController::dispatch`].
pub type MapTask = LocalBoxFuture<'static, MapEvent>;

#[derive(Default)]
pub struct Dispatch {
    pub effects: Vec<MapEffect>,
    pub tasks: Vec<MapTask>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelStatus {
    #[default]
    Idle,
    Loading {
        pending: usize,
    },
}

impl LevelStatus {
    pub fn is_loading(self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    fn started(self) -> Self {
        match self {
            Self::Idle => Self::Loading { pending: 1 },
            Self::Loading { pending } => Self::Loading {
                pending: pending + 1,
            },
        }
    }

    fn settled(self) -> Self {
        match self {
            Self::Loading { pending } if pending > 1 => Self::Loading {
                pending: pending - 1,
            },
            _ => Self::Idle,
        }
    }
}

/// Keeps the choropleth in sync with the viewport.
///
/// Owns the record cache and the renderer. All state changes go through
/// [`Self::dispatch`], which never blocks: record fetches are returned as
/// tasks, and the recolor pass after a camera move is deferred until the
/// host reports a [`MapEvent::Tick`] past [`Self::recolor_deadline_ms`].
pub struct MapController<R> {
    renderer: R,
    fetcher: Rc<dyn RecordFetcher>,
    cache: SharedCache,
    territory: &'static TerritoryConfig,
    score: ScoreAttribute,
    viewport: ViewportState,
    level: Level,
    status: [LevelStatus; 3],
    recolor: Debouncer<ViewportState>,
}

impl<R: FeatureRenderer> MapController<R> {
    pub fn new(
        renderer: R,
        fetcher: Rc<dyn RecordFetcher>,
        territory_key: &str,
        score: ScoreAttribute,
    ) -> Self {
        let territory = lookup_territory(territory_key);
        let viewport = territory.view_state;
        Self {
            renderer,
            fetcher,
            cache: RecordCache::shared(),
            territory,
            score,
            viewport,
            level: territory.level_at(viewport.zoom),
            status: Default::default(),
            recolor: Debouncer::new(DEFAULT_WINDOW_MS),
        }
    }

    #[cfg(test)]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    #[cfg(test)]
    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn territory(&self) -> &'static TerritoryConfig {
        self.territory
    }

    pub fn score(&self) -> ScoreAttribute {
        self.score
    }

    #[cfg(test)]
    pub fn viewport(&self) -> ViewportState {
        self.viewport
    }

    #[cfg(test)]
    pub fn level(&self) -> Level {
        self.level
    }

    #[cfg(test)]
    pub fn status(&self, level: Level) -> LevelStatus {
        self.status[level.index()]
    }

    /// Population dots for the cached records of `level`.
    pub fn points(&self, level: Level) -> Vec<MapPoint> {
        map_points(self.cache.borrow().records(level))
    }

    pub fn is_loading(&self) -> bool {
        self.status.iter().any(|s| s.is_loading())
    }

    /// When the host should send the next [`MapEvent::Tick`].
    pub fn recolor_deadline_ms(&self) -> Option<f64> {
        self.recolor.deadline_ms()
    }

    pub fn dispatch(&mut self, event: MapEvent, now_ms: f64) -> Dispatch {
        let mut out = Dispatch::default();
        match event {
            MapEvent::Move(view) => {
                self.viewport = view.clamped_to(self.territory);
                out.effects.push(MapEffect::ViewportChanged(self.viewport));
                self.recolor.push(self.viewport, now_ms);
            }
            MapEvent::Tick => {
                if let Some(view) = self.recolor.poll(now_ms) {
                    self.update_level(view.zoom, &mut out);
                    self.recolor_now();
                }
            }
            MapEvent::Load | MapEvent::MoveEnd => {
                self.request_visible(&mut out);
                self.recolor_now();
            }
            MapEvent::RecordsSettled { level, outcome } => {
                self.settle(level, outcome, &mut out);
                self.recolor_now();
            }
            MapEvent::Click(features) => {
                let url = features
                    .first()
                    .and_then(|f| self.pointer_record(f))
                    .and_then(|record| record.community_path());
                if let Some(url) = url {
                    out.effects.push(MapEffect::OpenCommunity { url });
                }
            }
            MapEvent::Hover { x, y, features } => {
                let info = features.first().and_then(|feature| {
                    let (level, _) = feature.pointer_key()?;
                    Some(HoverInfo {
                        x,
                        y,
                        level,
                        record: self.pointer_record(feature),
                    })
                });
                out.effects.push(MapEffect::Hover(info));
            }
            MapEvent::HoverOut => out.effects.push(MapEffect::Hover(None)),
            MapEvent::SelectTerritory(key) => {
                self.territory = lookup_territory(&key);
                self.viewport = self.territory.view_state;
                self.recolor.cancel();
                out.effects.push(MapEffect::ViewportChanged(self.viewport));
                self.update_level(self.viewport.zoom, &mut out);
            }
            MapEvent::SelectScore(score) => {
                self.score = score;
                self.recolor_now();
            }
        }
        out
    }

    fn update_level(&mut self, zoom: f64, out: &mut Dispatch) {
        let level = self.territory.level_at(zoom);
        if level != self.level {
            debug!(from = %self.level, to = %level, zoom, "level changed");
            self.level = level;
            out.effects.push(MapEffect::LevelChanged(level));
        }
    }

    fn request_visible(&mut self, out: &mut Dispatch) {
        let was_loading = self.is_loading();
        let visible = visible_codes(&self.renderer, self.territory.filter_code);

        for level in Level::ALL {
            let missing = self
                .cache
                .borrow()
                .uncached(level, visible.for_level(level));
            if missing.is_empty() {
                continue;
            }

            let slot = &mut self.status[level.index()];
            *slot = slot.started();
            let task = ensure_records(self.cache.clone(), self.fetcher.clone(), level, missing)
                .map(move |outcome| MapEvent::RecordsSettled { level, outcome })
                .boxed_local();
            out.tasks.push(task);
        }

        if !was_loading && self.is_loading() {
            out.effects.push(MapEffect::LoadingChanged(true));
        }
    }

    fn settle(&mut self, level: Level, outcome: EnsureOutcome, out: &mut Dispatch) {
        let slot = &mut self.status[level.index()];
        *slot = slot.settled();

        if outcome.inserted > 0 || outcome.joined > 0 {
            out.effects.push(MapEffect::RecordsUpdated(level));
        }
        if let Some(error) = outcome.error {
            debug!(%level, error = %error, "records settled with error; retried on next move");
            out.effects.push(MapEffect::FetchFailed { level, error });
        }
        if !self.is_loading() {
            out.effects.push(MapEffect::LoadingChanged(false));
        }
    }

    fn pointer_record(&self, feature: &TerritoryFeature) -> Option<AdministrativeRecord> {
        record_for_pointer_feature(feature, &self.cache.borrow()).cloned()
    }

    fn recolor_now(&mut self) -> MergeStats {
        let stats = update_feature_states(
            &mut self.renderer,
            &self.cache.borrow(),
            self.score,
            self.territory.filter_code,
        );
        debug!(
            territory = self.territory.key,
            score = %self.score,
            written = stats.written,
            without_record = stats.without_record,
            "feature states updated"
        );
        stats
    }
}

fn lookup_territory(key: &str) -> &'static TerritoryConfig {
    territory(key).unwrap_or_else(|| {
        warn!(key, fallback = DEFAULT_TERRITORY, "unknown territory");
        territory_or_default(DEFAULT_TERRITORY)
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use futures::executor::{LocalPool, block_on};
    use futures::future::join_all;
    use futures::task::LocalSpawnExt;

    use super::*;
    use crate::feature::FeatureId;
    use crate::test_support::{
        ControlledFetcher, MockRenderer, StaticFetcher, feature, record, region_feature,
    };
    use transparence_shared::TransparencyScore;

    fn renderer() -> MockRenderer {
        MockRenderer::with_features(vec![
            region_feature(1_075, "FR"),
            feature(2, 2, "33", "FR"),
            feature(3, 3, "33063", "FR"),
            feature(4, 2, "971", "GP"),
        ])
    }

    fn fetcher() -> Rc<StaticFetcher> {
        Rc::new(StaticFetcher::new(vec![
            record(Level::Region, "75", Some(TransparencyScore::A)),
            record(Level::Departement, "33", Some(TransparencyScore::B)),
        ]))
    }

    fn controller(fetcher: Rc<dyn RecordFetcher>) -> MapController<MockRenderer> {
        MapController::new(renderer(), fetcher, "metropole", ScoreAttribute::MarchesPublics)
    }

    /// Run the dispatch's tasks to completion and feed their results back.
    fn settle_all(controller: &mut MapController<MockRenderer>, dispatch: Dispatch) -> Vec<MapEffect> {
        let events = block_on(join_all(dispatch.tasks));
        events
            .into_iter()
            .flat_map(|event| controller.dispatch(event, 0.0).effects)
            .collect()
    }

    fn mp_state(controller: &MapController<MockRenderer>, id: u64) -> Option<u8> {
        controller
            .renderer()
            .state(&FeatureId::Number(id), ScoreAttribute::MarchesPublics.as_str())
    }

    #[test]
    fn load_fetches_visible_levels_and_colors_features() {
        let fetcher = fetcher();
        let mut c = controller(fetcher.clone());

        let d = c.dispatch(MapEvent::Load, 0.0);
        assert_eq!(d.effects, vec![MapEffect::LoadingChanged(true)]);
        assert_eq!(d.tasks.len(), 3);
        assert_eq!(c.status(Level::Region), LevelStatus::Loading { pending: 1 });
        // Colored right away with what is cached: nothing yet.
        assert_eq!(mp_state(&c, 1_075), Some(5));

        let effects = settle_all(&mut c, d);
        assert!(effects.contains(&MapEffect::RecordsUpdated(Level::Region)));
        assert_eq!(effects.last(), Some(&MapEffect::LoadingChanged(false)));
        assert!(!c.is_loading());

        assert_eq!(mp_state(&c, 1_075), Some(1));
        assert_eq!(mp_state(&c, 2), Some(2));
        assert_eq!(mp_state(&c, 3), Some(5));
        assert_eq!(mp_state(&c, 4), None);
    }

    #[test]
    fn move_end_only_requests_what_is_still_missing() {
        let fetcher = fetcher();
        let mut c = controller(fetcher.clone());
        let d = c.dispatch(MapEvent::Load, 0.0);
        settle_all(&mut c, d);

        let d = c.dispatch(MapEvent::MoveEnd, 0.0);
        assert_eq!(d.tasks.len(), 1);
        settle_all(&mut c, d);

        let requests = fetcher.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[3], (Level::Commune, vec!["33063".to_string()]));
    }

    #[test]
    fn moves_are_clamped_and_recolored_once_after_the_window() {
        let mut c = controller(fetcher());
        let mut view = c.viewport();

        view.zoom = 7.0;
        let d = c.dispatch(MapEvent::Move(view), 0.0);
        assert_eq!(d.effects, vec![MapEffect::ViewportChanged(view)]);

        view.zoom = 30.0;
        let d = c.dispatch(MapEvent::Move(view), 100.0);
        let clamped = ViewportState { zoom: 14.0, ..view };
        assert_eq!(d.effects, vec![MapEffect::ViewportChanged(clamped)]);
        assert_eq!(c.recolor_deadline_ms(), Some(100.0 + DEFAULT_WINDOW_MS));

        assert!(c.dispatch(MapEvent::Tick, 200.0).effects.is_empty());
        assert_eq!(c.level(), Level::Region);

        let queries_before = c.renderer().queries.get();
        let d = c.dispatch(MapEvent::Tick, 400.0);
        assert_eq!(d.effects, vec![MapEffect::LevelChanged(Level::Commune)]);
        assert_eq!(c.renderer().queries.get(), queries_before + 1);

        assert!(c.dispatch(MapEvent::Tick, 1_000.0).effects.is_empty());
        assert_eq!(c.renderer().queries.get(), queries_before + 1);
    }

    #[test]
    fn click_opens_the_community_page() {
        let mut c = controller(fetcher());
        let d = c.dispatch(MapEvent::Load, 0.0);
        settle_all(&mut c, d);

        let d = c.dispatch(MapEvent::Click(vec![region_feature(1_075, "FR")]), 0.0);
        assert_eq!(
            d.effects,
            vec![MapEffect::OpenCommunity {
                url: "/community/200000075".to_string()
            }]
        );

        let d = c.dispatch(MapEvent::Click(vec![feature(3, 3, "33063", "FR")]), 0.0);
        assert!(d.effects.is_empty());
        assert!(c.dispatch(MapEvent::Click(Vec::new()), 0.0).effects.is_empty());
    }

    #[test]
    fn hover_reports_record_and_clears_on_out() {
        let mut c = controller(fetcher());
        let d = c.dispatch(MapEvent::Load, 0.0);
        settle_all(&mut c, d);

        let d = c.dispatch(
            MapEvent::Hover {
                x: 10.0,
                y: 20.0,
                features: vec![feature(2, 2, "33", "FR")],
            },
            0.0,
        );
        let [MapEffect::Hover(Some(info))] = d.effects.as_slice() else {
            panic!("expected a hover effect, got {:?}", d.effects);
        };
        assert_eq!((info.x, info.y, info.level), (10.0, 20.0, Level::Departement));
        assert_eq!(info.record.as_ref().map(|r| r.code.as_str()), Some("33"));

        let d = c.dispatch(
            MapEvent::Hover {
                x: 0.0,
                y: 0.0,
                features: vec![feature(3, 3, "33063", "FR")],
            },
            0.0,
        );
        let [MapEffect::Hover(Some(info))] = d.effects.as_slice() else {
            panic!("expected a hover effect, got {:?}", d.effects);
        };
        assert_eq!(info.record, None);

        let d = c.dispatch(MapEvent::HoverOut, 0.0);
        assert_eq!(d.effects, vec![MapEffect::Hover(None)]);
    }

    #[test]
    fn selecting_a_score_rewrites_feature_state() {
        let mut c = controller(fetcher());
        let d = c.dispatch(MapEvent::Load, 0.0);
        settle_all(&mut c, d);

        c.dispatch(MapEvent::SelectScore(ScoreAttribute::Subventions), 0.0);
        assert_eq!(c.score(), ScoreAttribute::Subventions);
        assert_eq!(
            c.renderer()
                .state(&FeatureId::Number(1_075), "subventions_score"),
            Some(1)
        );
    }

    #[test]
    fn selecting_a_territory_resets_view_and_keeps_cache() {
        let mut c = controller(fetcher());
        let d = c.dispatch(MapEvent::Load, 0.0);
        settle_all(&mut c, d);

        let mut view = c.viewport();
        view.zoom = 7.0;
        c.dispatch(MapEvent::Move(view), 0.0);
        let d = c.dispatch(MapEvent::SelectTerritory("guadeloupe".to_string()), 10.0);

        let guadeloupe = territory_or_default("guadeloupe");
        assert_eq!(c.territory().key, "guadeloupe");
        assert_eq!(d.effects, vec![MapEffect::ViewportChanged(guadeloupe.view_state)]);
        assert_eq!(c.recolor_deadline_ms(), None);
        assert!(c.dispatch(MapEvent::Tick, 1_000.0).effects.is_empty());
        assert_eq!(c.level(), Level::Region);
        assert!(c.cache().borrow().contains(Level::Region, "75"));

        c.dispatch(MapEvent::SelectTerritory("atlantide".to_string()), 20.0);
        assert_eq!(c.territory().key, DEFAULT_TERRITORY);
    }

    #[test]
    fn failed_fetch_settles_to_idle_with_worst_scores() {
        let fetcher = fetcher();
        fetcher.set_failing(true);
        let mut c = controller(fetcher.clone());

        let d = c.dispatch(MapEvent::Load, 0.0);
        let effects = settle_all(&mut c, d);

        let failed: Vec<Level> = effects
            .iter()
            .filter_map(|e| match e {
                MapEffect::FetchFailed { level, error } => {
                    assert_eq!(*error, FetchError::Status(503));
                    Some(*level)
                }
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec![Level::Region, Level::Departement, Level::Commune]);
        assert_eq!(effects.last(), Some(&MapEffect::LoadingChanged(false)));
        assert!(!effects.iter().any(|e| matches!(e, MapEffect::RecordsUpdated(_))));
        assert!(!c.is_loading());
        assert_eq!(mp_state(&c, 1_075), Some(5));
        assert_eq!(c.cache().borrow().len(Level::Region), 0);
    }

    #[test]
    fn points_cover_cached_records_with_coordinates() {
        let mut located = record(Level::Region, "75", Some(TransparencyScore::A));
        located.longitude = Some(-0.58);
        located.latitude = Some(44.84);
        located.population = 6_000_000;
        let fetcher = Rc::new(StaticFetcher::new(vec![
            located,
            record(Level::Departement, "33", Some(TransparencyScore::B)),
        ]));
        let mut c = controller(fetcher);
        assert!(c.points(Level::Region).is_empty());

        let d = c.dispatch(MapEvent::Load, 0.0);
        settle_all(&mut c, d);

        let points = c.points(Level::Region);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, "75");
        assert_eq!(points[0].population, 6_000_000);
        assert_eq!(points[0].coordinates, [-0.58, 44.84]);
        // Cached but without coordinates.
        assert!(c.points(Level::Departement).is_empty());
    }

    #[test]
    fn overlapping_move_ends_share_requests_and_count_pending() {
        let mut pool = LocalPool::new();
        let fetcher = Rc::new(ControlledFetcher::default());
        let mut c = controller(fetcher.clone());

        let settled = Rc::new(RefCell::new(Vec::new()));
        for event in [MapEvent::Load, MapEvent::MoveEnd] {
            for task in c.dispatch(event, 0.0).tasks {
                let settled = settled.clone();
                pool.spawner()
                    .spawn_local(async move {
                        let event = task.await;
                        settled.borrow_mut().push(event);
                    })
                    .expect("spawn task");
            }
        }
        pool.run_until_stalled();

        assert_eq!(c.status(Level::Departement), LevelStatus::Loading { pending: 2 });
        assert_eq!(fetcher.requests().len(), 3);

        for index in 0..3 {
            fetcher.resolve(index, Ok(Vec::new()));
        }
        pool.run_until_stalled();

        let events: Vec<MapEvent> = settled.borrow_mut().drain(..).collect();
        assert_eq!(events.len(), 6);
        let mut effects = Vec::new();
        for event in events {
            effects.extend(c.dispatch(event, 0.0).effects);
        }
        assert!(!c.is_loading());
        assert_eq!(
            effects
                .iter()
                .filter(|e| **e == MapEffect::LoadingChanged(false))
                .count(),
            1
        );
    }
}
