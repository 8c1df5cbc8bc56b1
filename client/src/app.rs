use std::cell::{Cell, RefCell};
use std::rc::Rc;

use gloo_storage::Storage;
use gloo_timers::future::TimeoutFuture;
use leptos::html::Div;
use leptos::prelude::*;
use wasm_bindgen::JsValue;
use wasm_bindgen::closure::Closure;
use wasm_bindgen_futures::spawn_local;

use transparence_shared::{
    DEFAULT_TERRITORY, Level, PopulationBounds, ScoreAttribute, TERRITORIES, TransparencyScore,
    ViewportState, population_bounds_for_level, territory_or_default,
};

use crate::controller::{HoverInfo, MapController, MapEffect, MapEvent};
use crate::fetcher::{HttpRecordFetcher, RECORDS_API_BASE, fetch_population_bounds};
use crate::layers::{self, SCORE_COLORS};
use crate::maplibre::{MaplibreRenderer, PointerEvent};

const SETTINGS_KEY: &str = "transparence_map_settings";

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
struct Settings {
    territory: String,
    score: ScoreAttribute,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            territory: DEFAULT_TERRITORY.to_string(),
            score: ScoreAttribute::default(),
        }
    }
}

#[derive(Clone, Copy)]
struct MapSignals {
    level: RwSignal<Level>,
    loading: RwSignal<bool>,
    hover: RwSignal<Option<HoverInfo>>,
    bounds: RwSignal<Vec<PopulationBounds>>,
}

/// Bridges map events and UI selections to the controller and applies the
/// resulting effects to the page.
#[derive(Clone)]
struct MapHost {
    controller: Rc<RefCell<MapController<MaplibreRenderer>>>,
    map: MaplibreRenderer,
    signals: MapSignals,
    tick_armed: Rc<Cell<bool>>,
    layers_ready: Rc<Cell<bool>>,
}

impl MapHost {
    fn send(&self, event: MapEvent) {
        let now = js_sys::Date::now();
        let dispatch = match self.controller.try_borrow_mut() {
            Ok(mut controller) => controller.dispatch(event, now),
            Err(_) => {
                web_sys::console::warn_1(&JsValue::from_str("map event dropped: controller busy"));
                return;
            }
        };

        for effect in dispatch.effects {
            self.apply(effect);
        }
        for task in dispatch.tasks {
            let host = self.clone();
            spawn_local(async move {
                let event = task.await;
                host.send(event);
            });
        }
        self.schedule_tick();
    }

    fn apply(&self, effect: MapEffect) {
        match effect {
            MapEffect::ViewportChanged(view) => {
                if !same_view(self.map.view_state(), view) {
                    self.map.jump_to(view);
                }
            }
            MapEffect::LevelChanged(level) => self.signals.level.set(level),
            MapEffect::LoadingChanged(loading) => self.signals.loading.set(loading),
            MapEffect::Hover(info) => {
                self.map
                    .set_cursor(if info.is_some() { "pointer" } else { "" });
                self.signals.hover.set(info);
            }
            MapEffect::OpenCommunity { url } => {
                if let Some(window) = web_sys::window() {
                    let _ = window.location().set_href(&url);
                }
            }
            MapEffect::RecordsUpdated(level) => {
                let points = self.controller.borrow().points(level);
                if let Err(e) = self.map.set_points(level, &points) {
                    web_sys::console::warn_2(&JsValue::from_str("population dots"), &e);
                }
            }
            MapEffect::FetchFailed { level, error } => {
                web_sys::console::warn_1(&JsValue::from_str(&format!(
                    "{level} records fetch failed: {error}"
                )));
            }
        }
    }

    /// Keep one timer armed while a recolor pass is pending. A tick that
    /// arrives early simply re-arms for the moved deadline.
    fn schedule_tick(&self) {
        if self.tick_armed.get() {
            return;
        }
        let Some(deadline) = self.controller.borrow().recolor_deadline_ms() else {
            return;
        };
        self.tick_armed.set(true);
        let host = self.clone();
        spawn_local(async move {
            let delay = (deadline - js_sys::Date::now()).max(0.0).ceil() as u32;
            TimeoutFuture::new(delay).await;
            host.tick_armed.set(false);
            host.send(MapEvent::Tick);
        });
    }

    /// Scale the dots of every level to the known population bounds.
    fn apply_population_bounds(&self) {
        if !self.layers_ready.get() {
            return;
        }
        let bounds = self.signals.bounds.get_untracked();
        for level in Level::ALL {
            let range = population_bounds_for_level(&bounds, level);
            if let Err(e) = self.map.set_population_bounds(level, range) {
                web_sys::console::warn_2(&JsValue::from_str("population bounds"), &e);
            }
        }
    }

    fn select_territory(&self, key: &str) {
        self.send(MapEvent::SelectTerritory(key.to_string()));
        let territory = self.controller.borrow().territory();
        if let Err(e) = self.map.configure_territory(territory) {
            web_sys::console::warn_2(&JsValue::from_str("territory layers"), &e);
        }
    }

    fn select_score(&self, score: ScoreAttribute) {
        if let Err(e) = self.map.set_score_attribute(score) {
            web_sys::console::warn_2(&JsValue::from_str("score paint"), &e);
        }
        self.send(MapEvent::SelectScore(score));
    }
}

fn same_view(a: ViewportState, b: ViewportState) -> bool {
    const EPS: f64 = 1e-7;
    (a.longitude - b.longitude).abs() < EPS
        && (a.latitude - b.latitude).abs() < EPS
        && (a.zoom - b.zoom).abs() < EPS
}

struct MapBindings {
    host: MapHost,
    _handlers: Vec<Closure<dyn FnMut(JsValue)>>,
}

thread_local! {
    static MAP_BINDINGS: RefCell<Option<MapBindings>> = const { RefCell::new(None) };
}

fn with_host(f: impl FnOnce(&MapHost)) {
    MAP_BINDINGS.with(|slot| {
        if let Some(bindings) = slot.borrow().as_ref() {
            f(&bindings.host);
        }
    });
}

/// API key for the boundary tiles, read from `data-maptiler-key` on the
/// mount node.
fn maptiler_key() -> Option<String> {
    web_sys::window()?
        .document()?
        .get_element_by_id("app")?
        .get_attribute("data-maptiler-key")
}

fn init_map(
    container: &web_sys::HtmlElement,
    territory_key: &str,
    score: ScoreAttribute,
    signals: MapSignals,
) -> Result<MapBindings, JsValue> {
    let territory = territory_or_default(territory_key);
    let map = MaplibreRenderer::create(container, territory)?;
    let controller = MapController::new(
        map.clone(),
        Rc::new(HttpRecordFetcher::default()),
        territory.key,
        score,
    );
    let host = MapHost {
        controller: Rc::new(RefCell::new(controller)),
        map: map.clone(),
        signals,
        tick_armed: Rc::new(Cell::new(false)),
        layers_ready: Rc::new(Cell::new(false)),
    };
    let tiles_url = layers::tiles_url(maptiler_key().as_deref());
    let mut handlers: Vec<Closure<dyn FnMut(JsValue)>> = Vec::new();

    let h = host.clone();
    let on_load = Closure::<dyn FnMut(JsValue)>::new(move |_| {
        let (territory, score) = {
            let c = h.controller.borrow();
            (c.territory(), c.score())
        };
        if let Err(e) = h.map.add_layers(&tiles_url, territory, score) {
            web_sys::console::error_2(&JsValue::from_str("map layers"), &e);
            return;
        }
        h.layers_ready.set(true);
        h.apply_population_bounds();
        h.send(MapEvent::Load);
    });
    map.on("load", &on_load)?;
    handlers.push(on_load);

    // Tiles of the freshly added source land after `load`; the first idle
    // after that is the earliest point where features can be read back.
    let h = host.clone();
    let first_idle = Cell::new(true);
    let on_idle = Closure::<dyn FnMut(JsValue)>::new(move |_| {
        if first_idle.replace(false) {
            h.send(MapEvent::MoveEnd);
        }
    });
    map.on("idle", &on_idle)?;
    handlers.push(on_idle);

    let h = host.clone();
    let on_move = Closure::<dyn FnMut(JsValue)>::new(move |_| {
        h.send(MapEvent::Move(h.map.view_state()));
    });
    map.on("move", &on_move)?;
    handlers.push(on_move);

    let h = host.clone();
    let on_move_end = Closure::<dyn FnMut(JsValue)>::new(move |_| h.send(MapEvent::MoveEnd));
    map.on("moveend", &on_move_end)?;
    handlers.push(on_move_end);

    for level in Level::ALL {
        let h = host.clone();
        let on_hover = Closure::<dyn FnMut(JsValue)>::new(move |e: JsValue| {
            let PointerEvent { x, y, features } = PointerEvent::from_js(&e);
            h.send(MapEvent::Hover { x, y, features });
        });
        map.on_layer("mousemove", level.layer_id(), &on_hover)?;
        handlers.push(on_hover);

        let h = host.clone();
        let on_leave = Closure::<dyn FnMut(JsValue)>::new(move |_| h.send(MapEvent::HoverOut));
        map.on_layer("mouseleave", level.layer_id(), &on_leave)?;
        handlers.push(on_leave);

        let h = host.clone();
        let on_click = Closure::<dyn FnMut(JsValue)>::new(move |e: JsValue| {
            h.send(MapEvent::Click(PointerEvent::from_js(&e).features));
        });
        map.on_layer("click", level.layer_id(), &on_click)?;
        handlers.push(on_click);
    }

    Ok(MapBindings {
        host,
        _handlers: handlers,
    })
}

/// Root application component.
#[component]
pub fn App() -> impl IntoView {
    let saved: Settings = gloo_storage::LocalStorage::get(SETTINGS_KEY).unwrap_or_default();
    let initial_territory = territory_or_default(&saved.territory);

    let territory_key: RwSignal<String> = RwSignal::new(initial_territory.key.to_string());
    let score: RwSignal<ScoreAttribute> = RwSignal::new(saved.score);
    let signals = MapSignals {
        level: RwSignal::new(initial_territory.level_at(initial_territory.view_state.zoom)),
        loading: RwSignal::new(false),
        hover: RwSignal::new(None),
        bounds: RwSignal::new(Vec::new()),
    };
    let bounds = signals.bounds;
    let map_ref = NodeRef::<Div>::new();

    Effect::new(move || {
        let settings = Settings {
            territory: territory_key.get(),
            score: score.get(),
        };
        let _ = gloo_storage::LocalStorage::set(SETTINGS_KEY, &settings);
    });

    Effect::new(move || {
        let Some(container) = map_ref.get() else {
            return;
        };
        if MAP_BINDINGS.with(|slot| slot.borrow().is_some()) {
            return;
        }
        match init_map(
            &container,
            &territory_key.get_untracked(),
            score.get_untracked(),
            signals,
        ) {
            Ok(bindings) => MAP_BINDINGS.with(|slot| *slot.borrow_mut() = Some(bindings)),
            Err(e) => web_sys::console::error_2(&JsValue::from_str("map init failed"), &e),
        }
    });

    Effect::new(move || {
        bounds.track();
        with_host(MapHost::apply_population_bounds);
    });

    on_cleanup(|| {
        if let Some(bindings) = MAP_BINDINGS.with(|slot| slot.borrow_mut().take()) {
            bindings.host.map.remove();
        }
    });

    spawn_local(async move {
        match fetch_population_bounds(RECORDS_API_BASE).await {
            Ok(b) => bounds.set(b),
            Err(e) => web_sys::console::warn_1(&JsValue::from_str(&format!(
                "population bounds unavailable: {e}"
            ))),
        }
    });

    let on_territory = move |key: String| {
        territory_key.set(key.clone());
        with_host(|host| host.select_territory(&key));
    };
    let on_score = move |attribute: ScoreAttribute| {
        score.set(attribute);
        with_host(|host| host.select_score(attribute));
    };

    view! {
        <div style="width: 100%; height: 100%; position: relative; background: #fff;">
            <div node_ref=map_ref style="position: absolute; inset: 0;" />
            <div style="position: absolute; top: 12px; left: 12px; z-index: 5; display: flex; flex-direction: column; gap: 8px;">
                <TerritorySelect selected=territory_key on_select=on_territory />
                <ScoreControls selected=score on_select=on_score />
            </div>
            <Legend level=signals.level bounds=bounds />
            {move || {
                signals.loading.get().then(|| view! {
                    <div style="position: absolute; top: 12px; right: 12px; z-index: 5; padding: 4px 10px; background: rgba(255,255,255,0.85); border-radius: 4px; font-size: 0.75rem; color: #555;">
                        "Chargement…"
                    </div>
                })
            }}
        </div>
        <Tooltip hover=signals.hover score=score />
    }
}

#[component]
fn TerritorySelect(
    selected: RwSignal<String>,
    on_select: impl Fn(String) + 'static,
) -> impl IntoView {
    view! {
        <select
            style="padding: 4px 8px; border-radius: 4px; border: 1px solid #ccc; background: #fff;"
            prop:value=move || selected.get()
            on:change=move |ev| on_select(event_target_value(&ev))
        >
            {TERRITORIES
                .iter()
                .map(|t| view! { <option value=t.key>{t.name}</option> })
                .collect_view()}
        </select>
    }
}

#[component]
fn ScoreControls(
    selected: RwSignal<ScoreAttribute>,
    on_select: impl Fn(ScoreAttribute) + Clone + 'static,
) -> impl IntoView {
    view! {
        <div style="display: flex; gap: 4px;">
            {ScoreAttribute::ALL
                .into_iter()
                .map(|attribute| {
                    let on_select = on_select.clone();
                    view! {
                        <button
                            style:background=move || {
                                if selected.get() == attribute { "#1976d2" } else { "#fff" }
                            }
                            style:color=move || {
                                if selected.get() == attribute { "#fff" } else { "#333" }
                            }
                            style="padding: 4px 10px; border: 1px solid #1976d2; border-radius: 4px; cursor: pointer; font-size: 0.8rem;"
                            on:click=move |_| on_select(attribute)
                        >
                            {attribute.label()}
                        </button>
                    }
                })
                .collect_view()}
        </div>
    }
}

#[component]
fn Legend(level: RwSignal<Level>, bounds: RwSignal<Vec<PopulationBounds>>) -> impl IntoView {
    let population = move || {
        let (min, max) = population_bounds_for_level(&bounds.get(), level.get());
        format!("Population : {min} – {max}")
    };

    view! {
        <div style="position: absolute; bottom: 16px; left: 12px; z-index: 5; padding: 8px 10px; background: rgba(255,255,255,0.9); border-radius: 6px; font-size: 0.75rem; color: #333;">
            <div style="display: flex; gap: 6px; align-items: center;">
                {TransparencyScore::ALL
                    .into_iter()
                    .zip(SCORE_COLORS)
                    .map(|(score, color)| view! {
                        <span style="display: inline-flex; align-items: center; gap: 3px;">
                            <span style=format!("width: 12px; height: 12px; border-radius: 2px; background: {color};") />
                            {score.letter()}
                        </span>
                    })
                    .collect_view()}
            </div>
            <div style="margin-top: 4px; color: #666;">{population}</div>
        </div>
    }
}

#[component]
fn Tooltip(hover: RwSignal<Option<HoverInfo>>, score: RwSignal<ScoreAttribute>) -> impl IntoView {
    view! {
        {move || {
            let info = hover.get()?;
            let attribute = score.get();
            let (title, detail) = match &info.record {
                Some(record) => {
                    let letter = record
                        .score(attribute)
                        .map_or("-", TransparencyScore::letter);
                    (
                        record.nom.clone(),
                        format!("{} : {letter} · {} hab.", attribute.label(), record.population),
                    )
                }
                None => (info.level.to_string(), "Données indisponibles".to_string()),
            };
            Some(view! {
                <div
                    style:left=format!("{}px", info.x + 16.0)
                    style:top=format!("{}px", info.y - 8.0)
                    style="position: fixed; pointer-events: none; z-index: 100; background: #fff; border: 1px solid #ddd; border-radius: 6px; padding: 6px 10px; box-shadow: 0 2px 8px rgba(0,0,0,0.2); font-size: 0.8rem;"
                >
                    <div style="font-weight: 700; color: #222;">{title}</div>
                    <div style="color: #555; margin-top: 2px;">{detail}</div>
                </div>
            })
        }}
    }
}
