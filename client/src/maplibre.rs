use js_sys::{Array, Function, Object, Reflect};
use serde::Serialize;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};

use transparence_shared::{
    DEFAULT_POPULATION_BOUNDS, Level, MapPoint, ScoreAttribute, TerritoryConfig, ViewportState,
};

use crate::feature::{FeatureId, TerritoryFeature};
use crate::layers;
use crate::renderer::{FeatureFilter, FeatureRenderer, SOURCE_ID};

fn js_get(target: &JsValue, key: &str) -> Option<JsValue> {
    Reflect::get(target, &JsValue::from_str(key))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

fn js_call(target: &JsValue, method: &str, args: &[JsValue]) -> Result<JsValue, JsValue> {
    let func = Reflect::get(target, &JsValue::from_str(method))?.dyn_into::<Function>()?;
    let args: Array = args.iter().collect();
    Reflect::apply(&func, target, &args)
}

fn to_js(value: &serde_json::Value) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(JsValue::from)
}

fn warn(message: &str, err: &JsValue) {
    web_sys::console::warn_2(&JsValue::from_str(message), err);
}

/// Tile property that may be encoded as a string or a number.
fn property_string(properties: &JsValue, key: &str) -> Option<String> {
    let value = js_get(properties, key)?;
    value
        .as_string()
        .or_else(|| value.as_f64().map(|n| format!("{n}")))
}

fn feature_id(value: &JsValue) -> Option<FeatureId> {
    let id = js_get(value, "id")?;
    match id.as_f64() {
        Some(n) if n.is_finite() && n >= 0.0 => Some(FeatureId::Number(n as u64)),
        _ => id.as_string().map(FeatureId::Text),
    }
}

/// Read the properties the map engine needs from a maplibre feature object.
fn territory_feature(value: &JsValue) -> TerritoryFeature {
    let properties = js_get(value, "properties").unwrap_or(JsValue::UNDEFINED);
    TerritoryFeature {
        id: feature_id(value),
        level: js_get(&properties, "level")
            .and_then(|l| l.as_f64())
            .filter(|l| l.fract() == 0.0)
            .map(|l| l as i64),
        code: property_string(&properties, "code"),
        code_insee: property_string(&properties, "code_insee"),
        country_code: property_string(&properties, crate::renderer::COUNTRY_PROPERTY),
        layer_id: js_get(value, "layer")
            .and_then(|layer| js_get(&layer, "id"))
            .and_then(|id| id.as_string()),
    }
}

fn territory_features(array: &JsValue) -> Vec<TerritoryFeature> {
    match array.dyn_ref::<Array>() {
        Some(array) => array.iter().map(|f| territory_feature(&f)).collect(),
        None => Vec::new(),
    }
}

/// Pointer payload of a maplibre layer event.
pub struct PointerEvent {
    pub x: f64,
    pub y: f64,
    pub features: Vec<TerritoryFeature>,
}

impl PointerEvent {
    pub fn from_js(event: &JsValue) -> Self {
        let point = js_get(event, "point").unwrap_or(JsValue::UNDEFINED);
        let coord = |key: &str| {
            js_get(&point, key)
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0)
        };
        Self {
            x: coord("x"),
            y: coord("y"),
            features: js_get(event, "features")
                .map(|f| territory_features(&f))
                .unwrap_or_default(),
        }
    }
}

/// Handle to a `maplibregl.Map` instance. Cloning shares the same map.
#[derive(Clone)]
pub struct MaplibreRenderer {
    map: Object,
}

impl MaplibreRenderer {
    /// Construct the map inside `container` using the page's global
    /// `maplibregl`.
    pub fn create(
        container: &web_sys::HtmlElement,
        territory: &TerritoryConfig,
    ) -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let maplibre = js_get(window.as_ref(), "maplibregl")
            .ok_or_else(|| JsValue::from_str("maplibregl is not loaded"))?;
        let ctor = Reflect::get(&maplibre, &JsValue::from_str("Map"))?.dyn_into::<Function>()?;

        let view = territory.view_state;
        let options = to_js(&serde_json::json!({
            "style": layers::base_style(),
            "center": [view.longitude, view.latitude],
            "zoom": view.zoom,
            "minZoom": territory.min_zoom,
            "maxZoom": territory.max_zoom,
            "attributionControl": false,
        }))?;
        Reflect::set(&options, &JsValue::from_str("container"), container)?;

        let map = Reflect::construct(&ctor, &Array::of1(&options))?.dyn_into::<Object>()?;
        Ok(Self { map })
    }

    /// Add the boundaries source and the fill and outline layers per level,
    /// then an empty population dots layer per level on top.
    pub fn add_layers(
        &self,
        tiles_url: &str,
        territory: &TerritoryConfig,
        attribute: ScoreAttribute,
    ) -> Result<(), JsValue> {
        js_call(
            &self.map,
            "addSource",
            &[JsValue::from_str(SOURCE_ID), to_js(&layers::source(tiles_url))?],
        )?;
        for level in Level::ALL {
            js_call(
                &self.map,
                "addLayer",
                &[to_js(&layers::fill_layer(level, territory, attribute))?],
            )?;
            js_call(
                &self.map,
                "addLayer",
                &[to_js(&layers::outline_layer(level, territory))?],
            )?;
        }
        for level in Level::ALL {
            js_call(
                &self.map,
                "addSource",
                &[
                    JsValue::from_str(&layers::dots_source_id(level)),
                    to_js(&layers::dots_source(&[]))?,
                ],
            )?;
            js_call(
                &self.map,
                "addLayer",
                &[to_js(&layers::dots_layer(
                    level,
                    territory,
                    DEFAULT_POPULATION_BOUNDS,
                ))?],
            )?;
        }
        Ok(())
    }

    /// Replace the dots of one level.
    pub fn set_points(&self, level: Level, points: &[MapPoint]) -> Result<(), JsValue> {
        let source = js_call(
            &self.map,
            "getSource",
            &[JsValue::from_str(&layers::dots_source_id(level))],
        )?;
        js_call(&source, "setData", &[to_js(&layers::points_data(points))?]).map(|_| ())
    }

    /// Restrict and scale the dots of one level to `bounds`.
    pub fn set_population_bounds(&self, level: Level, bounds: (i64, i64)) -> Result<(), JsValue> {
        let id = JsValue::from_str(&layers::dots_layer_id(level));
        js_call(
            &self.map,
            "setFilter",
            &[id.clone(), to_js(&layers::population_filter(bounds))?],
        )?;
        js_call(
            &self.map,
            "setPaintProperty",
            &[
                id,
                JsValue::from_str("circle-radius"),
                to_js(&layers::dot_radius(bounds))?,
            ],
        )
        .map(|_| ())
    }

    /// Point the layers at another territory: filters, zoom ranges, bounds.
    pub fn configure_territory(&self, territory: &TerritoryConfig) -> Result<(), JsValue> {
        js_call(&self.map, "setMinZoom", &[territory.min_zoom.into()])?;
        js_call(&self.map, "setMaxZoom", &[territory.max_zoom.into()])?;
        for level in Level::ALL {
            let filter = to_js(&layers::level_filter(level, territory))?;
            let (minzoom, maxzoom) = layers::zoom_range(level, territory);
            for layer_id in [level.layer_id().to_string(), layers::outline_layer_id(level)] {
                let id = JsValue::from_str(&layer_id);
                js_call(&self.map, "setFilter", &[id.clone(), filter.clone()])?;
                js_call(
                    &self.map,
                    "setLayerZoomRange",
                    &[id, minzoom.into(), maxzoom.into()],
                )?;
            }
            js_call(
                &self.map,
                "setLayerZoomRange",
                &[
                    JsValue::from_str(&layers::dots_layer_id(level)),
                    minzoom.into(),
                    maxzoom.into(),
                ],
            )?;
        }
        Ok(())
    }

    pub fn set_score_attribute(&self, attribute: ScoreAttribute) -> Result<(), JsValue> {
        let color = to_js(&layers::fill_color(attribute))?;
        for level in Level::ALL {
            js_call(
                &self.map,
                "setPaintProperty",
                &[
                    JsValue::from_str(level.layer_id()),
                    JsValue::from_str("fill-color"),
                    color.clone(),
                ],
            )?;
        }
        Ok(())
    }

    pub fn view_state(&self) -> ViewportState {
        let number = |method: &str| {
            js_call(&self.map, method, &[])
                .ok()
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0)
        };
        let center = js_call(&self.map, "getCenter", &[]).unwrap_or(JsValue::UNDEFINED);
        let coord = |key: &str| {
            js_get(&center, key)
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0)
        };
        ViewportState {
            longitude: coord("lng"),
            latitude: coord("lat"),
            zoom: js_call(&self.map, "getZoom", &[])
                .ok()
                .and_then(|v| v.as_f64())
                .unwrap_or(f64::NAN),
            pitch: number("getPitch"),
            bearing: number("getBearing"),
        }
    }

    pub fn jump_to(&self, view: ViewportState) {
        let options = serde_json::json!({
            "center": [view.longitude, view.latitude],
            "zoom": view.zoom,
            "pitch": view.pitch,
            "bearing": view.bearing,
        });
        let result = to_js(&options).and_then(|o| js_call(&self.map, "jumpTo", &[o]));
        if let Err(e) = result {
            warn("jumpTo failed", &e);
        }
    }

    pub fn set_cursor(&self, cursor: &str) {
        let canvas = js_call(&self.map, "getCanvas", &[]).ok();
        if let Some(canvas) = canvas.and_then(|c| c.dyn_into::<web_sys::HtmlElement>().ok()) {
            let _ = canvas.style().set_property("cursor", cursor);
        }
    }

    /// Register `handler` for a map-wide event such as `move` or `load`.
    pub fn on(&self, event: &str, handler: &Closure<dyn FnMut(JsValue)>) -> Result<(), JsValue> {
        js_call(
            &self.map,
            "on",
            &[JsValue::from_str(event), handler.as_ref().clone()],
        )
        .map(|_| ())
    }

    /// Register `handler` for a pointer event on one layer.
    pub fn on_layer(
        &self,
        event: &str,
        layer_id: &str,
        handler: &Closure<dyn FnMut(JsValue)>,
    ) -> Result<(), JsValue> {
        js_call(
            &self.map,
            "on",
            &[
                JsValue::from_str(event),
                JsValue::from_str(layer_id),
                handler.as_ref().clone(),
            ],
        )
        .map(|_| ())
    }

    pub fn remove(&self) {
        let _ = js_call(&self.map, "remove", &[]);
    }
}

impl FeatureRenderer for MaplibreRenderer {
    fn query_source_features(&self, filter: &FeatureFilter) -> Vec<TerritoryFeature> {
        let params = Object::new();
        let options = Reflect::set(
            &params,
            &JsValue::from_str("sourceLayer"),
            &JsValue::from_str(filter.source_layer),
        )
        .and_then(|_| to_js(&layers::country_filter(filter.country_code)))
        .and_then(|f| Reflect::set(&params, &JsValue::from_str("filter"), &f));
        if let Err(e) = options {
            warn("querySourceFeatures options", &e);
            return Vec::new();
        }

        match js_call(
            &self.map,
            "querySourceFeatures",
            &[JsValue::from_str(filter.source_id), params.into()],
        ) {
            Ok(features) => territory_features(&features),
            Err(e) => {
                warn("querySourceFeatures failed", &e);
                Vec::new()
            }
        }
    }

    fn set_feature_state(&mut self, filter: &FeatureFilter, id: &FeatureId, key: &str, value: u8) {
        let target = Object::new();
        let state = Object::new();
        let id = match id {
            FeatureId::Number(n) => JsValue::from_f64(*n as f64),
            FeatureId::Text(s) => JsValue::from_str(s),
        };
        let built = Reflect::set(&target, &"source".into(), &filter.source_id.into())
            .and_then(|_| Reflect::set(&target, &"sourceLayer".into(), &filter.source_layer.into()))
            .and_then(|_| Reflect::set(&target, &"id".into(), &id))
            .and_then(|_| Reflect::set(&state, &key.into(), &JsValue::from(value)));
        if built.is_err() {
            return;
        }
        // Features unloaded since the query are ignored by the renderer.
        let _ = js_call(&self.map, "setFeatureState", &[target.into(), state.into()]);
    }
}
