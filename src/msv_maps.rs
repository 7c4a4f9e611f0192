// Map views and the registry of live map instances
use crate::msv_geo::{FLY_DURATION, FlyTo};
use geo::{Coord, Rect};
use std::collections::BTreeMap;
use std::time::Instant;
use uuid::Uuid;

pub const LAYER_ROUTE: &str = "Route";
pub const LAYER_GPS: &str = "GPS Path";
pub const LAYER_SIGNAL: &str = "WiFi Signal";
pub const LAYER_SAMPLES: &str = "Samples";

pub const ROUTE_COLOR: &str = "#0000ff";

/// Lifecycle operations the registry and the tab switcher rely on.
pub trait MapWidget {
    /// Releases layers and controls; the widget must not be drawn afterwards.
    fn teardown(&mut self);
    /// Re-applies the current viewport after the container changed size.
    fn invalidate_size(&mut self);
    /// Jumps back to the initial bounds.
    fn recenter(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapShape {
    Polyline { points: Vec<Coord>, color: &'static str, width: f32 },
    Marker { at: Coord, label: String },
    Circle { at: Coord, color: &'static str, popup: String },
    Heat { at: Coord, intensity: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapLayer {
    pub name: String,
    pub visible: bool,
    pub shapes: Vec<MapShape>,
}

impl MapLayer {
    pub fn new(name: impl Into<String>, shapes: Vec<MapShape>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            shapes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MapView {
    pub id: Uuid,
    pub title: String,
    pub subtitle: Option<String>,
    pub layers: Vec<MapLayer>,
    pub show_signal_legend: bool,
    pub closable: bool,
    pub fullscreen: bool,
    home: Rect,
    view: Rect,
    fit_pending: bool,
    fly: Option<FlyTo>,
    torn_down: bool,
}

impl MapView {
    pub fn new(title: impl Into<String>, home: Rect) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            subtitle: None,
            layers: Vec::new(),
            show_signal_legend: false,
            closable: false,
            fullscreen: false,
            home,
            view: home,
            fit_pending: true,
            fly: None,
            torn_down: false,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn closable(mut self) -> Self {
        self.closable = true;
        self
    }

    /// Adds `layer`, replacing any layer with the same name.
    pub fn set_layer(&mut self, layer: MapLayer) {
        match self.layers.iter_mut().find(|l| l.name == layer.name) {
            Some(existing) => *existing = layer,
            None => self.layers.push(layer),
        }
    }

    pub fn layer(&self, name: &str) -> Option<&MapLayer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn toggle_layer(&mut self, name: &str) -> Option<bool> {
        let layer = self.layers.iter_mut().find(|l| l.name == name)?;
        layer.visible = !layer.visible;
        Some(layer.visible)
    }

    #[cfg(test)]
    pub fn home(&self) -> Rect {
        self.home
    }

    pub fn view(&self) -> Rect {
        self.view
    }

    #[cfg(test)]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Records the viewport the user panned or zoomed to.
    pub fn observe_view(&mut self, view: Rect) {
        if self.fly.is_none() && !self.fit_pending {
            self.view = view;
        }
    }

    pub fn fit_bounds(&mut self, bounds: Rect) {
        self.fly = None;
        self.view = bounds;
        self.fit_pending = true;
    }

    pub fn fly_to(&mut self, target: Rect, now: Instant) {
        self.fly = Some(FlyTo::new(self.view, target, now, FLY_DURATION));
    }

    pub fn fly_home(&mut self, now: Instant) {
        self.fly_to(self.home, now);
    }

    pub fn is_animating(&self) -> bool {
        self.fly.is_some()
    }

    /// Viewport the renderer must apply this frame, if any.
    pub fn take_pending_view(&mut self, now: Instant) -> Option<Rect> {
        if let Some(fly) = &self.fly {
            let rect = fly.at(now);
            if fly.finished(now) {
                self.fly = None;
            }
            self.view = rect;
            self.fit_pending = false;
            return Some(rect);
        }
        if self.fit_pending {
            self.fit_pending = false;
            return Some(self.view);
        }
        None
    }
}

impl MapWidget for MapView {
    fn teardown(&mut self) {
        self.layers.clear();
        self.fly = None;
        self.fullscreen = false;
        self.torn_down = true;
    }

    fn invalidate_size(&mut self) {
        self.fit_pending = true;
    }

    fn recenter(&mut self) {
        self.fit_bounds(self.home);
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Live map instances by key. Panels only touch keys they own.
pub struct MapRegistry<W: MapWidget = MapView> {
    maps: BTreeMap<String, W>,
}

impl<W: MapWidget> Default for MapRegistry<W> {
    fn default() -> Self {
        Self { maps: BTreeMap::new() }
    }
}

impl<W: MapWidget> MapRegistry<W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `widget` under `key`, tearing down whatever was there before.
    pub fn set(&mut self, key: impl Into<String>, widget: W) {
        let key = key.into();
        if let Some(mut old) = self.maps.insert(key.clone(), widget) {
            log::debug!("Replacing map '{}'", key);
            old.teardown();
        }
    }

    pub fn get(&self, key: &str) -> Option<&W> {
        self.maps.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut W> {
        self.maps.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.maps.contains_key(key)
    }

    /// Tears the widget down, then forgets the key.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.maps.remove(key) {
            Some(mut widget) => {
                widget.teardown();
                true
            }
            None => false,
        }
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.maps
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn remove_prefixed(&mut self, prefix: &str) -> usize {
        let keys = self.keys_with_prefix(prefix);
        for key in &keys {
            self.remove(key);
        }
        keys.len()
    }

    /// Invalidates every map under `prefix`; each keeps its current viewport.
    pub fn refresh_prefixed(&mut self, prefix: &str) -> usize {
        let mut count = 0;
        for (_, widget) in self.maps.iter_mut().filter(|(k, _)| k.starts_with(prefix)) {
            widget.invalidate_size();
            count += 1;
        }
        count
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.maps.keys()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}
