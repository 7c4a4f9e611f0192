// Panel controllers: selection, lazy loading and render-model building per data kind
use crate::msv_cache::{Completion, LazyCache, Request};
use crate::msv_geo::{
    MARKER_ZOOM, OverviewLayout, RouteLayout, rect_around, should_fly, to_coord,
};
use crate::msv_maps::{
    LAYER_GPS, LAYER_ROUTE, LAYER_SAMPLES, LAYER_SIGNAL, MapLayer, MapRegistry, MapShape,
    MapView, ROUTE_COLOR,
};
use crate::msv_models::{
    ChartDescriptor, GeoRoute, SampleRef, SampleSource, Summary, WifiData, WifiReading,
    fetch_typed,
};
use crate::msv_tabs::{GEO_MAP_KEY, OVERVIEW_MAP_KEY};
use crate::msv_wifi::{
    MAP_KEY_PREFIX, RenderMode, SignalTier, SsidFilter, map_key, normalize, reading_center,
};
use geo::Coord;
use poll_promise::Promise;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

/// Zoom level of a freshly plotted Wi-Fi map.
const WIFI_MAP_ZOOM: f64 = 18.0;

// ============================================================================
// Generic lazy panel
// ============================================================================

pub trait PanelKind {
    type Payload: DeserializeOwned + Send + 'static;
    const NAME: &'static str;
}

pub struct SensorKind;
pub struct WifiKind;
pub struct GeoKind;
pub struct JsonKind;

impl PanelKind for SensorKind {
    type Payload = Vec<ChartDescriptor>;
    const NAME: &'static str = "sensor";
}

impl PanelKind for WifiKind {
    type Payload = WifiData;
    const NAME: &'static str = "wifi";
}

impl PanelKind for GeoKind {
    type Payload = GeoRoute;
    const NAME: &'static str = "geo";
}

impl PanelKind for JsonKind {
    type Payload = serde_json::Value;
    const NAME: &'static str = "simple";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelStatus {
    Placeholder,
    Loading,
    Ready,
    Error(String),
}

/// Selector, cache and status shared by every data kind.
pub struct Panel<K: PanelKind> {
    samples: Vec<SampleRef>,
    selected: Option<usize>,
    cache: LazyCache<K::Payload>,
    status: PanelStatus,
    source: Arc<dyn SampleSource>,
}

impl<K: PanelKind> Panel<K> {
    pub fn new(source: Arc<dyn SampleSource>, samples: Vec<SampleRef>) -> Self {
        Self {
            samples,
            selected: None,
            cache: LazyCache::new(),
            status: PanelStatus::Placeholder,
            source,
        }
    }

    pub fn samples(&self) -> &[SampleRef] {
        &self.samples
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn select(&mut self, index: Option<usize>) {
        self.selected = index.filter(|i| *i < self.samples.len());
    }

    pub fn selected_sample(&self) -> Option<&SampleRef> {
        self.samples.get(self.selected?)
    }

    pub fn sample_by_label(&self, label: &str) -> Option<&SampleRef> {
        self.samples.iter().find(|s| s.label == label)
    }

    pub fn cache(&self) -> &LazyCache<K::Payload> {
        &self.cache
    }

    pub fn status(&self) -> &PanelStatus {
        &self.status
    }

    pub fn set_status(&mut self, status: PanelStatus) {
        self.status = status;
    }

    pub fn is_busy(&self) -> bool {
        self.cache.has_pending()
    }

    pub fn request(&mut self, sample: &SampleRef) -> Request {
        let source = Arc::clone(&self.source);
        let locator = sample.locator.clone();
        let outcome = self.cache.request(sample, move || {
            Promise::spawn_thread(format!("fetch-{}", K::NAME), move || {
                fetch_typed::<K::Payload>(source.as_ref(), &locator)
            })
        });

        match outcome {
            Request::Started => {
                log::info!("Loading {} sample '{}' from {}", K::NAME, sample.label, sample.locator);
                self.status = PanelStatus::Loading;
            }
            Request::InFlight => self.status = PanelStatus::Loading,
            Request::Hit => {}
        }
        outcome
    }

    /// Drains finished fetches; failures become the inline error state.
    pub fn poll(&mut self) -> Vec<Completion> {
        self.drain(false)
    }

    /// Like `poll`, but only completions for the current selection touch the status.
    pub fn poll_selected(&mut self) -> Vec<Completion> {
        self.drain(true)
    }

    fn drain(&mut self, selection_only: bool) -> Vec<Completion> {
        let completions = self.cache.poll();
        for completion in &completions {
            let current = !selection_only
                || self
                    .selected_sample()
                    .is_some_and(|s| s.locator == completion.locator());
            match completion {
                Completion::Loaded(locator) => {
                    log::debug!("Loaded {} sample {}", K::NAME, locator);
                    if current {
                        self.status = PanelStatus::Ready;
                    }
                }
                Completion::Failed { locator, error } => {
                    log::error!("Error loading {} data from {}: {}", K::NAME, locator, error);
                    if current {
                        self.status =
                            PanelStatus::Error(format!("Failed to load sample data. {}", error));
                    }
                }
            }
        }
        completions
    }

    pub fn reset(&mut self) {
        self.cache.clear();
        self.selected = None;
        self.status = PanelStatus::Placeholder;
    }
}

// ============================================================================
// Sensor panel
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChartKey {
    pub locator: String,
    pub chart_id: String,
}

impl ChartKey {
    pub fn new(locator: impl Into<String>, chart_id: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            chart_id: chart_id.into(),
        }
    }
}

pub struct SensorEntry {
    pub key: ChartKey,
    pub name: String,
    pub checked: bool,
}

pub struct SensorGroup {
    pub label: String,
    pub entries: Vec<SensorEntry>,
}

pub struct VisibleChart<'a> {
    pub key: ChartKey,
    pub title: String,
    pub chart: &'a ChartDescriptor,
}

pub struct SensorPanel {
    pub panel: Panel<SensorKind>,
    order: Vec<String>,
    checked: BTreeSet<ChartKey>,
    focus: Option<ChartKey>,
    alerts: Vec<String>,
}

impl SensorPanel {
    pub fn new(source: Arc<dyn SampleSource>, samples: Vec<SampleRef>) -> Self {
        Self {
            panel: Panel::new(source, samples),
            order: Vec::new(),
            checked: BTreeSet::new(),
            focus: None,
            alerts: Vec::new(),
        }
    }

    /// Loads the sample chosen in the selector; a second add of the same sample only warns.
    pub fn add_selected(&mut self) {
        let Some(sample) = self.panel.selected_sample().cloned() else {
            return;
        };
        match self.panel.request(&sample) {
            Request::Hit => self.alerts.push("This sample was already added.".to_string()),
            Request::InFlight => log::debug!("Sample {} is still loading", sample.locator),
            Request::Started => {}
        }
    }

    pub fn poll(&mut self) {
        for completion in self.panel.poll() {
            if let Completion::Loaded(locator) = completion {
                if !self.order.contains(&locator) {
                    self.order.push(locator);
                }
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.panel.is_busy()
    }

    /// Checkbox groups, one per loaded sample, in the order samples were added.
    pub fn groups(&self) -> Vec<SensorGroup> {
        self.order
            .iter()
            .filter_map(|locator| {
                let sample = self.panel.cache().get(locator)?;
                let entries = sample
                    .payload
                    .iter()
                    .enumerate()
                    .map(|(i, chart)| {
                        let key = ChartKey::new(locator.clone(), chart.chart_id.clone());
                        SensorEntry {
                            checked: self.checked.contains(&key),
                            name: chart.sensor_name(i),
                            key,
                        }
                    })
                    .collect();
                Some(SensorGroup {
                    label: sample.label.clone(),
                    entries,
                })
            })
            .collect()
    }

    pub fn set_checked(&mut self, key: ChartKey, checked: bool) {
        if checked {
            self.checked.insert(key);
        } else {
            self.checked.remove(&key);
        }
    }

    pub fn check_all(&mut self, checked: bool) {
        if !checked {
            self.checked.clear();
            return;
        }
        for locator in &self.order {
            if let Some(sample) = self.panel.cache().get(locator) {
                for chart in &sample.payload {
                    self.checked
                        .insert(ChartKey::new(locator.clone(), chart.chart_id.clone()));
                }
            }
        }
    }

    /// Shows exactly one chart regardless of the checkboxes, or clears that override.
    pub fn set_focus(&mut self, key: Option<ChartKey>) {
        if let Some(wanted) = &key {
            if self.lookup(wanted).is_none() {
                self.alerts
                    .push(format!("No chart data found for {}.", wanted.chart_id));
                return;
            }
        }
        self.focus = key;
    }

    pub fn focus(&self) -> Option<&ChartKey> {
        self.focus.as_ref()
    }

    fn lookup(&self, key: &ChartKey) -> Option<VisibleChart<'_>> {
        let sample = self.panel.cache().get(&key.locator)?;
        let chart = sample.payload.iter().find(|c| c.chart_id == key.chart_id)?;
        Some(VisibleChart {
            key: key.clone(),
            title: chart.title_for_sample(&sample.label),
            chart,
        })
    }

    /// The full set of charts to draw, rebuilt from the current selection.
    pub fn visible_charts(&self) -> Vec<VisibleChart<'_>> {
        if let Some(focus) = &self.focus {
            return self.lookup(focus).into_iter().collect();
        }

        let mut charts = Vec::new();
        for locator in &self.order {
            let Some(sample) = self.panel.cache().get(locator) else {
                continue;
            };
            for chart in &sample.payload {
                let key = ChartKey::new(locator.clone(), chart.chart_id.clone());
                if self.checked.contains(&key) {
                    charts.push(VisibleChart {
                        title: chart.title_for_sample(&sample.label),
                        key,
                        chart,
                    });
                }
            }
        }
        charts
    }

    pub fn take_alerts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.alerts)
    }

    pub fn reset(&mut self) {
        self.panel.reset();
        self.order.clear();
        self.checked.clear();
        self.focus = None;
    }
}

// ============================================================================
// GPS route panel
// ============================================================================

pub fn route_layer(name: &str, layout: &RouteLayout) -> MapLayer {
    MapLayer::new(
        name,
        vec![
            MapShape::Polyline {
                points: layout.line.clone(),
                color: ROUTE_COLOR,
                width: 2.0,
            },
            MapShape::Marker {
                at: layout.start,
                label: "Start".to_string(),
            },
            MapShape::Marker {
                at: layout.end,
                label: "End".to_string(),
            },
        ],
    )
}

pub struct GeoPanel {
    pub panel: Panel<GeoKind>,
    shown: Option<String>,
    alerts: Vec<String>,
}

impl GeoPanel {
    pub fn new(source: Arc<dyn SampleSource>, samples: Vec<SampleRef>) -> Self {
        Self {
            panel: Panel::new(source, samples),
            shown: None,
            alerts: Vec::new(),
        }
    }

    /// Choosing the empty option resets the panel.
    pub fn select(&mut self, index: Option<usize>, maps: &mut MapRegistry) {
        self.panel.select(index);
        let Some(sample) = self.panel.selected_sample().cloned() else {
            self.reset(maps);
            return;
        };

        if self.panel.request(&sample) == Request::Hit {
            self.render(&sample.locator, maps);
        }
    }

    pub fn poll(&mut self, maps: &mut MapRegistry) {
        for completion in self.panel.poll_selected() {
            if let Completion::Loaded(locator) = completion {
                let still_selected = self
                    .panel
                    .selected_sample()
                    .is_some_and(|s| s.locator == locator);
                if still_selected {
                    self.render(&locator, maps);
                }
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.panel.is_busy()
    }

    #[cfg(test)]
    pub fn shown(&self) -> Option<&str> {
        self.shown.as_deref()
    }

    fn render(&mut self, locator: &str, maps: &mut MapRegistry) {
        let Some(sample) = self.panel.cache().get(locator) else {
            log::debug!("No cached route for {}", locator);
            return;
        };
        let Some(layout) = RouteLayout::from_route(&sample.payload) else {
            self.alerts
                .push(format!("No route data found for {}.", sample.label));
            return;
        };

        let mut map = MapView::new(sample.label.clone(), layout.bounds);
        map.set_layer(route_layer(LAYER_ROUTE, &layout));
        maps.set(GEO_MAP_KEY, map);

        self.shown = Some(locator.to_string());
        self.panel.set_status(PanelStatus::Ready);
    }

    pub fn take_alerts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.alerts)
    }

    pub fn reset(&mut self, maps: &mut MapRegistry) {
        maps.remove(GEO_MAP_KEY);
        self.panel.reset();
        self.shown = None;
    }
}

// ============================================================================
// Wi-Fi panel
// ============================================================================

/// Everything a Wi-Fi control can ask for.
#[derive(Debug, Clone, PartialEq)]
pub enum WifiAction {
    Filter { locator: String, text: String },
    ShowAll(String),
    HideAll(String),
    SelectSsid { locator: String, ssid: String },
    PlotBand(String),
    CloseMap(String),
    ToggleLayer { key: String, layer: String },
    SetRenderMode(RenderMode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlottedMap {
    pub locator: String,
    pub ssid: String,
    pub band: String,
}

pub struct SsidBrowser<'a> {
    pub locator: String,
    pub label: String,
    pub filter_text: String,
    pub ssids: Vec<&'a str>,
    pub visible: Vec<&'a str>,
}

pub fn signal_layer(readings: &[WifiReading], mode: RenderMode) -> MapLayer {
    let shapes = match mode {
        RenderMode::Heat => normalize(readings)
            .into_iter()
            .map(|h| MapShape::Heat {
                at: h.at,
                intensity: h.intensity,
            })
            .collect(),
        RenderMode::Points => readings
            .iter()
            .map(|r| MapShape::Circle {
                at: Coord { x: r.lon, y: r.lat },
                color: SignalTier::from_level(r.level).hex(),
                popup: format!("Signal: {:.2} dBm", r.level),
            })
            .collect(),
    };
    MapLayer::new(LAYER_SIGNAL, shapes)
}

pub struct WifiPanel {
    pub panel: Panel<WifiKind>,
    routes: Panel<GeoKind>,
    order: Vec<String>,
    filters: BTreeMap<String, SsidFilter>,
    active_ssid: Option<(String, String)>,
    active_band: Option<String>,
    render_mode: RenderMode,
    plotted: BTreeMap<String, PlottedMap>,
    focused: Option<String>,
    alerts: Vec<String>,
}

impl WifiPanel {
    pub fn new(
        source: Arc<dyn SampleSource>,
        samples: Vec<SampleRef>,
        routes: Vec<SampleRef>,
    ) -> Self {
        Self {
            panel: Panel::new(Arc::clone(&source), samples),
            routes: Panel::new(source, routes),
            order: Vec::new(),
            filters: BTreeMap::new(),
            active_ssid: None,
            active_band: None,
            render_mode: RenderMode::default(),
            plotted: BTreeMap::new(),
            focused: None,
            alerts: Vec::new(),
        }
    }

    pub fn add_selected(&mut self) {
        let Some(sample) = self.panel.selected_sample().cloned() else {
            return;
        };
        match self.panel.request(&sample) {
            Request::Hit => self.alerts.push("This sample was already added.".to_string()),
            Request::InFlight => log::debug!("Sample {} is still loading", sample.locator),
            Request::Started => {
                if let Some(route) = self.routes.sample_by_label(&sample.label).cloned() {
                    self.routes.request(&route);
                }
            }
        }
    }

    pub fn poll(&mut self, maps: &mut MapRegistry) {
        for completion in self.panel.poll() {
            if let Completion::Loaded(locator) = completion {
                if !self.order.contains(&locator) {
                    self.filters.insert(locator.clone(), SsidFilter::default());
                    self.order.push(locator);
                }
            }
        }

        for completion in self.routes.poll() {
            match completion {
                Completion::Loaded(route_locator) => self.attach_route(&route_locator, maps),
                // A missing route only costs the GPS layer.
                Completion::Failed { locator, error } => {
                    log::warn!("No GPS path for Wi-Fi maps ({}): {}", locator, error);
                }
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.panel.is_busy() || self.routes.is_busy()
    }

    fn label_of(&self, locator: &str) -> Option<&str> {
        self.panel.cache().get(locator).map(|s| s.label.as_str())
    }

    fn route_for(&self, label: &str) -> Option<RouteLayout> {
        let route_ref = self.routes.sample_by_label(label)?;
        let route = self.routes.cache().get(&route_ref.locator)?;
        RouteLayout::from_route(&route.payload)
    }

    fn attach_route(&mut self, route_locator: &str, maps: &mut MapRegistry) {
        let Some(route) = self.routes.cache().get(route_locator) else {
            return;
        };
        let Some(layout) = RouteLayout::from_route(&route.payload) else {
            return;
        };
        let label = route.label.clone();

        for (key, plotted) in &self.plotted {
            if self.label_of(&plotted.locator) != Some(label.as_str()) {
                continue;
            }
            if let Some(map) = maps.get_mut(key) {
                if map.layer(LAYER_GPS).is_none() {
                    map.set_layer(route_layer(LAYER_GPS, &layout));
                }
            }
        }
    }

    /// SSID browsers, one per loaded sample.
    pub fn browsers(&self) -> Vec<SsidBrowser<'_>> {
        self.order
            .iter()
            .filter_map(|locator| {
                let sample = self.panel.cache().get(locator)?;
                let filter = self.filters.get(locator).cloned().unwrap_or_default();
                let ssids = sample.payload.ssids();
                Some(SsidBrowser {
                    locator: locator.clone(),
                    label: sample.label.clone(),
                    filter_text: filter.text().to_string(),
                    visible: filter.visible(&ssids),
                    ssids,
                })
            })
            .collect()
    }

    pub fn active_ssid(&self) -> Option<(&str, &str)> {
        self.active_ssid
            .as_ref()
            .map(|(locator, ssid)| (locator.as_str(), ssid.as_str()))
    }

    pub fn active_band(&self) -> Option<&str> {
        self.active_band.as_deref()
    }

    /// Bands of the selected SSID with the registry key each would plot to.
    pub fn band_buttons(&self) -> Vec<(String, String)> {
        let Some((locator, ssid)) = &self.active_ssid else {
            return Vec::new();
        };
        let Some(sample) = self.panel.cache().get(locator) else {
            return Vec::new();
        };
        sample
            .payload
            .bands_for(ssid)
            .into_iter()
            .map(|band| (band.to_string(), map_key(&sample.label, ssid, band)))
            .collect()
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn plotted_keys(&self) -> Vec<String> {
        self.plotted.keys().cloned().collect()
    }

    pub fn has_maps(&self) -> bool {
        !self.plotted.is_empty()
    }

    /// Key of the map the view should scroll to, consumed once.
    pub fn take_focused(&mut self) -> Option<String> {
        self.focused.take()
    }

    pub fn dispatch(&mut self, action: WifiAction, maps: &mut MapRegistry) {
        match action {
            WifiAction::Filter { locator, text } => {
                if let Some(filter) = self.filters.get_mut(&locator) {
                    filter.set_text(text);
                }
            }
            WifiAction::ShowAll(locator) => {
                if let Some(filter) = self.filters.get_mut(&locator) {
                    filter.show_all();
                }
            }
            WifiAction::HideAll(locator) => {
                if let Some(filter) = self.filters.get_mut(&locator) {
                    filter.hide_all();
                }
            }
            WifiAction::SelectSsid { locator, ssid } => {
                let known = self
                    .panel
                    .cache()
                    .get(&locator)
                    .is_some_and(|s| s.payload.networks.contains_key(&ssid));
                if known {
                    self.active_ssid = Some((locator, ssid));
                    self.active_band = None;
                } else {
                    log::debug!("Ignoring selection of unknown SSID '{}'", ssid);
                }
            }
            WifiAction::PlotBand(band) => self.plot_band(&band, maps),
            WifiAction::CloseMap(key) => self.close_map(&key, maps),
            WifiAction::ToggleLayer { key, layer } => {
                if let Some(map) = maps.get_mut(&key) {
                    map.toggle_layer(&layer);
                }
            }
            WifiAction::SetRenderMode(mode) => self.set_render_mode(mode, maps),
        }
    }

    fn plot_band(&mut self, band: &str, maps: &mut MapRegistry) {
        let Some((locator, ssid)) = self.active_ssid.clone() else {
            return;
        };
        let Some(sample) = self.panel.cache().get(&locator) else {
            return;
        };
        let label = sample.label.clone();
        let key = map_key(&label, &ssid, band);
        self.active_band = Some(band.to_string());

        if maps.contains(&key) {
            self.focused = Some(key);
            return;
        }

        let readings = match sample.payload.readings(&ssid, band) {
            Some(readings) if !readings.is_empty() => readings,
            _ => {
                self.alerts
                    .push(format!("No data found for {} ({}).", ssid, band));
                return;
            }
        };
        let Some(center) = reading_center(readings) else {
            return;
        };

        let mut map = MapView::new(format!("{} ({})", ssid, band), rect_around(center, WIFI_MAP_ZOOM))
            .with_subtitle(format!("Sample: {}", label))
            .closable();
        map.show_signal_legend = true;
        if let Some(layout) = self.route_for(&label) {
            map.set_layer(route_layer(LAYER_GPS, &layout));
        }
        map.set_layer(signal_layer(readings, self.render_mode));

        maps.set(key.clone(), map);
        self.plotted.insert(
            key.clone(),
            PlottedMap {
                locator,
                ssid,
                band: band.to_string(),
            },
        );
        self.focused = Some(key);
    }

    fn close_map(&mut self, key: &str, maps: &mut MapRegistry) {
        maps.remove(key);
        if let Some(plotted) = self.plotted.remove(key) {
            if self.active_band.as_deref() == Some(plotted.band.as_str()) {
                self.active_band = None;
            }
        }
    }

    fn set_render_mode(&mut self, mode: RenderMode, maps: &mut MapRegistry) {
        if self.render_mode == mode {
            return;
        }
        self.render_mode = mode;

        for (key, plotted) in &self.plotted {
            let readings = self
                .panel
                .cache()
                .get(&plotted.locator)
                .and_then(|s| s.payload.readings(&plotted.ssid, &plotted.band));
            if let (Some(readings), Some(map)) = (readings, maps.get_mut(key)) {
                let visible = map.layer(LAYER_SIGNAL).is_none_or(|l| l.visible);
                let mut layer = signal_layer(readings, mode);
                layer.visible = visible;
                map.set_layer(layer);
            }
        }
    }

    pub fn take_alerts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.alerts)
    }

    /// Clears this panel's cache and maps; other panels' maps are untouched.
    pub fn reset(&mut self, maps: &mut MapRegistry) {
        maps.remove_prefixed(MAP_KEY_PREFIX);
        self.panel.reset();
        self.routes.reset();
        self.order.clear();
        self.filters.clear();
        self.active_ssid = None;
        self.active_band = None;
        self.plotted.clear();
        self.focused = None;
    }
}

// ============================================================================
// Simple (raw JSON) panel
// ============================================================================

pub struct SimplePanel {
    pub name: String,
    pub panel: Panel<JsonKind>,
    shown: Option<String>,
}

impl SimplePanel {
    pub fn new(name: impl Into<String>, source: Arc<dyn SampleSource>, samples: Vec<SampleRef>) -> Self {
        Self {
            name: name.into(),
            panel: Panel::new(source, samples),
            shown: None,
        }
    }

    pub fn select(&mut self, index: Option<usize>) {
        self.panel.select(index);
        let Some(sample) = self.panel.selected_sample().cloned() else {
            self.reset();
            return;
        };
        self.shown = None;
        if self.panel.request(&sample) == Request::Hit {
            self.shown = Some(sample.locator);
            self.panel.set_status(PanelStatus::Ready);
        }
    }

    pub fn poll(&mut self) {
        for completion in self.panel.poll_selected() {
            if let Completion::Loaded(locator) = completion {
                let still_selected = self
                    .panel
                    .selected_sample()
                    .is_some_and(|s| s.locator == locator);
                if still_selected {
                    self.shown = Some(locator);
                }
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.panel.is_busy()
    }

    /// Label and raw document currently on display.
    pub fn content(&self) -> Option<(&str, &serde_json::Value)> {
        let sample = self.panel.cache().get(self.shown.as_deref()?)?;
        Some((sample.label.as_str(), &sample.payload))
    }

    pub fn reset(&mut self) {
        self.panel.reset();
        self.shown = None;
    }
}

// ============================================================================
// Overview panel
// ============================================================================

pub struct OverviewPanel {
    pub summary: Summary,
    layout: OverviewLayout,
}

impl OverviewPanel {
    pub fn new(summary: Summary) -> Self {
        let layout = OverviewLayout::from_centers(&summary.geo_centers_map);
        Self { summary, layout }
    }

    #[cfg(test)]
    pub fn markers(&self) -> &[(Coord, String)] {
        &self.layout.markers
    }

    /// Registers the overview map, replacing any earlier instance.
    pub fn install(&self, maps: &mut MapRegistry) {
        let shapes = self
            .layout
            .markers
            .iter()
            .map(|(at, name)| MapShape::Marker {
                at: *at,
                label: format!("Sample: {}", name),
            })
            .collect();
        let mut map = MapView::new("Samples overview", self.layout.home);
        map.set_layer(MapLayer::new(LAYER_SAMPLES, shapes));
        maps.set(OVERVIEW_MAP_KEY, map);
    }

    /// Flies to the marker at `index` unless the map already shows it.
    pub fn fly_to_marker(&self, index: usize, maps: &mut MapRegistry, now: Instant) -> bool {
        let Some((target, _)) = self.layout.markers.get(index) else {
            return false;
        };
        let Some(map) = maps.get_mut(OVERVIEW_MAP_KEY) else {
            return false;
        };
        if !should_fly(&map.view(), *target, MARKER_ZOOM) {
            return false;
        }
        map.fly_to(rect_around(*target, MARKER_ZOOM), now);
        true
    }

    pub fn click(&self, at: [f64; 2], tolerance: f64, maps: &mut MapRegistry, now: Instant) -> bool {
        match self.layout.marker_near(to_coord(at), tolerance) {
            Some(index) => self.fly_to_marker(index, maps, now),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msv_maps::MapWidget;
    use crate::msv_models::{GeoCenter, MsvError, Result};
    use geo::Rect;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    const HOME_24: &str = r#"wifi:"a":"home":"2.4GHz""#;

    /// In-memory report that counts how often each file is fetched.
    struct MemorySource {
        files: HashMap<String, serde_json::Value>,
        fetches: Mutex<HashMap<String, usize>>,
    }

    impl MemorySource {
        fn new(files: Vec<(&str, serde_json::Value)>) -> Arc<Self> {
            Arc::new(Self {
                files: files
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                fetches: Mutex::new(HashMap::new()),
            })
        }

        fn fetch_count(&self, locator: &str) -> usize {
            self.fetches.lock().unwrap().get(locator).copied().unwrap_or(0)
        }
    }

    impl SampleSource for MemorySource {
        fn fetch(&self, locator: &str) -> Result<serde_json::Value> {
            *self
                .fetches
                .lock()
                .unwrap()
                .entry(locator.to_string())
                .or_insert(0) += 1;
            self.files
                .get(locator)
                .cloned()
                .ok_or_else(|| MsvError::Network(format!("404 {}", locator)))
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    /// Holds fetches of the gated locators back until they are released.
    struct GatedSource {
        inner: Arc<MemorySource>,
        closed: Mutex<Vec<String>>,
    }

    impl GatedSource {
        fn new(inner: Arc<MemorySource>, gated: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                inner,
                closed: Mutex::new(gated.iter().map(|l| l.to_string()).collect()),
            })
        }

        fn release(&self, locator: &str) {
            self.closed.lock().unwrap().retain(|l| l != locator);
        }
    }

    impl SampleSource for GatedSource {
        fn fetch(&self, locator: &str) -> Result<serde_json::Value> {
            while self.closed.lock().unwrap().iter().any(|l| l == locator) {
                thread::sleep(Duration::from_millis(2));
            }
            self.inner.fetch(locator)
        }

        fn describe(&self) -> String {
            "gated".to_string()
        }
    }

    fn wait_until_idle(mut step: impl FnMut() -> bool) {
        for _ in 0..500 {
            if !step() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("background fetch did not finish");
    }

    fn sensor_file() -> serde_json::Value {
        json!([
            {
                "chart_id": "chart_a_Accelerometer",
                "layout": {"title": "<b>Sensor:</b> Accelerometer"},
                "data": [{"x": [0.0, 1.0], "y": [0.1, 0.2], "name": "x"}]
            },
            {
                "chart_id": "chart_a_Gyroscope",
                "layout": {"title": "<b>Sensor:</b> Gyroscope"},
                "data": []
            }
        ])
    }

    fn wifi_file() -> serde_json::Value {
        json!({
            "home": {
                "2.4GHz": [[0.0, 0.0, -90.0], [0.0, 2.0, -70.0], [2.0, 2.0, -50.0]],
                "5GHz": []
            },
            "": {"2.4GHz": [[0.0, 0.0, -60.0]]}
        })
    }

    fn source() -> Arc<MemorySource> {
        MemorySource::new(vec![
            ("data/sensors_a.json", sensor_file()),
            ("data/wifi_a.json", wifi_file()),
            ("data/geo_a.json", json!({"center": [0.5, 0.5], "path": [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0]]})),
            ("data/geo_empty.json", json!({"center": [0.0, 0.0], "path": []})),
            ("data/video_a.json", json!({"fps": 30, "frames": [1, 2]})),
        ])
    }

    fn sensor_panel(source: &Arc<MemorySource>) -> SensorPanel {
        let mut panel = SensorPanel::new(
            source.clone(),
            vec![
                SampleRef::new("data/sensors_a.json", "a"),
                SampleRef::new("data/sensors_missing.json", "missing"),
            ],
        );
        panel.panel.select(Some(0));
        panel.add_selected();
        wait_until_idle(|| {
            panel.poll();
            panel.is_busy()
        });
        panel
    }

    #[test]
    fn adding_a_sample_twice_fetches_once() {
        let source = source();
        let mut panel = sensor_panel(&source);

        panel.add_selected();
        assert_eq!(source.fetch_count("data/sensors_a.json"), 1);
        assert_eq!(panel.take_alerts(), vec!["This sample was already added.".to_string()]);
        assert_eq!(panel.panel.status(), &PanelStatus::Ready);
    }

    #[test]
    fn checked_boxes_drive_the_visible_charts() {
        let source = source();
        let mut panel = sensor_panel(&source);

        let groups = panel.groups();
        assert_eq!(groups.len(), 1);
        let names: Vec<&str> = groups[0].entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Accelerometer", "Gyroscope"]);
        assert!(panel.visible_charts().is_empty());

        let gyro = ChartKey::new("data/sensors_a.json", "chart_a_Gyroscope");
        panel.set_checked(gyro.clone(), true);
        let visible = panel.visible_charts();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].title, "Sensor: Gyroscope\nSample: a");

        panel.check_all(true);
        assert_eq!(panel.visible_charts().len(), 2);

        panel.set_focus(Some(gyro.clone()));
        assert_eq!(panel.visible_charts()[0].key, gyro);
        panel.set_focus(Some(ChartKey::new("data/sensors_a.json", "chart_a_Magnetometer")));
        assert_eq!(panel.focus(), Some(&gyro));
        assert_eq!(
            panel.take_alerts(),
            vec!["No chart data found for chart_a_Magnetometer.".to_string()]
        );
        panel.set_focus(None);

        panel.check_all(false);
        assert!(panel.visible_charts().is_empty());
    }

    #[test]
    fn sensor_reset_restores_placeholder() {
        let source = source();
        let mut panel = sensor_panel(&source);
        panel.check_all(true);

        panel.reset();
        assert_eq!(panel.panel.status(), &PanelStatus::Placeholder);
        assert!(panel.groups().is_empty());
        assert!(panel.visible_charts().is_empty());
        assert_eq!(panel.panel.selected(), None);
        assert!(panel.panel.cache().is_empty());
    }

    #[test]
    fn failed_fetch_shows_inline_error() {
        let source = source();
        let mut panel = sensor_panel(&source);
        panel.panel.select(Some(1));
        panel.add_selected();
        wait_until_idle(|| {
            panel.poll();
            panel.is_busy()
        });

        assert!(matches!(panel.panel.status(), PanelStatus::Error(_)));
        assert!(!panel.panel.cache().contains("data/sensors_missing.json"));
        assert_eq!(panel.groups().len(), 1);
    }

    fn geo_panel(source: &Arc<MemorySource>) -> GeoPanel {
        GeoPanel::new(
            source.clone(),
            vec![
                SampleRef::new("data/geo_a.json", "a"),
                SampleRef::new("data/geo_empty.json", "empty"),
            ],
        )
    }

    #[test]
    fn route_renders_markers_and_reuses_cache() {
        let source = source();
        let mut maps = MapRegistry::new();
        let mut panel = geo_panel(&source);

        panel.select(Some(0), &mut maps);
        wait_until_idle(|| {
            panel.poll(&mut maps);
            panel.is_busy()
        });

        let map = maps.get(GEO_MAP_KEY).unwrap();
        let route = map.layer(LAYER_ROUTE).unwrap();
        assert_eq!(
            route.shapes[1],
            MapShape::Marker { at: Coord { x: 0.0, y: 0.0 }, label: "Start".into() }
        );
        assert_eq!(
            route.shapes[2],
            MapShape::Marker { at: Coord { x: 1.0, y: 1.0 }, label: "End".into() }
        );
        let first_id = map.id;

        panel.select(Some(0), &mut maps);
        assert_eq!(source.fetch_count("data/geo_a.json"), 1);
        assert_ne!(maps.get(GEO_MAP_KEY).unwrap().id, first_id);
        assert_eq!(maps.len(), 1);
    }

    #[test]
    fn empty_route_alerts_and_keeps_previous_map() {
        let source = source();
        let mut maps = MapRegistry::new();
        let mut panel = geo_panel(&source);
        panel.select(Some(0), &mut maps);
        wait_until_idle(|| {
            panel.poll(&mut maps);
            panel.is_busy()
        });
        let shown_id = maps.get(GEO_MAP_KEY).unwrap().id;

        panel.select(Some(1), &mut maps);
        wait_until_idle(|| {
            panel.poll(&mut maps);
            panel.is_busy()
        });

        assert_eq!(panel.take_alerts(), vec!["No route data found for empty.".to_string()]);
        assert_eq!(maps.get(GEO_MAP_KEY).unwrap().id, shown_id);
        assert_eq!(panel.shown(), Some("data/geo_a.json"));
    }

    #[test]
    fn late_failure_for_abandoned_route_keeps_current_status() {
        let source = GatedSource::new(source(), &["data/geo_slow.json"]);
        let mut maps = MapRegistry::new();
        let mut panel = GeoPanel::new(
            source.clone(),
            vec![
                SampleRef::new("data/geo_a.json", "a"),
                SampleRef::new("data/geo_slow.json", "slow"),
            ],
        );

        panel.select(Some(1), &mut maps);
        panel.select(Some(0), &mut maps);
        wait_until_idle(|| {
            panel.poll(&mut maps);
            !maps.contains(GEO_MAP_KEY)
        });
        assert_eq!(panel.panel.status(), &PanelStatus::Ready);

        source.release("data/geo_slow.json");
        wait_until_idle(|| {
            panel.poll(&mut maps);
            panel.is_busy()
        });

        assert_eq!(panel.panel.status(), &PanelStatus::Ready);
        assert_eq!(panel.shown(), Some("data/geo_a.json"));
        assert!(maps.contains(GEO_MAP_KEY));
    }

    #[test]
    fn section_refresh_keeps_map_instances() {
        let source = source();
        let mut maps = MapRegistry::new();
        let mut panel = geo_panel(&source);
        panel.select(Some(0), &mut maps);
        wait_until_idle(|| {
            panel.poll(&mut maps);
            panel.is_busy()
        });
        let id = maps.get(GEO_MAP_KEY).unwrap().id;
        let layers = maps.get(GEO_MAP_KEY).unwrap().layers.clone();

        let now = Instant::now();
        let panned = Rect::new(Coord { x: 0.2, y: 0.2 }, Coord { x: 0.4, y: 0.4 });
        let map = maps.get_mut(GEO_MAP_KEY).unwrap();
        map.take_pending_view(now);
        map.observe_view(panned);

        maps.refresh_prefixed(GEO_MAP_KEY);
        maps.refresh_prefixed(GEO_MAP_KEY);

        let map = maps.get_mut(GEO_MAP_KEY).unwrap();
        assert_eq!(map.id, id);
        assert_eq!(map.layers, layers);
        assert_eq!(map.take_pending_view(now), Some(panned));
        assert_eq!(maps.len(), 1);
    }

    #[test]
    fn geo_reset_releases_its_key_only() {
        let source = source();
        let mut maps = MapRegistry::new();
        maps.set(HOME_24, MapView::new("other", rect_around(Coord { x: 0.0, y: 0.0 }, 10.0)));
        let mut panel = geo_panel(&source);
        panel.select(Some(0), &mut maps);
        wait_until_idle(|| {
            panel.poll(&mut maps);
            panel.is_busy()
        });

        panel.select(None, &mut maps);
        assert!(!maps.contains(GEO_MAP_KEY));
        assert!(maps.contains(HOME_24));
        assert_eq!(panel.panel.status(), &PanelStatus::Placeholder);
        assert!(panel.panel.cache().is_empty());
    }

    fn wifi_panel(source: &Arc<MemorySource>, maps: &mut MapRegistry) -> WifiPanel {
        let mut panel = WifiPanel::new(
            source.clone(),
            vec![SampleRef::new("data/wifi_a.json", "a")],
            vec![SampleRef::new("data/geo_a.json", "a")],
        );
        panel.panel.select(Some(0));
        panel.add_selected();
        wait_until_idle(|| {
            panel.poll(maps);
            panel.is_busy()
        });
        panel
    }

    #[test]
    fn ssid_browser_starts_hidden_and_filters() {
        let source = source();
        let mut maps = MapRegistry::new();
        let mut panel = wifi_panel(&source, &mut maps);

        let browsers = panel.browsers();
        assert_eq!(browsers[0].ssids, vec!["home"]);
        assert!(browsers[0].visible.is_empty());

        let locator = "data/wifi_a.json".to_string();
        panel.dispatch(WifiAction::Filter { locator: locator.clone(), text: "HO".into() }, &mut maps);
        assert_eq!(panel.browsers()[0].visible, vec!["home"]);

        panel.dispatch(WifiAction::HideAll(locator.clone()), &mut maps);
        assert!(panel.browsers()[0].visible.is_empty());
        assert_eq!(panel.browsers()[0].filter_text, "");

        panel.dispatch(WifiAction::ShowAll(locator), &mut maps);
        assert_eq!(panel.browsers()[0].visible, vec!["home"]);
    }

    #[test]
    fn plotting_a_band_builds_heat_map_with_gps_path() {
        let source = source();
        let mut maps = MapRegistry::new();
        let mut panel = wifi_panel(&source, &mut maps);
        let locator = "data/wifi_a.json".to_string();

        panel.dispatch(WifiAction::SelectSsid { locator, ssid: "home".into() }, &mut maps);
        let buttons = panel.band_buttons();
        assert_eq!(buttons[0], ("2.4GHz".to_string(), HOME_24.to_string()));

        panel.dispatch(WifiAction::PlotBand("2.4GHz".into()), &mut maps);
        let map = maps.get(HOME_24).unwrap();
        let center = map.home().center();
        assert!((center.x - 4.0 / 3.0).abs() < 1e-9);
        assert!((center.y - 2.0 / 3.0).abs() < 1e-9);
        assert!(map.layer(LAYER_GPS).is_some());

        let intensities: Vec<f64> = map
            .layer(LAYER_SIGNAL)
            .unwrap()
            .shapes
            .iter()
            .filter_map(|s| match s {
                MapShape::Heat { intensity, .. } => Some(*intensity),
                _ => None,
            })
            .collect();
        assert_eq!(intensities, vec![0.0, 0.5, 1.0]);

        let id = map.id;
        panel.dispatch(WifiAction::PlotBand("2.4GHz".into()), &mut maps);
        assert_eq!(maps.get(HOME_24).unwrap().id, id);
        assert_eq!(panel.take_focused().as_deref(), Some(HOME_24));
    }

    #[test]
    fn similar_ssids_get_their_own_maps() {
        let source = MemorySource::new(vec![(
            "data/wifi_guest.json",
            json!({
                "Guest-WiFi": {"2.4GHz": [[0.0, 0.0, -60.0]]},
                "Guest WiFi": {"2.4GHz": [[1.0, 1.0, -70.0]]}
            }),
        )]);
        let mut maps = MapRegistry::new();
        let mut panel = WifiPanel::new(
            source.clone(),
            vec![SampleRef::new("data/wifi_guest.json", "guest")],
            vec![],
        );
        panel.panel.select(Some(0));
        panel.add_selected();
        wait_until_idle(|| {
            panel.poll(&mut maps);
            panel.is_busy()
        });

        let locator = "data/wifi_guest.json".to_string();
        for ssid in ["Guest-WiFi", "Guest WiFi"] {
            panel.dispatch(
                WifiAction::SelectSsid { locator: locator.clone(), ssid: ssid.into() },
                &mut maps,
            );
            panel.dispatch(WifiAction::PlotBand("2.4GHz".into()), &mut maps);
        }

        assert_eq!(maps.keys_with_prefix(MAP_KEY_PREFIX).len(), 2);
        assert!(maps.contains(&map_key("guest", "Guest-WiFi", "2.4GHz")));
        assert!(maps.contains(&map_key("guest", "Guest WiFi", "2.4GHz")));
    }

    #[test]
    fn empty_band_alerts_without_creating_a_map() {
        let source = source();
        let mut maps = MapRegistry::new();
        let mut panel = wifi_panel(&source, &mut maps);
        let locator = "data/wifi_a.json".to_string();

        panel.dispatch(WifiAction::SelectSsid { locator, ssid: "home".into() }, &mut maps);
        panel.dispatch(WifiAction::PlotBand("5GHz".into()), &mut maps);

        assert_eq!(panel.take_alerts(), vec!["No data found for home (5GHz).".to_string()]);
        assert!(maps.is_empty());
        assert!(!panel.has_maps());
    }

    #[test]
    fn point_mode_uses_signal_tiers() {
        let source = source();
        let mut maps = MapRegistry::new();
        let mut panel = wifi_panel(&source, &mut maps);
        let locator = "data/wifi_a.json".to_string();
        panel.dispatch(WifiAction::SelectSsid { locator, ssid: "home".into() }, &mut maps);
        panel.dispatch(WifiAction::PlotBand("2.4GHz".into()), &mut maps);
        panel.dispatch(
            WifiAction::ToggleLayer { key: HOME_24.into(), layer: LAYER_SIGNAL.into() },
            &mut maps,
        );

        panel.dispatch(WifiAction::SetRenderMode(RenderMode::Points), &mut maps);

        let layer = maps
            .get(HOME_24)
            .unwrap()
            .layer(LAYER_SIGNAL)
            .unwrap()
            .clone();
        assert!(!layer.visible);
        let colors: Vec<&str> = layer
            .shapes
            .iter()
            .filter_map(|s| match s {
                MapShape::Circle { color, .. } => Some(*color),
                _ => None,
            })
            .collect();
        assert_eq!(colors, vec!["#dc3545", "#ffd700", "#28a745"]);
    }

    #[test]
    fn closing_and_resetting_wifi_maps() {
        let source = source();
        let mut maps = MapRegistry::new();
        maps.set(GEO_MAP_KEY, MapView::new("route", rect_around(Coord { x: 0.0, y: 0.0 }, 10.0)));
        let mut panel = wifi_panel(&source, &mut maps);
        let locator = "data/wifi_a.json".to_string();
        panel.dispatch(WifiAction::SelectSsid { locator, ssid: "home".into() }, &mut maps);
        panel.dispatch(WifiAction::PlotBand("2.4GHz".into()), &mut maps);

        panel.dispatch(WifiAction::CloseMap(HOME_24.into()), &mut maps);
        assert!(!panel.has_maps());
        assert_eq!(panel.active_band(), None);
        assert!(!maps.contains(HOME_24));

        panel.dispatch(WifiAction::PlotBand("2.4GHz".into()), &mut maps);
        panel.reset(&mut maps);
        assert!(maps.keys_with_prefix(MAP_KEY_PREFIX).is_empty());
        assert!(maps.contains(GEO_MAP_KEY));
        assert!(panel.browsers().is_empty());
        assert_eq!(panel.panel.status(), &PanelStatus::Placeholder);
    }

    #[test]
    fn simple_panel_shows_raw_document() {
        let source = source();
        let mut panel = SimplePanel::new(
            "video",
            source.clone(),
            vec![SampleRef::new("data/video_a.json", "a")],
        );
        panel.select(Some(0));
        wait_until_idle(|| {
            panel.poll();
            panel.is_busy()
        });

        let (label, value) = panel.content().unwrap();
        assert_eq!(label, "a");
        assert_eq!(value["fps"], 30);

        panel.select(None);
        assert!(panel.content().is_none());
        assert_eq!(panel.panel.status(), &PanelStatus::Placeholder);
    }

    #[test]
    fn late_document_does_not_replace_current_selection() {
        let source = GatedSource::new(source(), &["data/video_a.json"]);
        let mut panel = SimplePanel::new(
            "video",
            source.clone(),
            vec![
                SampleRef::new("data/video_a.json", "a"),
                SampleRef::new("data/video_missing.json", "missing"),
            ],
        );

        panel.select(Some(0));
        panel.select(Some(1));
        wait_until_idle(|| {
            panel.poll();
            panel.panel.status() == &PanelStatus::Loading
        });
        let failed = panel.panel.status().clone();
        assert!(matches!(failed, PanelStatus::Error(_)));

        source.release("data/video_a.json");
        wait_until_idle(|| {
            panel.poll();
            panel.is_busy()
        });
        assert_eq!(panel.panel.status(), &failed);
        assert!(panel.content().is_none());

        panel.select(Some(0));
        assert_eq!(panel.panel.status(), &PanelStatus::Ready);
        assert_eq!(panel.content().unwrap().0, "a");
    }

    #[test]
    fn overview_flies_to_clicked_marker_once() {
        let overview = OverviewPanel::new(Summary {
            geo_centers_map: vec![
                GeoCenter { lat: -23.55, lon: -46.63, name: "a".into() },
                GeoCenter { lat: -23.60, lon: -46.70, name: "b".into() },
            ],
            ..Summary::default()
        });
        let mut maps = MapRegistry::new();
        overview.install(&mut maps);
        assert_eq!(overview.markers().len(), 2);

        let now = Instant::now();
        assert!(overview.click([-23.55, -46.63], 0.001, &mut maps, now));
        let map = maps.get_mut(OVERVIEW_MAP_KEY).unwrap();
        let later = now + Duration::from_secs(2);
        while map.take_pending_view(later).is_some() {}

        assert!(!overview.fly_to_marker(0, &mut maps, later));
        assert!(!overview.click([0.0, 0.0], 0.001, &mut maps, later));

        maps.get_mut(OVERVIEW_MAP_KEY).unwrap().recenter();
        assert!(overview.fly_to_marker(1, &mut maps, later));
    }
}
