// GUI implementation for the Mobility Sample Viewer using egui/eframe
use crate::msv_cache::LazyCache;
use crate::msv_config::ViewerConfig;
use crate::msv_controllers::{
    ChartKey, GeoPanel, OverviewPanel, SensorPanel, SimplePanel, WifiAction, WifiPanel,
};
use crate::msv_maps::{MapRegistry, MapWidget};
use crate::msv_menu_state::MenuState;
use crate::msv_models::{ReportIndex, SampleSource, load_index, source_for};
use crate::msv_tabs::{GEO_MAP_KEY, OVERVIEW_MAP_KEY, Section, TabSwitcher};
use crate::msv_views::{MapResponse, MsvViews};
use crate::msv_wifi::RenderMode;
use chrono::{DateTime, Local};
use eframe::egui;
use egui::{Align, Align2, Color32, Layout, RichText, Ui};
use poll_promise::Promise;
use std::sync::Arc;
use std::time::{Duration, Instant};

const GROUP_SECTIONS: &str = "Sections";
const GROUP_OTHER: &str = "Other data";
const GROUP_DATA: &str = "Data";
/// Click tolerance on maps as a fraction of the visible width.
const CLICK_TOLERANCE: f64 = 0.02;

// ============================================================================
// Application State
// ============================================================================

type InitResult = Result<(Arc<dyn SampleSource>, ReportIndex), String>;

struct Panels {
    title: String,
    overview: OverviewPanel,
    sensors: SensorPanel,
    wifi: WifiPanel,
    geo: GeoPanel,
    simple: Vec<SimplePanel>,
}

impl Panels {
    fn from_index(source: Arc<dyn SampleSource>, index: ReportIndex) -> Self {
        let simple = index
            .sections
            .simple
            .iter()
            .map(|(name, samples)| {
                SimplePanel::new(name.clone(), Arc::clone(&source), ReportIndex::sample_refs(samples))
            })
            .collect();

        Self {
            title: index.display_title().to_string(),
            sensors: SensorPanel::new(Arc::clone(&source), index.sensor_samples()),
            wifi: WifiPanel::new(Arc::clone(&source), index.wifi_samples(), index.geo_samples()),
            geo: GeoPanel::new(source, index.geo_samples()),
            overview: OverviewPanel::new(index.summary),
            simple,
        }
    }

    fn is_busy(&self) -> bool {
        self.sensors.is_busy()
            || self.wifi.is_busy()
            || self.geo.is_busy()
            || self.simple.iter().any(SimplePanel::is_busy)
    }
}

pub struct MsvApp {
    config: ViewerConfig,
    panels: Option<Panels>,
    maps: MapRegistry,
    tabs: TabSwitcher,
    menu: MenuState,
    alerts: Vec<String>,
    fullscreen: bool,

    // Loading states
    is_loading: bool,
    loading_message: String,
    error_message: Option<String>,

    init_promise: Option<Promise<InitResult>>,
}

impl MsvApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: ViewerConfig) -> Self {
        let menu = MenuState::load(&config.menu_state_path);
        let tabs = TabSwitcher::new(Section::Overview, config.settle_delay);

        let mut app = Self {
            config,
            panels: None,
            maps: MapRegistry::new(),
            tabs,
            menu,
            alerts: Vec::new(),
            fullscreen: false,
            is_loading: true,
            loading_message: "Initializing...".to_string(),
            error_message: None,
            init_promise: None,
        };

        app.start_initialization();
        app
    }

    fn start_initialization(&mut self) {
        let report = self.config.report.clone();
        let index_file = self.config.index_file.clone();
        let timeout = self.config.request_timeout;

        let promise = Promise::spawn_thread("init", move || -> InitResult {
            let source = source_for(&report, timeout).map_err(|e| e.to_string())?;
            let index = load_index(source.as_ref(), &index_file).map_err(|e| e.to_string())?;
            Ok((source, index))
        });

        self.init_promise = Some(promise);
        self.is_loading = true;
        self.error_message = None;
        self.loading_message = format!("Loading report from {}...", self.config.report);
    }

    fn check_initialization(&mut self) {
        let Some(promise) = self.init_promise.take() else {
            return;
        };

        match promise.try_take() {
            Ok(Ok((source, index))) => {
                let panels = Panels::from_index(source, index);
                panels.overview.install(&mut self.maps);
                self.panels = Some(panels);
                self.tabs.show(Section::Overview, Instant::now());
                self.is_loading = false;
            }
            Ok(Err(e)) => {
                log::error!("Failed to load report index: {}", e);
                self.is_loading = false;
                self.error_message = Some(format!("Failed to load report: {}", e));
            }
            Err(promise) => self.init_promise = Some(promise),
        }
    }

    fn poll_panels(&mut self) {
        let Some(panels) = self.panels.as_mut() else {
            return;
        };

        panels.sensors.poll();
        panels.wifi.poll(&mut self.maps);
        panels.geo.poll(&mut self.maps);
        for panel in &mut panels.simple {
            panel.poll();
        }

        self.alerts.extend(panels.sensors.take_alerts());
        self.alerts.extend(panels.wifi.take_alerts());
        self.alerts.extend(panels.geo.take_alerts());
    }

    fn show_section(&mut self, section: Section) {
        self.tabs.show(section, Instant::now());
    }

    /// Re-lays out the widgets of the section that just became visible.
    fn settle(&mut self, ctx: &egui::Context, section: &Section) {
        if section.has_charts() {
            ctx.request_repaint();
        }
        if let Some(prefix) = section.map_prefix() {
            let refreshed = self.maps.refresh_prefixed(prefix);
            log::debug!("Refreshed {} map(s) for {:?}", refreshed, section);
        }
    }

    fn toggle_group(&mut self, group: &str) {
        self.menu.toggle(group);
        if let Err(e) = self.menu.save(&self.config.menu_state_path) {
            log::warn!("{}", e);
        }
    }

    fn fullscreen_key(&self) -> Option<String> {
        self.maps
            .keys()
            .find(|k| self.maps.get(k).is_some_and(|m| m.fullscreen))
            .cloned()
    }

    fn sync_fullscreen(&mut self, ctx: &egui::Context) {
        let wanted = self.fullscreen_key().is_some();
        if wanted != self.fullscreen {
            self.fullscreen = wanted;
            ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(wanted));
        }
    }
}

impl eframe::App for MsvApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.check_initialization();
        self.poll_panels();

        let now = Instant::now();
        if let Some(section) = self.tabs.poll_settled(now) {
            self.settle(ctx, &section);
        }
        if let Some(wait) = self.tabs.time_until_settled(now) {
            ctx.request_repaint_after(wait);
        }
        if self.panels.as_ref().is_some_and(Panels::is_busy) {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
        if self.maps.keys().any(|k| self.maps.get(k).is_some_and(|m| m.is_animating())) {
            ctx.request_repaint();
        }
        self.sync_fullscreen(ctx);

        // Top panel with header
        let title = self
            .panels
            .as_ref()
            .map(|p| p.title.clone())
            .unwrap_or_else(|| "Mobility Sample Viewer".to_string());
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading(format!("📡 {}", title));
                ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                    let now: DateTime<Local> = Local::now();
                    ui.label(now.format("%H:%M:%S").to_string());
                });
            });
        });

        if self.is_loading {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.centered_and_justified(|ui| {
                    ui.vertical_centered(|ui| {
                        ui.spinner();
                        ui.label(&self.loading_message);
                    });
                });
            });
            ctx.request_repaint_after(Duration::from_millis(100));
            return;
        }

        if let Some(error) = self.error_message.clone() {
            let mut should_retry = false;
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.centered_and_justified(|ui| {
                    ui.vertical_centered(|ui| {
                        ui.colored_label(Color32::RED, "❌ Error");
                        ui.label(&error);
                        if ui.button("Retry").clicked() {
                            should_retry = true;
                        }
                    });
                });
            });
            if should_retry {
                self.start_initialization();
            }
            return;
        }

        if let Some(key) = self.fullscreen_key() {
            egui::CentralPanel::default().show(ctx, |ui| self.show_fullscreen_map(ui, &key));
            self.show_alerts(ctx);
            return;
        }

        egui::SidePanel::left("nav_panel")
            .min_width(200.0)
            .show(ctx, |ui| self.show_navigation(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    let active = self.tabs.active().clone();
                    match active {
                        Section::Overview => self.show_overview(ui),
                        Section::Sensors => self.show_sensors(ui),
                        Section::Wifi => self.show_wifi(ui),
                        Section::Geo => self.show_geo(ui),
                        Section::Simple(name) => self.show_simple(ui, &name),
                        Section::LoadedData => self.show_loaded_data(ui),
                    }
                });
        });

        self.show_alerts(ctx);
    }
}

// ============================================================================
// View Implementations
// ============================================================================

impl MsvApp {
    fn nav_entry(&mut self, ui: &mut Ui, section: Section) {
        let title = section.title();
        if ui.selectable_label(self.tabs.is_active(&section), title).clicked() {
            self.show_section(section);
        }
    }

    fn menu_group(&mut self, ui: &mut Ui, group: &str, sections: Vec<Section>) {
        let response = egui::CollapsingHeader::new(RichText::new(group).strong())
            .id_source(group)
            .open(Some(self.menu.is_expanded(group)))
            .show(ui, |ui| {
                for section in sections {
                    self.nav_entry(ui, section);
                }
            });
        if response.header_response.clicked() {
            self.toggle_group(group);
        }
    }

    fn show_navigation(&mut self, ui: &mut Ui) {
        ui.heading("Navigation");
        ui.separator();

        self.menu_group(
            ui,
            GROUP_SECTIONS,
            vec![Section::Overview, Section::Sensors, Section::Wifi, Section::Geo],
        );

        let simple: Vec<Section> = self
            .panels
            .as_ref()
            .map(|p| p.simple.iter().map(|s| Section::Simple(s.name.clone())).collect())
            .unwrap_or_default();
        if !simple.is_empty() {
            self.menu_group(ui, GROUP_OTHER, simple);
        }

        self.menu_group(ui, GROUP_DATA, vec![Section::LoadedData]);

        ui.add_space(20.0);
        ui.separator();
        ui.weak(format!("Report: {}", self.config.report));
        if !self.maps.is_empty() {
            ui.weak(format!("Live maps: {}", self.maps.len()));
        }
    }

    fn show_alerts(&mut self, ctx: &egui::Context) {
        let Some(message) = self.alerts.first().cloned() else {
            return;
        };
        let mut dismissed = false;
        egui::Window::new("Notice")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(&message);
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        if dismissed {
            self.alerts.remove(0);
        }
    }

    /// Applies the generic map controls; returns the response for panel-specific handling.
    fn draw_map(&mut self, ui: &mut Ui, key: &str, focus: bool) -> Option<MapResponse> {
        let now = Instant::now();
        let map = self.maps.get_mut(key)?;
        let response = MsvViews::map(ui, map, now, focus);

        if response.toggle_fullscreen {
            map.fullscreen = !map.fullscreen;
        }
        if response.recenter {
            if key == OVERVIEW_MAP_KEY {
                map.fly_home(now);
            } else {
                map.recenter();
            }
        }
        Some(response)
    }

    fn show_fullscreen_map(&mut self, ui: &mut Ui, key: &str) {
        let Some(response) = self.draw_map(ui, key, false) else {
            return;
        };
        if let Some(layer) = response.toggled_layer {
            if let Some(map) = self.maps.get_mut(key) {
                map.toggle_layer(&layer);
            }
        }
        if response.close {
            if let Some(panels) = self.panels.as_mut() {
                panels.wifi.dispatch(WifiAction::CloseMap(key.to_string()), &mut self.maps);
            }
        }
    }

    fn show_overview(&mut self, ui: &mut Ui) {
        ui.heading("Overview");
        ui.separator();

        let Some(response) = self.draw_map(ui, OVERVIEW_MAP_KEY, false) else {
            return;
        };
        let Some(panels) = self.panels.as_ref() else {
            return;
        };
        if let Some(at) = response.clicked_at {
            let tolerance = response.view_width * CLICK_TOLERANCE;
            panels.overview.click(at, tolerance, &mut self.maps, Instant::now());
        }

        ui.add_space(10.0);
        ui.label(RichText::new("Dataset summary").strong().size(16.0));
        MsvViews::summary_stats(ui, &panels.overview.summary);
        ui.add_space(10.0);
        egui::ScrollArea::horizontal().show(ui, |ui| {
            MsvViews::sample_table(ui, &panels.overview.summary.sample_details);
        });
    }

    fn show_sensors(&mut self, ui: &mut Ui) {
        let Some(panels) = self.panels.as_mut() else {
            return;
        };
        let sensors = &mut panels.sensors;

        ui.heading("Sensors");
        ui.separator();

        ui.horizontal(|ui| {
            let selected = sensors.panel.selected();
            if let Some(choice) =
                MsvViews::sample_selector(ui, "sensor_sample", sensors.panel.samples(), selected)
            {
                sensors.panel.select(choice);
            }
            if ui.button("➕ Add sample").clicked() {
                sensors.add_selected();
            }
            if ui.button("Check all").clicked() {
                sensors.check_all(true);
            }
            if ui.button("Uncheck all").clicked() {
                sensors.check_all(false);
            }
            if ui.button("Reset").clicked() {
                sensors.reset();
            }
        });

        if !MsvViews::status(
            ui,
            sensors.panel.status(),
            "Select a sample and click Add to plot its sensors.",
        ) {
            return;
        }

        let groups = sensors.groups();
        let mut changes: Vec<(ChartKey, bool)> = Vec::new();
        for group in &groups {
            egui::CollapsingHeader::new(format!("Sample: {}", group.label))
                .id_source(("sensor_group", &group.label))
                .default_open(true)
                .show(ui, |ui| {
                    if group.entries.is_empty() {
                        ui.weak("No sensors found in this sample.");
                    }
                    ui.horizontal_wrapped(|ui| {
                        for entry in &group.entries {
                            let mut checked = entry.checked;
                            if ui.checkbox(&mut checked, &entry.name).changed() {
                                changes.push((entry.key.clone(), checked));
                            }
                        }
                    });
                });
        }
        for (key, checked) in changes {
            sensors.set_checked(key, checked);
        }

        let mut focus = sensors.focus().cloned();
        let focus_text = focus
            .as_ref()
            .and_then(|key| {
                groups.iter().find_map(|g| {
                    g.entries
                        .iter()
                        .find(|e| &e.key == key)
                        .map(|e| format!("{} ({})", e.name, g.label))
                })
            })
            .unwrap_or_else(|| "All checked sensors".to_string());
        ui.horizontal(|ui| {
            ui.label("Show only:");
            egui::ComboBox::from_id_source("sensor_focus")
                .selected_text(focus_text)
                .show_ui(ui, |ui| {
                    ui.selectable_value(&mut focus, None, "All checked sensors");
                    for group in &groups {
                        for entry in &group.entries {
                            ui.selectable_value(
                                &mut focus,
                                Some(entry.key.clone()),
                                format!("{} ({})", entry.name, group.label),
                            );
                        }
                    }
                });
        });
        if focus.as_ref() != sensors.focus() {
            sensors.set_focus(focus);
        }

        ui.separator();
        let charts = sensors.visible_charts();
        if charts.is_empty() {
            if !groups.is_empty() {
                ui.weak("No sensor selected");
            }
            return;
        }
        for chart in &charts {
            MsvViews::chart(ui, chart);
        }
    }

    fn show_wifi(&mut self, ui: &mut Ui) {
        let Some(panels) = self.panels.as_mut() else {
            return;
        };
        let mut actions: Vec<WifiAction> = Vec::new();
        let mut reset = false;

        ui.heading("Wi-Fi");
        ui.separator();

        {
            let wifi = &mut panels.wifi;
            ui.horizontal(|ui| {
                let selected = wifi.panel.selected();
                if let Some(choice) =
                    MsvViews::sample_selector(ui, "wifi_sample", wifi.panel.samples(), selected)
                {
                    wifi.panel.select(choice);
                }
                if ui.button("➕ Add sample").clicked() {
                    wifi.add_selected();
                }
                let mut mode = wifi.render_mode();
                ui.radio_value(&mut mode, RenderMode::Heat, "Heatmap");
                ui.radio_value(&mut mode, RenderMode::Points, "Points");
                if mode != wifi.render_mode() {
                    actions.push(WifiAction::SetRenderMode(mode));
                }
                if ui.button("Reset").clicked() {
                    reset = true;
                }
            });
        }

        let wifi = &panels.wifi;
        let placeholder = "Select a sample and click Add to browse its networks.";
        if !MsvViews::status(ui, wifi.panel.status(), placeholder) && !wifi.has_maps() {
            if reset {
                panels.wifi.reset(&mut self.maps);
            }
            return;
        }

        let active = wifi
            .active_ssid()
            .map(|(locator, ssid)| (locator.to_string(), ssid.to_string()));
        for browser in wifi.browsers() {
            egui::CollapsingHeader::new(format!("Sample: {}", browser.label))
                .id_source(("wifi_browser", &browser.locator))
                .default_open(true)
                .show(ui, |ui| {
                    ui.horizontal(|ui| {
                        let mut text = browser.filter_text.clone();
                        ui.label("🔍");
                        if ui.text_edit_singleline(&mut text).changed() {
                            actions.push(WifiAction::Filter {
                                locator: browser.locator.clone(),
                                text,
                            });
                        }
                        if ui.button("Show all").clicked() {
                            actions.push(WifiAction::ShowAll(browser.locator.clone()));
                        }
                        if ui.button("Hide all").clicked() {
                            actions.push(WifiAction::HideAll(browser.locator.clone()));
                        }
                        ui.weak(format!("{} networks", browser.ssids.len()));
                    });
                    ui.horizontal_wrapped(|ui| {
                        for ssid in &browser.visible {
                            let is_active = active
                                .as_ref()
                                .is_some_and(|(l, s)| l == &browser.locator && s.as_str() == *ssid);
                            if ui.selectable_label(is_active, *ssid).clicked() {
                                actions.push(WifiAction::SelectSsid {
                                    locator: browser.locator.clone(),
                                    ssid: ssid.to_string(),
                                });
                            }
                        }
                    });
                });
        }

        if let Some((_, ssid)) = &active {
            ui.horizontal(|ui| {
                ui.label(format!("Bands for {}:", ssid));
                for (band, _) in wifi.band_buttons() {
                    let is_active = wifi.active_band() == Some(band.as_str());
                    if ui.selectable_label(is_active, format!("📶 {}", band)).clicked() {
                        actions.push(WifiAction::PlotBand(band));
                    }
                }
            });
        }

        ui.separator();
        let keys = wifi.plotted_keys();
        let focused = panels.wifi.take_focused();
        if keys.is_empty() {
            ui.weak("Select a network and a band to plot its signal map.");
        }
        for key in keys {
            let focus = focused.as_deref() == Some(key.as_str());
            let Some(response) = self.draw_map(ui, &key, focus) else {
                continue;
            };
            if let Some(layer) = response.toggled_layer {
                actions.push(WifiAction::ToggleLayer { key: key.clone(), layer });
            }
            if response.close {
                actions.push(WifiAction::CloseMap(key));
            }
        }

        let Some(panels) = self.panels.as_mut() else {
            return;
        };
        for action in actions {
            panels.wifi.dispatch(action, &mut self.maps);
        }
        if reset {
            panels.wifi.reset(&mut self.maps);
        }
    }

    fn show_geo(&mut self, ui: &mut Ui) {
        let Some(panels) = self.panels.as_mut() else {
            return;
        };
        let geo = &mut panels.geo;

        ui.heading("GPS Routes");
        ui.separator();

        ui.horizontal(|ui| {
            let selected = geo.panel.selected();
            if let Some(choice) =
                MsvViews::sample_selector(ui, "geo_sample", geo.panel.samples(), selected)
            {
                geo.select(choice, &mut self.maps);
            }
            if ui.button("Reset").clicked() {
                geo.reset(&mut self.maps);
            }
        });

        if !MsvViews::status(ui, geo.panel.status(), "Select a sample to display its route.") {
            return;
        }

        if let Some(response) = self.draw_map(ui, GEO_MAP_KEY, false) {
            if let Some(layer) = response.toggled_layer {
                if let Some(map) = self.maps.get_mut(GEO_MAP_KEY) {
                    map.toggle_layer(&layer);
                }
            }
        }
    }

    fn show_simple(&mut self, ui: &mut Ui, name: &str) {
        let Some(panels) = self.panels.as_mut() else {
            return;
        };
        let Some(panel) = panels.simple.iter_mut().find(|p| p.name == name) else {
            log::debug!("No panel for section '{}'", name);
            return;
        };

        ui.heading(Section::Simple(name.to_string()).title());
        ui.separator();

        ui.horizontal(|ui| {
            let selected = panel.panel.selected();
            let id = format!("simple_sample_{}", name);
            if let Some(choice) = MsvViews::sample_selector(ui, &id, panel.panel.samples(), selected) {
                panel.select(choice);
            }
            if ui.button("Reset").clicked() {
                panel.reset();
            }
        });

        if !MsvViews::status(ui, panel.panel.status(), "Select a sample to inspect its data.") {
            return;
        }
        if let Some((label, value)) = panel.content() {
            MsvViews::json_tree(ui, label, value);
        }
    }

    fn show_loaded_data(&mut self, ui: &mut Ui) {
        ui.heading("Loaded Data");
        ui.separator();

        let Some(panels) = self.panels.as_ref() else {
            return;
        };
        MsvViews::loaded_data(ui, "Sensors", &loaded_rows(panels.sensors.panel.cache()));
        MsvViews::loaded_data(ui, "Wi-Fi", &loaded_rows(panels.wifi.panel.cache()));
        MsvViews::loaded_data(ui, "GPS Routes", &loaded_rows(panels.geo.panel.cache()));
        for panel in &panels.simple {
            let title = Section::Simple(panel.name.clone()).title();
            MsvViews::loaded_data(ui, &title, &loaded_rows(panel.panel.cache()));
        }
    }
}

fn loaded_rows<T: Send + 'static>(cache: &LazyCache<T>) -> Vec<(String, String, String)> {
    cache
        .iter()
        .map(|(locator, sample)| {
            (
                sample.label.clone(),
                locator.clone(),
                sample.loaded_at.format("%H:%M:%S").to_string(),
            )
        })
        .collect()
}

// ============================================================================
// Public entry point
// ============================================================================

pub fn run_gui(config: ViewerConfig) -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([800.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Mobility Sample Viewer",
        options,
        Box::new(move |cc| Ok(Box::new(MsvApp::new(cc, config)))),
    )
}
