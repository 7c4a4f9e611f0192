// Drawing helpers for the Mobility Sample Viewer egui front end
use crate::msv_controllers::{PanelStatus, VisibleChart};
use crate::msv_maps::{MapShape, MapView};
use crate::msv_models::{SampleRef, SampleDetail, Summary};
use crate::msv_wifi::SignalTier;
use eframe::egui;
use egui::{Align, Align2, Color32, Layout, RichText, Ui};
use egui_extras::{Column, TableBuilder};
use egui_plot::{Legend, Line, Plot, PlotBounds, PlotPoint, PlotPoints, Points, Text};
use std::time::Instant;

const CHART_HEIGHT: f32 = 260.0;
const MAP_HEIGHT: f32 = 380.0;
const HEAT_RADIUS: f32 = 6.0;

/// What the user did with a map's controls this frame.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MapResponse {
    /// `[lat, lon]` of a click inside the map area.
    pub clicked_at: Option<[f64; 2]>,
    pub close: bool,
    pub recenter: bool,
    pub toggle_fullscreen: bool,
    pub toggled_layer: Option<String>,
    /// Width of the visible area in degrees, used for click tolerance.
    pub view_width: f64,
}

pub struct MsvViews;

impl MsvViews {
    /// Placeholder, spinner or inline error. Returns true when content should be drawn.
    pub fn status(ui: &mut Ui, status: &PanelStatus, placeholder: &str) -> bool {
        match status {
            PanelStatus::Placeholder => {
                ui.add_space(20.0);
                ui.vertical_centered(|ui| {
                    ui.weak(placeholder);
                });
                false
            }
            PanelStatus::Loading => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Loading...");
                });
                true
            }
            PanelStatus::Error(message) => {
                ui.colored_label(Color32::RED, format!("❌ {}", message));
                true
            }
            PanelStatus::Ready => true,
        }
    }

    /// Sample dropdown; returns the new selection when it changed.
    pub fn sample_selector(
        ui: &mut Ui,
        id: &str,
        samples: &[SampleRef],
        selected: Option<usize>,
    ) -> Option<Option<usize>> {
        let mut choice = selected;
        let text = selected
            .and_then(|i| samples.get(i))
            .map(|s| s.label.clone())
            .unwrap_or_else(|| "Select a sample".to_string());

        egui::ComboBox::from_id_source(id)
            .selected_text(text)
            .width(220.0)
            .show_ui(ui, |ui| {
                ui.selectable_value(&mut choice, None, "Select a sample");
                for (i, sample) in samples.iter().enumerate() {
                    ui.selectable_value(&mut choice, Some(i), &sample.label);
                }
            });

        (choice != selected).then_some(choice)
    }

    // ========================================================================
    // Charts
    // ========================================================================

    pub fn chart(ui: &mut Ui, visible: &VisibleChart<'_>) {
        egui::Frame::group(ui.style()).show(ui, |ui| {
            let mut lines = visible.title.lines();
            if let Some(first) = lines.next() {
                ui.strong(first);
            }
            for line in lines {
                ui.weak(line);
            }

            let mut plot = Plot::new(("chart", &visible.key))
                .height(CHART_HEIGHT)
                .legend(Legend::default());
            if let Some(label) = visible.chart.x_axis_title() {
                plot = plot.x_axis_label(label);
            }
            if let Some(label) = visible.chart.y_axis_title() {
                plot = plot.y_axis_label(label);
            }

            plot.show(ui, |plot_ui| {
                for (i, trace) in visible.chart.data.iter().enumerate() {
                    let name = trace
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("trace {}", i + 1));
                    let points = PlotPoints::from(trace.points());
                    let markers_only = trace
                        .mode
                        .as_deref()
                        .is_some_and(|m| m.contains("markers") && !m.contains("lines"));
                    if markers_only {
                        plot_ui.points(Points::new(points).name(name).radius(2.0));
                    } else {
                        plot_ui.line(Line::new(points).name(name));
                    }
                }
            });
        });
        ui.add_space(6.0);
    }

    // ========================================================================
    // Maps
    // ========================================================================

    pub fn map(ui: &mut Ui, map: &mut MapView, now: Instant, focus: bool) -> MapResponse {
        let mut response = MapResponse::default();

        let frame = egui::Frame::group(ui.style()).show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.strong(&map.title);
                if let Some(subtitle) = &map.subtitle {
                    ui.weak(subtitle);
                }
                ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                    if map.closable && ui.button("✖").on_hover_text("Close map").clicked() {
                        response.close = true;
                    }
                    let fullscreen_label = if map.fullscreen { "🗗" } else { "⛶" };
                    if ui.button(fullscreen_label).on_hover_text("Toggle fullscreen").clicked() {
                        response.toggle_fullscreen = true;
                    }
                    if ui.button("⟲").on_hover_text("Recenter").clicked() {
                        response.recenter = true;
                    }
                });
            });

            if map.layers.len() > 1 {
                ui.horizontal(|ui| {
                    for layer in &map.layers {
                        let mut visible = layer.visible;
                        if ui.checkbox(&mut visible, &layer.name).changed() {
                            response.toggled_layer = Some(layer.name.clone());
                        }
                    }
                });
            }

            let height = if map.fullscreen {
                ui.available_height().max(MAP_HEIGHT)
            } else {
                MAP_HEIGHT
            };

            let plot = Plot::new(("map", map.id))
                .height(height)
                .data_aspect(1.0)
                .show_axes(false)
                .show_grid(false)
                .allow_double_click_reset(false);

            let shown = plot.show(ui, |plot_ui| {
                if let Some(rect) = map.take_pending_view(now) {
                    plot_ui.set_plot_bounds(PlotBounds::from_min_max(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ));
                }
                for layer in map.layers.iter().filter(|l| l.visible) {
                    for shape in &layer.shapes {
                        draw_shape(plot_ui, shape);
                    }
                }
                (plot_ui.plot_bounds(), plot_ui.pointer_coordinate())
            });

            let (bounds, pointer) = shown.inner;
            let [min_x, min_y] = bounds.min();
            let [max_x, max_y] = bounds.max();
            map.observe_view(geo::Rect::new(
                geo::Coord { x: min_x, y: min_y },
                geo::Coord { x: max_x, y: max_y },
            ));
            response.view_width = max_x - min_x;

            if shown.response.clicked() {
                response.clicked_at = pointer.map(|p| [p.y, p.x]);
            }

            if map.show_signal_legend {
                Self::signal_legend(ui);
            }
        });

        if focus {
            ui.scroll_to_rect(frame.response.rect, Some(Align::TOP));
        }
        ui.add_space(6.0);
        response
    }

    pub fn signal_legend(ui: &mut Ui) {
        ui.horizontal_wrapped(|ui| {
            ui.label(RichText::new("Signal Strength (dBm)").small().strong());
            for tier in SignalTier::ALL {
                swatch(ui, parse_hex_color(tier.hex()));
                ui.label(RichText::new(tier.legend_label()).small());
            }
        });
    }

    // ========================================================================
    // Raw JSON
    // ========================================================================

    pub fn json_tree(ui: &mut Ui, label: &str, value: &serde_json::Value) {
        egui::CollapsingHeader::new(RichText::new(label).strong())
            .id_source(("json", label))
            .default_open(true)
            .show(ui, |ui| json_node(ui, value, label));
    }

    // ========================================================================
    // Overview
    // ========================================================================

    pub fn summary_stats(ui: &mut Ui, summary: &Summary) {
        egui::Grid::new("summary_stats")
            .num_columns(2)
            .spacing([24.0, 4.0])
            .show(ui, |ui| {
                ui.label("Samples");
                ui.strong(summary.total_instances.to_string());
                ui.end_row();
                ui.label("Total duration");
                ui.strong(&summary.total_duration_human);
                ui.end_row();
                ui.label("Total size");
                ui.strong(format!("{:.2} GB", summary.total_size_gb));
                ui.end_row();
                ui.label("Total distance");
                ui.strong(format!("{:.2} km", summary.total_distance_km));
                ui.end_row();
            });
    }

    pub fn sample_table(ui: &mut Ui, details: &[SampleDetail]) {
        if details.is_empty() {
            ui.weak("No sample details in this report.");
            return;
        }

        TableBuilder::new(ui)
            .striped(true)
            .resizable(true)
            .cell_layout(Layout::left_to_right(Align::Center))
            .column(Column::auto())
            .columns(Column::auto().at_least(80.0), 7)
            .column(Column::remainder())
            .header(20.0, |mut header| {
                for title in [
                    "#", "Sample", "Collected", "Duration", "Device", "Distance", "Video",
                    "Sensors", "Location",
                ] {
                    header.col(|ui| {
                        ui.strong(title);
                    });
                }
            })
            .body(|mut body| {
                for detail in details {
                    body.row(18.0, |mut row| {
                        row.col(|ui| {
                            ui.label(detail.id.to_string());
                        });
                        row.col(|ui| {
                            ui.label(&detail.name);
                        });
                        row.col(|ui| {
                            ui.label(&detail.collection_datetime);
                        });
                        row.col(|ui| {
                            ui.label(&detail.duration);
                        });
                        row.col(|ui| {
                            ui.label(format!(
                                "{} {}",
                                detail.device_manufacturer, detail.device_model
                            ));
                        });
                        row.col(|ui| {
                            ui.label(format!("{:.2} km", detail.distance_km));
                        });
                        row.col(|ui| {
                            ui.label(format!(
                                "{} frames @ {} fps, {}",
                                detail.video_frames, detail.video_fps, detail.video_resolution
                            ));
                        });
                        row.col(|ui| {
                            ui.label(detail.sensors.to_string());
                        });
                        row.col(|ui| {
                            ui.label(&detail.location);
                        });
                    });
                }
            });
    }

    /// Rows of `(label, locator, loaded at)` under a heading per panel.
    pub fn loaded_data(ui: &mut Ui, title: &str, rows: &[(String, String, String)]) {
        ui.group(|ui| {
            ui.label(RichText::new(title).strong().size(16.0));
            ui.separator();
            if rows.is_empty() {
                ui.weak("Nothing loaded.");
            }
            for (label, locator, loaded_at) in rows {
                ui.horizontal(|ui| {
                    ui.strong(label);
                    ui.weak(locator);
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        ui.label(loaded_at);
                    });
                });
            }
        });
        ui.add_space(10.0);
    }
}

fn draw_shape(plot_ui: &mut egui_plot::PlotUi, shape: &MapShape) {
    match shape {
        MapShape::Polyline { points, color, width } => {
            let line: Vec<[f64; 2]> = points.iter().map(|c| [c.x, c.y]).collect();
            plot_ui.line(
                Line::new(PlotPoints::from(line))
                    .color(parse_hex_color(color))
                    .width(*width),
            );
        }
        MapShape::Marker { at, label } => {
            plot_ui.points(
                Points::new(vec![[at.x, at.y]])
                    .radius(5.0)
                    .color(Color32::from_rgb(40, 90, 200))
                    .name(label),
            );
            plot_ui.text(
                Text::new(PlotPoint::new(at.x, at.y), RichText::new(label).small())
                    .anchor(Align2::LEFT_BOTTOM),
            );
        }
        MapShape::Circle { at, color, popup } => {
            plot_ui.points(
                Points::new(vec![[at.x, at.y]])
                    .radius(4.0)
                    .filled(true)
                    .color(parse_hex_color(color))
                    .name(popup),
            );
        }
        MapShape::Heat { at, intensity } => {
            plot_ui.points(
                Points::new(vec![[at.x, at.y]])
                    .radius(HEAT_RADIUS)
                    .filled(true)
                    .color(heat_color(*intensity)),
            );
        }
    }
}

fn json_node(ui: &mut Ui, value: &serde_json::Value, path: &str) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                json_child(ui, key, child, &format!("{}/{}", path, key));
            }
        }
        serde_json::Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                json_child(ui, &format!("[{}]", i), child, &format!("{}/{}", path, i));
            }
        }
        scalar => {
            ui.monospace(scalar.to_string());
        }
    }
}

fn json_child(ui: &mut Ui, key: &str, child: &serde_json::Value, path: &str) {
    match child {
        serde_json::Value::Object(map) => {
            egui::CollapsingHeader::new(format!("{} {{{}}}", key, map.len()))
                .id_source(path)
                .show(ui, |ui| json_node(ui, child, path));
        }
        serde_json::Value::Array(items) => {
            egui::CollapsingHeader::new(format!("{} [{}]", key, items.len()))
                .id_source(path)
                .show(ui, |ui| json_node(ui, child, path));
        }
        scalar => {
            ui.horizontal(|ui| {
                ui.label(format!("{}:", key));
                ui.monospace(scalar.to_string());
            });
        }
    }
}

fn swatch(ui: &mut Ui, color: Color32) {
    let (rect, _) = ui.allocate_exact_size(egui::vec2(12.0, 12.0), egui::Sense::hover());
    ui.painter().rect_filled(rect, 2.0, color);
}

// ============================================================================
// Helper Functions
// ============================================================================

pub fn parse_hex_color(hex: &str) -> Color32 {
    let hex = hex.trim_start_matches('#');
    if hex.len() == 6 {
        if let (Ok(r), Ok(g), Ok(b)) = (
            u8::from_str_radix(&hex[0..2], 16),
            u8::from_str_radix(&hex[2..4], 16),
            u8::from_str_radix(&hex[4..6], 16),
        ) {
            return Color32::from_rgb(r, g, b);
        }
    }
    Color32::from_rgb(100, 100, 100)
}

/// Heat gradient: blue for the weakest readings through cyan, lime and yellow to red.
pub fn heat_color(intensity: f64) -> Color32 {
    const STOPS: [(f64, [u8; 3]); 5] = [
        (0.4, [0, 0, 255]),
        (0.6, [0, 255, 255]),
        (0.7, [0, 255, 0]),
        (0.8, [255, 255, 0]),
        (1.0, [255, 0, 0]),
    ];

    let t = intensity.clamp(0.0, 1.0);
    let [r, g, b] = if t <= STOPS[0].0 {
        STOPS[0].1
    } else {
        let upper = STOPS.iter().position(|(at, _)| t <= *at).unwrap_or(STOPS.len() - 1);
        let (lo_at, lo) = STOPS[upper - 1];
        let (hi_at, hi) = STOPS[upper];
        let f = (t - lo_at) / (hi_at - lo_at);
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * f).round() as u8;
        [mix(lo[0], hi[0]), mix(lo[1], hi[1]), mix(lo[2], hi[2])]
    };
    Color32::from_rgba_unmultiplied(r, g, b, 180)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse_with_fallback() {
        assert_eq!(parse_hex_color("#28a745"), Color32::from_rgb(0x28, 0xa7, 0x45));
        assert_eq!(parse_hex_color("0000ff"), Color32::from_rgb(0, 0, 255));
        assert_eq!(parse_hex_color("#fff"), Color32::from_rgb(100, 100, 100));
    }

    #[test]
    fn heat_gradient_spans_blue_to_red() {
        assert_eq!(heat_color(0.0), Color32::from_rgba_unmultiplied(0, 0, 255, 180));
        assert_eq!(heat_color(0.7), Color32::from_rgba_unmultiplied(0, 255, 0, 180));
        assert_eq!(heat_color(1.0), Color32::from_rgba_unmultiplied(255, 0, 0, 180));

        let mid = heat_color(0.5);
        assert_eq!(mid.b(), 255);
        assert!(mid.g() > 0 && mid.g() < 255);
    }
}
