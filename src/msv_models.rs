// Data models and sample fetching for the Mobility Sample Viewer
//
// A report is a directory (or HTTP base URL) produced by the survey exporter:
// - index.json                 report index, section maps and dataset summary
// - data/sensors_<sample>.json array of chart descriptors
// - data/wifi_<sample>.json    {ssid: {band: [[lat, lon, level], ...]}}
// - data/geo_<sample>.json     {center: [lat, lon], path: [[lat, lon], ...]}

use chrono::{DateTime, Local};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::blocking;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

lazy_static! {
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]+>").expect("valid html tag pattern");
    static ref LINE_BREAK: Regex = Regex::new(r"(?i)<br\s*/?>").expect("valid line break pattern");
    static ref SENSOR_PREFIX: Regex =
        Regex::new(r"(?i)<b>\s*Sensor:\s*</b>\s*").expect("valid sensor prefix pattern");
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MsvError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("File error: {0}")]
    File(String),
}

pub type Result<T> = std::result::Result<T, MsvError>;

// ============================================================================
// Samples
// ============================================================================

/// A selectable dataset: `locator` is the fetch path, `label` is what the user sees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleRef {
    pub locator: String,
    pub label: String,
}

impl SampleRef {
    pub fn new(locator: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedSample<T> {
    pub label: String,
    pub payload: T,
    pub loaded_at: DateTime<Local>,
}

impl<T> LoadedSample<T> {
    pub fn new(label: impl Into<String>, payload: T) -> Self {
        Self {
            label: label.into(),
            payload,
            loaded_at: Local::now(),
        }
    }
}

// ============================================================================
// Sensor charts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub x: Vec<f64>,
    #[serde(default)]
    pub y: Vec<Option<f64>>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Trace {
    /// Paired points, skipping gaps in `y`.
    pub fn points(&self) -> Vec<[f64; 2]> {
        self.x
            .iter()
            .zip(self.y.iter())
            .filter_map(|(x, y)| y.map(|y| [*x, y]))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDescriptor {
    pub chart_id: String,
    #[serde(default)]
    pub layout: serde_json::Value,
    #[serde(default)]
    pub data: Vec<Trace>,
}

impl ChartDescriptor {
    fn text_at(&self, pointer: &str) -> Option<String> {
        let value = self.layout.pointer(pointer)?;
        match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(obj) => obj.get("text")?.as_str().map(str::to_string),
            _ => None,
        }
    }

    /// Layout title with markup removed, `None` when the layout has no title.
    pub fn title(&self) -> Option<String> {
        self.text_at("/title")
            .map(|t| strip_markup(&t))
            .filter(|t| !t.is_empty())
    }

    /// Label used for the checkbox of this chart, e.g. `Accelerometer`.
    pub fn sensor_name(&self, index: usize) -> String {
        self.text_at("/title")
            .map(|t| strip_markup(&SENSOR_PREFIX.replace(&t, "")))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("Sensor {}", index + 1))
    }

    /// Chart title with the sample label appended as a second line.
    pub fn title_for_sample(&self, sample_label: &str) -> String {
        let title = self.title().unwrap_or_else(|| "Sensor".to_string());
        format!("{}\nSample: {}", title, sample_label)
    }

    pub fn x_axis_title(&self) -> Option<String> {
        self.text_at("/xaxis/title").map(|t| strip_markup(&t))
    }

    pub fn y_axis_title(&self) -> Option<String> {
        self.text_at("/yaxis/title").map(|t| strip_markup(&t))
    }
}

pub fn strip_markup(text: &str) -> String {
    let with_breaks = LINE_BREAK.replace_all(text, "\n");
    HTML_TAG.replace_all(&with_breaks, "").trim().to_string()
}

// ============================================================================
// Wi-Fi readings
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "(f64, f64, f64)")]
pub struct WifiReading {
    pub lat: f64,
    pub lon: f64,
    pub level: f64,
}

impl From<(f64, f64, f64)> for WifiReading {
    fn from((lat, lon, level): (f64, f64, f64)) -> Self {
        Self { lat, lon, level }
    }
}

/// Readings grouped by SSID, then by band. Keys are used verbatim.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct WifiData {
    pub networks: BTreeMap<String, BTreeMap<String, Vec<WifiReading>>>,
}

impl WifiData {
    /// SSIDs offered for selection; blank names are dropped.
    pub fn ssids(&self) -> Vec<&str> {
        self.networks
            .keys()
            .filter(|ssid| !ssid.trim().is_empty())
            .map(String::as_str)
            .collect()
    }

    pub fn bands_for(&self, ssid: &str) -> Vec<&str> {
        self.networks
            .get(ssid)
            .map(|by_band| by_band.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn readings(&self, ssid: &str, band: &str) -> Option<&[WifiReading]> {
        self.networks
            .get(ssid)?
            .get(band)
            .map(Vec::as_slice)
    }
}

// ============================================================================
// GPS routes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRoute {
    pub center: [f64; 2],
    #[serde(default)]
    pub path: Vec<[f64; 2]>,
}

// ============================================================================
// Report index
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoCenter {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleDetail {
    pub id: u32,
    pub name: String,
    pub collection_date: String,
    pub collection_datetime: String,
    pub duration: String,
    pub device_manufacturer: String,
    pub device_model: String,
    pub distance_km: f64,
    pub video_frames: String,
    pub video_fps: String,
    pub video_resolution: String,
    pub location: String,
    pub sensors: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Summary {
    pub total_instances: usize,
    pub total_duration_human: String,
    pub total_size_gb: f64,
    pub total_distance_km: f64,
    pub geo_centers_map: Vec<GeoCenter>,
    pub sample_details: Vec<SampleDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSections {
    pub sensor: BTreeMap<String, String>,
    pub wifi: BTreeMap<String, String>,
    pub geo: BTreeMap<String, String>,
    /// Sections without a dedicated viewer, e.g. `video` or `cell`.
    pub simple: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportIndex {
    pub title: String,
    pub generation_date: String,
    pub version: String,
    pub sections: ReportSections,
    pub summary: Summary,
}

impl ReportIndex {
    pub fn sample_refs(section: &BTreeMap<String, String>) -> Vec<SampleRef> {
        section
            .iter()
            .map(|(label, locator)| SampleRef::new(locator.clone(), label.clone()))
            .collect()
    }

    pub fn sensor_samples(&self) -> Vec<SampleRef> {
        Self::sample_refs(&self.sections.sensor)
    }

    pub fn wifi_samples(&self) -> Vec<SampleRef> {
        Self::sample_refs(&self.sections.wifi)
    }

    pub fn geo_samples(&self) -> Vec<SampleRef> {
        Self::sample_refs(&self.sections.geo)
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "Mobility Sample Viewer"
        } else {
            &self.title
        }
    }
}

// ============================================================================
// Sample sources
// ============================================================================

/// Where sample files come from. Implementations must be usable from fetch threads.
pub trait SampleSource: Send + Sync {
    fn fetch(&self, locator: &str) -> Result<serde_json::Value>;

    fn describe(&self) -> String;
}

pub fn fetch_typed<T: DeserializeOwned>(source: &dyn SampleSource, locator: &str) -> Result<T> {
    let value = source.fetch(locator)?;
    serde_json::from_value(value)
        .map_err(|e| MsvError::Parse(format!("Unexpected content in {}: {}", locator, e)))
}

pub struct HttpSource {
    base_url: String,
    client: blocking::Client,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MsvError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url_for(&self, locator: &str) -> String {
        format!("{}/{}", self.base_url, locator.trim_start_matches('/'))
    }
}

impl SampleSource for HttpSource {
    fn fetch(&self, locator: &str) -> Result<serde_json::Value> {
        let url = self.url_for(locator);
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| MsvError::Network(format!("Failed to load {}: {}", locator, e)))?;

        if !response.status().is_success() {
            return Err(MsvError::Network(format!(
                "Failed to load {}: server returned {}",
                locator,
                response.status()
            )));
        }

        let body = response
            .text()
            .map_err(|e| MsvError::Network(format!("Failed to read response: {}", e)))?;

        serde_json::from_str(&body)
            .map_err(|e| MsvError::Parse(format!("Invalid JSON in {}: {}", locator, e)))
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SampleSource for DirSource {
    fn fetch(&self, locator: &str) -> Result<serde_json::Value> {
        let path = self.root.join(locator);
        log::debug!("Reading {}", path.display());

        let contents = fs::read_to_string(&path)
            .map_err(|e| MsvError::File(format!("Failed to load {}: {}", path.display(), e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| MsvError::Parse(format!("Invalid JSON in {}: {}", locator, e)))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Picks an HTTP source for `http(s)://` locations and a directory source otherwise.
pub fn source_for(location: &str, timeout: Duration) -> Result<Arc<dyn SampleSource>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Ok(Arc::new(HttpSource::new(location, timeout)?))
    } else {
        Ok(Arc::new(DirSource::new(location)))
    }
}

pub fn load_index(source: &dyn SampleSource, index_file: &str) -> Result<ReportIndex> {
    let index: ReportIndex = fetch_typed(source, index_file)?;
    log::info!(
        "Loaded report '{}' from {}: {} sensor, {} wifi, {} geo samples",
        index.display_title(),
        source.describe(),
        index.sections.sensor.len(),
        index.sections.wifi.len(),
        index.sections.geo.len()
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn chart_titles_drop_markup() {
        let chart: ChartDescriptor = serde_json::from_value(json!({
            "chart_id": "chart_s1_Accelerometer",
            "layout": {
                "title": "<b>Sensor:</b> Accelerometer",
                "xaxis": {"title": "Time (s)"},
                "yaxis": {"title": {"text": "Value (m/s²)"}}
            },
            "data": [{"x": [0.0, 1.0], "y": [1.0, null], "mode": "lines", "name": "x"}]
        }))
        .unwrap();

        assert_eq!(chart.sensor_name(0), "Accelerometer");
        assert_eq!(chart.title().as_deref(), Some("Sensor: Accelerometer"));
        assert_eq!(
            chart.title_for_sample("s1"),
            "Sensor: Accelerometer\nSample: s1"
        );
        assert_eq!(chart.x_axis_title().as_deref(), Some("Time (s)"));
        assert_eq!(chart.y_axis_title().as_deref(), Some("Value (m/s²)"));
        assert_eq!(chart.data[0].points(), vec![[0.0, 1.0]]);
    }

    #[test]
    fn untitled_chart_falls_back_to_position() {
        let chart: ChartDescriptor =
            serde_json::from_value(json!({"chart_id": "c", "layout": {}, "data": []})).unwrap();
        assert_eq!(chart.sensor_name(2), "Sensor 3");
        assert_eq!(chart.title_for_sample("a"), "Sensor\nSample: a");
    }

    #[test]
    fn wifi_data_groups_and_filters_blank_ssids() {
        let data: WifiData = serde_json::from_value(json!({
            "home": {"2.4GHz": [[-23.5, -46.6, -55.0]], "5GHz": [[-23.5, -46.6, -70.0]]},
            "   ": {"2.4GHz": [[-23.5, -46.6, -80.0]]},
            "cafe": {"5GHz": []}
        }))
        .unwrap();

        assert_eq!(data.ssids(), vec!["cafe", "home"]);
        assert_eq!(data.bands_for("home"), vec!["2.4GHz", "5GHz"]);
        assert_eq!(
            data.readings("home", "2.4GHz"),
            Some(&[WifiReading { lat: -23.5, lon: -46.6, level: -55.0 }][..])
        );
        assert_eq!(data.readings("home", "6GHz"), None);
    }

    #[test]
    fn index_tolerates_missing_fields() {
        let index: ReportIndex = serde_json::from_value(json!({
            "title": "Survey",
            "sections": {"geo": {"s1": "data/geo_s1.json"}},
            "summary": {"geo_centers_map": [{"lat": 1.0, "lon": 2.0, "name": "s1"}]}
        }))
        .unwrap();

        assert_eq!(index.geo_samples(), vec![SampleRef::new("data/geo_s1.json", "s1")]);
        assert!(index.sensor_samples().is_empty());
        assert_eq!(index.summary.geo_centers_map.len(), 1);
        assert_eq!(ReportIndex::default().display_title(), "Mobility Sample Viewer");
    }

    #[test]
    fn dir_source_reads_and_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = fs::File::create(dir.path().join("geo.json")).unwrap();
        file.write_all(br#"{"center": [0.0, 0.0], "path": [[0.0, 0.0]]}"#)
            .unwrap();

        let source = DirSource::new(dir.path());
        let route: GeoRoute = fetch_typed(&source, "geo.json").unwrap();
        assert_eq!(route.path.len(), 1);

        assert!(matches!(source.fetch("absent.json"), Err(MsvError::File(_))));
    }

    #[test]
    fn source_kind_follows_location_scheme() {
        let timeout = Duration::from_secs(1);
        let http = source_for("https://example.org/report/", timeout).unwrap();
        assert_eq!(http.describe(), "https://example.org/report");
        let dir = source_for("reports/run1", timeout).unwrap();
        assert_eq!(dir.describe(), "reports/run1");
    }
}
