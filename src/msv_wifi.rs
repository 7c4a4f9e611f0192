// Wi-Fi signal classification, heat normalization and SSID filtering
use crate::msv_geo::mean_center;
use crate::msv_models::WifiReading;
use geo::Coord;

pub const MAP_KEY_PREFIX: &str = "wifi:";

/// Discrete color tiers used for point rendering and the legend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTier {
    Excellent,
    Good,
    Fair,
    Weak,
    Poor,
}

impl SignalTier {
    pub const ALL: [SignalTier; 5] = [
        SignalTier::Poor,
        SignalTier::Weak,
        SignalTier::Fair,
        SignalTier::Good,
        SignalTier::Excellent,
    ];

    pub fn from_level(level: f64) -> Self {
        if level >= -50.0 {
            SignalTier::Excellent
        } else if level >= -60.0 {
            SignalTier::Good
        } else if level >= -70.0 {
            SignalTier::Fair
        } else if level >= -80.0 {
            SignalTier::Weak
        } else {
            SignalTier::Poor
        }
    }

    pub fn hex(&self) -> &'static str {
        match self {
            SignalTier::Excellent => "#28a745",
            SignalTier::Good => "#a0d468",
            SignalTier::Fair => "#ffd700",
            SignalTier::Weak => "#ff9800",
            SignalTier::Poor => "#dc3545",
        }
    }

    /// Legend text, e.g. `-70–-60` or `-50+`.
    pub fn legend_label(&self) -> &'static str {
        match self {
            SignalTier::Poor => "-90–-80",
            SignalTier::Weak => "-80–-70",
            SignalTier::Fair => "-70–-60",
            SignalTier::Good => "-60–-50",
            SignalTier::Excellent => "-50+",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalStats {
    pub min_level: f64,
    pub max_level: f64,
    pub range: f64,
}

impl SignalStats {
    pub fn of(readings: &[WifiReading]) -> Option<Self> {
        let first = readings.first()?.level;
        let (min_level, max_level) = readings
            .iter()
            .fold((first, first), |(lo, hi), r| (lo.min(r.level), hi.max(r.level)));
        Some(Self {
            min_level,
            max_level,
            range: max_level - min_level,
        })
    }

    /// Position of `level` within the range; 0.5 when every reading is equal.
    pub fn intensity(&self, level: f64) -> f64 {
        if self.range > 0.0 {
            (level - self.min_level) / self.range
        } else {
            0.5
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatPoint {
    pub at: Coord,
    pub intensity: f64,
}

pub fn normalize(readings: &[WifiReading]) -> Vec<HeatPoint> {
    let Some(stats) = SignalStats::of(readings) else {
        return Vec::new();
    };
    readings
        .iter()
        .map(|r| HeatPoint {
            at: Coord { x: r.lon, y: r.lat },
            intensity: stats.intensity(r.level),
        })
        .collect()
}

pub fn reading_center(readings: &[WifiReading]) -> Option<Coord> {
    let coords: Vec<Coord> = readings.iter().map(|r| Coord { x: r.lon, y: r.lat }).collect();
    mean_center(&coords)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Heat,
    Points,
}

/// Registry key for the map of one `(sample, ssid, band)` combination.
/// Parts are quoted and escaped, so distinct combinations never share a key.
pub fn map_key(sample: &str, ssid: &str, band: &str) -> String {
    format!("{}{:?}:{:?}:{:?}", MAP_KEY_PREFIX, sample, ssid, band)
}

// ============================================================================
// SSID filter
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FilterMode {
    #[default]
    Text,
    ShowAll,
}

/// Visibility of SSID entries in the browser list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SsidFilter {
    text: String,
    mode: FilterMode,
}

impl SsidFilter {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Typing replaces any Show all override.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.mode = FilterMode::Text;
    }

    pub fn show_all(&mut self) {
        self.mode = FilterMode::ShowAll;
    }

    pub fn hide_all(&mut self) {
        self.text.clear();
        self.mode = FilterMode::Text;
    }

    pub fn is_visible(&self, ssid: &str) -> bool {
        match self.mode {
            FilterMode::ShowAll => true,
            FilterMode::Text if self.text.is_empty() => false,
            FilterMode::Text => ssid.to_lowercase().contains(&self.text.to_lowercase()),
        }
    }

    pub fn visible<'a>(&self, ssids: &[&'a str]) -> Vec<&'a str> {
        ssids.iter().copied().filter(|s| self.is_visible(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(levels: &[f64]) -> Vec<WifiReading> {
        levels
            .iter()
            .enumerate()
            .map(|(i, level)| WifiReading { lat: i as f64, lon: 2.0 * i as f64, level: *level })
            .collect()
    }

    #[test]
    fn intensities_span_zero_to_one() {
        let heat = normalize(&readings(&[-90.0, -70.0, -50.0]));
        let intensities: Vec<f64> = heat.iter().map(|h| h.intensity).collect();
        assert_eq!(intensities, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn single_reading_uses_midpoint() {
        let heat = normalize(&readings(&[-63.0]));
        assert_eq!(heat.len(), 1);
        assert_eq!(heat[0].intensity, 0.5);
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn stats_track_extremes() {
        let stats = SignalStats::of(&readings(&[-72.0, -40.0, -88.0])).unwrap();
        assert_eq!(stats.min_level, -88.0);
        assert_eq!(stats.max_level, -40.0);
        assert_eq!(stats.range, 48.0);
    }

    #[test]
    fn tiers_follow_thresholds() {
        assert_eq!(SignalTier::from_level(-50.0), SignalTier::Excellent);
        assert_eq!(SignalTier::from_level(-55.0), SignalTier::Good);
        assert_eq!(SignalTier::from_level(-60.0), SignalTier::Good);
        assert_eq!(SignalTier::from_level(-69.9), SignalTier::Fair);
        assert_eq!(SignalTier::from_level(-80.0), SignalTier::Weak);
        assert_eq!(SignalTier::from_level(-80.1), SignalTier::Poor);
        assert_eq!(SignalTier::from_level(-55.0).hex(), "#a0d468");
    }

    #[test]
    fn legend_colors_match_lower_bound_plus_one() {
        let lower_bounds = [-90.0, -80.0, -70.0, -60.0, -50.0];
        for (tier, from) in SignalTier::ALL.iter().zip(lower_bounds) {
            assert_eq!(SignalTier::from_level(from + 1.0), *tier);
        }
    }

    #[test]
    fn center_is_mean_of_readings() {
        let center = reading_center(&readings(&[-60.0, -60.0, -60.0])).unwrap();
        assert_eq!(center, Coord { x: 2.0, y: 1.0 });
        assert!(reading_center(&[]).is_none());
    }

    #[test]
    fn map_keys_keep_every_part_distinct() {
        assert_eq!(
            map_key("run 1", "Café-Net", "2.4GHz"),
            r#"wifi:"run 1":"Café-Net":"2.4GHz""#
        );
        assert_ne!(
            map_key("a", "Guest-WiFi", "5GHz"),
            map_key("a", "Guest WiFi", "5GHz")
        );
        assert_ne!(map_key("a", "x:y", "5GHz"), map_key("a:x", "y", "5GHz"));
        assert!(map_key("a", "", "5GHz").starts_with(MAP_KEY_PREFIX));
    }

    #[test]
    fn filter_hides_everything_until_typed() {
        let ssids = ["HomeNet", "office", "Guest-HOME"];
        let mut filter = SsidFilter::default();
        assert!(filter.visible(&ssids).is_empty());

        filter.set_text("home");
        assert_eq!(filter.visible(&ssids), vec!["HomeNet", "Guest-HOME"]);

        filter.show_all();
        assert_eq!(filter.visible(&ssids).len(), 3);
        assert_eq!(filter.text(), "home");

        filter.hide_all();
        assert!(filter.visible(&ssids).is_empty());
        assert_eq!(filter.text(), "");
    }
}
