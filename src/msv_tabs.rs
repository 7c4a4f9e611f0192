// Section switching with a settle window before widgets are re-fitted
use crate::msv_wifi::MAP_KEY_PREFIX;
use std::time::{Duration, Instant};

pub const OVERVIEW_MAP_KEY: &str = "overview-map";
pub const GEO_MAP_KEY: &str = "geo-map";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Section {
    Overview,
    Sensors,
    Wifi,
    Geo,
    Simple(String),
    LoadedData,
}

impl Section {
    pub fn title(&self) -> String {
        match self {
            Section::Overview => "📊 Overview".to_string(),
            Section::Sensors => "📈 Sensors".to_string(),
            Section::Wifi => "📶 Wi-Fi".to_string(),
            Section::Geo => "🗺 GPS Routes".to_string(),
            Section::Simple(name) => format!("📄 {}", capitalize(name)),
            Section::LoadedData => "💾 Loaded Data".to_string(),
        }
    }

    /// Registry key prefix of the maps shown in this section.
    pub fn map_prefix(&self) -> Option<&'static str> {
        match self {
            Section::Overview => Some(OVERVIEW_MAP_KEY),
            Section::Wifi => Some(MAP_KEY_PREFIX),
            Section::Geo => Some(GEO_MAP_KEY),
            _ => None,
        }
    }

    pub fn has_charts(&self) -> bool {
        matches!(self, Section::Sensors)
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct TabSwitcher {
    active: Section,
    settle: Duration,
    settle_deadline: Option<Instant>,
}

impl TabSwitcher {
    pub fn new(initial: Section, settle: Duration) -> Self {
        Self {
            active: initial,
            settle,
            settle_deadline: None,
        }
    }

    pub fn active(&self) -> &Section {
        &self.active
    }

    pub fn is_active(&self, section: &Section) -> bool {
        &self.active == section
    }

    /// Makes `section` visible and arms the settle window.
    pub fn show(&mut self, section: Section, now: Instant) {
        if self.active != section {
            log::debug!("Switching to section {:?}", section);
        }
        self.active = section;
        self.settle_deadline = Some(now + self.settle);
    }

    /// Returns the active section once its settle window has elapsed, exactly once.
    pub fn poll_settled(&mut self, now: Instant) -> Option<Section> {
        match self.settle_deadline {
            Some(deadline) if now >= deadline => {
                self.settle_deadline = None;
                Some(self.active.clone())
            }
            _ => None,
        }
    }

    pub fn time_until_settled(&self, now: Instant) -> Option<Duration> {
        self.settle_deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}
