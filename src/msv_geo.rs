// Route geometry, viewport fitting and fly-to animation.
// Plot space uses x = longitude, y = latitude; input files use [lat, lon].
use crate::msv_models::{GeoCenter, GeoRoute};
use geo::{BoundingRect, Coord, LineString, Rect};
use std::time::{Duration, Instant};

/// Fraction of the span added on each side when fitting a route.
pub const FIT_PADDING: f64 = 0.05;
/// Fraction of the span added on each side of the overview bounds.
pub const OVERVIEW_PADDING: f64 = 0.1;
/// Smallest span (degrees) a fitted viewport may have.
pub const MIN_SPAN_DEG: f64 = 0.0005;
/// Width of the viewport in 256px tiles, used to relate zoom levels to spans.
const VIEW_TILES: f64 = 4.0;
const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub const DEFAULT_CENTER: [f64; 2] = [-23.5505, -46.6333];
pub const DEFAULT_ZOOM: f64 = 10.0;
pub const MARKER_ZOOM: f64 = 17.0;
pub const FLY_DURATION: Duration = Duration::from_millis(1500);

pub fn to_coord([lat, lon]: [f64; 2]) -> Coord {
    Coord { x: lon, y: lat }
}

pub fn bounds_of(coords: &[Coord]) -> Option<Rect> {
    LineString::from(coords.to_vec()).bounding_rect()
}

/// Grows `rect` by `ratio` of its span on each side, never below `MIN_SPAN_DEG`.
pub fn pad_rect(rect: Rect, ratio: f64) -> Rect {
    let center = rect.center();
    let half_w = (rect.width() * (0.5 + ratio)).max(MIN_SPAN_DEG / 2.0);
    let half_h = (rect.height() * (0.5 + ratio)).max(MIN_SPAN_DEG / 2.0);
    Rect::new(
        Coord { x: center.x - half_w, y: center.y - half_h },
        Coord { x: center.x + half_w, y: center.y + half_h },
    )
}

pub fn fit_bounds(coords: &[Coord], padding: f64) -> Option<Rect> {
    bounds_of(coords).map(|rect| pad_rect(rect, padding))
}

pub fn span_for_zoom(zoom: f64) -> f64 {
    360.0 * VIEW_TILES / 2f64.powf(zoom)
}

pub fn zoom_of(rect: &Rect) -> f64 {
    let width = rect.width().max(f64::EPSILON);
    (360.0 * VIEW_TILES / width).log2()
}

/// Viewport of the given zoom level centered on `center`.
pub fn rect_around(center: Coord, zoom: f64) -> Rect {
    let half_w = span_for_zoom(zoom) / 2.0;
    let half_h = half_w * center.y.to_radians().cos().abs().max(0.01);
    Rect::new(
        Coord { x: center.x - half_w, y: center.y - half_h },
        Coord { x: center.x + half_w, y: center.y + half_h },
    )
}

/// Great-circle distance in meters between two plot-space coordinates.
pub fn haversine_m(a: Coord, b: Coord) -> f64 {
    let dlat = (b.y - a.y).to_radians();
    let dlon = (b.x - a.x).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.y.to_radians().cos() * b.y.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Arithmetic mean of the given coordinates.
pub fn mean_center(coords: &[Coord]) -> Option<Coord> {
    if coords.is_empty() {
        return None;
    }
    let n = coords.len() as f64;
    let (sx, sy) = coords
        .iter()
        .fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
    Some(Coord { x: sx / n, y: sy / n })
}

// ============================================================================
// Route layout
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RouteLayout {
    pub line: Vec<Coord>,
    pub start: Coord,
    pub end: Coord,
    pub bounds: Rect,
}

impl RouteLayout {
    /// `None` when the route has no points.
    pub fn from_route(route: &GeoRoute) -> Option<Self> {
        let line: Vec<Coord> = route.path.iter().copied().map(to_coord).collect();
        let start = *line.first()?;
        let end = *line.last()?;
        let bounds = fit_bounds(&line, FIT_PADDING)?;

        Some(Self {
            line,
            start,
            end,
            bounds,
        })
    }
}

// ============================================================================
// Overview layout
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct OverviewLayout {
    pub markers: Vec<(Coord, String)>,
    pub home: Rect,
}

impl OverviewLayout {
    pub fn from_centers(centers: &[GeoCenter]) -> Self {
        let markers: Vec<(Coord, String)> = centers
            .iter()
            .map(|c| {
                let name = if c.name.is_empty() { "Sample".to_string() } else { c.name.clone() };
                (Coord { x: c.lon, y: c.lat }, name)
            })
            .collect();

        let coords: Vec<Coord> = markers.iter().map(|(c, _)| *c).collect();
        let home = fit_bounds(&coords, OVERVIEW_PADDING)
            .unwrap_or_else(|| rect_around(to_coord(DEFAULT_CENTER), DEFAULT_ZOOM));

        Self { markers, home }
    }

    /// Index of the marker closest to `at`, if it lies within `tolerance` degrees.
    pub fn marker_near(&self, at: Coord, tolerance: f64) -> Option<usize> {
        self.markers
            .iter()
            .enumerate()
            .map(|(i, (c, _))| (i, ((c.x - at.x).powi(2) + (c.y - at.y).powi(2)).sqrt()))
            .filter(|(_, d)| *d <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }
}

/// Whether flying from `view` to `target` at `zoom` would visibly move the map.
pub fn should_fly(view: &Rect, target: Coord, zoom: f64) -> bool {
    haversine_m(view.center(), target) > 1.0 || (zoom_of(view) - zoom).abs() > 0.01
}

// ============================================================================
// Fly-to animation
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FlyTo {
    from: Rect,
    to: Rect,
    started: Instant,
    duration: Duration,
}

impl FlyTo {
    pub fn new(from: Rect, to: Rect, started: Instant, duration: Duration) -> Self {
        Self { from, to, started, duration }
    }

    fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let t = now.saturating_duration_since(self.started).as_secs_f64()
            / self.duration.as_secs_f64();
        let t = t.clamp(0.0, 1.0);
        t * t * (3.0 - 2.0 * t)
    }

    pub fn at(&self, now: Instant) -> Rect {
        let p = self.progress(now);
        let lerp = |a: Coord, b: Coord| Coord {
            x: a.x + (b.x - a.x) * p,
            y: a.y + (b.y - a.y) * p,
        };
        Rect::new(lerp(self.from.min(), self.to.min()), lerp(self.from.max(), self.to.max()))
    }

    pub fn finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.duration
    }
}
