//! Geometry computations.
//!
//! Platform-agnostic distance and projection helpers. All
//! coordinates use WGS84 (lat/lon in degrees).

use serde::{Deserialize, Serialize};

/// A geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Result of projecting a position onto a polyline.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectionResult {
    /// Nearest point on the polyline.
    pub point: Point,
    /// Index of the segment start point (0-based).
    pub segment_index: usize,
    /// Distance from the position to the nearest point, in meters.
    pub distance_m: f64,
    /// Distance along the polyline from its start to the projected point, in meters.
    pub distance_along_m: f64,
}

/// Earth radius in meters (WGS84 mean).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Haversine distance between two points in meters.
pub fn haversine(a: &Point, b: &Point) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    // Rounding can push h a hair above 1 for antipodal points
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine(&w[0], &w[1]))
        .sum()
}

/// Project a position onto the nearest segment of a polyline.
///
/// Returns None if the polyline has fewer than 2 points.
pub fn project_on_polyline(position: &Point, polyline: &[Point]) -> Option<ProjectionResult> {
    if polyline.len() < 2 {
        return None;
    }

    let mut best: Option<ProjectionResult> = None;
    let mut cumulative_distance = 0.0;

    for (i, segment) in polyline.windows(2).enumerate() {
        let a = &segment[0];
        let b = &segment[1];

        let projected = project_on_segment(position, a, b);
        let dist = haversine(position, &projected);

        let is_better = match &best {
            Some(prev) => dist < prev.distance_m,
            None => true,
        };

        if is_better {
            best = Some(ProjectionResult {
                point: projected,
                segment_index: i,
                distance_m: dist,
                distance_along_m: cumulative_distance + haversine(a, &projected),
            });
        }

        cumulative_distance += haversine(a, b);
    }

    best
}

/// Minimum distance from a point to a polyline, in meters.
///
/// Measures against every segment, not only the vertices. A single-point
/// polyline degrades to point distance; an empty one yields None.
pub fn nearest_distance_to_polyline(point: &Point, polyline: &[Point]) -> Option<f64> {
    match polyline {
        [] => None,
        [only] => Some(haversine(point, only)),
        _ => project_on_polyline(point, polyline).map(|p| p.distance_m),
    }
}

/// Distance left along a polyline, in meters.
///
/// Sums segment lengths from the vertex nearest `from` to the end of the
/// polyline. Vertex granularity is intended: it matches how far the
/// remaining-distance readout jumps as a position passes each vertex.
pub fn remaining_distance_along_polyline(polyline: &[Point], from: &Point) -> f64 {
    let nearest = polyline
        .iter()
        .enumerate()
        .map(|(i, p)| (i, haversine(from, p)))
        .min_by(|a, b| a.1.total_cmp(&b.1));

    match nearest {
        Some((index, _)) => polyline_length(&polyline[index..]),
        None => 0.0,
    }
}

/// Project a point onto a line segment defined by two endpoints.
///
/// Uses a planar approximation scaled by latitude cosine, which is
/// accurate enough for short segments (< 10 km).
fn project_on_segment(p: &Point, a: &Point, b: &Point) -> Point {
    let cos_lat = ((a.lat + b.lat) / 2.0).to_radians().cos();

    let dx = (b.lon - a.lon) * cos_lat;
    let dy = b.lat - a.lat;
    let px = (p.lon - a.lon) * cos_lat;
    let py = p.lat - a.lat;

    let seg_len_sq = dx * dx + dy * dy;

    if seg_len_sq < 1e-20 {
        // Degenerate segment, return endpoint
        return *a;
    }

    // Clamp parameter t to [0, 1] to stay on the segment
    let t = ((px * dx + py * dy) / seg_len_sq).clamp(0.0, 1.0);

    Point {
        lat: a.lat + t * (b.lat - a.lat),
        lon: a.lon + t * (b.lon - a.lon),
    }
}
