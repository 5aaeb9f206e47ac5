//! Coordinate helpers shared by the graph store and the location index

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

/// Fixed-point scale for stored coordinates (1e-7 degrees)
pub const COORD_SCALE: f64 = 1e7;

const EARTH_RADIUS_M: f64 = 6_371_008.8;

pub fn to_fixed(deg: f64) -> i32 {
    (deg * COORD_SCALE).round() as i32
}

pub fn from_fixed(v: i32) -> f64 {
    v as f64 / COORD_SCALE
}

/// Great-circle distance in meters
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    Haversine::distance(Point::new(lon1, lat1), Point::new(lon2, lat2))
}

/// Meters per degree of latitude
pub fn meters_per_degree_lat() -> f64 {
    EARTH_RADIUS_M * std::f64::consts::PI / 180.0
}

/// Meters per degree of longitude at the given latitude
pub fn meters_per_degree_lon(lat: f64) -> f64 {
    meters_per_degree_lat() * lat.to_radians().cos().max(1e-6)
}

/// Axis-aligned box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// An inverted box that any `extend` call replaces
    pub fn empty() -> Self {
        Self::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN)
    }

    pub fn is_empty(&self) -> bool {
        self.min_lat > self.max_lat || self.min_lon > self.max_lon
    }

    pub fn extend(&mut self, lat: f64, lon: f64) {
        self.min_lat = self.min_lat.min(lat);
        self.min_lon = self.min_lon.min(lon);
        self.max_lat = self.max_lat.max(lat);
        self.max_lon = self.max_lon.max(lon);
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        !(other.min_lat > self.max_lat
            || other.max_lat < self.min_lat
            || other.min_lon > self.max_lon
            || other.max_lon < self.min_lon)
    }

    /// Box around a point reaching `radius_m` in every direction
    pub fn around(lat: f64, lon: f64, radius_m: f64) -> Self {
        let dlat = radius_m / meters_per_degree_lat();
        let dlon = radius_m / meters_per_degree_lon(lat);
        Self::new(lat - dlat, lon - dlon, lat + dlat, lon + dlon)
    }

    /// East-west extent in meters, measured at the box center
    pub fn width_m(&self) -> f64 {
        let mid = (self.min_lat + self.max_lat) / 2.0;
        (self.max_lon - self.min_lon) * meters_per_degree_lon(mid)
    }

    pub fn height_m(&self) -> f64 {
        (self.max_lat - self.min_lat) * meters_per_degree_lat()
    }

    /// Quadrants in the order SW, SE, NW, NE
    pub fn quadrants(&self) -> [BBox; 4] {
        let mid_lat = (self.min_lat + self.max_lat) / 2.0;
        let mid_lon = (self.min_lon + self.max_lon) / 2.0;
        [
            BBox::new(self.min_lat, self.min_lon, mid_lat, mid_lon),
            BBox::new(self.min_lat, mid_lon, mid_lat, self.max_lon),
            BBox::new(mid_lat, self.min_lon, self.max_lat, mid_lon),
            BBox::new(mid_lat, mid_lon, self.max_lat, self.max_lon),
        ]
    }
}

/// Closest point on segment a-b to p, using an equirectangular projection
/// centered on p. Returns the point and the position along the segment in [0, 1].
pub fn closest_on_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> ((f64, f64), f64) {
    let kx = meters_per_degree_lon(p.0);
    let ky = meters_per_degree_lat();
    let ax = (a.1 - p.1) * kx;
    let ay = (a.0 - p.0) * ky;
    let bx = (b.1 - p.1) * kx;
    let by = (b.0 - p.0) * ky;
    let dx = bx - ax;
    let dy = by - ay;
    let len2 = dx * dx + dy * dy;
    if len2 <= f64::EPSILON {
        return (a, 0.0);
    }
    let t = (-(ax * dx + ay * dy) / len2).clamp(0.0, 1.0);
    ((a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t), t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_one_degree_lat() {
        let d = haversine_m(50.0, 4.0, 51.0, 4.0);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn test_fixed_roundtrip_precision() {
        let v = 50.846_781_2;
        assert!((from_fixed(to_fixed(v)) - v).abs() < 1e-7);
    }

    #[test]
    fn test_closest_on_segment_interior_and_clamped() {
        let (pt, t) = closest_on_segment((0.001, 0.5), (0.0, 0.0), (0.0, 1.0));
        assert!((t - 0.5).abs() < 1e-9);
        assert!(pt.0.abs() < 1e-12);

        let (pt, t) = closest_on_segment((0.0, -1.0), (0.0, 0.0), (0.0, 1.0));
        assert_eq!(t, 0.0);
        assert_eq!(pt, (0.0, 0.0));
    }

    #[test]
    fn test_bbox_quadrants_cover_box() {
        let b = BBox::new(0.0, 0.0, 2.0, 2.0);
        let q = b.quadrants();
        assert!(q[0].contains(0.5, 0.5));
        assert!(q[1].contains(0.5, 1.5));
        assert!(q[2].contains(1.5, 0.5));
        assert!(q[3].contains(1.5, 1.5));
        assert!(q.iter().all(|c| c.intersects(&b)));
    }
}
