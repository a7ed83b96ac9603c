//! Geodetic polygons and planar intersection tests in longitude/latitude
//! space.
//!
//! Longitudes are stored *unwrapped*: consecutive vertices never differ by
//! more than 180 degrees, so a ring crossing the antimeridian is continuous
//! (e.g. `170 .. 190` rather than `170 .. -170`). Tests against another shape
//! are repeated with that shape shifted by -360, 0 and +360 degrees.

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

const EPS: f64 = 1.0e-12;
const WRAP_SHIFTS: [f64; 3] = [0.0, -360.0, 360.0];
/// Distance an edge midpoint is moved inside its ring to test for shared area.
const INSET_DEG: f64 = 1.0e-7;

/// A point on the earth's surface, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    fn shifted(self, dlon: f64) -> Self {
        Self::new(self.lon + dlon, self.lat)
    }
}

/// Simple polygon with unwrapped longitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPolygon {
    vertices: Vec<GeoPoint>,
}

impl GeoPolygon {
    /// Build a polygon from an open or closed ring of vertices.
    ///
    /// # Arguments
    /// * `id` - Identifier used in error messages
    /// * `vertices` - Ring vertices in degrees; a repeated closing vertex is dropped
    ///
    /// # Returns
    /// * `Err(GeometryError::DegeneratePolygon)` for fewer than 3 vertices,
    ///   non-finite coordinates or zero area
    /// * `Err(GeometryError::Antimeridian)` when the ring cannot be made
    ///   continuous (it encircles a pole)
    pub fn new(id: &str, vertices: Vec<GeoPoint>) -> Result<Self, GeometryError> {
        let degenerate = |reason: &str| GeometryError::DegeneratePolygon {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        let mut ring = vertices;
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 {
            return Err(degenerate("fewer than 3 vertices"));
        }
        if ring
            .iter()
            .any(|p| !p.lon.is_finite() || !p.lat.is_finite() || p.lat.abs() > 90.0)
        {
            return Err(degenerate("non-finite or out-of-range coordinate"));
        }

        // unwrap longitudes so that successive vertices are continuous
        let mut unwrapped = Vec::with_capacity(ring.len());
        let mut prev = ring[0].lon;
        unwrapped.push(ring[0]);
        for p in &ring[1..] {
            let mut lon = p.lon;
            while lon - prev > 180.0 {
                lon -= 360.0;
            }
            while lon - prev < -180.0 {
                lon += 360.0;
            }
            unwrapped.push(GeoPoint::new(lon, p.lat));
            prev = lon;
        }

        // the closing edge must not need a wrap either
        let closing = unwrapped[0].lon - prev;
        if closing.abs() > 180.0 {
            let span = unwrapped.iter().map(|p| p.lon).fold(f64::MIN, f64::max)
                - unwrapped.iter().map(|p| p.lon).fold(f64::MAX, f64::min);
            return Err(GeometryError::Antimeridian {
                id: id.to_string(),
                span_deg: span,
            });
        }

        let polygon = Self {
            vertices: unwrapped,
        };
        if polygon.signed_area().abs() <= EPS {
            return Err(degenerate("zero area"));
        }
        Ok(polygon)
    }

    /// Convenience constructor from `[lon, lat]` pairs.
    pub fn from_lon_lat(id: &str, coords: &[[f64; 2]]) -> Result<Self, GeometryError> {
        Self::new(id, coords.iter().map(|c| GeoPoint::new(c[0], c[1])).collect())
    }

    pub fn vertices(&self) -> &[GeoPoint] {
        &self.vertices
    }

    /// Bounding box `(min_lon, min_lat, max_lon, max_lat)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.vertices.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(x0, y0, x1, y1), p| (x0.min(p.lon), y0.min(p.lat), x1.max(p.lon), y1.max(p.lat)),
        )
    }

    fn signed_area(&self) -> f64 {
        shoelace(&self.vertices)
    }

    fn edges(&self) -> impl Iterator<Item = (GeoPoint, GeoPoint)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    fn shifted(&self, dlon: f64) -> GeoPolygon {
        GeoPolygon {
            vertices: self.vertices.iter().map(|p| p.shifted(dlon)).collect(),
        }
    }

    /// Point-in-polygon containment, tolerant of longitude wrap.
    pub fn contains_point(&self, point: GeoPoint) -> bool {
        WRAP_SHIFTS
            .iter()
            .any(|&dlon| self.contains_planar(point.shifted(dlon)))
    }

    fn contains_planar(&self, p: GeoPoint) -> bool {
        let (x0, y0, x1, y1) = self.bounds();
        if p.lon < x0 - EPS || p.lon > x1 + EPS || p.lat < y0 - EPS || p.lat > y1 + EPS {
            return false;
        }

        let mut inside = false;
        for (a, b) in self.edges() {
            if on_segment(a, b, p) {
                return true;
            }
            if (a.lat > p.lat) != (b.lat > p.lat) {
                let x = a.lon + (p.lat - a.lat) * (b.lon - a.lon) / (b.lat - a.lat);
                if p.lon < x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Returns `true` when the two polygons share a region of positive area.
    ///
    /// Polygons that only touch along an edge or at a vertex do not
    /// intersect.
    pub fn intersects(&self, other: &GeoPolygon) -> bool {
        WRAP_SHIFTS
            .iter()
            .any(|&dlon| self.intersects_planar(&other.shifted(dlon)))
    }

    fn intersects_planar(&self, other: &GeoPolygon) -> bool {
        if !bounds_overlap(self.bounds(), other.bounds()) {
            return false;
        }
        let crossing = self
            .edges()
            .any(|(a, b)| other.edges().any(|(c, d)| segments_cross_properly(a, b, c, d)));

        // without a proper crossing the boundaries at most touch, so any
        // shared area holds an inset point of one ring
        crossing
            || other.inset_points().any(|p| self.strictly_contains(p))
            || self.inset_points().any(|p| other.strictly_contains(p))
    }

    fn strictly_contains(&self, p: GeoPoint) -> bool {
        self.contains_planar(p) && !self.edges().any(|(a, b)| on_segment(a, b, p))
    }

    /// Vertices, plus edge midpoints pushed just inside the ring.
    fn inset_points(&self) -> impl Iterator<Item = GeoPoint> + '_ {
        let inward = self.signed_area().signum();
        let midpoints = self.edges().filter_map(move |(a, b)| {
            let (dx, dy) = (b.lon - a.lon, b.lat - a.lat);
            let len = dx.hypot(dy);
            if len <= EPS {
                return None;
            }
            let step = INSET_DEG.min(len * 1.0e-3) * inward / len;
            Some(GeoPoint::new(
                (a.lon + b.lon) / 2.0 - dy * step,
                (a.lat + b.lat) / 2.0 + dx * step,
            ))
        });
        self.vertices.iter().copied().chain(midpoints)
    }

    /// Returns `true` when `other` lies entirely inside this polygon.
    pub fn contains_polygon(&self, other: &GeoPolygon) -> bool {
        WRAP_SHIFTS.iter().any(|&dlon| {
            let moved = other.shifted(dlon);
            moved.vertices.iter().all(|&p| self.contains_planar(p))
                && !self.edges().any(|(a, b)| {
                    moved
                        .edges()
                        .any(|(c, d)| segments_cross_properly(a, b, c, d))
                })
        })
    }
}

fn shoelace(ring: &[GeoPoint]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let a = ring[i];
            let b = ring[(i + 1) % n];
            a.lon * b.lat - b.lon * a.lat
        })
        .sum();
    twice / 2.0
}

fn bounds_overlap(a: (f64, f64, f64, f64), b: (f64, f64, f64, f64)) -> bool {
    a.0 <= b.2 + EPS && b.0 <= a.2 + EPS && a.1 <= b.3 + EPS && b.1 <= a.3 + EPS
}

/// z-component of (b - a) x (c - a)
fn cross(a: GeoPoint, b: GeoPoint, c: GeoPoint) -> f64 {
    (b.lon - a.lon) * (c.lat - a.lat) - (b.lat - a.lat) * (c.lon - a.lon)
}

fn on_segment(a: GeoPoint, b: GeoPoint, p: GeoPoint) -> bool {
    cross(a, b, p).abs() <= EPS
        && p.lon >= a.lon.min(b.lon) - EPS
        && p.lon <= a.lon.max(b.lon) + EPS
        && p.lat >= a.lat.min(b.lat) - EPS
        && p.lat <= a.lat.max(b.lat) + EPS
}

fn segments_cross_properly(a: GeoPoint, b: GeoPoint, c: GeoPoint, d: GeoPoint) -> bool {
    let d1 = cross(c, d, a);
    let d2 = cross(c, d, b);
    let d3 = cross(a, b, c);
    let d4 = cross(a, b, d);
    ((d1 > EPS && d2 < -EPS) || (d1 < -EPS && d2 > EPS))
        && ((d3 > EPS && d4 < -EPS) || (d3 < -EPS && d4 > EPS))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(id: &str, lon0: f64, lat0: f64, size: f64) -> GeoPolygon {
        GeoPolygon::from_lon_lat(
            id,
            &[
                [lon0, lat0],
                [lon0 + size, lat0],
                [lon0 + size, lat0 + size],
                [lon0, lat0 + size],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_degenerate_polygons_rejected() {
        assert!(GeoPolygon::from_lon_lat("a", &[[0.0, 0.0], [1.0, 1.0]]).is_err());
        assert!(GeoPolygon::from_lon_lat("b", &[[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]).is_err());
        assert!(GeoPolygon::from_lon_lat("c", &[[0.0, 0.0], [1.0, 0.0], [f64::NAN, 1.0]]).is_err());
    }

    #[test]
    fn test_closing_vertex_dropped() {
        let p = GeoPolygon::from_lon_lat(
            "closed",
            &[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]],
        )
        .unwrap();
        assert_eq!(p.vertices().len(), 3);
    }

    #[test]
    fn test_contains_point() {
        let sq = square("sq", 10.0, 10.0, 5.0);
        assert!(sq.contains_point(GeoPoint::new(12.0, 12.0)));
        assert!(sq.contains_point(GeoPoint::new(10.0, 12.0)));
        assert!(!sq.contains_point(GeoPoint::new(16.0, 12.0)));
    }

    #[test]
    fn test_antimeridian_polygon_is_unwrapped() {
        let p = GeoPolygon::from_lon_lat(
            "fiji",
            &[[178.0, -20.0], [-178.0, -20.0], [-178.0, -15.0], [178.0, -15.0]],
        )
        .unwrap();
        let (x0, _, x1, _) = p.bounds();
        assert!((x1 - x0 - 4.0).abs() < 1e-9);
        assert!(p.contains_point(GeoPoint::new(179.5, -17.0)));
        assert!(p.contains_point(GeoPoint::new(-179.5, -17.0)));
        assert!(!p.contains_point(GeoPoint::new(0.0, -17.0)));
    }

    #[test]
    fn test_intersects_across_antimeridian() {
        let east = square("east", 179.0, 0.0, 0.5);
        let west = GeoPolygon::from_lon_lat(
            "west",
            &[[-179.8, 0.1], [-179.0, 0.1], [-179.0, 0.4], [-179.8, 0.4]],
        )
        .unwrap();
        let straddle = GeoPolygon::from_lon_lat(
            "straddle",
            &[[179.4, 0.1], [-179.5, 0.1], [-179.5, 0.4], [179.4, 0.4]],
        )
        .unwrap();
        assert!(!east.intersects(&west));
        assert!(straddle.intersects(&east));
        assert!(straddle.intersects(&west));
    }

    #[test]
    fn test_intersects_and_containment() {
        let big = square("big", 0.0, 0.0, 10.0);
        let inner = square("inner", 2.0, 2.0, 1.0);
        let partial = square("partial", 8.0, 8.0, 5.0);
        let far = square("far", 30.0, 30.0, 1.0);

        assert!(big.intersects(&inner));
        assert!(inner.intersects(&big));
        assert!(big.intersects(&partial));
        assert!(!big.intersects(&far));

        assert!(big.contains_polygon(&inner));
        assert!(!big.contains_polygon(&partial));
    }

    #[test]
    fn test_touching_polygons_do_not_intersect() {
        let left = square("left", 0.0, 0.0, 1.0);
        let right = square("right", 1.0, 0.0, 1.0);
        let corner = square("corner", 1.0, 1.0, 1.0);
        assert!(!left.intersects(&right));
        assert!(!right.intersects(&left));
        assert!(!left.intersects(&corner));

        // a sliver of overlap counts
        let shifted = square("shifted", 0.999, 0.0, 1.0);
        assert!(left.intersects(&shifted));
    }

    #[test]
    fn test_shared_edges_with_common_area_intersect() {
        let outer = square("outer", 0.0, 0.0, 2.0);
        let same = square("same", 0.0, 0.0, 2.0);
        let corner = square("corner", 0.0, 0.0, 1.0);
        let l_shape = GeoPolygon::from_lon_lat(
            "l",
            &[[0.0, 0.0], [2.0, 0.0], [2.0, 1.0], [1.0, 1.0], [1.0, 2.0], [0.0, 2.0]],
        )
        .unwrap();
        let notch = square("notch", 1.0, 1.0, 1.0);

        assert!(outer.intersects(&same));
        assert!(outer.intersects(&corner));
        assert!(corner.intersects(&outer));
        assert!(l_shape.intersects(&corner));
        // fills the missing quadrant, touching along two edges
        assert!(!l_shape.intersects(&notch));
    }
}
