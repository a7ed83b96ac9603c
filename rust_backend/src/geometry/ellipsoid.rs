//! WGS-84 ellipsoid helpers: geodetic conversions and ray intersection.

use nalgebra::Vector3;

use super::polygon::GeoPoint;

/// Semi-major axis in meters.
pub const WGS84_A: f64 = 6_378_137.0;
/// Flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// Semi-minor axis in meters.
pub const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);

const E2: f64 = WGS84_F * (2.0 - WGS84_F);

/// ECEF position (meters) of a geodetic point at `height` meters.
pub fn geodetic_to_ecef(point: GeoPoint, height: f64) -> Vector3<f64> {
    let (sin_lat, cos_lat) = point.lat.to_radians().sin_cos();
    let (sin_lon, cos_lon) = point.lon.to_radians().sin_cos();
    let n = WGS84_A / (1.0 - E2 * sin_lat * sin_lat).sqrt();

    Vector3::new(
        (n + height) * cos_lat * cos_lon,
        (n + height) * cos_lat * sin_lon,
        (n * (1.0 - E2) + height) * sin_lat,
    )
}

/// Geodetic point and height (meters) of an ECEF position.
///
/// Uses Bowring's parametric latitude as the starting value followed by a
/// few fixed-point iterations, which converges to well below a millimeter
/// for any position outside the earth's core.
pub fn ecef_to_geodetic(position: &Vector3<f64>) -> (GeoPoint, f64) {
    let (x, y, z) = (position.x, position.y, position.z);
    let lon = y.atan2(x);
    let p = (x * x + y * y).sqrt();

    if p < 1.0e-9 {
        // on the polar axis
        let lat = if z >= 0.0 { 90.0 } else { -90.0 };
        return (GeoPoint::new(lon.to_degrees(), lat), z.abs() - WGS84_B);
    }

    let ep2 = (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);
    let beta = (WGS84_A * z).atan2(WGS84_B * p);
    let mut lat = (z + ep2 * WGS84_B * beta.sin().powi(3))
        .atan2(p - E2 * WGS84_A * beta.cos().powi(3));

    let mut height = 0.0;
    for _ in 0..5 {
        let sin_lat = lat.sin();
        let n = WGS84_A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
        height = p / lat.cos() - n;
        lat = (z / p / (1.0 - E2 * n / (n + height))).atan();
    }

    (GeoPoint::new(lon.to_degrees(), lat.to_degrees()), height)
}

/// Unit normal to the ellipsoid (local "up") at a geodetic point.
pub fn local_up(point: GeoPoint) -> Vector3<f64> {
    let (sin_lat, cos_lat) = point.lat.to_radians().sin_cos();
    let (sin_lon, cos_lon) = point.lon.to_radians().sin_cos();
    Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
}

/// First intersection of the ray `origin + t * direction` (`t > 0`) with the
/// ellipsoid surface.
///
/// Returns `None` if the ray misses the earth or points away from it.
pub fn ray_intersection(origin: &Vector3<f64>, direction: &Vector3<f64>) -> Option<Vector3<f64>> {
    // scale to the unit sphere
    let scale = Vector3::new(1.0 / WGS84_A, 1.0 / WGS84_A, 1.0 / WGS84_B);
    let o = origin.component_mul(&scale);
    let d = direction.component_mul(&scale);

    let a = d.dot(&d);
    let b = 2.0 * o.dot(&d);
    let c = o.dot(&o) - 1.0;
    if a <= 0.0 {
        return None;
    }

    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    let t_near = (-b - sqrt_disc) / (2.0 * a);
    let t_far = (-b + sqrt_disc) / (2.0 * a);

    let t = if t_near > 0.0 {
        t_near
    } else if t_far > 0.0 {
        t_far
    } else {
        return None;
    };

    Some(origin + direction * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geodetic_round_trip_at_altitude() {
        let point = GeoPoint::new(-73.5, 45.25);
        let ecef = geodetic_to_ecef(point, 700_000.0);
        let (back, h) = ecef_to_geodetic(&ecef);
        assert!((back.lon - point.lon).abs() < 1e-9);
        assert!((back.lat - point.lat).abs() < 1e-9);
        assert!((h - 700_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_equator_and_pole() {
        let eq = geodetic_to_ecef(GeoPoint::new(0.0, 0.0), 0.0);
        assert!((eq.x - WGS84_A).abs() < 1e-6);

        let (pole, h) = ecef_to_geodetic(&Vector3::new(0.0, 0.0, WGS84_B + 100.0));
        assert_eq!(pole.lat, 90.0);
        assert!((h - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_nadir_ray_hits_sub_satellite_point() {
        let sub = GeoPoint::new(10.0, 0.0);
        let sat = geodetic_to_ecef(sub, 500_000.0);
        let hit = ray_intersection(&sat, &(-sat)).unwrap();
        let (ground, h) = ecef_to_geodetic(&hit);
        assert!((ground.lon - 10.0).abs() < 1e-9);
        assert!(ground.lat.abs() < 1e-9);
        assert!(h.abs() < 1e-3);
    }

    #[test]
    fn test_ray_pointing_away_misses() {
        let sat = geodetic_to_ecef(GeoPoint::new(0.0, 0.0), 500_000.0);
        assert!(ray_intersection(&sat, &sat).is_none());
        // tangent-ish ray well above the limb
        assert!(ray_intersection(&sat, &Vector3::new(0.0, 0.0, 1.0)).is_none());
    }
}
