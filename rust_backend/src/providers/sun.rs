//! Low-precision solar ephemeris.
//!
//! Uses the almanac approximation of the sun's ecliptic longitude (accurate
//! to about 0.01 degree between 1950 and 2050) and the mean sidereal time to
//! get the local hour angle. Good enough for illumination gating.

use chrono::{DateTime, Utc};
use qtty::Degrees;

use super::SunElevationProvider;
use crate::geometry::GeoPoint;

const J2000_JD: f64 = 2_451_545.0;
const UNIX_EPOCH_JD: f64 = 2_440_587.5;

/// Built-in [`SunElevationProvider`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LowPrecisionSun;

impl LowPrecisionSun {
    /// Sun right ascension and declination in degrees.
    pub fn equatorial(t: DateTime<Utc>) -> (f64, f64) {
        let n = days_since_j2000(t);
        let mean_lon = (280.460 + 0.985_647_4 * n).rem_euclid(360.0);
        let anomaly = (357.528 + 0.985_600_3 * n).rem_euclid(360.0).to_radians();
        let ecl_lon =
            (mean_lon + 1.915 * anomaly.sin() + 0.020 * (2.0 * anomaly).sin()).to_radians();
        let obliquity = (23.439 - 0.000_000_4 * n).to_radians();

        let ra = (obliquity.cos() * ecl_lon.sin()).atan2(ecl_lon.cos());
        let dec = (obliquity.sin() * ecl_lon.sin()).asin();
        (ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
    }
}

impl SunElevationProvider for LowPrecisionSun {
    fn sun_elevation(&self, point: GeoPoint, t: DateTime<Utc>) -> Degrees {
        let (ra, dec) = Self::equatorial(t);
        let gmst = (280.460_618_37 + 360.985_647_366_29 * days_since_j2000(t)).rem_euclid(360.0);
        let hour_angle = (gmst + point.lon - ra).to_radians();

        let (sin_lat, cos_lat) = point.lat.to_radians().sin_cos();
        let (sin_dec, cos_dec) = dec.to_radians().sin_cos();
        let sin_elev = sin_lat * sin_dec + cos_lat * cos_dec * hour_angle.cos();

        Degrees::new(sin_elev.clamp(-1.0, 1.0).asin().to_degrees())
    }
}

fn days_since_j2000(t: DateTime<Utc>) -> f64 {
    let secs = t.timestamp() as f64 + t.timestamp_subsec_nanos() as f64 * 1.0e-9;
    secs / 86_400.0 + UNIX_EPOCH_JD - J2000_JD
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_equinox_declination_near_zero() {
        let t = Utc.with_ymd_and_hms(2024, 3, 20, 3, 6, 0).unwrap();
        let (_, dec) = LowPrecisionSun::equatorial(t);
        assert!(dec.abs() < 0.1, "dec = {}", dec);
    }

    #[test]
    fn test_solstice_declination() {
        let t = Utc.with_ymd_and_hms(2024, 6, 20, 20, 51, 0).unwrap();
        let (_, dec) = LowPrecisionSun::equatorial(t);
        assert!((dec - 23.44).abs() < 0.05, "dec = {}", dec);
    }

    #[test]
    fn test_noon_and_midnight_at_greenwich() {
        let sun = LowPrecisionSun;
        let greenwich = GeoPoint::new(0.0, 0.0);
        let noon = Utc.with_ymd_and_hms(2024, 3, 20, 12, 7, 0).unwrap();
        let midnight = Utc.with_ymd_and_hms(2024, 3, 20, 0, 7, 0).unwrap();

        assert!(sun.sun_elevation(greenwich, noon).value() > 85.0);
        assert!(sun.sun_elevation(greenwich, midnight).value() < -85.0);
    }
}
