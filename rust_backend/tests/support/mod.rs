#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::TAU;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use qtty::Degrees;

use satsched_rust::config::{RunSettings, SatelliteSettings, SchedulerConfig, SensorSettings};
use satsched_rust::error::{SchedulerError, SchedulerResult};
use satsched_rust::geometry::GeoPoint;
use satsched_rust::models::AreaOfInterest;
use satsched_rust::providers::{EphemerisProvider, SpacecraftState, SunElevationProvider};

pub const EARTH_RADIUS_M: f64 = 6_378_137.0;
pub const ALTITUDE_M: f64 = 600_000.0;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

pub fn at(secs: f64) -> DateTime<Utc> {
    t0() + TimeDelta::nanoseconds((secs * 1e9).round() as i64)
}

/// Circular orbit in the earth-fixed frame (no earth rotation), with the
/// body +Z axis on nadir and +X along the velocity.
///
/// The ascending node is crossed at `t0` and then once per period.
#[derive(Debug, Clone)]
pub struct CircularOrbit {
    pub radius_m: f64,
    pub inclination_deg: f64,
    pub period_secs: f64,
    /// Satellites this ephemeris answers for; empty means all.
    pub satellites: BTreeSet<String>,
}

impl CircularOrbit {
    pub fn equatorial(period_secs: f64) -> Self {
        Self {
            radius_m: EARTH_RADIUS_M + ALTITUDE_M,
            inclination_deg: 0.0,
            period_secs,
            satellites: BTreeSet::new(),
        }
    }

    pub fn inclined(inclination_deg: f64, period_secs: f64) -> Self {
        Self {
            inclination_deg,
            ..Self::equatorial(period_secs)
        }
    }

    pub fn only(mut self, satellite_id: &str) -> Self {
        self.satellites.insert(satellite_id.to_string());
        self
    }

    /// Degrees of argument of latitude swept per second.
    pub fn rate_deg_per_sec(&self) -> f64 {
        360.0 / self.period_secs
    }
}

impl EphemerisProvider for CircularOrbit {
    fn state(&self, satellite_id: &str, t: DateTime<Utc>) -> SchedulerResult<SpacecraftState> {
        if !self.satellites.is_empty() && !self.satellites.contains(satellite_id) {
            return Err(SchedulerError::Ephemeris {
                satellite_id: satellite_id.to_string(),
                message: "no ephemeris loaded".to_string(),
            });
        }
        let elapsed = (t - t0()).num_nanoseconds().unwrap_or(0) as f64 * 1e-9;
        let u = TAU * elapsed / self.period_secs;
        let inc = self.inclination_deg.to_radians();
        let r = self.radius_m;
        let speed = r * TAU / self.period_secs;

        let position = Vector3::new(r * u.cos(), r * u.sin() * inc.cos(), r * u.sin() * inc.sin());
        let velocity = Vector3::new(-u.sin(), u.cos() * inc.cos(), u.cos() * inc.sin()) * speed;
        Ok(SpacecraftState {
            position,
            velocity,
            attitude: nadir_attitude(&position, &velocity),
        })
    }
}

/// Spacecraft parked above a fixed ground point.
#[derive(Debug, Clone, Copy)]
pub struct Stationary {
    pub lon: f64,
    pub lat: f64,
}

impl EphemerisProvider for Stationary {
    fn state(&self, _satellite_id: &str, _t: DateTime<Utc>) -> SchedulerResult<SpacecraftState> {
        let (lon, lat) = (self.lon.to_radians(), self.lat.to_radians());
        let r = EARTH_RADIUS_M + ALTITUDE_M;
        let position = Vector3::new(r * lat.cos() * lon.cos(), r * lat.cos() * lon.sin(), r * lat.sin());
        // any direction perpendicular to the radius will do
        let velocity = Vector3::new(-lon.sin(), lon.cos(), 0.0) * 7_500.0;
        Ok(SpacecraftState {
            position,
            velocity,
            attitude: nadir_attitude(&position, &velocity),
        })
    }
}

pub fn nadir_attitude(position: &Vector3<f64>, velocity: &Vector3<f64>) -> UnitQuaternion<f64> {
    let z = -position.normalize();
    let y = z.cross(velocity).normalize();
    let x = y.cross(&z);
    let rotation = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[x, y, z]));
    UnitQuaternion::from_rotation_matrix(&rotation)
}

/// Same solar elevation everywhere, all the time.
#[derive(Debug, Clone, Copy)]
pub struct ConstantSun(pub f64);

impl SunElevationProvider for ConstantSun {
    fn sun_elevation(&self, _point: GeoPoint, _t: DateTime<Utc>) -> Degrees {
        Degrees::new(self.0)
    }
}

/// Square AOI centered on (`lon`, `lat`).
pub fn square_aoi(id: &str, lon: f64, lat: f64, half_deg: f64, priority: f64) -> AreaOfInterest {
    AreaOfInterest::from_lon_lat(
        id,
        &[
            [lon - half_deg, lat - half_deg],
            [lon + half_deg, lat - half_deg],
            [lon + half_deg, lat + half_deg],
            [lon - half_deg, lat + half_deg],
        ],
        priority,
    )
    .unwrap()
}

pub fn run_settings(duration_secs: f64, step_secs: f64, multithread: bool) -> RunSettings {
    let mut run = RunSettings::new(t0(), at(duration_secs), step_secs);
    run.multithread = multithread;
    run
}

pub fn config(run: RunSettings, satellites: &[(&str, Vec<SensorSettings>)]) -> SchedulerConfig {
    let satellites = satellites
        .iter()
        .map(|(id, sensors)| {
            (
                id.to_string(),
                SatelliteSettings {
                    sensors: sensors.clone(),
                    ..Default::default()
                },
            )
        })
        .collect::<BTreeMap<_, _>>();
    SchedulerConfig {
        run,
        satellites,
        score: Default::default(),
        optimizer: Default::default(),
    }
}

/// No revolution boundaries: the whole run is one revolution.
pub fn single_revolution() -> BTreeMap<String, Vec<DateTime<Utc>>> {
    BTreeMap::new()
}
