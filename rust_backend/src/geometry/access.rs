//! The in-view predicate for one (satellite, sensor, AOI) triple.

use chrono::{DateTime, Utc};

use super::footprint::{boresight_ground_point, project_footprint};
use crate::error::SchedulerResult;
use crate::models::{AreaOfInterest, Satellite, Sensor, SensorView};
use crate::providers::{EphemerisProvider, SpacecraftState, SunElevationProvider};

/// Everything needed to decide whether a sensor sees an AOI at an instant.
///
/// A view passes when all of its gates pass: not filtered, footprint touches
/// the AOI, and the sun is high enough at the boresight ground point (when a
/// minimum is configured). The sensor sees the AOI if any of its views pass.
#[derive(Clone, Copy)]
pub struct AccessPredicate<'a> {
    pub satellite: &'a Satellite,
    pub sensor: &'a Sensor,
    pub aoi: &'a AreaOfInterest,
    pub ephemeris: &'a dyn EphemerisProvider,
    pub sun: &'a dyn SunElevationProvider,
}

impl<'a> AccessPredicate<'a> {
    /// Evaluate the predicate at `t`.
    pub fn in_view(&self, t: DateTime<Utc>) -> SchedulerResult<bool> {
        let state = self.ephemeris.state(&self.satellite.id, t)?;

        for view in &self.sensor.views {
            if self.view_passes(view, &state, t)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn view_passes(&self, view: &SensorView, state: &SpacecraftState, t: DateTime<Utc>) -> SchedulerResult<bool> {
        if view.filtered {
            return Ok(false);
        }

        let footprint = project_footprint(state, &self.sensor.id, &view.geometry)?;
        if !footprint.in_view(&self.aoi.polygon) {
            return Ok(false);
        }

        if let Some(min_elevation) = view.min_sun_elevation {
            // a boresight that misses the earth has no ground point to light
            let Some(ground) = boresight_ground_point(state, &view.geometry) else {
                return Ok(false);
            };
            if self.sun.sun_elevation(ground, t) < min_elevation {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
