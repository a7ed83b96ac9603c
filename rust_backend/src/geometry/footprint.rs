//! Sensor footprint projection onto the WGS-84 ellipsoid.

use nalgebra::Vector3;

use super::ellipsoid::{ecef_to_geodetic, ray_intersection};
use super::polygon::{GeoPoint, GeoPolygon};
use crate::error::GeometryError;
use crate::models::SensorGeometry;
use crate::providers::SpacecraftState;

/// Instantaneous ground footprint of a sensor.
#[derive(Debug, Clone, PartialEq)]
pub enum Footprint {
    /// Nadir-pointing sensors see the sub-satellite point only.
    Point(GeoPoint),
    Polygon(GeoPolygon),
}

impl Footprint {
    /// Returns `true` if the footprint overlaps the AOI polygon.
    pub fn in_view(&self, aoi: &GeoPolygon) -> bool {
        match self {
            Footprint::Point(point) => aoi.contains_point(*point),
            Footprint::Polygon(polygon) => aoi.intersects(polygon),
        }
    }
}

/// Project a sensor's field of view onto the earth.
///
/// # Arguments
/// * `state` - Spacecraft state at the evaluation instant
/// * `sensor_id` - Used in error reports
/// * `geometry` - Nadir or camera geometry of the sensor view
///
/// # Returns
/// * `Err(GeometryError::PositionBelowSurface)` if the spacecraft is not above the ellipsoid
/// * `Err(GeometryError::FootprintOffEarth)` if any corner ray misses the earth
pub fn project_footprint(
    state: &SpacecraftState,
    sensor_id: &str,
    geometry: &SensorGeometry,
) -> Result<Footprint, GeometryError> {
    let (sub_point, height) = ecef_to_geodetic(&state.position);
    if height <= 0.0 {
        return Err(GeometryError::PositionBelowSurface);
    }

    match geometry {
        SensorGeometry::Nadir => Ok(Footprint::Point(sub_point)),
        SensorGeometry::Camera(camera) => {
            let corners = camera
                .corner_directions()
                .iter()
                .map(|dir| ground_point(state, dir))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| GeometryError::FootprintOffEarth {
                    sensor_id: sensor_id.to_string(),
                })?;

            let polygon = GeoPolygon::new(sensor_id, corners)?;
            Ok(Footprint::Polygon(polygon))
        }
    }
}

/// Ground point hit by the sensor boresight, if it intersects the earth.
pub fn boresight_ground_point(state: &SpacecraftState, geometry: &SensorGeometry) -> Option<GeoPoint> {
    match geometry {
        SensorGeometry::Nadir => {
            let (point, height) = ecef_to_geodetic(&state.position);
            (height > 0.0).then_some(point)
        }
        SensorGeometry::Camera(camera) => ground_point(state, &camera.boresight()),
    }
}

/// Intersect a body-frame direction with the ellipsoid.
fn ground_point(state: &SpacecraftState, body_direction: &Vector3<f64>) -> Option<GeoPoint> {
    let direction = state.attitude * body_direction;
    ray_intersection(&state.position, &direction).map(|hit| ecef_to_geodetic(&hit).0)
}
