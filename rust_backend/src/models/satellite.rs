//! Satellites and their sensors, resolved from configuration.

use nalgebra::{Matrix3, Vector3};
use qtty::{Degrees, Meters, Seconds};

use crate::config::{CameraSettings, FrameSettings, RevBoundary, SatelliteSettings, SensorSettings};
use crate::error::{SchedulerError, SchedulerResult};

/// A satellite with its sensors, immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct Satellite {
    pub id: String,
    pub name: String,
    pub rev_boundary: RevBoundary,
    pub sensors: Vec<Sensor>,
}

/// A physical sensor.
///
/// Sensor entries sharing an id in the configuration describe the same
/// physical sensor and become one `Sensor` with several views. The views
/// share one duty-cycle budget and one timeline.
#[derive(Debug, Clone)]
pub struct Sensor {
    pub id: String,
    pub duty_cycle: f64,
    pub max_dwell: Option<Seconds>,
    pub views: Vec<SensorView>,
}

/// One viewing geometry of a sensor plus its gating settings.
#[derive(Debug, Clone)]
pub struct SensorView {
    pub geometry: SensorGeometry,
    pub min_sun_elevation: Option<Degrees>,
    pub filtered: bool,
}

#[derive(Debug, Clone)]
pub enum SensorGeometry {
    /// Footprint reduced to the sub-satellite point.
    Nadir,
    Camera(CameraGeometry),
}

/// Double-dihedral field of view around the sensor +Z axis.
#[derive(Debug, Clone)]
pub struct CameraGeometry {
    /// Half-angle along sensor +X.
    pub half_angle_x: Degrees,
    /// Half-angle along sensor +Y.
    pub half_angle_y: Degrees,
    /// Columns are the sensor axes expressed in the body frame.
    pub sensor_to_body: Matrix3<f64>,
}

impl Satellite {
    /// Resolve a configured satellite.
    ///
    /// # Arguments
    /// * `id` - Satellite id (the configuration table key)
    /// * `settings` - Validated satellite settings
    pub fn from_settings(id: &str, settings: &SatelliteSettings) -> SchedulerResult<Self> {
        let mut sensors: Vec<Sensor> = Vec::new();

        for entry in &settings.sensors {
            let view = SensorView::from_settings(id, entry)?;
            let max_dwell = entry.max_dwell_secs.map(Seconds::new);

            match sensors.iter_mut().find(|s| s.id == entry.id) {
                Some(sensor) => {
                    sensor.views.push(view);
                    sensor.max_dwell = match (sensor.max_dwell, max_dwell) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => a.or(b),
                    };
                }
                None => sensors.push(Sensor {
                    id: entry.id.clone(),
                    duty_cycle: entry.duty_cycle,
                    max_dwell,
                    views: vec![view],
                }),
            }
        }

        Ok(Self {
            id: id.to_string(),
            name: settings.name.clone().unwrap_or_else(|| id.to_string()),
            rev_boundary: settings.rev_boundary,
            sensors,
        })
    }

    pub fn sensor(&self, sensor_id: &str) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.id == sensor_id)
    }
}

impl Sensor {
    /// Returns `true` when every view of the sensor is filtered out.
    pub fn is_filtered(&self) -> bool {
        self.views.iter().all(|v| v.filtered)
    }
}

impl SensorView {
    fn from_settings(sat_id: &str, settings: &SensorSettings) -> SchedulerResult<Self> {
        let geometry = match (&settings.camera, settings.use_nadir_pointing) {
            (_, true) => SensorGeometry::Nadir,
            (Some(camera), false) => SensorGeometry::Camera(CameraGeometry::from_settings(
                camera,
                settings.frame.as_ref(),
            )
            .map_err(|e| {
                SchedulerError::configuration(format!(
                    "satellite {} sensor {}: {}",
                    sat_id, settings.id, e
                ))
            })?),
            (None, false) => {
                return Err(SchedulerError::configuration(format!(
                    "satellite {} sensor {}: no camera geometry",
                    sat_id, settings.id
                )))
            }
        };

        Ok(Self {
            geometry,
            min_sun_elevation: settings.min_sun_elevation_deg.map(Degrees::new),
            filtered: settings.filter,
        })
    }
}

impl CameraGeometry {
    /// Build the field of view from focal-plane settings.
    ///
    /// The half-angle along the row axis is `atan(rows * pitch / (2 * focal))`
    /// and likewise for columns; `rows_along_x` picks which sensor axis the
    /// rows run along.
    pub fn from_settings(camera: &CameraSettings, frame: Option<&FrameSettings>) -> Result<Self, String> {
        let focal = Meters::new(camera.focal_length_m);
        let pitch = Meters::new(camera.pitch_m);

        let half = |pixels: u32| -> Degrees {
            let extent = pitch * (pixels as f64 / 2.0);
            Degrees::new((extent.value() / focal.value()).atan().to_degrees())
        };
        let along_rows = half(camera.rows);
        let along_cols = half(camera.cols);

        let (half_angle_x, half_angle_y) = if camera.rows_along_x {
            (along_rows, along_cols)
        } else {
            (along_cols, along_rows)
        };

        let sensor_to_body = match frame {
            Some(frame) => frame_rotation(frame)?,
            None => Matrix3::identity(),
        };

        Ok(Self {
            half_angle_x,
            half_angle_y,
            sensor_to_body,
        })
    }

    /// Boresight (sensor +Z) in the body frame.
    pub fn boresight(&self) -> Vector3<f64> {
        self.sensor_to_body.column(2).into_owned()
    }

    /// Corner ray directions in the body frame, in ring order.
    pub fn corner_directions(&self) -> [Vector3<f64>; 4] {
        let tx = self.half_angle_x.tan();
        let ty = self.half_angle_y.tan();
        [(1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)]
            .map(|(sx, sy)| self.sensor_to_body * Vector3::new(sx * tx, sy * ty, 1.0))
    }
}

/// Orthonormal sensor-to-body rotation from any configured subset of axes.
fn frame_rotation(frame: &FrameSettings) -> Result<Matrix3<f64>, String> {
    let unit = |axis: Option<[f64; 3]>, name: &str| -> Result<Option<Vector3<f64>>, String> {
        match axis {
            None => Ok(None),
            Some(v) => Vector3::from(v)
                .try_normalize(1.0e-12)
                .map(Some)
                .ok_or_else(|| format!("frame axis {} has zero length", name)),
        }
    };
    let x = unit(frame.x, "x")?;
    let y = unit(frame.y, "y")?;
    let z = unit(frame.z, "z")?;

    let perpendicular = |a: &Vector3<f64>, b: &Vector3<f64>, name: &str| {
        a.cross(b)
            .try_normalize(1.0e-9)
            .ok_or_else(|| format!("frame axes are parallel ({})", name))
    };

    let (x, y, z) = match (x, y, z) {
        (None, None, None) => return Ok(Matrix3::identity()),
        (Some(x), _, Some(z)) => {
            let y = perpendicular(&z, &x, "z, x")?;
            (y.cross(&z), y, z)
        }
        (_, Some(y), Some(z)) => {
            let x = perpendicular(&y, &z, "y, z")?;
            (x, z.cross(&x), z)
        }
        (Some(x), Some(y), None) => {
            let z = perpendicular(&x, &y, "x, y")?;
            (x, z.cross(&x), z)
        }
        (None, None, Some(z)) => {
            // any x perpendicular to the boresight
            let reference = if z.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
            let y = perpendicular(&z, &reference, "z")?;
            (y.cross(&z), y, z)
        }
        _ => return Err("frame needs the z axis or both x and y".to_string()),
    };

    Ok(Matrix3::from_columns(&[x, y, z]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> CameraSettings {
        CameraSettings {
            focal_length_m: 1.0,
            pitch_m: 1.0e-5,
            rows: 2000,
            cols: 1000,
            rows_along_x: true,
        }
    }

    #[test]
    fn test_camera_half_angles() {
        let geom = CameraGeometry::from_settings(&camera(), None).unwrap();
        assert!((geom.half_angle_x.value() - 0.01f64.atan().to_degrees()).abs() < 1e-12);
        assert!((geom.half_angle_y.value() - 0.005f64.atan().to_degrees()).abs() < 1e-12);

        let mut swapped = camera();
        swapped.rows_along_x = false;
        let geom = CameraGeometry::from_settings(&swapped, None).unwrap();
        assert!(geom.half_angle_x < geom.half_angle_y);
    }

    #[test]
    fn test_frame_rotation_is_orthonormal() {
        let frame = FrameSettings {
            x: Some([1.0, 0.1, 0.0]),
            y: None,
            z: Some([0.0, 0.0, 2.0]),
        };
        let r = frame_rotation(&frame).unwrap();
        let should_be_identity = r.transpose() * r;
        assert!((should_be_identity - Matrix3::identity()).norm() < 1e-12);
        assert!((r.column(2) - Vector3::z()).norm() < 1e-12);
    }

    #[test]
    fn test_parallel_frame_axes_rejected() {
        let frame = FrameSettings {
            x: Some([0.0, 0.0, 1.0]),
            y: None,
            z: Some([0.0, 0.0, 1.0]),
        };
        assert!(frame_rotation(&frame).is_err());
    }

    #[test]
    fn test_duplicate_ids_form_one_sensor() {
        let mut a = SensorSettings::nadir("cam", 0.2);
        a.max_dwell_secs = Some(60.0);
        let mut b = SensorSettings::nadir("cam", 0.2);
        b.max_dwell_secs = Some(30.0);
        let c = SensorSettings::nadir("other", 0.5);

        let settings = SatelliteSettings {
            sensors: vec![a, b, c],
            ..Default::default()
        };
        let sat = Satellite::from_settings("sat", &settings).unwrap();
        assert_eq!(sat.sensors.len(), 2);
        assert_eq!(sat.sensors[0].views.len(), 2);
        assert_eq!(sat.sensors[0].max_dwell.map(|d| d.value()), Some(30.0));
        assert_eq!(sat.name, "sat");
    }

    #[test]
    fn test_filtered_sensor() {
        let mut s = SensorSettings::nadir("cam", 0.2);
        s.filter = true;
        let settings = SatelliteSettings {
            sensors: vec![s],
            ..Default::default()
        };
        let sat = Satellite::from_settings("sat", &settings).unwrap();
        assert!(sat.sensor("cam").unwrap().is_filtered());
    }
}
