//! Collaborator interfaces the scheduling core depends on.
//!
//! The core never propagates orbits or computes frames itself. It asks an
//! [`EphemerisProvider`] for spacecraft state, a [`SunElevationProvider`] for
//! solar elevation and a [`RevolutionEvents`] source for revolution
//! boundaries. All three are read-only and shared across worker threads.

pub mod revolutions;
pub mod sun;

use chrono::{DateTime, Utc};
use nalgebra::{UnitQuaternion, Vector3};
use qtty::Degrees;

use crate::config::RevBoundary;
use crate::error::SchedulerResult;
use crate::geometry::GeoPoint;
use crate::time::TimeInterval;

pub use revolutions::EphemerisRevolutionEvents;
pub use sun::LowPrecisionSun;

/// Spacecraft state in the earth-centered, earth-fixed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpacecraftState {
    /// Position in meters.
    pub position: Vector3<f64>,
    /// Velocity in meters per second.
    pub velocity: Vector3<f64>,
    /// Rotation from the body frame to ECEF.
    pub attitude: UnitQuaternion<f64>,
}

/// Source of spacecraft state.
///
/// Must answer at arbitrary instants inside the run window, including the
/// off-grid instants used during edge refinement.
pub trait EphemerisProvider: Send + Sync {
    fn state(&self, satellite_id: &str, t: DateTime<Utc>) -> SchedulerResult<SpacecraftState>;
}

/// Source of solar elevation above the local horizon.
pub trait SunElevationProvider: Send + Sync {
    fn sun_elevation(&self, point: GeoPoint, t: DateTime<Utc>) -> Degrees;
}

/// Source of revolution-boundary instants.
pub trait RevolutionEvents: Send + Sync {
    /// Ordered boundary instants of the requested kind inside `window`.
    fn boundaries(
        &self,
        satellite_id: &str,
        kind: RevBoundary,
        window: &TimeInterval,
    ) -> SchedulerResult<Vec<DateTime<Utc>>>;
}

/// Fixed, precomputed boundary instants per satellite.
impl RevolutionEvents for std::collections::BTreeMap<String, Vec<DateTime<Utc>>> {
    fn boundaries(
        &self,
        satellite_id: &str,
        _kind: RevBoundary,
        _window: &TimeInterval,
    ) -> SchedulerResult<Vec<DateTime<Utc>>> {
        Ok(self.get(satellite_id).cloned().unwrap_or_default())
    }
}
