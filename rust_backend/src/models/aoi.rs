use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};
use crate::geometry::GeoPolygon;

/// Area of interest: an already buffered/simplified polygon with a priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaOfInterest {
    pub id: String,
    pub polygon: GeoPolygon,
    pub priority: f64,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub continent: Option<String>,
}

impl AreaOfInterest {
    /// Create an AOI, rejecting negative or non-finite priorities.
    pub fn new(id: impl Into<String>, polygon: GeoPolygon, priority: f64) -> SchedulerResult<Self> {
        let id = id.into();
        if !(priority.is_finite() && priority >= 0.0) {
            return Err(SchedulerError::configuration(format!(
                "AOI {} has invalid priority {}",
                id, priority
            )));
        }
        Ok(Self {
            id,
            polygon,
            priority,
            country: None,
            continent: None,
        })
    }

    /// Tag the AOI with the country and continent it lies in.
    pub fn with_location(mut self, country: Option<&str>, continent: Option<&str>) -> Self {
        self.country = country.map(str::to_string);
        self.continent = continent.map(str::to_string);
        self
    }

    /// Build an AOI from `[lon, lat]` pairs.
    pub fn from_lon_lat(id: impl Into<String>, coords: &[[f64; 2]], priority: f64) -> SchedulerResult<Self> {
        let id = id.into();
        let polygon = GeoPolygon::from_lon_lat(&id, coords)?;
        Self::new(id, polygon, priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_priority_rejected() {
        let square = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        assert!(AreaOfInterest::from_lon_lat("a", &square, -1.0).is_err());
        assert!(AreaOfInterest::from_lon_lat("a", &square, f64::NAN).is_err());
        assert!(AreaOfInterest::from_lon_lat("a", &square, 0.0).is_ok());
    }

    #[test]
    fn test_degenerate_polygon_is_geometry_error() {
        let err = AreaOfInterest::from_lon_lat("line", &[[0.0, 0.0], [1.0, 1.0]], 1.0).unwrap_err();
        assert!(matches!(err, SchedulerError::Geometry(_)));
    }
}
