//! Records flowing between the sampler, the scorer and the scheduler.

use std::fmt;

use qtty::Seconds;
use serde::{Deserialize, Serialize};

use crate::time::TimeInterval;

/// One revolution of a satellite, the duty-cycle accounting unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrbitRevolution {
    pub index: usize,
    pub interval: TimeInterval,
}

/// Identifies one (satellite, sensor, AOI) combination.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TripleKey {
    pub satellite_id: String,
    pub sensor_id: String,
    pub aoi_id: String,
}

impl TripleKey {
    pub fn new(satellite_id: &str, sensor_id: &str, aoi_id: &str) -> Self {
        Self {
            satellite_id: satellite_id.to_string(),
            sensor_id: sensor_id.to_string(),
            aoi_id: aoi_id.to_string(),
        }
    }
}

impl fmt::Display for TripleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.satellite_id, self.sensor_id, self.aoi_id)
    }
}

/// A span during which a sensor footprint sees an AOI.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VisibilityInterval {
    pub satellite_id: String,
    pub sensor_id: String,
    pub aoi_id: String,
    pub interval: TimeInterval,
    pub revolution_index: usize,
}

impl VisibilityInterval {
    pub fn key(&self) -> TripleKey {
        TripleKey::new(&self.satellite_id, &self.sensor_id, &self.aoi_id)
    }
}

/// A selectable imaging window derived from a visibility interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateActivity {
    /// The visibility interval this window was cut from.
    pub source: VisibilityInterval,
    /// Window actually offered to the optimizer, a subset of `source.interval`.
    pub interval: TimeInterval,
    pub revolution_index: usize,
    pub score: f64,
    /// Candidates sharing a group are mutually exclusive.
    pub group: usize,
}

impl CandidateActivity {
    pub fn duration(&self) -> Seconds {
        self.interval.duration()
    }
}

/// A committed imaging activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledActivity {
    pub satellite_id: String,
    pub sensor_id: String,
    pub aoi_id: String,
    pub interval: TimeInterval,
    pub score: f64,
    pub revolution_index: usize,
}

impl ScheduledActivity {
    pub fn duration(&self) -> Seconds {
        self.interval.duration()
    }
}

impl From<&CandidateActivity> for ScheduledActivity {
    fn from(candidate: &CandidateActivity) -> Self {
        Self {
            satellite_id: candidate.source.satellite_id.clone(),
            sensor_id: candidate.source.sensor_id.clone(),
            aoi_id: candidate.source.aoi_id.clone(),
            interval: candidate.interval,
            score: candidate.score,
            revolution_index: candidate.revolution_index,
        }
    }
}
