//! Scheduler configuration file support.
//!
//! The configuration is read once from TOML, validated, and then passed by
//! reference to every pipeline stage. There is no process-wide instance.
//!
//! ```toml
//! [run]
//! start = "2024-03-01T00:00:00Z"
//! stop = "2024-03-02T00:00:00Z"
//! step_secs = 600.0
//! multithread = true
//!
//! [satellites.sat-1]
//! name = "Demo"
//!
//! [[satellites.sat-1.sensors]]
//! id = "cam"
//! duty_cycle = 0.25
//! min_sun_elevation_deg = 10.0
//!
//! [satellites.sat-1.sensors.camera]
//! focal_length_m = 0.7
//! pitch_m = 5.5e-6
//! rows = 4096
//! cols = 128
//!
//! [optimizer]
//! solver = "branch_and_bound"
//! time_limit_secs = 30.0
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use qtty::Seconds;
use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};
use crate::time::TimeInterval;

/// Complete scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub run: RunSettings,
    #[serde(default)]
    pub satellites: BTreeMap<String, SatelliteSettings>,
    #[serde(default)]
    pub score: ScoreSettings,
    #[serde(default)]
    pub optimizer: OptimizerSettings,
}

/// Run window and sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    #[serde(default = "default_step_secs")]
    pub step_secs: f64,
    #[serde(default = "default_multithread")]
    pub multithread: bool,
    #[serde(default = "default_refine_tolerance_secs")]
    pub refine_tolerance_secs: f64,
    #[serde(default = "default_refine_max_iterations")]
    pub refine_max_iterations: u32,
    #[serde(default = "default_merge_tolerance_secs")]
    pub merge_tolerance_secs: f64,
}

/// Orbital event that separates two revolutions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevBoundary {
    #[default]
    Ascending,
    Descending,
    NorthPoint,
    SouthPoint,
}

/// Per-satellite settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SatelliteSettings {
    #[serde(default)]
    pub name: Option<String>,
    /// When `true` the satellite is ignored entirely.
    #[serde(default)]
    pub filter: bool,
    #[serde(default)]
    pub rev_boundary: RevBoundary,
    #[serde(default)]
    pub sensors: Vec<SensorSettings>,
}

/// Per-sensor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSettings {
    pub id: String,
    #[serde(default)]
    pub use_nadir_pointing: bool,
    #[serde(default = "default_duty_cycle")]
    pub duty_cycle: f64,
    #[serde(default)]
    pub min_sun_elevation_deg: Option<f64>,
    #[serde(default)]
    pub max_dwell_secs: Option<f64>,
    #[serde(default)]
    pub filter: bool,
    #[serde(default)]
    pub camera: Option<CameraSettings>,
    #[serde(default)]
    pub frame: Option<FrameSettings>,
}

/// Focal-plane geometry of a camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    pub focal_length_m: f64,
    pub pitch_m: f64,
    pub rows: u32,
    pub cols: u32,
    /// Rows are aligned with sensor +X when `true`, with +Y otherwise.
    #[serde(default)]
    pub rows_along_x: bool,
}

/// Sensor axes expressed in the satellite body frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameSettings {
    #[serde(default)]
    pub x: Option<[f64; 3]>,
    #[serde(default)]
    pub y: Option<[f64; 3]>,
    #[serde(default)]
    pub z: Option<[f64; 3]>,
}

/// Standard score equation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSettings {
    #[serde(default = "default_priority_exp")]
    pub priority_exp: f64,
    /// Multipliers by AOI country, matched case-insensitively.
    #[serde(default)]
    pub country: BTreeMap<String, f64>,
    /// Multipliers by AOI continent, matched case-insensitively.
    #[serde(default)]
    pub continent: BTreeMap<String, f64>,
    #[serde(default)]
    pub regions: Vec<RegionScoreSettings>,
}

/// Score multiplier applied to AOIs inside (or overlapping) a region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionScoreSettings {
    /// Region outline as `[lon, lat]` pairs in degrees.
    pub region: Vec<[f64; 2]>,
    pub multiplier: f64,
    /// Apply to fully contained AOIs (`true`) or to overlapping AOIs (`false`).
    #[serde(default)]
    pub contains: bool,
}

/// Optimizer backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    #[default]
    BranchAndBound,
    Greedy,
}

/// Optimizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerSettings {
    #[serde(default)]
    pub solver: SolverKind,
    #[serde(default = "default_time_limit_secs")]
    pub time_limit_secs: f64,
    #[serde(default = "default_node_limit")]
    pub node_limit: u64,
    /// Relative optimality gap at which the exact solver stops improving.
    #[serde(default = "default_relative_gap")]
    pub relative_gap: f64,
    /// Extra wait before an unresponsive solver is abandoned.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: f64,
}

fn default_step_secs() -> f64 {
    600.0
}

fn default_multithread() -> bool {
    true
}

fn default_refine_tolerance_secs() -> f64 {
    1.0e-3
}

fn default_refine_max_iterations() -> u32 {
    32
}

fn default_merge_tolerance_secs() -> f64 {
    1.0e-3
}

fn default_duty_cycle() -> f64 {
    1.0
}

fn default_priority_exp() -> f64 {
    1.0
}

fn default_time_limit_secs() -> f64 {
    30.0
}

fn default_node_limit() -> u64 {
    5_000_000
}

fn default_relative_gap() -> f64 {
    1.0e-4
}

fn default_grace_secs() -> f64 {
    5.0
}

impl Default for ScoreSettings {
    fn default() -> Self {
        Self {
            priority_exp: default_priority_exp(),
            country: BTreeMap::new(),
            continent: BTreeMap::new(),
            regions: Vec::new(),
        }
    }
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            solver: SolverKind::default(),
            time_limit_secs: default_time_limit_secs(),
            node_limit: default_node_limit(),
            relative_gap: default_relative_gap(),
            grace_secs: default_grace_secs(),
        }
    }
}

impl RunSettings {
    /// Creates run settings with default sampling parameters.
    pub fn new(start: DateTime<Utc>, stop: DateTime<Utc>, step_secs: f64) -> Self {
        Self {
            start,
            stop,
            step_secs,
            multithread: default_multithread(),
            refine_tolerance_secs: default_refine_tolerance_secs(),
            refine_max_iterations: default_refine_max_iterations(),
            merge_tolerance_secs: default_merge_tolerance_secs(),
        }
    }

    /// The run window as an interval.
    pub fn window(&self) -> SchedulerResult<TimeInterval> {
        TimeInterval::new(self.start, self.stop)
            .map_err(|e| SchedulerError::configuration(format!("run window: {}", e)))
    }

    pub fn step(&self) -> Seconds {
        Seconds::new(self.step_secs)
    }

    pub fn refine_tolerance(&self) -> Seconds {
        Seconds::new(self.refine_tolerance_secs)
    }

    pub fn merge_tolerance(&self) -> Seconds {
        Seconds::new(self.merge_tolerance_secs)
    }
}

impl SensorSettings {
    /// Nadir-pointing sensor with the given duty cycle.
    pub fn nadir(id: impl Into<String>, duty_cycle: f64) -> Self {
        Self {
            id: id.into(),
            use_nadir_pointing: true,
            duty_cycle,
            min_sun_elevation_deg: None,
            max_dwell_secs: None,
            filter: false,
            camera: None,
            frame: None,
        }
    }
}

impl SchedulerConfig {
    /// Load the configuration from a TOML file and validate it.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Ok(SchedulerConfig)` if the file was read, parsed and validated
    /// * `Err(SchedulerError::Configuration)` otherwise
    pub fn from_file<P: AsRef<Path>>(path: P) -> SchedulerResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            SchedulerError::configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate a configuration from TOML text.
    ///
    /// Parse errors name the key path that failed (e.g. `satellites.sat-1.sensors[0].duty_cycle`).
    pub fn from_toml_str(content: &str) -> SchedulerResult<Self> {
        let deserializer = toml::Deserializer::new(content);
        let config: SchedulerConfig = serde_path_to_error::deserialize(deserializer).map_err(|e| {
            SchedulerError::configuration(format!(
                "Failed to parse config at '{}': {}",
                e.path(),
                e.inner()
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check every setting that the pipeline relies on.
    pub fn validate(&self) -> SchedulerResult<()> {
        self.run.window()?;

        if !(self.run.step_secs.is_finite() && self.run.step_secs > 0.0) {
            return Err(SchedulerError::configuration(format!(
                "run.step_secs must be positive, got {}",
                self.run.step_secs
            )));
        }
        if !(self.run.refine_tolerance_secs.is_finite() && self.run.refine_tolerance_secs > 0.0) {
            return Err(SchedulerError::configuration(
                "run.refine_tolerance_secs must be positive",
            ));
        }
        if !(self.run.merge_tolerance_secs.is_finite() && self.run.merge_tolerance_secs >= 0.0) {
            return Err(SchedulerError::configuration(
                "run.merge_tolerance_secs must be non-negative",
            ));
        }

        for (sat_id, sat) in &self.satellites {
            if sat_id.trim().is_empty() {
                return Err(SchedulerError::configuration("satellite id must not be empty"));
            }
            let mut seen: BTreeMap<&str, f64> = BTreeMap::new();
            for sensor in &sat.sensors {
                validate_sensor(sat_id, sensor)?;
                // a repeated id names the same physical sensor and must agree on its budget
                if let Some(previous) = seen.insert(sensor.id.as_str(), sensor.duty_cycle) {
                    if previous != sensor.duty_cycle {
                        return Err(SchedulerError::configuration(format!(
                            "sensor {} on satellite {} is declared twice with different duty cycles",
                            sensor.id, sat_id
                        )));
                    }
                }
            }
        }

        if !self.score.priority_exp.is_finite() {
            return Err(SchedulerError::configuration("score.priority_exp must be finite"));
        }
        for (section, multipliers) in [("country", &self.score.country), ("continent", &self.score.continent)] {
            let mut seen = BTreeMap::new();
            for (name, multiplier) in multipliers {
                if !(multiplier.is_finite() && *multiplier >= 0.0) {
                    return Err(SchedulerError::configuration(format!(
                        "score.{}.{} must be non-negative",
                        section, name
                    )));
                }
                if let Some(previous) = seen.insert(name.to_lowercase(), name) {
                    return Err(SchedulerError::configuration(format!(
                        "score.{} has both {} and {}",
                        section, previous, name
                    )));
                }
            }
        }
        for (i, region) in self.score.regions.iter().enumerate() {
            if region.region.len() < 3 {
                return Err(SchedulerError::configuration(format!(
                    "score.regions[{}] needs at least 3 vertices",
                    i
                )));
            }
            if !(region.multiplier.is_finite() && region.multiplier >= 0.0) {
                return Err(SchedulerError::configuration(format!(
                    "score.regions[{}].multiplier must be non-negative",
                    i
                )));
            }
        }

        if !(self.optimizer.time_limit_secs.is_finite() && self.optimizer.time_limit_secs > 0.0) {
            return Err(SchedulerError::configuration(
                "optimizer.time_limit_secs must be positive",
            ));
        }
        if !(self.optimizer.grace_secs.is_finite() && self.optimizer.grace_secs >= 0.0) {
            return Err(SchedulerError::configuration(
                "optimizer.grace_secs must be non-negative",
            ));
        }
        let deadline = Duration::try_from_secs_f64(self.optimizer.time_limit_secs)
            .ok()
            .zip(Duration::try_from_secs_f64(self.optimizer.grace_secs).ok())
            .and_then(|(limit, grace)| limit.checked_add(grace));
        if deadline.is_none() {
            return Err(SchedulerError::configuration(format!(
                "optimizer.time_limit_secs + optimizer.grace_secs is out of range ({} + {})",
                self.optimizer.time_limit_secs, self.optimizer.grace_secs
            )));
        }
        if !(0.0..1.0).contains(&self.optimizer.relative_gap) {
            return Err(SchedulerError::configuration(
                "optimizer.relative_gap must be within [0, 1)",
            ));
        }

        Ok(())
    }

    /// Satellites that are not filtered out, in id order.
    pub fn active_satellites(&self) -> impl Iterator<Item = (&String, &SatelliteSettings)> {
        self.satellites.iter().filter(|(_, sat)| !sat.filter)
    }
}

fn validate_sensor(sat_id: &str, sensor: &SensorSettings) -> SchedulerResult<()> {
    let ctx = || format!("satellite {} sensor {}", sat_id, sensor.id);

    if sensor.id.trim().is_empty() {
        return Err(SchedulerError::configuration(format!(
            "satellite {} has a sensor with an empty id",
            sat_id
        )));
    }
    if !(0.0..=1.0).contains(&sensor.duty_cycle) {
        return Err(SchedulerError::configuration(format!(
            "{}: duty_cycle must be between 0 and 1, inclusive (got {})",
            ctx(),
            sensor.duty_cycle
        )));
    }
    if let Some(elev) = sensor.min_sun_elevation_deg {
        if !(-90.0..=90.0).contains(&elev) {
            return Err(SchedulerError::configuration(format!(
                "{}: min_sun_elevation_deg must be within [-90, 90]",
                ctx()
            )));
        }
    }
    if let Some(dwell) = sensor.max_dwell_secs {
        if !(dwell.is_finite() && dwell > 0.0) {
            return Err(SchedulerError::configuration(format!(
                "{}: max_dwell_secs must be positive",
                ctx()
            )));
        }
    }

    match (&sensor.camera, sensor.use_nadir_pointing) {
        (None, false) => {
            return Err(SchedulerError::configuration(format!(
                "{}: camera geometry is required unless use_nadir_pointing = true",
                ctx()
            )))
        }
        (Some(camera), _) => {
            if !(camera.focal_length_m > 0.0 && camera.pitch_m > 0.0) {
                return Err(SchedulerError::configuration(format!(
                    "{}: focal_length_m and pitch_m must be positive",
                    ctx()
                )));
            }
            if camera.rows == 0 || camera.cols == 0 {
                return Err(SchedulerError::configuration(format!(
                    "{}: rows and cols must be greater than 0",
                    ctx()
                )));
            }
        }
        (None, true) => {}
    }

    Ok(())
}
