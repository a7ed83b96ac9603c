//! Error taxonomy for the scheduling core.
//!
//! Errors fall in two groups. Isolated errors (`Geometry`, `Ephemeris`,
//! `DutyCycleViolation`, `SolverFailure`) fail one unit of work (a
//! satellite/sensor/AOI triple or one satellite's schedule) and are recorded
//! next to the results of the remaining units. Fatal errors (`Configuration`,
//! `InvariantViolation`) abort the whole run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result type for scheduling operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Error type for scheduling operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Ephemeris error for satellite {satellite_id}: {message}")]
    Ephemeris {
        satellite_id: String,
        message: String,
    },

    #[error("Duty cycle violation for satellite {satellite_id}: {message}")]
    DutyCycleViolation {
        satellite_id: String,
        message: String,
    },

    #[error("Solver failure for satellite {satellite_id} ({context}): {failure}")]
    SolverFailure {
        satellite_id: String,
        failure: SolverFailure,
        context: SolverDiagnostics,
    },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl SchedulerError {
    /// Returns `true` when the error must abort the whole run rather than a
    /// single triple or satellite.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Configuration(_) | SchedulerError::InvariantViolation(_)
        )
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        SchedulerError::Configuration(message.into())
    }
}

/// Geometry failures, scoped to a single satellite/sensor/AOI triple.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("polygon {id} is degenerate: {reason}")]
    DegeneratePolygon { id: String, reason: String },

    #[error("footprint of sensor {sensor_id} does not intersect the earth")]
    FootprintOffEarth { sensor_id: String },

    #[error("satellite position is inside the earth ellipsoid")]
    PositionBelowSurface,

    #[error("antimeridian normalization failed for {id}: longitude span {span_deg:.3} deg")]
    Antimeridian { id: String, span_deg: f64 },
}

/// Outcome of a failed solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum SolverFailure {
    #[error("problem is infeasible: {0}")]
    Infeasible(String),

    #[error("solver exceeded its budget after {nodes} nodes ({elapsed_ms} ms)")]
    Timeout { nodes: u64, elapsed_ms: u128 },

    #[error("model is invalid: {0}")]
    ModelInvalid(String),

    #[error("solver internal error: {0}")]
    Internal(String),
}

/// Size of the model handed to the solver, attached to solver failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverDiagnostics {
    pub sensor_ids: Vec<String>,
    pub variables: usize,
    pub overlap_constraints: usize,
    pub duty_cycle_constraints: usize,
    pub exclusive_constraints: usize,
}

impl fmt::Display for SolverDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sensors=[{}] variables={} overlap={} duty_cycle={} exclusive={}",
            self.sensor_ids.join(","),
            self.variables,
            self.overlap_constraints,
            self.duty_cycle_constraints,
            self.exclusive_constraints
        )
    }
}
