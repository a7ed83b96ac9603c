//! Satellite imaging scheduler core.
//!
//! Finds when each sensor of each satellite can see each area of interest,
//! then selects a non-overlapping, duty-cycle-respecting set of imaging
//! activities that maximizes the total score.
//!
//! Start with [`pipeline::SchedulingPipeline`], or drive the stages in
//! [`services`] directly.

pub mod algorithms;
pub mod config;
pub mod error;
pub mod geometry;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod services;
pub mod time;

pub use config::SchedulerConfig;
pub use error::{GeometryError, SchedulerError, SchedulerResult, SolverFailure};
pub use models::{AreaOfInterest, ScheduledActivity, VisibilityInterval};
pub use pipeline::{RunFailure, RunStage, ScheduleRun, SchedulingPipeline};
