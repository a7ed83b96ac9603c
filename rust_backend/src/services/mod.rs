//! Service layer: the stages of a scheduling run.
//!
//! Each stage is a plain function or object taking and returning the model
//! types; [`crate::pipeline`] chains them in a fixed order.

pub mod candidates;
pub mod checksum;
pub mod duty_cycle;
pub mod report;
pub mod sampler;
pub mod scheduler;
pub mod scoring;
pub mod validation;

pub use candidates::{build_candidates, CandidateSet};
pub use checksum::visibility_fingerprint;
pub use duty_cycle::{DutyCycleTracker, RevolutionTable};
pub use report::{build_report, AccessOutcome, AccessRecord, AccessReport, AccessSummary};
pub use sampler::{TripleVisibility, VisibilitySampler};
pub use scheduler::{SatelliteSchedule, ScheduleOptimizer};
pub use scoring::{PriorityDuration, ScorePolicy, StandardScore};
pub use validation::{check_schedule, check_visibility, ensure_valid, InvariantIssue, InvariantKind};
