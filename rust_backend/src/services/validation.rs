//! Invariant checks on visibility sets and committed schedules.
//!
//! These run after every solve. Any issue means the model or the sampler is
//! wrong, so [`ensure_valid`] turns issues into a fatal
//! [`SchedulerError::InvariantViolation`].
//!
//! Checks:
//! - Visibility intervals of one (satellite, sensor, AOI) are sorted and disjoint
//! - Activities of one sensor do not overlap in time
//! - Activity durations per (sensor, revolution) stay within the duty-cycle budget
//! - Every activity lies inside a visibility interval of the same (sensor, AOI)
//! - At most one activity is committed per visibility interval

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{ScheduledActivity, TripleKey, VisibilityInterval};
use crate::services::duty_cycle::DutyCycleTracker;

/// Invariant category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvariantKind {
    VisibilityOrder,
    Overlap,
    DutyCycle,
    OutsideVisibility,
    DoubleBooked,
}

impl InvariantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvariantKind::VisibilityOrder => "visibility_order",
            InvariantKind::Overlap => "overlap",
            InvariantKind::DutyCycle => "duty_cycle",
            InvariantKind::OutsideVisibility => "outside_visibility",
            InvariantKind::DoubleBooked => "double_booked",
        }
    }
}

/// A single broken invariant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantIssue {
    pub kind: InvariantKind,
    pub satellite_id: String,
    pub sensor_id: String,
    pub description: String,
}

impl InvariantIssue {
    fn new(kind: InvariantKind, satellite_id: &str, sensor_id: &str, description: String) -> Self {
        Self {
            kind,
            satellite_id: satellite_id.to_string(),
            sensor_id: sensor_id.to_string(),
            description,
        }
    }
}

/// Check that each triple's intervals are sorted and pairwise disjoint.
pub fn check_visibility(intervals: &[VisibilityInterval]) -> Vec<InvariantIssue> {
    let mut issues = Vec::new();
    let mut last: BTreeMap<TripleKey, &VisibilityInterval> = BTreeMap::new();

    for vis in intervals {
        let key = vis.key();
        if let Some(prev) = last.get(&key) {
            if vis.interval.start() < prev.interval.stop() {
                issues.push(InvariantIssue::new(
                    InvariantKind::VisibilityOrder,
                    &vis.satellite_id,
                    &vis.sensor_id,
                    format!(
                        "{}: interval starting {} is not after the previous one ending {}",
                        key,
                        vis.interval.start(),
                        prev.interval.stop()
                    ),
                ));
            }
        }
        last.insert(key, vis);
    }

    issues
}

/// Check a satellite's committed activities against the schedule invariants.
///
/// # Arguments
/// * `activities` - Committed activities of one satellite
/// * `visibility` - Visibility intervals of that satellite
/// * `tracker` - Budgets of that satellite (recorded usage is ignored)
pub fn check_schedule(
    activities: &[ScheduledActivity],
    visibility: &[VisibilityInterval],
    tracker: &DutyCycleTracker,
) -> Vec<InvariantIssue> {
    let mut issues = Vec::new();

    // === Non-overlap per sensor ===
    let mut by_sensor: BTreeMap<&str, Vec<&ScheduledActivity>> = BTreeMap::new();
    for activity in activities {
        by_sensor.entry(activity.sensor_id.as_str()).or_default().push(activity);
    }
    for (sensor_id, mut list) in by_sensor {
        list.sort_by_key(|a| a.interval);
        for pair in list.windows(2) {
            if pair[0].interval.overlaps(&pair[1].interval) {
                issues.push(InvariantIssue::new(
                    InvariantKind::Overlap,
                    &pair[0].satellite_id,
                    sensor_id,
                    format!(
                        "activities for {} and {} overlap ({} > {})",
                        pair[0].aoi_id,
                        pair[1].aoi_id,
                        pair[0].interval.stop(),
                        pair[1].interval.start()
                    ),
                ));
            }
        }
    }

    // === Duty cycle per (sensor, revolution) ===
    let mut usage = tracker.clone();
    usage.reset();
    for activity in activities {
        if let Err(e) = usage.record(&activity.sensor_id, activity.revolution_index, activity.duration()) {
            issues.push(InvariantIssue::new(
                InvariantKind::DutyCycle,
                &activity.satellite_id,
                &activity.sensor_id,
                e.to_string(),
            ));
        }
    }

    // === Containment and double booking ===
    let mut bookings: BTreeMap<&VisibilityInterval, usize> = BTreeMap::new();
    for activity in activities {
        let source = visibility.iter().find(|v| {
            v.satellite_id == activity.satellite_id
                && v.sensor_id == activity.sensor_id
                && v.aoi_id == activity.aoi_id
                && v.interval.contains_interval(&activity.interval)
        });
        match source {
            Some(vis) => *bookings.entry(vis).or_default() += 1,
            None => issues.push(InvariantIssue::new(
                InvariantKind::OutsideVisibility,
                &activity.satellite_id,
                &activity.sensor_id,
                format!(
                    "activity for {} at {} - {} is outside every visibility interval",
                    activity.aoi_id,
                    activity.interval.start(),
                    activity.interval.stop()
                ),
            )),
        }
    }
    for (vis, count) in bookings.into_iter().filter(|(_, n)| *n > 1) {
        issues.push(InvariantIssue::new(
            InvariantKind::DoubleBooked,
            &vis.satellite_id,
            &vis.sensor_id,
            format!("{} activities committed in one pass over {}", count, vis.aoi_id),
        ));
    }

    issues
}

/// Turn any issue into a fatal invariant violation.
pub fn ensure_valid(issues: Vec<InvariantIssue>) -> SchedulerResult<()> {
    if issues.is_empty() {
        return Ok(());
    }
    for issue in &issues {
        log::error!(
            "Invariant {} violated for {}/{}: {}",
            issue.kind.as_str(),
            issue.satellite_id,
            issue.sensor_id,
            issue.description
        );
    }
    let summary = issues
        .iter()
        .map(|i| format!("[{}] {}", i.kind.as_str(), i.description))
        .collect::<Vec<_>>()
        .join("; ");
    Err(SchedulerError::InvariantViolation(summary))
}
