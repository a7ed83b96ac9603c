//! Per-access outcome report.
//!
//! One record per visibility interval (or per triple when the triple produced
//! no interval or failed) stating what happened to it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{ScheduledActivity, VisibilityInterval};
use crate::services::sampler::TripleVisibility;
use crate::services::scheduler::SatelliteSchedule;
use crate::time::TimeInterval;

/// What became of one access opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    Scheduled,
    /// Visible and scored but left out by duty cycle or conflicts.
    NotSelected,
    NotScored,
    /// The triple was never in view.
    NoAccess,
    GeometryFailed,
    SolverFailed,
    DutyCycleFailed,
}

impl AccessOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessOutcome::Scheduled => "scheduled",
            AccessOutcome::NotSelected => "not_selected",
            AccessOutcome::NotScored => "not_scored",
            AccessOutcome::NoAccess => "no_access",
            AccessOutcome::GeometryFailed => "geometry_failed",
            AccessOutcome::SolverFailed => "solver_failed",
            AccessOutcome::DutyCycleFailed => "duty_cycle_failed",
        }
    }

    /// Outcome recorded for work that failed with `error`.
    pub fn from_error(error: &SchedulerError) -> Self {
        match error {
            SchedulerError::Geometry(_) | SchedulerError::Ephemeris { .. } => AccessOutcome::GeometryFailed,
            SchedulerError::DutyCycleViolation { .. } => AccessOutcome::DutyCycleFailed,
            SchedulerError::SolverFailure { .. }
            | SchedulerError::Configuration(_)
            | SchedulerError::InvariantViolation(_) => AccessOutcome::SolverFailed,
        }
    }
}

/// Report line for one access opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub satellite_id: String,
    pub sensor_id: String,
    pub aoi_id: String,
    pub visibility: Option<TimeInterval>,
    pub revolution_index: Option<usize>,
    pub outcome: AccessOutcome,
    pub scheduled: Option<TimeInterval>,
    pub score: Option<f64>,
    pub detail: Option<String>,
}

/// Totals over a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessSummary {
    pub counts: BTreeMap<AccessOutcome, usize>,
    pub scheduled_secs: f64,
    pub total_score: f64,
}

impl AccessSummary {
    pub fn count(&self, outcome: AccessOutcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessReport {
    pub records: Vec<AccessRecord>,
    pub summary: AccessSummary,
}

impl AccessReport {
    pub fn with_outcome(&self, outcome: AccessOutcome) -> impl Iterator<Item = &AccessRecord> {
        self.records.iter().filter(move |r| r.outcome == outcome)
    }
}

/// Build the report of a run.
///
/// # Arguments
/// * `triples` - Sampling outcome of every triple
/// * `schedules` - Scheduling outcome per satellite id
/// * `unscored` - Visibility intervals that produced no scored candidate
pub fn build_report(
    triples: &[TripleVisibility],
    schedules: &BTreeMap<String, SchedulerResult<SatelliteSchedule>>,
    unscored: &BTreeSet<VisibilityInterval>,
) -> AccessReport {
    let mut records = Vec::new();

    for triple in triples {
        let key = &triple.key;
        let intervals = match &triple.result {
            Err(e) => {
                records.push(AccessRecord {
                    satellite_id: key.satellite_id.clone(),
                    sensor_id: key.sensor_id.clone(),
                    aoi_id: key.aoi_id.clone(),
                    visibility: None,
                    revolution_index: None,
                    outcome: AccessOutcome::from_error(e),
                    scheduled: None,
                    score: None,
                    detail: Some(e.to_string()),
                });
                continue;
            }
            Ok(intervals) => intervals,
        };

        if intervals.is_empty() {
            records.push(AccessRecord {
                satellite_id: key.satellite_id.clone(),
                sensor_id: key.sensor_id.clone(),
                aoi_id: key.aoi_id.clone(),
                visibility: None,
                revolution_index: None,
                outcome: AccessOutcome::NoAccess,
                scheduled: None,
                score: None,
                detail: None,
            });
            continue;
        }

        let schedule = schedules.get(&key.satellite_id);
        for vis in intervals {
            records.push(classify(vis, schedule, unscored));
        }
    }

    let mut summary = AccessSummary::default();
    for record in &records {
        *summary.counts.entry(record.outcome).or_default() += 1;
        if let Some(scheduled) = &record.scheduled {
            summary.scheduled_secs += scheduled.duration().value();
        }
        summary.total_score += record.score.unwrap_or(0.0);
    }

    AccessReport { records, summary }
}

fn classify(
    vis: &VisibilityInterval,
    schedule: Option<&SchedulerResult<SatelliteSchedule>>,
    unscored: &BTreeSet<VisibilityInterval>,
) -> AccessRecord {
    let mut record = AccessRecord {
        satellite_id: vis.satellite_id.clone(),
        sensor_id: vis.sensor_id.clone(),
        aoi_id: vis.aoi_id.clone(),
        visibility: Some(vis.interval),
        revolution_index: Some(vis.revolution_index),
        outcome: AccessOutcome::NotSelected,
        scheduled: None,
        score: None,
        detail: None,
    };

    match schedule {
        None => {
            record.outcome = AccessOutcome::SolverFailed;
            record.detail = Some(format!("satellite {} was not scheduled", vis.satellite_id));
        }
        Some(Err(e)) => {
            record.outcome = AccessOutcome::from_error(e);
            record.detail = Some(e.to_string());
        }
        Some(Ok(schedule)) => {
            if let Some(activity) = schedule.activities.iter().find(|a| books(a, vis)) {
                record.outcome = AccessOutcome::Scheduled;
                record.scheduled = Some(activity.interval);
                record.score = Some(activity.score);
            } else if unscored.contains(vis) {
                record.outcome = AccessOutcome::NotScored;
            }
        }
    }

    record
}

fn books(activity: &ScheduledActivity, vis: &VisibilityInterval) -> bool {
    activity.sensor_id == vis.sensor_id
        && activity.aoi_id == vis.aoi_id
        && vis.interval.contains_interval(&activity.interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GeometryError, SolverDiagnostics, SolverFailure};
    use crate::models::TripleKey;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn ivl(a: i64, b: i64) -> TimeInterval {
        TimeInterval::new(t(a), t(b)).unwrap()
    }

    fn vis(sat: &str, aoi: &str, a: i64, b: i64) -> VisibilityInterval {
        VisibilityInterval {
            satellite_id: sat.into(),
            sensor_id: "cam".into(),
            aoi_id: aoi.into(),
            interval: ivl(a, b),
            revolution_index: 0,
        }
    }

    fn triple(sat: &str, aoi: &str, result: SchedulerResult<Vec<VisibilityInterval>>) -> TripleVisibility {
        TripleVisibility {
            key: TripleKey::new(sat, "cam", aoi),
            result,
        }
    }

    fn schedule(sat: &str, activities: Vec<ScheduledActivity>) -> SatelliteSchedule {
        SatelliteSchedule {
            satellite_id: sat.into(),
            objective_value: activities.iter().map(|a| a.score).sum(),
            activities,
            solver: "branch_and_bound".into(),
            proven_optimal: true,
            diagnostics: SolverDiagnostics::default(),
        }
    }

    #[test]
    fn test_outcomes_per_interval() {
        let a = vis("sat", "a", 0, 100);
        let b = vis("sat", "b", 50, 150);
        let c = vis("sat", "c", 200, 300);
        let triples = vec![
            triple("sat", "a", Ok(vec![a.clone()])),
            triple("sat", "b", Ok(vec![b])),
            triple("sat", "c", Ok(vec![c.clone()])),
            triple("sat", "d", Ok(Vec::new())),
        ];
        let activity = ScheduledActivity {
            satellite_id: "sat".into(),
            sensor_id: "cam".into(),
            aoi_id: "a".into(),
            interval: ivl(10, 60),
            score: 50.0,
            revolution_index: 0,
        };
        let mut schedules = BTreeMap::new();
        schedules.insert("sat".to_string(), Ok(schedule("sat", vec![activity])));
        let unscored: BTreeSet<_> = [c].into_iter().collect();

        let report = build_report(&triples, &schedules, &unscored);
        let outcomes: Vec<_> = report.records.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                AccessOutcome::Scheduled,
                AccessOutcome::NotSelected,
                AccessOutcome::NotScored,
                AccessOutcome::NoAccess
            ]
        );
        assert_eq!(report.records[0].scheduled, Some(ivl(10, 60)));
        assert_eq!(report.summary.count(AccessOutcome::Scheduled), 1);
        assert_eq!(report.summary.scheduled_secs, 50.0);
        assert_eq!(report.summary.total_score, 50.0);
        assert_eq!(report.with_outcome(AccessOutcome::NoAccess).count(), 1);
        assert_eq!(a.interval, report.records[0].visibility.unwrap());
    }

    #[test]
    fn test_failures_are_reported() {
        let geometry = SchedulerError::Geometry(GeometryError::PositionBelowSurface);
        let duty = SchedulerError::DutyCycleViolation {
            satellite_id: "late".into(),
            message: "revolution 0 has zero duration".into(),
        };
        let triples = vec![
            triple("sat", "a", Err(geometry)),
            triple("late", "a", Err(duty)),
            triple("broken", "a", Ok(vec![vis("broken", "a", 0, 10)])),
        ];
        let mut schedules = BTreeMap::new();
        schedules.insert(
            "broken".to_string(),
            Err(SchedulerError::SolverFailure {
                satellite_id: "broken".into(),
                failure: SolverFailure::Internal("boom".into()),
                context: SolverDiagnostics::default(),
            }),
        );

        let report = build_report(&triples, &schedules, &BTreeSet::new());
        let outcomes: Vec<_> = report.records.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                AccessOutcome::GeometryFailed,
                AccessOutcome::DutyCycleFailed,
                AccessOutcome::SolverFailed
            ]
        );
        assert!(report.records.iter().all(|r| r.detail.is_some()));
        assert_eq!(report.summary.total_score, 0.0);
    }

    #[test]
    fn test_outcome_names() {
        assert_eq!(AccessOutcome::DutyCycleFailed.as_str(), "duty_cycle_failed");
        assert_eq!(
            serde_json::to_string(&AccessOutcome::NotSelected).unwrap(),
            "\"not_selected\""
        );
    }
}
