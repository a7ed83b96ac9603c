//! Revolution partitioning and per-revolution duty-cycle budgets.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use qtty::Seconds;
use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{OrbitRevolution, Satellite};
use crate::time::TimeInterval;

/// Absolute slack when comparing accumulated durations against a budget.
pub const BUDGET_TOLERANCE_SECS: f64 = 1.0e-6;

/// The run window of one satellite split into revolutions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevolutionTable {
    satellite_id: String,
    revolutions: Vec<OrbitRevolution>,
}

impl RevolutionTable {
    /// Partition `window` at the given boundary events.
    ///
    /// Events at or outside the window edges are ignored. The first
    /// revolution starts at the window start and the last one ends at the
    /// window stop, so partial revolutions at either end are kept.
    ///
    /// # Returns
    /// * `Err(SchedulerError::DutyCycleViolation)` when events are duplicated
    ///   or out of order, which would produce a revolution of zero or negative
    ///   duration
    pub fn build(satellite_id: &str, window: &TimeInterval, events: &[DateTime<Utc>]) -> SchedulerResult<Self> {
        let mut bounds = vec![window.start()];
        bounds.extend(
            events
                .iter()
                .copied()
                .filter(|e| *e > window.start() && *e < window.stop()),
        );
        bounds.push(window.stop());

        let revolutions = bounds
            .windows(2)
            .enumerate()
            .map(|(index, pair)| {
                TimeInterval::new(pair[0], pair[1])
                    .map(|interval| OrbitRevolution { index, interval })
                    .map_err(|_| SchedulerError::DutyCycleViolation {
                        satellite_id: satellite_id.to_string(),
                        message: format!(
                            "revolution {} has zero or negative duration ({} -> {})",
                            index, pair[0], pair[1]
                        ),
                    })
            })
            .collect::<SchedulerResult<Vec<_>>>()?;

        Ok(Self {
            satellite_id: satellite_id.to_string(),
            revolutions,
        })
    }

    pub fn satellite_id(&self) -> &str {
        &self.satellite_id
    }

    pub fn revolutions(&self) -> &[OrbitRevolution] {
        &self.revolutions
    }

    pub fn get(&self, index: usize) -> Option<&OrbitRevolution> {
        self.revolutions.get(index)
    }

    /// Index of the revolution containing `t`.
    ///
    /// Revolutions are half-open `[start, stop)` except the last, which also
    /// owns the window stop.
    pub fn index_of(&self, t: DateTime<Utc>) -> Option<usize> {
        let last = self.revolutions.len().checked_sub(1)?;
        let idx = self.revolutions.partition_point(|rev| rev.interval.stop() <= t);
        if idx <= last {
            self.revolutions[idx].interval.contains(t).then_some(idx)
        } else if self.revolutions[last].interval.stop() == t {
            Some(last)
        } else {
            None
        }
    }
}

/// Per-(sensor, revolution) budgets and usage for one satellite.
///
/// Sensors are keyed by id; entries configured with the same id share a
/// budget.
#[derive(Debug, Clone)]
pub struct DutyCycleTracker {
    satellite_id: String,
    budgets: BTreeMap<(String, usize), Seconds>,
    used: BTreeMap<(String, usize), Seconds>,
}

impl DutyCycleTracker {
    /// Budget for revolution r is `sensor.duty_cycle * duration(r)`.
    pub fn new(satellite: &Satellite, table: &RevolutionTable) -> Self {
        let budgets = satellite
            .sensors
            .iter()
            .flat_map(|sensor| {
                table.revolutions().iter().map(move |rev| {
                    (
                        (sensor.id.clone(), rev.index),
                        rev.interval.duration() * sensor.duty_cycle,
                    )
                })
            })
            .collect();

        Self {
            satellite_id: satellite.id.clone(),
            budgets,
            used: BTreeMap::new(),
        }
    }

    pub fn satellite_id(&self) -> &str {
        &self.satellite_id
    }

    pub fn budget(&self, sensor_id: &str, revolution: usize) -> Option<Seconds> {
        self.budgets.get(&(sensor_id.to_string(), revolution)).copied()
    }

    pub fn used(&self, sensor_id: &str, revolution: usize) -> Seconds {
        self.used
            .get(&(sensor_id.to_string(), revolution))
            .copied()
            .unwrap_or(Seconds::new(0.0))
    }

    pub fn remaining(&self, sensor_id: &str, revolution: usize) -> Option<Seconds> {
        self.budget(sensor_id, revolution)
            .map(|budget| budget - self.used(sensor_id, revolution))
    }

    /// Returns `true` if `duration` more seconds still fit in the budget.
    pub fn can_fit(&self, sensor_id: &str, revolution: usize, duration: Seconds) -> bool {
        self.remaining(sensor_id, revolution)
            .is_some_and(|left| duration.value() <= left.value() + BUDGET_TOLERANCE_SECS)
    }

    /// Charge `duration` to a sensor's revolution budget.
    pub fn record(&mut self, sensor_id: &str, revolution: usize, duration: Seconds) -> SchedulerResult<()> {
        if !self.can_fit(sensor_id, revolution, duration) {
            return Err(SchedulerError::DutyCycleViolation {
                satellite_id: self.satellite_id.clone(),
                message: format!(
                    "sensor {} revolution {}: {:.3} s requested, {:.3} s of {:.3} s left",
                    sensor_id,
                    revolution,
                    duration.value(),
                    self.remaining(sensor_id, revolution).map_or(0.0, |s| s.value()),
                    self.budget(sensor_id, revolution).map_or(0.0, |s| s.value()),
                ),
            });
        }
        let entry = self
            .used
            .entry((sensor_id.to_string(), revolution))
            .or_insert(Seconds::new(0.0));
        *entry = *entry + duration;
        Ok(())
    }

    /// Drop all recorded usage, keeping the budgets.
    pub fn reset(&mut self) {
        self.used.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SatelliteSettings, SensorSettings};
    use chrono::{TimeDelta, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn window() -> TimeInterval {
        TimeInterval::new(t(0), t(1000)).unwrap()
    }

    fn satellite() -> Satellite {
        let settings = SatelliteSettings {
            sensors: vec![SensorSettings::nadir("a", 0.1), SensorSettings::nadir("b", 0.5)],
            ..Default::default()
        };
        Satellite::from_settings("sat", &settings).unwrap()
    }

    #[test]
    fn test_partition_keeps_partial_revolutions() {
        let table = RevolutionTable::build("sat", &window(), &[t(0), t(300), t(700), t(1000), t(1200)]).unwrap();
        let durations: Vec<f64> = table
            .revolutions()
            .iter()
            .map(|r| r.interval.duration().value())
            .collect();
        assert_eq!(durations, vec![300.0, 400.0, 300.0]);
    }

    #[test]
    fn test_no_events_single_revolution() {
        let table = RevolutionTable::build("sat", &window(), &[]).unwrap();
        assert_eq!(table.revolutions().len(), 1);
        assert_eq!(table.index_of(t(1000)), Some(0));
    }

    #[test]
    fn test_duplicate_event_is_violation() {
        let err = RevolutionTable::build("sat", &window(), &[t(300), t(300)]).unwrap_err();
        assert!(matches!(err, SchedulerError::DutyCycleViolation { .. }));
        assert!(!err.is_fatal());

        assert!(RevolutionTable::build("sat", &window(), &[t(600), t(300)]).is_err());
    }

    #[test]
    fn test_index_of_half_open() {
        let table = RevolutionTable::build("sat", &window(), &[t(300), t(700)]).unwrap();
        assert_eq!(table.index_of(t(0)), Some(0));
        assert_eq!(table.index_of(t(299)), Some(0));
        assert_eq!(table.index_of(t(300)), Some(1));
        assert_eq!(table.index_of(t(999)), Some(2));
        assert_eq!(table.index_of(t(1000)), Some(2));
        assert_eq!(table.index_of(t(1001)), None);
        assert_eq!(table.index_of(t(-1)), None);
    }

    #[test]
    fn test_budgets_are_independent_per_sensor() {
        let table = RevolutionTable::build("sat", &window(), &[t(400)]).unwrap();
        let mut tracker = DutyCycleTracker::new(&satellite(), &table);

        assert_eq!(tracker.budget("a", 0).unwrap().value(), 40.0);
        assert_eq!(tracker.budget("b", 1).unwrap().value(), 300.0);
        assert!(tracker.budget("c", 0).is_none());

        tracker.record("a", 0, Seconds::new(40.0)).unwrap();
        assert!(tracker.record("a", 0, Seconds::new(1.0)).is_err());
        assert!(tracker.can_fit("b", 0, Seconds::new(200.0)));
        assert_eq!(tracker.remaining("a", 0).unwrap().value(), 0.0);

        tracker.reset();
        assert_eq!(tracker.used("a", 0).value(), 0.0);
    }
}
