//! Visibility sampler.
//!
//! Scans the run window at a fixed step, finds the transitions of a boolean
//! predicate between consecutive samples and refines each one by bisection.
//! Rising edges resolve to the first instant known to be true and falling
//! edges to the last instant known to be true, so refined intervals never
//! extend past the true visibility by more than the refinement tolerance.

use chrono::{DateTime, Utc};
use qtty::Seconds;
use rayon::prelude::*;

use crate::config::RunSettings;
use crate::error::{SchedulerError, SchedulerResult};
use crate::geometry::AccessPredicate;
use crate::models::{AreaOfInterest, Satellite, TripleKey, VisibilityInterval};
use crate::providers::{EphemerisProvider, SunElevationProvider};
use crate::services::duty_cycle::RevolutionTable;
use crate::time::{merge_intervals, seconds_between, shift, TimeInterval};

/// A refined transition of the predicate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    /// `true` for false -> true.
    pub rising: bool,
    /// Last instant with the old value.
    pub before: DateTime<Utc>,
    /// First instant with the new value.
    pub after: DateTime<Utc>,
}

/// Result of scanning a predicate over a window.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    pub window: TimeInterval,
    pub initial: bool,
    pub edges: Vec<Edge>,
    /// Set when the window was shorter than one step and only the start was evaluated.
    pub reduced_fidelity: bool,
}

/// Sampling parameters taken from the run settings.
#[derive(Debug, Clone, Copy)]
pub struct ScanSettings {
    pub step: Seconds,
    pub tolerance: Seconds,
    pub max_iterations: u32,
}

impl From<&RunSettings> for ScanSettings {
    fn from(run: &RunSettings) -> Self {
        Self {
            step: run.step(),
            tolerance: run.refine_tolerance(),
            max_iterations: run.refine_max_iterations,
        }
    }
}

/// Sample instants `start, start + step, ...`, always ending with `stop`.
pub fn sample_instants(window: &TimeInterval, step: Seconds) -> Vec<DateTime<Utc>> {
    let total = window.duration().value();
    let count = (total / step.value()).floor() as usize;

    let mut instants: Vec<DateTime<Utc>> = (0..=count)
        .map(|k| shift(window.start(), step * k as f64))
        .filter(|t| *t < window.stop())
        .collect();
    instants.push(window.stop());
    instants
}

/// Scan `predicate` over `window` and refine every transition.
pub fn scan<F>(window: &TimeInterval, settings: &ScanSettings, mut predicate: F) -> SchedulerResult<Scan>
where
    F: FnMut(DateTime<Utc>) -> SchedulerResult<bool>,
{
    if window.duration() < settings.step {
        return Ok(Scan {
            window: *window,
            initial: predicate(window.start())?,
            edges: Vec::new(),
            reduced_fidelity: true,
        });
    }

    let instants = sample_instants(window, settings.step);
    let mut previous = predicate(instants[0])?;
    let initial = previous;
    let mut edges = Vec::new();

    for pair in instants.windows(2) {
        let current = predicate(pair[1])?;
        if current != previous {
            edges.push(refine(&mut predicate, pair[0], pair[1], previous, settings)?);
        }
        previous = current;
    }

    Ok(Scan {
        window: *window,
        initial,
        edges,
        reduced_fidelity: false,
    })
}

/// Bisect between `lo` (value `lo_value`) and `hi` (the opposite value).
fn refine<F>(
    predicate: &mut F,
    mut lo: DateTime<Utc>,
    mut hi: DateTime<Utc>,
    lo_value: bool,
    settings: &ScanSettings,
) -> SchedulerResult<Edge>
where
    F: FnMut(DateTime<Utc>) -> SchedulerResult<bool>,
{
    let mut iterations = 0;
    while iterations < settings.max_iterations && seconds_between(lo, hi) > settings.tolerance {
        let mid = lo + (hi - lo) / 2;
        if mid <= lo || mid >= hi {
            break;
        }
        if predicate(mid)? == lo_value {
            lo = mid;
        } else {
            hi = mid;
        }
        iterations += 1;
    }

    Ok(Edge {
        rising: !lo_value,
        before: lo,
        after: hi,
    })
}

impl Scan {
    /// Spans where the predicate holds, sorted and disjoint.
    pub fn true_spans(&self) -> Vec<TimeInterval> {
        let mut spans = Vec::new();
        let mut open = self.initial.then_some(self.window.start());

        for edge in &self.edges {
            if edge.rising {
                open = Some(edge.after);
            } else if let Some(start) = open.take() {
                if let Ok(span) = TimeInterval::new(start, edge.before) {
                    spans.push(span);
                }
            }
        }
        if let Some(start) = open {
            if let Ok(span) = TimeInterval::new(start, self.window.stop()) {
                spans.push(span);
            }
        }

        spans
    }
}

/// Outcome of sampling one triple.
#[derive(Debug, Clone)]
pub struct TripleVisibility {
    pub key: TripleKey,
    pub result: SchedulerResult<Vec<VisibilityInterval>>,
}

/// Drives the in-view predicate across all triples of a run.
pub struct VisibilitySampler<'a> {
    run: &'a RunSettings,
    ephemeris: &'a dyn EphemerisProvider,
    sun: &'a dyn SunElevationProvider,
}

impl<'a> VisibilitySampler<'a> {
    pub fn new(
        run: &'a RunSettings,
        ephemeris: &'a dyn EphemerisProvider,
        sun: &'a dyn SunElevationProvider,
    ) -> Self {
        Self { run, ephemeris, sun }
    }

    /// Merged visibility intervals for one triple, tagged with revolutions.
    ///
    /// An AOI that is never visible yields an empty list.
    pub fn sample_triple(
        &self,
        satellite: &Satellite,
        sensor_id: &str,
        aoi: &AreaOfInterest,
        revolutions: &RevolutionTable,
    ) -> SchedulerResult<Vec<VisibilityInterval>> {
        let sensor = satellite.sensor(sensor_id).ok_or_else(|| {
            SchedulerError::configuration(format!(
                "satellite {} has no sensor {}",
                satellite.id, sensor_id
            ))
        })?;
        let window = self.run.window()?;
        let predicate = AccessPredicate {
            satellite,
            sensor,
            aoi,
            ephemeris: self.ephemeris,
            sun: self.sun,
        };

        let scan = scan(&window, &ScanSettings::from(self.run), |t| predicate.in_view(t))?;
        if scan.reduced_fidelity {
            log::warn!(
                "Run window ({:.1} s) is shorter than one step ({:.1} s); {}/{}/{} evaluated at a single sample",
                window.duration().value(),
                self.run.step_secs,
                satellite.id,
                sensor.id,
                aoi.id
            );
        }

        let merged = merge_intervals(scan.true_spans(), self.run.merge_tolerance());
        merged
            .into_iter()
            .map(|interval| {
                let revolution_index = revolutions.index_of(interval.midpoint()).ok_or_else(|| {
                    SchedulerError::DutyCycleViolation {
                        satellite_id: satellite.id.clone(),
                        message: format!("no revolution contains {}", interval.midpoint()),
                    }
                })?;
                Ok(VisibilityInterval {
                    satellite_id: satellite.id.clone(),
                    sensor_id: sensor.id.clone(),
                    aoi_id: aoi.id.clone(),
                    interval,
                    revolution_index,
                })
            })
            .collect()
    }

    /// Sample every (satellite, sensor, AOI) triple.
    ///
    /// Each triple is independent: failures are returned in place and do not
    /// affect the other triples. With `run.multithread` the triples run on the
    /// rayon pool; output order is the same either way.
    pub fn sample_all(
        &self,
        satellites: &[(&Satellite, &RevolutionTable)],
        aois: &[AreaOfInterest],
    ) -> Vec<TripleVisibility> {
        let triples: Vec<(&Satellite, &RevolutionTable, &str, &AreaOfInterest)> = satellites
            .iter()
            .flat_map(|(sat, table)| {
                sat.sensors
                    .iter()
                    .filter(|sensor| !sensor.is_filtered())
                    .flat_map(move |sensor| {
                        aois.iter()
                            .map(move |aoi| (*sat, *table, sensor.id.as_str(), aoi))
                    })
            })
            .collect();

        let run_one = |(sat, table, sensor_id, aoi): &(&Satellite, &RevolutionTable, &str, &AreaOfInterest)| {
            let key = TripleKey::new(&sat.id, sensor_id, &aoi.id);
            let result = self.sample_triple(sat, sensor_id, aoi, table);
            if let Err(e) = &result {
                log::warn!("Visibility for {} failed: {}", key, e);
            }
            TripleVisibility { key, result }
        };

        if self.run.multithread {
            triples.par_iter().map(run_one).collect()
        } else {
            triples.iter().map(run_one).collect()
        }
    }
}
