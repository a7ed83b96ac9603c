//! End-to-end scheduling run.
//!
//! Stages run in a fixed order:
//!
//! 1. validate the configuration and resolve satellites
//! 2. build the revolution table of each satellite
//! 3. sample visibility for every (satellite, sensor, AOI) triple
//! 4. cut and score candidate activities
//! 5. optimize each satellite's schedule
//! 6. re-validate every committed schedule (inside step 5)
//! 7. build the access report
//!
//! Failures of one triple or one satellite are recorded in
//! [`ScheduleRun::failures`] and the run carries on. Configuration errors and
//! invariant violations abort the run.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{AreaOfInterest, OrbitRevolution, Satellite, TripleKey, VisibilityInterval};
use crate::providers::{EphemerisProvider, RevolutionEvents, SunElevationProvider};
use crate::services::candidates::build_candidates;
use crate::services::checksum::visibility_fingerprint;
use crate::services::duty_cycle::{DutyCycleTracker, RevolutionTable};
use crate::services::report::{build_report, AccessReport};
use crate::services::sampler::{TripleVisibility, VisibilitySampler};
use crate::services::scheduler::{SatelliteSchedule, ScheduleOptimizer};
use crate::services::scoring::{ScorePolicy, StandardScore};
use crate::services::validation::{check_visibility, ensure_valid};

/// Stage at which an isolated failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Revolutions,
    Visibility,
    Optimization,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Revolutions => "revolutions",
            RunStage::Visibility => "visibility",
            RunStage::Optimization => "optimization",
        }
    }
}

/// A failure confined to one triple or one satellite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub stage: RunStage,
    pub satellite_id: String,
    /// Set for visibility failures.
    pub triple: Option<TripleKey>,
    pub message: String,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRun {
    /// Sorted by (satellite, sensor, AOI), then start time.
    pub visibility: Vec<VisibilityInterval>,
    pub revolutions: BTreeMap<String, Vec<OrbitRevolution>>,
    pub schedules: Vec<SatelliteSchedule>,
    pub failures: Vec<RunFailure>,
    pub report: AccessReport,
}

impl ScheduleRun {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn visibility_fingerprint(&self) -> String {
        visibility_fingerprint(&self.visibility)
    }

    pub fn total_score(&self) -> f64 {
        self.schedules.iter().map(|s| s.total_score()).sum()
    }

    pub fn schedule(&self, satellite_id: &str) -> Option<&SatelliteSchedule> {
        self.schedules.iter().find(|s| s.satellite_id == satellite_id)
    }
}

/// Scheduling pipeline bound to its collaborators.
pub struct SchedulingPipeline<'a> {
    config: &'a SchedulerConfig,
    ephemeris: &'a dyn EphemerisProvider,
    sun: &'a dyn SunElevationProvider,
    events: &'a dyn RevolutionEvents,
    policy: Box<dyn ScorePolicy>,
    optimizer: ScheduleOptimizer,
}

impl<'a> SchedulingPipeline<'a> {
    /// Create a pipeline with the configured score policy and solver.
    ///
    /// # Returns
    /// * `Err(SchedulerError::Configuration)` if the configuration is invalid
    pub fn new(
        config: &'a SchedulerConfig,
        ephemeris: &'a dyn EphemerisProvider,
        sun: &'a dyn SunElevationProvider,
        events: &'a dyn RevolutionEvents,
    ) -> SchedulerResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ephemeris,
            sun,
            events,
            policy: Box::new(StandardScore::from_settings(&config.score)?),
            optimizer: ScheduleOptimizer::from_settings(&config.optimizer)?,
        })
    }

    pub fn with_policy(mut self, policy: Box<dyn ScorePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_optimizer(mut self, optimizer: ScheduleOptimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Run every stage for the given AOIs.
    pub fn run(&self, aois: &[AreaOfInterest]) -> SchedulerResult<ScheduleRun> {
        // Step 1: Resolve satellites and AOIs
        let satellites = self
            .config
            .active_satellites()
            .map(|(id, settings)| Satellite::from_settings(id, settings))
            .collect::<SchedulerResult<Vec<_>>>()?;
        let mut aoi_index: BTreeMap<&str, &AreaOfInterest> = BTreeMap::new();
        for aoi in aois {
            if aoi_index.insert(aoi.id.as_str(), aoi).is_some() {
                return Err(SchedulerError::configuration(format!("duplicate AOI id {}", aoi.id)));
            }
        }
        log::info!(
            "Scheduling run {} - {}: {} satellites, {} AOIs",
            self.config.run.start,
            self.config.run.stop,
            satellites.len(),
            aois.len()
        );

        // Step 2: Revolution tables
        let window = self.config.run.window()?;
        let mut failures = Vec::new();
        let mut tables: BTreeMap<String, RevolutionTable> = BTreeMap::new();
        let mut table_errors: BTreeMap<String, SchedulerError> = BTreeMap::new();
        for sat in &satellites {
            let table = self
                .events
                .boundaries(&sat.id, sat.rev_boundary, &window)
                .and_then(|events| RevolutionTable::build(&sat.id, &window, &events));
            match table {
                Ok(table) => {
                    log::debug!("Satellite {}: {} revolutions", sat.id, table.revolutions().len());
                    tables.insert(sat.id.clone(), table);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::error!("Revolutions for satellite {} failed: {}", sat.id, e);
                    failures.push(RunFailure {
                        stage: RunStage::Revolutions,
                        satellite_id: sat.id.clone(),
                        triple: None,
                        message: e.to_string(),
                    });
                    table_errors.insert(sat.id.clone(), e);
                }
            }
        }

        // Step 3: Visibility
        let sampled: Vec<(&Satellite, &RevolutionTable)> = satellites
            .iter()
            .filter_map(|sat| tables.get(&sat.id).map(|table| (sat, table)))
            .collect();
        let sampler = VisibilitySampler::new(&self.config.run, self.ephemeris, self.sun);
        let mut triples = sampler.sample_all(&sampled, aois);
        for sat in satellites.iter().filter(|s| table_errors.contains_key(&s.id)) {
            let error = &table_errors[&sat.id];
            for sensor in sat.sensors.iter().filter(|s| !s.is_filtered()) {
                for aoi in aois {
                    triples.push(TripleVisibility {
                        key: TripleKey::new(&sat.id, &sensor.id, &aoi.id),
                        result: Err(error.clone()),
                    });
                }
            }
        }
        triples.sort_by(|a, b| a.key.cmp(&b.key));

        let mut visibility = Vec::new();
        for triple in &triples {
            match &triple.result {
                Ok(intervals) => visibility.extend(intervals.iter().cloned()),
                Err(e) if e.is_fatal() => return Err(e.clone()),
                Err(e) => {
                    if !table_errors.contains_key(&triple.key.satellite_id) {
                        failures.push(RunFailure {
                            stage: RunStage::Visibility,
                            satellite_id: triple.key.satellite_id.clone(),
                            triple: Some(triple.key.clone()),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
        ensure_valid(check_visibility(&visibility))?;
        log::info!(
            "Sampled {} triples: {} visibility intervals",
            triples.len(),
            visibility.len()
        );

        // Step 4-6: Candidates, optimization and re-validation per satellite
        let schedule_one = |(sat, table): &(&Satellite, &RevolutionTable)| {
            let own: Vec<VisibilityInterval> = visibility
                .iter()
                .filter(|v| v.satellite_id == sat.id)
                .cloned()
                .collect();
            let tracker = DutyCycleTracker::new(sat, table);
            let set = build_candidates(sat, &own, &aoi_index, table, &tracker, self.policy.as_ref());
            let result = self.optimizer.schedule(sat, set.candidates, &own, &tracker);
            (sat.id.clone(), result, set.unscored)
        };
        let outcomes: Vec<_> = if self.config.run.multithread {
            sampled.par_iter().map(schedule_one).collect()
        } else {
            sampled.iter().map(schedule_one).collect()
        };

        let mut schedules = Vec::new();
        let mut by_satellite: BTreeMap<String, SchedulerResult<SatelliteSchedule>> = BTreeMap::new();
        let mut unscored: BTreeSet<VisibilityInterval> = BTreeSet::new();
        for (sat_id, result, skipped) in outcomes {
            unscored.extend(skipped);
            match &result {
                Ok(schedule) => schedules.push(schedule.clone()),
                Err(e) if e.is_fatal() => return Err(e.clone()),
                Err(e) => failures.push(RunFailure {
                    stage: RunStage::Optimization,
                    satellite_id: sat_id.clone(),
                    triple: None,
                    message: e.to_string(),
                }),
            }
            by_satellite.insert(sat_id, result);
        }

        // Step 7: Report
        let report = build_report(&triples, &by_satellite, &unscored);
        let revolutions = tables
            .iter()
            .map(|(id, table)| (id.clone(), table.revolutions().to_vec()))
            .collect();

        log::info!(
            "Scheduled {} activities across {} satellites ({} failures), total score {:.3}",
            schedules.iter().map(|s| s.activities.len()).sum::<usize>(),
            schedules.len(),
            failures.len(),
            report.summary.total_score
        );

        Ok(ScheduleRun {
            visibility,
            revolutions,
            schedules,
            failures,
            report,
        })
    }
}
