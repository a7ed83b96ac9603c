//! Scheduler/optimizer adapter.
//!
//! Turns one satellite's candidate activities into a [`SelectionProblem`]:
//!
//! - one binary variable per candidate, weighted by its score;
//! - per sensor, one "at most one" row per maximal set of mutually
//!   overlapping candidates (a clique of the interval graph);
//! - per (sensor, revolution), one knapsack row capping the selected
//!   duration at the duty-cycle budget, emitted only when it can bind;
//! - per visibility interval cut into several windows, one "at most one" row.
//!
//! The selected candidates become [`ScheduledActivity`] records, which are
//! re-validated before they are returned.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::algorithms::{optimizer_for, LinearConstraint, Optimizer, Selection, SelectionProblem, SolveLimits};
use crate::config::OptimizerSettings;
use crate::error::{SchedulerError, SchedulerResult, SolverDiagnostics, SolverFailure};
use crate::models::{CandidateActivity, Satellite, ScheduledActivity, VisibilityInterval};
use crate::services::duty_cycle::{DutyCycleTracker, BUDGET_TOLERANCE_SECS};
use crate::services::validation::{check_schedule, ensure_valid};

/// Deep searches recurse once per variable.
const SOLVER_STACK_BYTES: usize = 64 * 1024 * 1024;

/// Optimization model of one satellite.
#[derive(Debug, Clone)]
pub struct ScheduleModel {
    pub candidates: Vec<CandidateActivity>,
    pub problem: SelectionProblem,
    pub diagnostics: SolverDiagnostics,
}

/// Committed schedule of one satellite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteSchedule {
    pub satellite_id: String,
    /// Sorted by sensor, then start time.
    pub activities: Vec<ScheduledActivity>,
    pub objective_value: f64,
    pub solver: String,
    pub proven_optimal: bool,
    pub diagnostics: SolverDiagnostics,
}

impl SatelliteSchedule {
    pub fn total_score(&self) -> f64 {
        self.activities.iter().map(|a| a.score).sum()
    }
}

/// Build the selection model for one satellite.
pub fn build_model(satellite: &Satellite, candidates: Vec<CandidateActivity>, tracker: &DutyCycleTracker) -> ScheduleModel {
    let objective: Vec<f64> = candidates.iter().map(|c| c.score).collect();
    let mut constraints = Vec::new();

    let mut by_sensor: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    let mut by_budget: BTreeMap<(&str, usize), Vec<usize>> = BTreeMap::new();
    let mut by_group: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, c) in candidates.iter().enumerate() {
        by_sensor.entry(c.source.sensor_id.as_str()).or_default().push(i);
        by_budget
            .entry((c.source.sensor_id.as_str(), c.revolution_index))
            .or_default()
            .push(i);
        by_group.entry(c.group).or_default().push(i);
    }

    let mut exclusive = 0;
    for members in by_group.values().filter(|m| m.len() > 1) {
        constraints.push(LinearConstraint::at_most_one(members.iter().copied()));
        exclusive += 1;
    }

    let mut overlap = 0;
    for members in by_sensor.values() {
        for clique in overlap_cliques(&candidates, members) {
            let first_group = candidates[clique[0]].group;
            if clique.iter().all(|&i| candidates[i].group == first_group) {
                // already covered by the group row
                continue;
            }
            constraints.push(LinearConstraint::at_most_one(clique));
            overlap += 1;
        }
    }

    let mut duty_cycle = 0;
    for (&(sensor_id, revolution), members) in &by_budget {
        let budget = tracker
            .budget(sensor_id, revolution)
            .map_or(0.0, |b| b.value());
        let demand: f64 = members.iter().map(|&i| candidates[i].duration().value()).sum();
        if demand <= budget + BUDGET_TOLERANCE_SECS {
            continue;
        }
        let terms = members
            .iter()
            .map(|&i| (i, candidates[i].duration().value()))
            .collect();
        constraints.push(LinearConstraint::new(terms, budget));
        duty_cycle += 1;
    }

    let diagnostics = SolverDiagnostics {
        sensor_ids: satellite.sensors.iter().map(|s| s.id.clone()).collect(),
        variables: candidates.len(),
        overlap_constraints: overlap,
        duty_cycle_constraints: duty_cycle,
        exclusive_constraints: exclusive,
    };

    ScheduleModel {
        candidates,
        problem: SelectionProblem {
            objective,
            constraints,
        },
        diagnostics,
    }
}

/// Maximal sets of candidates (among `members`) sharing an instant.
///
/// Candidates that only touch at an endpoint do not overlap.
fn overlap_cliques(candidates: &[CandidateActivity], members: &[usize]) -> Vec<Vec<usize>> {
    // (time, 0 = stop / 1 = start, candidate): stops sort before starts at equal times
    let mut events: Vec<_> = members
        .iter()
        .flat_map(|&i| {
            let interval = candidates[i].interval;
            [(interval.start(), 1u8, i), (interval.stop(), 0u8, i)]
        })
        .collect();
    events.sort();

    let mut active: BTreeSet<usize> = BTreeSet::new();
    let mut grew = false;
    let mut cliques = Vec::new();
    for (_, kind, i) in events {
        if kind == 1 {
            active.insert(i);
            grew = true;
        } else {
            if grew && active.len() > 1 {
                cliques.push(active.iter().copied().collect());
            }
            grew = false;
            active.remove(&i);
        }
    }
    cliques
}

/// Run `optimizer` on its own thread and give up after the time limit plus
/// `grace`.
///
/// The solver call is not cancelable: on timeout the worker thread is left
/// to finish in the background and its result is discarded.
pub fn solve_with_deadline(
    optimizer: Arc<dyn Optimizer>,
    problem: SelectionProblem,
    limits: SolveLimits,
    grace: Duration,
) -> Result<Selection, SolverFailure> {
    let (tx, rx) = mpsc::channel();
    let started = Instant::now();

    thread::Builder::new()
        .name(format!("solver-{}", optimizer.name()))
        .stack_size(SOLVER_STACK_BYTES)
        .spawn(move || {
            // the receiver may already have given up
            let _ = tx.send(optimizer.solve(&problem, &limits));
        })
        .map_err(|e| SolverFailure::Internal(format!("failed to spawn solver thread: {}", e)))?;

    // an unrepresentable deadline waits for the solver's own limits
    let deadline = limits.time_limit.checked_add(grace).unwrap_or(Duration::MAX);
    match rx.recv_timeout(deadline) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            log::warn!("Abandoning solver after {:?}", started.elapsed());
            Err(SolverFailure::Timeout {
                nodes: 0,
                elapsed_ms: started.elapsed().as_millis(),
            })
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(SolverFailure::Internal(
            "solver thread exited without a result".to_string(),
        )),
    }
}

/// Per-satellite schedule optimizer.
#[derive(Clone)]
pub struct ScheduleOptimizer {
    optimizer: Arc<dyn Optimizer>,
    limits: SolveLimits,
    grace: Duration,
}

impl ScheduleOptimizer {
    /// # Returns
    /// * `Err(SchedulerError::Configuration)` when a limit does not fit in a [`Duration`]
    pub fn from_settings(settings: &OptimizerSettings) -> SchedulerResult<Self> {
        let grace = Duration::try_from_secs_f64(settings.grace_secs)
            .map_err(|e| SchedulerError::configuration(format!("optimizer.grace_secs: {}", e)))?;
        Ok(Self {
            optimizer: Arc::from(optimizer_for(settings.solver)),
            limits: SolveLimits::from_settings(settings)?,
            grace,
        })
    }

    pub fn with_optimizer(optimizer: Arc<dyn Optimizer>, limits: SolveLimits, grace: Duration) -> Self {
        Self {
            optimizer,
            limits,
            grace,
        }
    }

    pub fn solver_name(&self) -> &'static str {
        self.optimizer.name()
    }

    /// Select the best feasible subset of a satellite's candidates.
    ///
    /// # Arguments
    /// * `satellite` - The satellite being scheduled
    /// * `candidates` - Scored candidates of that satellite
    /// * `visibility` - The satellite's visibility intervals, for re-validation
    /// * `tracker` - Duty-cycle budgets of the satellite
    ///
    /// # Returns
    /// * `Err(SchedulerError::SolverFailure)` when the solver fails, with the model size
    /// * `Err(SchedulerError::InvariantViolation)` when the extracted schedule breaks an invariant
    pub fn schedule(
        &self,
        satellite: &Satellite,
        candidates: Vec<CandidateActivity>,
        visibility: &[VisibilityInterval],
        tracker: &DutyCycleTracker,
    ) -> SchedulerResult<SatelliteSchedule> {
        let model = build_model(satellite, candidates, tracker);
        log::debug!("Satellite {} model: {}", satellite.id, model.diagnostics);

        let selection = if model.candidates.is_empty() {
            Selection {
                solution: Vec::new(),
                objective_value: 0.0,
                iterations: 0,
                converged: true,
            }
        } else {
            solve_with_deadline(
                Arc::clone(&self.optimizer),
                model.problem.clone(),
                self.limits,
                self.grace,
            )
            .map_err(|failure| {
                log::error!(
                    "Solver {} failed for satellite {} ({}): {}",
                    self.optimizer.name(),
                    satellite.id,
                    model.diagnostics,
                    failure
                );
                SchedulerError::SolverFailure {
                    satellite_id: satellite.id.clone(),
                    failure,
                    context: model.diagnostics.clone(),
                }
            })?
        };

        if !model.problem.is_feasible(&selection.solution) {
            return Err(SchedulerError::InvariantViolation(format!(
                "solver {} returned an infeasible selection for satellite {}",
                self.optimizer.name(),
                satellite.id
            )));
        }

        let mut activities: Vec<ScheduledActivity> = selection
            .solution
            .iter()
            .map(|&i| ScheduledActivity::from(&model.candidates[i]))
            .collect();
        activities.sort_by(|a, b| {
            (a.sensor_id.as_str(), a.interval, a.aoi_id.as_str())
                .cmp(&(b.sensor_id.as_str(), b.interval, b.aoi_id.as_str()))
        });

        ensure_valid(check_schedule(&activities, visibility, tracker))?;

        if !selection.converged {
            log::warn!(
                "Satellite {}: solver {} stopped at its limits, keeping a feasible selection",
                satellite.id,
                self.optimizer.name()
            );
        }

        log::info!(
            "Satellite {}: solver {} selected {} of {} candidates, objective {:.3}{}",
            satellite.id,
            self.optimizer.name(),
            activities.len(),
            model.candidates.len(),
            selection.objective_value,
            if selection.converged { " (optimal)" } else { "" }
        );

        Ok(SatelliteSchedule {
            satellite_id: satellite.id.clone(),
            activities,
            objective_value: selection.objective_value,
            solver: self.optimizer.name().to_string(),
            proven_optimal: selection.converged,
            diagnostics: model.diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::BranchAndBound;
    use crate::config::{SatelliteSettings, SensorSettings};
    use crate::services::duty_cycle::RevolutionTable;
    use crate::time::TimeInterval;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn ivl(a: i64, b: i64) -> TimeInterval {
        TimeInterval::new(t(a), t(b)).unwrap()
    }

    fn vis(aoi: &str, a: i64, b: i64) -> VisibilityInterval {
        VisibilityInterval {
            satellite_id: "sat".into(),
            sensor_id: "cam".into(),
            aoi_id: aoi.into(),
            interval: ivl(a, b),
            revolution_index: 0,
        }
    }

    fn candidate(v: &VisibilityInterval, group: usize, score: f64) -> CandidateActivity {
        CandidateActivity {
            source: v.clone(),
            interval: v.interval,
            revolution_index: v.revolution_index,
            score,
            group,
        }
    }

    fn setup(duty: f64) -> (Satellite, DutyCycleTracker) {
        let settings = SatelliteSettings {
            sensors: vec![SensorSettings::nadir("cam", duty)],
            ..Default::default()
        };
        let sat = Satellite::from_settings("sat", &settings).unwrap();
        let table = RevolutionTable::build("sat", &ivl(0, 1000), &[]).unwrap();
        let tracker = DutyCycleTracker::new(&sat, &table);
        (sat, tracker)
    }

    fn optimizer() -> ScheduleOptimizer {
        ScheduleOptimizer::with_optimizer(
            Arc::new(BranchAndBound),
            SolveLimits {
                time_limit: Duration::from_secs(5),
                node_limit: 100_000,
                relative_gap: 0.0,
            },
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_overlap_cliques() {
        let v = [vis("a", 0, 100), vis("b", 50, 150), vis("c", 60, 70), vis("d", 150, 200)];
        let candidates: Vec<_> = v.iter().enumerate().map(|(g, v)| candidate(v, g, 1.0)).collect();
        let cliques = overlap_cliques(&candidates, &[0, 1, 2, 3]);
        // d only touches b
        assert_eq!(cliques, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_model_emits_binding_rows_only() {
        let (sat, tracker) = setup(0.1);
        let v = [vis("a", 0, 60), vis("b", 100, 160)];
        let candidates: Vec<_> = v.iter().enumerate().map(|(g, v)| candidate(v, g, 1.0)).collect();
        let model = build_model(&sat, candidates, &tracker);
        assert_eq!(model.diagnostics.overlap_constraints, 0);
        assert_eq!(model.diagnostics.exclusive_constraints, 0);
        // 120 s of demand against a 100 s budget
        assert_eq!(model.diagnostics.duty_cycle_constraints, 1);

        let (sat, tracker) = setup(0.5);
        let candidates: Vec<_> = v.iter().enumerate().map(|(g, v)| candidate(v, g, 1.0)).collect();
        let model = build_model(&sat, candidates, &tracker);
        assert_eq!(model.diagnostics.duty_cycle_constraints, 0);
    }

    #[test]
    fn test_overlapping_candidates_one_selected() {
        let (sat, tracker) = setup(1.0);
        let v = vec![vis("a", 0, 100), vis("b", 50, 120)];
        let candidates: Vec<_> = v.iter().enumerate().map(|(g, v)| candidate(v, g, v.interval.duration().value())).collect();
        let schedule = optimizer().schedule(&sat, candidates, &v, &tracker).unwrap();
        assert_eq!(schedule.activities.len(), 1);
        assert_eq!(schedule.activities[0].aoi_id, "a");
        assert!(schedule.proven_optimal);
    }

    #[test]
    fn test_empty_candidates_empty_schedule() {
        let (sat, tracker) = setup(1.0);
        let schedule = optimizer().schedule(&sat, Vec::new(), &[], &tracker).unwrap();
        assert!(schedule.activities.is_empty());
        assert_eq!(schedule.objective_value, 0.0);
    }

    #[test]
    fn test_forty_passes_sharing_budget_with_default_settings() {
        let settings = SatelliteSettings {
            sensors: vec![SensorSettings::nadir("cam", 0.1)],
            ..Default::default()
        };
        let sat = Satellite::from_settings("sat", &settings).unwrap();
        let table = RevolutionTable::build("sat", &ivl(0, 5400), &[]).unwrap();
        let tracker = DutyCycleTracker::new(&sat, &table);

        let v: Vec<_> = (0..40i64)
            .map(|j| vis(&format!("aoi-{}", j), j * 130, j * 130 + 30 + (j * 37) % 41))
            .collect();
        let candidates: Vec<_> = v
            .iter()
            .enumerate()
            .map(|(g, v)| candidate(v, g, v.interval.duration().value()))
            .collect();

        let exact = ScheduleOptimizer::from_settings(&OptimizerSettings::default())
            .unwrap()
            .schedule(&sat, candidates.clone(), &v, &tracker)
            .unwrap();
        let greedy = ScheduleOptimizer::from_settings(&OptimizerSettings {
            solver: crate::config::SolverKind::Greedy,
            ..Default::default()
        })
        .unwrap()
        .schedule(&sat, candidates, &v, &tracker)
        .unwrap();

        assert_eq!(exact.diagnostics.duty_cycle_constraints, 1);
        assert!(exact.objective_value >= greedy.objective_value);
        assert!(exact.objective_value <= 540.0 + 1e-6);
        assert!(exact.proven_optimal);
    }

    #[test]
    fn test_unrepresentable_grace_rejected() {
        let settings = OptimizerSettings {
            grace_secs: 1.0e30,
            ..Default::default()
        };
        assert!(matches!(
            ScheduleOptimizer::from_settings(&settings),
            Err(SchedulerError::Configuration(_))
        ));
    }

    #[test]
    fn test_solver_failure_carries_diagnostics() {
        struct Broken;
        impl Optimizer for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn solve(&self, _: &SelectionProblem, _: &SolveLimits) -> Result<Selection, SolverFailure> {
                Err(SolverFailure::Internal("boom".into()))
            }
        }

        let (sat, tracker) = setup(1.0);
        let v = vec![vis("a", 0, 100)];
        let candidates = vec![candidate(&v[0], 0, 1.0)];
        let opt = ScheduleOptimizer::with_optimizer(
            Arc::new(Broken),
            SolveLimits {
                time_limit: Duration::from_secs(1),
                node_limit: 10,
                relative_gap: 0.0,
            },
            Duration::from_secs(1),
        );
        match opt.schedule(&sat, candidates, &v, &tracker) {
            Err(SchedulerError::SolverFailure { satellite_id, context, .. }) => {
                assert_eq!(satellite_id, "sat");
                assert_eq!(context.variables, 1);
                assert_eq!(context.sensor_ids, vec!["cam".to_string()]);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_hung_solver_times_out() {
        struct Sleepy;
        impl Optimizer for Sleepy {
            fn name(&self) -> &'static str {
                "sleepy"
            }
            fn solve(&self, _: &SelectionProblem, _: &SolveLimits) -> Result<Selection, SolverFailure> {
                thread::sleep(Duration::from_secs(2));
                Err(SolverFailure::Internal("late".into()))
            }
        }

        let result = solve_with_deadline(
            Arc::new(Sleepy),
            SelectionProblem::default(),
            SolveLimits {
                time_limit: Duration::from_millis(50),
                node_limit: 10,
                relative_gap: 0.0,
            },
            Duration::from_millis(50),
        );
        assert!(matches!(result, Err(SolverFailure::Timeout { .. })));
    }
}
