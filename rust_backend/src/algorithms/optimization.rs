//! 0/1 selection problems and the solvers behind the [`Optimizer`] seam.
//!
//! A [`SelectionProblem`] is
//!
//! ```text
//! maximize    sum_j c_j x_j
//! subject to  sum_j a_ij x_j <= b_i    for every constraint i
//!             x_j in {0, 1}
//! ```
//!
//! with non-negative coefficients `a_ij`. That covers every constraint the
//! scheduler emits (mutual exclusion rows and duty-cycle knapsack rows).

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::{OptimizerSettings, SolverKind};
use crate::error::{SchedulerError, SchedulerResult, SolverFailure};

/// Relative slack used when checking a row against its bound.
const FEASIBILITY_EPS: f64 = 1.0e-9;

/// `sum(coef * x[var]) <= upper_bound`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub terms: Vec<(usize, f64)>,
    pub upper_bound: f64,
}

impl LinearConstraint {
    pub fn new(terms: Vec<(usize, f64)>, upper_bound: f64) -> Self {
        Self { terms, upper_bound }
    }

    /// At most one of `vars` may be selected.
    pub fn at_most_one(vars: impl IntoIterator<Item = usize>) -> Self {
        Self::new(vars.into_iter().map(|v| (v, 1.0)).collect(), 1.0)
    }

    fn slack(&self) -> f64 {
        FEASIBILITY_EPS * self.upper_bound.abs().max(1.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionProblem {
    pub objective: Vec<f64>,
    pub constraints: Vec<LinearConstraint>,
}

impl SelectionProblem {
    pub fn num_variables(&self) -> usize {
        self.objective.len()
    }

    /// Reject models the solvers cannot handle.
    ///
    /// # Returns
    /// * `Err(SolverFailure::ModelInvalid)` for non-finite values, negative
    ///   coefficients or out-of-range variable indices
    /// * `Err(SolverFailure::Infeasible)` when a bound is negative, since the
    ///   empty selection then already violates it
    pub fn validate(&self) -> Result<(), SolverFailure> {
        if let Some(j) = self.objective.iter().position(|c| !c.is_finite()) {
            return Err(SolverFailure::ModelInvalid(format!(
                "objective coefficient {} is not finite",
                j
            )));
        }
        for (i, row) in self.constraints.iter().enumerate() {
            if !row.upper_bound.is_finite() {
                return Err(SolverFailure::ModelInvalid(format!("row {} has a non-finite bound", i)));
            }
            for &(var, coef) in &row.terms {
                if var >= self.objective.len() {
                    return Err(SolverFailure::ModelInvalid(format!(
                        "row {} references unknown variable {}",
                        i, var
                    )));
                }
                if !(coef.is_finite() && coef >= 0.0) {
                    return Err(SolverFailure::ModelInvalid(format!(
                        "row {} has coefficient {} for variable {}",
                        i, coef, var
                    )));
                }
            }
            if row.upper_bound < -row.slack() {
                return Err(SolverFailure::Infeasible(format!(
                    "row {} has negative bound {}",
                    i, row.upper_bound
                )));
            }
        }
        Ok(())
    }

    /// Returns `true` if the selection satisfies every row.
    pub fn is_feasible(&self, selected: &[usize]) -> bool {
        let mut chosen = vec![false; self.objective.len()];
        for &j in selected {
            match chosen.get_mut(j) {
                Some(slot) => *slot = true,
                None => return false,
            }
        }
        self.constraints.iter().all(|row| {
            let lhs: f64 = row
                .terms
                .iter()
                .filter(|(var, _)| chosen[*var])
                .map(|(_, coef)| coef)
                .sum();
            lhs <= row.upper_bound + row.slack()
        })
    }

    pub fn objective_value(&self, selected: &[usize]) -> f64 {
        selected.iter().map(|&j| self.objective[j]).sum()
    }

    /// Rows touching each variable, as `(row, coefficient)`.
    fn rows_by_variable(&self) -> Vec<Vec<(usize, f64)>> {
        let mut by_var = vec![Vec::new(); self.objective.len()];
        for (i, row) in self.constraints.iter().enumerate() {
            for &(var, coef) in &row.terms {
                if coef > 0.0 {
                    by_var[var].push((i, coef));
                }
            }
        }
        by_var
    }
}

/// Budget handed to a solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveLimits {
    pub time_limit: Duration,
    pub node_limit: u64,
    /// Branches whose bound is within this fraction of the incumbent are
    /// pruned.
    pub relative_gap: f64,
}

impl SolveLimits {
    /// # Returns
    /// * `Err(SchedulerError::Configuration)` when the time limit does not fit in a [`Duration`]
    pub fn from_settings(settings: &OptimizerSettings) -> SchedulerResult<Self> {
        let time_limit = Duration::try_from_secs_f64(settings.time_limit_secs).map_err(|e| {
            SchedulerError::configuration(format!("optimizer.time_limit_secs: {}", e))
        })?;
        Ok(Self {
            time_limit,
            node_limit: settings.node_limit,
            relative_gap: settings.relative_gap,
        })
    }
}

/// Result of a successful solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Selected variable indices, ascending.
    pub solution: Vec<usize>,
    pub objective_value: f64,
    pub iterations: u64,
    /// `true` when the solver proved the selection optimal.
    pub converged: bool,
}

/// A 0/1 selection solver.
pub trait Optimizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, problem: &SelectionProblem, limits: &SolveLimits) -> Result<Selection, SolverFailure>;
}

/// Solver for the configured backend.
pub fn optimizer_for(kind: SolverKind) -> Box<dyn Optimizer> {
    match kind {
        SolverKind::BranchAndBound => Box::new(BranchAndBound),
        SolverKind::Greedy => Box::new(GreedyOptimizer),
    }
}

/// Highest-score-first feasible insertion.
///
/// Fast, deterministic, not exact.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyOptimizer;

impl Optimizer for GreedyOptimizer {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn solve(&self, problem: &SelectionProblem, limits: &SolveLimits) -> Result<Selection, SolverFailure> {
        problem.validate()?;
        Ok(greedy_schedule(problem, limits.node_limit))
    }
}

/// Greedy selection over a validated problem.
///
/// Considers variables by decreasing objective (ties by index) and keeps
/// each one that leaves every row within its bound. Stops after
/// `max_iterations` considered variables.
pub fn greedy_schedule(problem: &SelectionProblem, max_iterations: u64) -> Selection {
    let rows_by_var = problem.rows_by_variable();
    let mut load = vec![0.0; problem.constraints.len()];
    let mut selected: Vec<usize> = Vec::new();
    let mut iterations = 0;

    for j in order_by_objective(problem) {
        if iterations >= max_iterations {
            break;
        }
        iterations += 1;

        let fits = rows_by_var[j].iter().all(|&(row, coef)| {
            let c = &problem.constraints[row];
            load[row] + coef <= c.upper_bound + c.slack()
        });
        if fits {
            for &(row, coef) in &rows_by_var[j] {
                load[row] += coef;
            }
            selected.push(j);
        }
    }

    selected.sort_unstable();
    let objective_value = problem.objective_value(&selected);
    Selection {
        solution: selected,
        objective_value,
        iterations,
        converged: false,
    }
}

/// Positive-objective variables, best first, ties broken by index.
fn order_by_objective(problem: &SelectionProblem) -> Vec<usize> {
    let mut order: Vec<usize> = (0..problem.num_variables())
        .filter(|&j| problem.objective[j] > 0.0)
        .collect();
    order.sort_by(|&a, &b| {
        problem.objective[b]
            .total_cmp(&problem.objective[a])
            .then(a.cmp(&b))
    });
    order
}

/// Exact depth-first branch and bound.
///
/// Variables are split into independent components (no shared row); each
/// component is searched best-first with the greedy solution as initial
/// incumbent. A node is bounded by the smaller of the remaining objective sum
/// and, for every row of the component, the fractional-knapsack relaxation of
/// that row over the remaining variables.
///
/// Reaching the node or time limit stops the search and returns the best
/// selection found so far with `converged = false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchAndBound;

impl Optimizer for BranchAndBound {
    fn name(&self) -> &'static str {
        "branch_and_bound"
    }

    fn solve(&self, problem: &SelectionProblem, limits: &SolveLimits) -> Result<Selection, SolverFailure> {
        problem.validate()?;

        let rows_by_var = problem.rows_by_variable();
        let mut budget = SearchBudget {
            started: Instant::now(),
            limits: *limits,
            nodes: 0,
            exhausted: false,
        };

        let mut solution = Vec::new();
        for component in components(problem) {
            let mut search = ComponentSearch::new(problem, &rows_by_var, component, limits.relative_gap);
            solution.extend(search.run(&mut budget));
        }

        if budget.exhausted {
            log::warn!(
                "Branch and bound stopped after {} nodes ({} ms), keeping the best selection found",
                budget.nodes,
                budget.started.elapsed().as_millis()
            );
        }

        solution.sort_unstable();
        let objective_value = problem.objective_value(&solution);
        Ok(Selection {
            solution,
            objective_value,
            iterations: budget.nodes,
            converged: !budget.exhausted,
        })
    }
}

/// The node or time limit was reached.
#[derive(Debug)]
struct LimitReached;

struct SearchBudget {
    started: Instant,
    limits: SolveLimits,
    nodes: u64,
    exhausted: bool,
}

impl SearchBudget {
    fn tick(&mut self) -> Result<(), LimitReached> {
        if self.exhausted {
            return Err(LimitReached);
        }
        self.nodes += 1;
        let over_nodes = self.nodes > self.limits.node_limit;
        let over_time = self.nodes % 1024 == 0 && self.started.elapsed() > self.limits.time_limit;
        if over_nodes || over_time {
            self.exhausted = true;
            return Err(LimitReached);
        }
        Ok(())
    }
}

/// Groups of positive-objective variables linked through shared rows, each
/// ordered best first.
fn components(problem: &SelectionProblem) -> Vec<Vec<usize>> {
    let n = problem.num_variables();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for row in &problem.constraints {
        let mut vars = row.terms.iter().filter(|(_, c)| *c > 0.0).map(|(v, _)| *v);
        if let Some(first) = vars.next() {
            for other in vars {
                let (a, b) = (find(&mut parent, first), find(&mut parent, other));
                if a != b {
                    parent[a.max(b)] = a.min(b);
                }
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for j in order_by_objective(problem) {
        let root = find(&mut parent, j);
        groups.entry(root).or_default().push(j);
    }
    groups.into_values().collect()
}

/// One row of a component seen as a knapsack.
struct RowRelaxation {
    row: usize,
    /// `(position in the search order, coefficient, objective)`, best
    /// objective per unit of coefficient first.
    items: Vec<(usize, f64, f64)>,
}

impl RowRelaxation {
    /// Dantzig bound on the objective of the row's variables at positions
    /// `k..`, given the capacity left in the row.
    ///
    /// Returns `(objective of those variables, relaxed objective)`.
    fn bound(&self, k: usize, capacity: f64) -> (f64, f64) {
        let mut capacity = capacity.max(0.0);
        let mut total = 0.0;
        let mut relaxed = 0.0;
        let mut filling = true;
        for &(pos, coef, objective) in &self.items {
            if pos < k {
                continue;
            }
            total += objective;
            if filling {
                if coef <= capacity {
                    relaxed += objective;
                    capacity -= coef;
                } else {
                    relaxed += objective * capacity / coef;
                    filling = false;
                }
            }
        }
        (total, relaxed)
    }
}

struct ComponentSearch<'a> {
    problem: &'a SelectionProblem,
    rows_by_var: &'a [Vec<(usize, f64)>],
    order: Vec<usize>,
    /// `suffix[k]` = sum of objective over `order[k..]`
    suffix: Vec<f64>,
    relaxations: Vec<RowRelaxation>,
    relative_gap: f64,
    load: Vec<f64>,
    current: Vec<usize>,
    current_value: f64,
    best: Vec<usize>,
    best_value: f64,
}

impl<'a> ComponentSearch<'a> {
    fn new(
        problem: &'a SelectionProblem,
        rows_by_var: &'a [Vec<(usize, f64)>],
        order: Vec<usize>,
        relative_gap: f64,
    ) -> Self {
        let mut suffix = vec![0.0; order.len() + 1];
        for k in (0..order.len()).rev() {
            suffix[k] = suffix[k + 1] + problem.objective[order[k]];
        }

        let mut by_row: BTreeMap<usize, Vec<(usize, f64, f64)>> = BTreeMap::new();
        for (pos, &j) in order.iter().enumerate() {
            for &(row, coef) in &rows_by_var[j] {
                by_row.entry(row).or_default().push((pos, coef, problem.objective[j]));
            }
        }
        let relaxations = by_row
            .into_iter()
            .filter(|(row, items)| {
                // rows the component can never fill do not bound anything
                let c = &problem.constraints[*row];
                items.iter().map(|(_, coef, _)| coef).sum::<f64>() > c.upper_bound + c.slack()
            })
            .map(|(row, mut items)| {
                items.sort_by(|a, b| (b.2 / b.1).total_cmp(&(a.2 / a.1)).then(a.0.cmp(&b.0)));
                RowRelaxation { row, items }
            })
            .collect();

        Self {
            problem,
            rows_by_var,
            order,
            suffix,
            relaxations,
            relative_gap,
            load: vec![0.0; problem.constraints.len()],
            current: Vec::new(),
            current_value: 0.0,
            best: Vec::new(),
            best_value: 0.0,
        }
    }

    fn run(&mut self, budget: &mut SearchBudget) -> Vec<usize> {
        self.seed_with_greedy();
        if self.branch(0, budget).is_err() {
            log::debug!(
                "Search limit reached in a component of {} variables, incumbent {:.3}",
                self.order.len(),
                self.best_value
            );
        }
        std::mem::take(&mut self.best)
    }

    fn seed_with_greedy(&mut self) {
        let mut load = vec![0.0; self.problem.constraints.len()];
        for &j in &self.order {
            if self.fits_with(&load, j) {
                for &(row, coef) in &self.rows_by_var[j] {
                    load[row] += coef;
                }
                self.best.push(j);
                self.best_value += self.problem.objective[j];
            }
        }
    }

    fn fits_with(&self, load: &[f64], j: usize) -> bool {
        self.rows_by_var[j].iter().all(|&(row, coef)| {
            let c = &self.problem.constraints[row];
            load[row] + coef <= c.upper_bound + c.slack()
        })
    }

    /// Smallest value a branch must exceed to be worth exploring.
    fn prune_threshold(&self) -> f64 {
        let scale = self.best_value.abs();
        self.best_value + (FEASIBILITY_EPS * scale.max(1.0)).max(self.relative_gap * scale)
    }

    /// Upper bound on any completion of the current node at depth `k`.
    fn bound(&self, k: usize, threshold: f64) -> f64 {
        let mut bound = self.current_value + self.suffix[k];
        for relaxation in &self.relaxations {
            if bound <= threshold {
                break;
            }
            let c = &self.problem.constraints[relaxation.row];
            let capacity = c.upper_bound + c.slack() - self.load[relaxation.row];
            let (in_row, relaxed) = relaxation.bound(k, capacity);
            bound = bound.min(self.current_value + self.suffix[k] - in_row + relaxed);
        }
        bound
    }

    fn branch(&mut self, k: usize, budget: &mut SearchBudget) -> Result<(), LimitReached> {
        budget.tick()?;

        if self.current_value > self.best_value {
            self.best_value = self.current_value;
            self.best = self.current.clone();
        }
        if k == self.order.len() {
            return Ok(());
        }
        let threshold = self.prune_threshold();
        if self.bound(k, threshold) <= threshold {
            return Ok(());
        }

        let j = self.order[k];
        if self.fits_with(&self.load, j) {
            for &(row, coef) in &self.rows_by_var[j] {
                self.load[row] += coef;
            }
            self.current.push(j);
            self.current_value += self.problem.objective[j];

            let result = self.branch(k + 1, budget);

            self.current_value -= self.problem.objective[j];
            self.current.pop();
            for &(row, coef) in &self.rows_by_var[j] {
                self.load[row] -= coef;
            }
            result?;
        }

        self.branch(k + 1, budget)
    }
}
