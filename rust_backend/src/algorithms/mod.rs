//! Solver backends for the schedule optimizer.
//!
//! # Components
//!
//! - [`optimization`]: 0/1 selection model, the [`Optimizer`] trait, an exact
//!   branch-and-bound solver and a greedy solver
//!
//! # Example
//!
//! ```
//! use satsched_rust::algorithms::{BranchAndBound, LinearConstraint, Optimizer, SelectionProblem, SolveLimits};
//! use std::time::Duration;
//!
//! let problem = SelectionProblem {
//!     objective: vec![3.0, 2.0, 2.0],
//!     constraints: vec![LinearConstraint::new(vec![(0, 2.0), (1, 1.0), (2, 1.0)], 2.0)],
//! };
//! let limits = SolveLimits { time_limit: Duration::from_secs(1), node_limit: 1_000, relative_gap: 0.0 };
//! let selection = BranchAndBound.solve(&problem, &limits).unwrap();
//! assert_eq!(selection.objective_value, 4.0);
//! ```

pub mod optimization;

pub use optimization::{
    greedy_schedule, optimizer_for, BranchAndBound, GreedyOptimizer, LinearConstraint, Optimizer,
    Selection, SelectionProblem, SolveLimits,
};
