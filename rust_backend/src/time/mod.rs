//! Time primitives shared by the sampler, the duty-cycle tracker and the
//! scheduler.

pub mod interval;

pub use interval::{merge_intervals, seconds_between, shift, IntervalError, TimeInterval};
