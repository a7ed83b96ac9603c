//! Closed time intervals and interval-list operations.

use chrono::{DateTime, TimeDelta, Utc};
use qtty::Seconds;
use serde::{Deserialize, Serialize};

/// Error raised when an interval would be empty or reversed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid interval: stop {stop} is not after start {start}")]
pub struct IntervalError {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}

/// A time span `[start, stop]` with `stop > start`.
///
/// Intervals are immutable once constructed; every operation returns a new
/// value. Ordering is by start, then stop.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use satsched_rust::time::TimeInterval;
///
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let stop = Utc.with_ymd_and_hms(2024, 1, 1, 0, 10, 0).unwrap();
/// let interval = TimeInterval::new(start, stop).unwrap();
/// assert_eq!(interval.duration().value(), 600.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawInterval", into = "RawInterval")]
pub struct TimeInterval {
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct RawInterval {
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
}

impl TryFrom<RawInterval> for TimeInterval {
    type Error = IntervalError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        TimeInterval::new(raw.start, raw.stop)
    }
}

impl From<TimeInterval> for RawInterval {
    fn from(interval: TimeInterval) -> Self {
        RawInterval {
            start: interval.start,
            stop: interval.stop,
        }
    }
}

impl TimeInterval {
    /// Creates a new interval, rejecting empty or reversed spans.
    pub fn new(start: DateTime<Utc>, stop: DateTime<Utc>) -> Result<Self, IntervalError> {
        if stop > start {
            Ok(Self { start, stop })
        } else {
            Err(IntervalError { start, stop })
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn stop(&self) -> DateTime<Utc> {
        self.stop
    }

    /// Length of the interval.
    pub fn duration(&self) -> Seconds {
        seconds_between(self.start, self.stop)
    }

    pub fn midpoint(&self) -> DateTime<Utc> {
        self.start + (self.stop - self.start) / 2
    }

    /// Returns `true` if `t` lies within the closed interval.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.stop
    }

    /// Returns `true` if `other` is a subset of this interval.
    pub fn contains_interval(&self, other: &TimeInterval) -> bool {
        self.start <= other.start && other.stop <= self.stop
    }

    /// Returns `true` if the two intervals share a span of positive length.
    ///
    /// Intervals that only touch at an endpoint do not overlap.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.stop && other.start < self.stop
    }

    /// Union of two intervals when they overlap or are separated by no more
    /// than `tolerance`.
    pub fn union_if_adjacent(&self, other: &TimeInterval, tolerance: Seconds) -> Option<TimeInterval> {
        let (first, second) = if self.start <= other.start {
            (self, other)
        } else {
            (other, self)
        };
        let gap = seconds_between(first.stop, second.start);
        if gap.value() <= tolerance.value() {
            Some(TimeInterval {
                start: first.start,
                stop: first.stop.max(second.stop),
            })
        } else {
            None
        }
    }

    /// Sub-interval of length `length` starting at `offset` seconds after the
    /// start, clipped to this interval.
    pub fn window(&self, offset: Seconds, length: Seconds) -> Option<TimeInterval> {
        let start = shift(self.start, offset);
        let stop = shift(start, length).min(self.stop);
        TimeInterval::new(start.max(self.start), stop).ok()
    }
}

/// Signed number of seconds from `a` to `b`, with nanosecond resolution.
pub fn seconds_between(a: DateTime<Utc>, b: DateTime<Utc>) -> Seconds {
    let delta = b - a;
    let secs = delta.num_seconds() as f64 + delta.subsec_nanos() as f64 * 1.0e-9;
    Seconds::new(secs)
}

/// Instant `t + secs`, rounded to the nearest nanosecond.
pub fn shift(t: DateTime<Utc>, secs: Seconds) -> DateTime<Utc> {
    t + TimeDelta::nanoseconds((secs.value() * 1.0e9).round() as i64)
}

/// Sort and merge intervals that overlap or sit within `tolerance` of each
/// other.
///
/// The result is pairwise disjoint and ascending by start.
pub fn merge_intervals(mut intervals: Vec<TimeInterval>, tolerance: Seconds) -> Vec<TimeInterval> {
    intervals.sort();

    let mut merged: Vec<TimeInterval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        if let Some(last) = merged.last_mut() {
            if let Some(joined) = last.union_if_adjacent(&interval, tolerance) {
                *last = joined;
                continue;
            }
        }
        merged.push(interval);
    }

    merged
}
