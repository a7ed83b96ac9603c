//! Candidate activity generation.
//!
//! Each visibility interval is offered to the optimizer either whole or, when
//! it is longer than the sensor may dwell in one go, as a set of windows of
//! the allowed length. The windows cut from one interval form an exclusive
//! group: at most one of them is ever scheduled.

use std::collections::BTreeMap;

use qtty::Seconds;

use crate::models::{AreaOfInterest, CandidateActivity, Satellite, VisibilityInterval};
use crate::services::duty_cycle::{DutyCycleTracker, RevolutionTable};
use crate::services::scoring::ScorePolicy;
use crate::time::TimeInterval;

/// Upper bound on windows cut from a single visibility interval.
pub const MAX_WINDOWS_PER_INTERVAL: usize = 32;

/// Candidates for one satellite plus the intervals that produced none.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub candidates: Vec<CandidateActivity>,
    /// Intervals whose score was not strictly positive.
    pub unscored: Vec<VisibilityInterval>,
    /// Intervals whose sensor has no budget left in their revolution.
    pub no_budget: Vec<VisibilityInterval>,
}

/// Build scored candidates for one satellite.
///
/// # Arguments
/// * `satellite` - The satellite whose visibility intervals are given
/// * `visibility` - Visibility intervals of that satellite
/// * `aois` - AOIs by id
/// * `table` - The satellite's revolutions
/// * `tracker` - Budgets used to cap window length
/// * `policy` - Scoring policy
pub fn build_candidates(
    satellite: &Satellite,
    visibility: &[VisibilityInterval],
    aois: &BTreeMap<&str, &AreaOfInterest>,
    table: &RevolutionTable,
    tracker: &DutyCycleTracker,
    policy: &dyn ScorePolicy,
) -> CandidateSet {
    let mut set = CandidateSet::default();

    for (group, vis) in visibility.iter().enumerate() {
        let (Some(sensor), Some(aoi)) = (satellite.sensor(&vis.sensor_id), aois.get(vis.aoi_id.as_str())) else {
            log::warn!(
                "Skipping visibility interval with unknown sensor {} or AOI {}",
                vis.sensor_id,
                vis.aoi_id
            );
            continue;
        };

        let budget = tracker
            .budget(&sensor.id, vis.revolution_index)
            .unwrap_or(Seconds::new(0.0));
        let length = match sensor.max_dwell {
            Some(dwell) => dwell.min(budget),
            None => budget,
        };
        if length.value() <= 0.0 {
            set.no_budget.push(vis.clone());
            continue;
        }

        let windows = cut_windows(&vis.interval, length);
        let mut scored = Vec::with_capacity(windows.len());
        for interval in windows {
            let score = policy.score(aoi, interval.duration());
            if !(score.is_finite() && score > 0.0) {
                continue;
            }
            let revolution_index = table
                .index_of(interval.midpoint())
                .unwrap_or(vis.revolution_index);
            scored.push(CandidateActivity {
                source: vis.clone(),
                interval,
                revolution_index,
                score,
                group,
            });
        }

        if scored.is_empty() {
            set.unscored.push(vis.clone());
        } else {
            set.candidates.extend(scored);
        }
    }

    log::debug!(
        "Satellite {}: {} candidates from {} visibility intervals ({} unscored, {} without budget)",
        satellite.id,
        set.candidates.len(),
        visibility.len(),
        set.unscored.len(),
        set.no_budget.len()
    );

    set
}

/// Cut `interval` into windows no longer than `length`.
///
/// Returns the interval itself when it fits. Otherwise the windows have
/// exactly `length`, the first starts at the interval start, the last ends at
/// the interval stop and the rest are evenly spaced in between.
pub fn cut_windows(interval: &TimeInterval, length: Seconds) -> Vec<TimeInterval> {
    let total = interval.duration();
    if total <= length {
        return vec![*interval];
    }

    let count = ((total.value() / length.value()).ceil() as usize + 1).clamp(2, MAX_WINDOWS_PER_INTERVAL);
    let slack = total - length;
    (0..count)
        .filter_map(|k| {
            let offset = slack * (k as f64 / (count - 1) as f64);
            interval.window(offset, length)
        })
        .collect()
}
