//! Revolution boundaries derived from the ephemeris.
//!
//! Node crossings are sign changes of the ECEF z position; the north and
//! south points are sign changes of the z velocity. Each crossing is found
//! with the same scan-and-bisect search the visibility sampler uses.

use chrono::{DateTime, Utc};

use super::{EphemerisProvider, RevolutionEvents};
use crate::config::{RevBoundary, RunSettings};
use crate::error::SchedulerResult;
use crate::services::sampler::{scan, ScanSettings};
use crate::time::TimeInterval;

/// [`RevolutionEvents`] computed from an [`EphemerisProvider`].
pub struct EphemerisRevolutionEvents<'a> {
    ephemeris: &'a dyn EphemerisProvider,
    settings: ScanSettings,
}

impl<'a> EphemerisRevolutionEvents<'a> {
    /// Uses the run's step and refinement settings for the event search.
    ///
    /// The step must stay well below half an orbital period or crossings
    /// will be missed.
    pub fn new(ephemeris: &'a dyn EphemerisProvider, run: &RunSettings) -> Self {
        Self {
            ephemeris,
            settings: ScanSettings::from(run),
        }
    }
}

impl RevolutionEvents for EphemerisRevolutionEvents<'_> {
    fn boundaries(
        &self,
        satellite_id: &str,
        kind: RevBoundary,
        window: &TimeInterval,
    ) -> SchedulerResult<Vec<DateTime<Utc>>> {
        // each boundary kind is a rising or falling edge of a sign test
        let (rising, test): (bool, fn(&super::SpacecraftState) -> bool) = match kind {
            RevBoundary::Ascending => (true, |s| s.position.z >= 0.0),
            RevBoundary::Descending => (false, |s| s.position.z >= 0.0),
            RevBoundary::NorthPoint => (false, |s| s.velocity.z >= 0.0),
            RevBoundary::SouthPoint => (true, |s| s.velocity.z >= 0.0),
        };

        let scan = scan(window, &self.settings, |t| {
            self.ephemeris.state(satellite_id, t).map(|s| test(&s))
        })?;

        Ok(scan
            .edges
            .iter()
            .filter(|edge| edge.rising == rising)
            .map(|edge| edge.after)
            .collect())
    }
}
