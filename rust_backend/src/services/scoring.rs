//! Scoring policies.
//!
//! A policy maps an AOI and an activity duration to a weight. Policies must
//! be deterministic, return zero for a zero duration and grow strictly with
//! duration whenever the AOI weight is positive.

use std::collections::BTreeMap;

use qtty::Seconds;

use crate::config::ScoreSettings;
use crate::error::SchedulerResult;
use crate::geometry::GeoPolygon;
use crate::models::AreaOfInterest;

/// Pluggable scoring policy.
pub trait ScorePolicy: Send + Sync {
    fn score(&self, aoi: &AreaOfInterest, duration: Seconds) -> f64;
}

/// `priority * duration_secs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityDuration;

impl ScorePolicy for PriorityDuration {
    fn score(&self, aoi: &AreaOfInterest, duration: Seconds) -> f64 {
        aoi.priority * duration.value().max(0.0)
    }
}

/// Region multiplier of the standard equation.
#[derive(Debug, Clone)]
pub struct RegionMultiplier {
    pub region: GeoPolygon,
    pub multiplier: f64,
    /// Apply only to AOIs fully inside the region.
    pub contains: bool,
}

impl RegionMultiplier {
    fn applies_to(&self, aoi: &AreaOfInterest) -> bool {
        if self.contains {
            self.region.contains_polygon(&aoi.polygon)
        } else {
            self.region.intersects(&aoi.polygon)
        }
    }
}

/// Standard score equation:
/// `priority^priority_exp * country * continent * product(region multipliers) * duration_secs`.
///
/// Country and continent multipliers default to 1 for AOIs without a
/// matching entry.
#[derive(Debug, Clone)]
pub struct StandardScore {
    pub priority_exp: f64,
    /// Keyed by lowercase name.
    pub country: BTreeMap<String, f64>,
    /// Keyed by lowercase name.
    pub continent: BTreeMap<String, f64>,
    pub regions: Vec<RegionMultiplier>,
}

fn lowercase_keys(multipliers: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    multipliers
        .iter()
        .map(|(name, multiplier)| (name.to_lowercase(), *multiplier))
        .collect()
}

fn lookup(multipliers: &BTreeMap<String, f64>, name: Option<&str>) -> f64 {
    name.and_then(|n| multipliers.get(&n.to_lowercase()))
        .copied()
        .unwrap_or(1.0)
}

impl StandardScore {
    pub fn from_settings(settings: &ScoreSettings) -> SchedulerResult<Self> {
        let regions = settings
            .regions
            .iter()
            .enumerate()
            .map(|(i, r)| {
                Ok(RegionMultiplier {
                    region: GeoPolygon::from_lon_lat(&format!("score.regions[{}]", i), &r.region)?,
                    multiplier: r.multiplier,
                    contains: r.contains,
                })
            })
            .collect::<SchedulerResult<Vec<_>>>()?;

        Ok(Self {
            priority_exp: settings.priority_exp,
            country: lowercase_keys(&settings.country),
            continent: lowercase_keys(&settings.continent),
            regions,
        })
    }

    /// Duration-independent part of the score.
    pub fn aoi_weight(&self, aoi: &AreaOfInterest) -> f64 {
        if aoi.priority == 0.0 {
            return 0.0;
        }
        let base = aoi.priority.powf(self.priority_exp)
            * lookup(&self.country, aoi.country.as_deref())
            * lookup(&self.continent, aoi.continent.as_deref());
        self.regions
            .iter()
            .filter(|r| r.applies_to(aoi))
            .fold(base, |acc, r| acc * r.multiplier)
    }
}

impl ScorePolicy for StandardScore {
    fn score(&self, aoi: &AreaOfInterest, duration: Seconds) -> f64 {
        self.aoi_weight(aoi) * duration.value().max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionScoreSettings;

    fn aoi(lon0: f64, priority: f64) -> AreaOfInterest {
        AreaOfInterest::from_lon_lat(
            "aoi",
            &[[lon0, 0.0], [lon0 + 1.0, 0.0], [lon0 + 1.0, 1.0], [lon0, 1.0]],
            priority,
        )
        .unwrap()
    }

    fn region(lon0: f64, lon1: f64, multiplier: f64, contains: bool) -> RegionScoreSettings {
        RegionScoreSettings {
            region: vec![[lon0, -5.0], [lon1, -5.0], [lon1, 5.0], [lon0, 5.0]],
            multiplier,
            contains,
        }
    }

    #[test]
    fn test_priority_duration() {
        let p = PriorityDuration;
        assert_eq!(p.score(&aoi(0.0, 2.0), Seconds::new(10.0)), 20.0);
        assert_eq!(p.score(&aoi(0.0, 2.0), Seconds::new(0.0)), 0.0);
    }

    #[test]
    fn test_standard_score_exponent() {
        let settings = ScoreSettings {
            priority_exp: 2.0,
            ..Default::default()
        };
        let policy = StandardScore::from_settings(&settings).unwrap();
        assert_eq!(policy.score(&aoi(0.0, 3.0), Seconds::new(10.0)), 90.0);
        assert_eq!(policy.score(&aoi(0.0, 0.0), Seconds::new(10.0)), 0.0);
    }

    #[test]
    fn test_region_multipliers_contains_vs_overlaps() {
        let settings = ScoreSettings {
            priority_exp: 1.0,
            regions: vec![region(-0.5, 0.5, 2.0, false), region(-10.0, 10.0, 3.0, true)],
            ..Default::default()
        };
        let policy = StandardScore::from_settings(&settings).unwrap();

        // overlaps the first region and lies inside the second
        assert_eq!(policy.aoi_weight(&aoi(0.0, 1.0)), 6.0);
        // inside the second only
        assert_eq!(policy.aoi_weight(&aoi(5.0, 1.0)), 3.0);
        // straddles the second region's edge, which only counts when contained
        assert_eq!(policy.aoi_weight(&aoi(9.5, 1.0)), 1.0);
    }

    #[test]
    fn test_country_and_continent_multipliers() {
        let settings = ScoreSettings {
            country: BTreeMap::from([("France".to_string(), 2.0), ("Chile".to_string(), 0.5)]),
            continent: BTreeMap::from([("EUROPE".to_string(), 3.0)]),
            ..Default::default()
        };
        let policy = StandardScore::from_settings(&settings).unwrap();

        let paris = aoi(2.0, 1.0).with_location(Some("france"), Some("Europe"));
        assert_eq!(policy.aoi_weight(&paris), 6.0);

        let santiago = aoi(2.0, 2.0).with_location(Some("Chile"), Some("South America"));
        assert_eq!(policy.aoi_weight(&santiago), 1.0);

        // unknown or missing location leaves the weight unchanged
        assert_eq!(policy.aoi_weight(&aoi(2.0, 2.0)), 2.0);
        let atlantis = aoi(2.0, 2.0).with_location(Some("Atlantis"), None);
        assert_eq!(policy.aoi_weight(&atlantis), 2.0);
    }

    #[test]
    fn test_score_strictly_increasing_in_duration() {
        let policy = StandardScore::from_settings(&ScoreSettings::default()).unwrap();
        let a = aoi(0.0, 1.5);
        let short = policy.score(&a, Seconds::new(10.0));
        let long = policy.score(&a, Seconds::new(10.5));
        assert!(long > short);
    }
}
