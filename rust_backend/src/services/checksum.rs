//! Checksums of run outputs.

use chrono::SecondsFormat;
use sha2::{Digest, Sha256};

use crate::models::VisibilityInterval;

/// Calculate SHA-256 checksum of text content.
///
/// # Returns
/// Hexadecimal string representation of the SHA-256 hash.
pub fn calculate_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
}

/// Order-independent checksum of a visibility set.
///
/// Two runs produce the same fingerprint exactly when they produce the same
/// set of intervals, to the nanosecond.
pub fn visibility_fingerprint(intervals: &[VisibilityInterval]) -> String {
    let mut lines: Vec<String> = intervals
        .iter()
        .map(|v| {
            format!(
                "{}|{}|{}|{}|{}|{}",
                v.satellite_id,
                v.sensor_id,
                v.aoi_id,
                v.interval.start().to_rfc3339_opts(SecondsFormat::Nanos, true),
                v.interval.stop().to_rfc3339_opts(SecondsFormat::Nanos, true),
                v.revolution_index
            )
        })
        .collect();
    lines.sort();
    calculate_checksum(&lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TimeInterval;
    use chrono::{TimeDelta, TimeZone, Utc};

    fn vis(aoi: &str, a: i64, b: i64) -> VisibilityInterval {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        VisibilityInterval {
            satellite_id: "sat".into(),
            sensor_id: "cam".into(),
            aoi_id: aoi.into(),
            interval: TimeInterval::new(t0 + TimeDelta::seconds(a), t0 + TimeDelta::seconds(b)).unwrap(),
            revolution_index: 0,
        }
    }

    #[test]
    fn test_checksum_consistency() {
        let content = r#"{"test": "data"}"#;
        assert_eq!(calculate_checksum(content), calculate_checksum(content));
        assert_ne!(calculate_checksum(content), calculate_checksum(r#"{"test": "data2"}"#));
    }

    #[test]
    fn test_fingerprint_ignores_order() {
        let a = vec![vis("a", 0, 10), vis("b", 5, 20)];
        let b = vec![vis("b", 5, 20), vis("a", 0, 10)];
        assert_eq!(visibility_fingerprint(&a), visibility_fingerprint(&b));
        assert_ne!(visibility_fingerprint(&a), visibility_fingerprint(&a[..1]));
    }

    #[test]
    fn test_fingerprint_of_empty_set() {
        assert_eq!(visibility_fingerprint(&[]).len(), 64);
    }
}
