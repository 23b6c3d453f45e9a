//! Outlier detection per channel.
//!
//! Two policies, chosen per channel in `AnomalyConfig`:
//! - clinical range: readings strictly outside a fixed envelope
//! - statistical: readings more than `z_threshold` sample standard
//!   deviations from the window mean

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::trend::{mean, sample_variance};
use crate::config::{AnomalyConfig, AnomalyPolicy};
use crate::domain::{Channel, Observation};

/// Standard deviations below this are treated as zero spread.
const MIN_STD_DEV: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyReason {
    AboveRange { limit: f64 },
    BelowRange { limit: f64 },
    Deviation { z_score: f64 },
}

/// A flagged reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    /// Position within the channel's time-ordered series
    pub index: usize,
    pub effective_time: DateTime<Utc>,
    pub value: f64,
    pub reason: AnomalyReason,
}

#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    #[must_use]
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    /// Flag the anomalous readings of one channel.
    #[must_use]
    pub fn detect(&self, channel: Channel, observations: &[Observation]) -> Vec<Anomaly> {
        match self.config.policy_for(channel) {
            AnomalyPolicy::ClinicalRange { min, max } => observations
                .iter()
                .enumerate()
                .filter_map(|(index, obs)| {
                    let reason = match (min, max) {
                        (_, Some(limit)) if obs.value > limit => AnomalyReason::AboveRange { limit },
                        (Some(limit), _) if obs.value < limit => AnomalyReason::BelowRange { limit },
                        _ => return None,
                    };
                    Some(anomaly(index, obs, reason))
                })
                .collect(),

            AnomalyPolicy::Statistical { z_threshold } => {
                // Variance is undefined below two samples: nothing is anomalous.
                if observations.len() < 2 {
                    return Vec::new();
                }
                let values: Vec<f64> = observations.iter().map(|o| o.value).collect();
                let m = mean(&values);
                let sd = sample_variance(&values).sqrt();
                if sd < MIN_STD_DEV {
                    return Vec::new();
                }

                observations
                    .iter()
                    .enumerate()
                    .filter_map(|(index, obs)| {
                        let z_score = (obs.value - m) / sd;
                        (z_score.abs() > z_threshold)
                            .then(|| anomaly(index, obs, AnomalyReason::Deviation { z_score }))
                    })
                    .collect()
            }
        }
    }
}

fn anomaly(index: usize, obs: &Observation, reason: AnomalyReason) -> Anomaly {
    Anomaly {
        index,
        effective_time: obs.effective_time,
        value: obs.value,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn series(channel: Channel, values: &[f64]) -> Vec<Observation> {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Observation::new(channel, *v, start + Duration::hours(i as i64 * 6)))
            .collect()
    }

    #[test]
    fn test_clinical_range_policy() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        let obs = series(Channel::Glucose, &[110.0, 130.0, 125.0, 180.0]);

        let found = detector.detect(Channel::Glucose, &obs);
        let indices: Vec<usize> = found.iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert_eq!(found[0].reason, AnomalyReason::AboveRange { limit: 125.0 });
        assert_eq!(found[1].effective_time, obs[3].effective_time);
    }

    #[test]
    fn test_clinical_range_lower_bound() {
        let mut config = AnomalyConfig::default();
        config.policies.insert(
            Channel::HeartRate,
            AnomalyPolicy::ClinicalRange { min: Some(50.0), max: Some(120.0) },
        );
        let detector = AnomalyDetector::new(config);
        let found = detector.detect(Channel::HeartRate, &series(Channel::HeartRate, &[45.0, 70.0, 125.0]));

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].reason, AnomalyReason::BelowRange { limit: 50.0 });
        assert_eq!(found[1].reason, AnomalyReason::AboveRange { limit: 120.0 });
    }

    #[test]
    fn test_statistical_policy_flags_outlier() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        let obs = series(
            Channel::HeartRate,
            &[72.0, 74.0, 71.0, 73.0, 72.0, 75.0, 73.0, 72.0, 74.0, 130.0],
        );

        let found = detector.detect(Channel::HeartRate, &obs);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].index, 9);
        assert!(matches!(found[0].reason, AnomalyReason::Deviation { z_score } if z_score > 2.5));
    }

    #[test]
    fn test_statistical_policy_small_or_constant_windows() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());

        assert!(detector.detect(Channel::HeartRate, &[]).is_empty());
        assert!(detector
            .detect(Channel::HeartRate, &series(Channel::HeartRate, &[200.0]))
            .is_empty());
        assert!(detector
            .detect(Channel::HeartRate, &series(Channel::HeartRate, &[80.0, 80.0, 80.0]))
            .is_empty());
    }

    #[test]
    fn test_gentle_rise_is_not_anomalous() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        let obs = series(Channel::HeartRate, &[70.0, 75.0, 80.0, 85.0, 94.0]);
        assert!(detector.detect(Channel::HeartRate, &obs).is_empty());
    }
}
