//! Linear extrapolation of the risk score to a future horizon.

use super::confidence::ConfidenceEstimator;
use super::scorer::MAX_SCORE;
use super::trend::two_point_slope;
use crate::config::ProjectionConfig;
use crate::domain::{Channel, ObservationSet, Projection, RiskResult, Trajectory};

#[derive(Debug, Clone)]
pub struct ProjectionEngine {
    config: ProjectionConfig,
    confidence: ConfidenceEstimator,
}

impl ProjectionEngine {
    #[must_use]
    pub fn new(config: ProjectionConfig, confidence: ConfidenceEstimator) -> Self {
        Self { config, confidence }
    }

    /// The first projection channel with at least two samples.
    ///
    /// Only the configured projection channels are considered, so a window
    /// holding nothing but glucose or respiratory data projects as stable
    /// even when those channels carry the score.
    #[must_use]
    pub fn dominant_channel(&self, set: &ObservationSet) -> Option<Channel> {
        self.config
            .channels
            .iter()
            .copied()
            .find(|c| set.sample_count(*c) >= 2)
    }

    /// Project using the configured horizon.
    #[must_use]
    pub fn project(&self, set: &ObservationSet, result: &RiskResult) -> Projection {
        self.project_with_horizon(set, result, self.config.horizon_days)
    }

    /// `projected = current + slope * (horizon_days / observed_span_days)`,
    /// clamped to [0, 100].
    #[must_use]
    pub fn project_with_horizon(
        &self,
        set: &ObservationSet,
        result: &RiskResult,
        horizon_days: f64,
    ) -> Projection {
        let slope = self
            .dominant_channel(set)
            .map_or(0.0, |channel| two_point_slope(&set.values(channel)));
        let span_days = set.observed_span_days();

        let current = f64::from(result.score);
        let projected = current + slope * (horizon_days / span_days as f64);
        let projected_score = if projected.is_finite() {
            projected.round().clamp(0.0, f64::from(MAX_SCORE)) as u8
        } else {
            result.score
        };

        Projection {
            current_score: result.score,
            projected_score,
            slope,
            trajectory: self.classify(slope),
            confidence: self.confidence.confidence(set),
            horizon_days,
        }
    }

    fn classify(&self, slope: f64) -> Trajectory {
        let threshold = self.config.trajectory_threshold;
        if slope > threshold {
            Trajectory::Worsening
        } else if slope < -threshold {
            Trajectory::Improving
        } else {
            Trajectory::Stable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfidenceConfig, EngineConfig};
    use crate::domain::{Observation, RiskCategory};
    use chrono::{Duration, TimeZone, Utc};

    fn engine() -> ProjectionEngine {
        let config = EngineConfig::default();
        ProjectionEngine::new(
            config.projection.clone(),
            ConfidenceEstimator::new(ConfidenceConfig::default(), config.projection.channels),
        )
    }

    fn result(score: u8) -> RiskResult {
        RiskResult {
            score,
            category: RiskCategory::Low,
            factors: Vec::new(),
            confidence: 0.3,
        }
    }

    fn daily(channel: Channel, values: &[f64]) -> ObservationSet {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 7, 30, 0).unwrap();
        ObservationSet::from_observations(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| Observation::new(channel, *v, start + Duration::days(i as i64))),
        )
    }

    #[test]
    fn test_rising_heart_rate_projection() {
        let set = daily(Channel::HeartRate, &[70.0, 75.0, 80.0, 85.0, 94.0]);
        let p = engine().project(&set, &result(20));

        // slope 4.8 over 5 distinct days: 20 + 4.8 * 30 / 5 = 48.8
        assert!((p.slope - 4.8).abs() < 1e-9);
        assert_eq!(p.projected_score, 49);
        assert_eq!(p.trajectory, Trajectory::Worsening);
        assert!((p.confidence - 0.60).abs() < f64::EPSILON);
    }

    #[test]
    fn test_improving_trend_clamps_at_zero() {
        let set = daily(Channel::SystolicBp, &[180.0, 120.0]);
        let p = engine().project(&set, &result(15));

        assert_eq!(p.trajectory, Trajectory::Improving);
        assert_eq!(p.projected_score, 0);
    }

    #[test]
    fn test_projection_clamps_at_hundred() {
        let set = daily(Channel::HeartRate, &[60.0, 140.0]);
        let p = engine().project(&set, &result(90));
        assert_eq!(p.projected_score, 100);
    }

    #[test]
    fn test_sparse_data_is_stable() {
        let p = engine().project(&ObservationSet::empty(), &result(10));
        assert!((p.slope - 0.0).abs() < f64::EPSILON);
        assert_eq!(p.trajectory, Trajectory::Stable);
        assert_eq!(p.projected_score, 10);
        assert!((p.confidence - 0.30).abs() < f64::EPSILON);

        let p = engine().project(&daily(Channel::HeartRate, &[120.0]), &result(25));
        assert_eq!(p.trajectory, Trajectory::Stable);
        assert_eq!(p.projected_score, 25);
    }

    #[test]
    fn test_priority_falls_through_to_systolic() {
        let mut obs: Vec<Observation> = daily(Channel::SystolicBp, &[120.0, 122.0, 124.0, 126.0])
            .iter()
            .cloned()
            .collect();
        obs.push(Observation::new(
            Channel::HeartRate,
            88.0,
            Utc.with_ymd_and_hms(2024, 6, 2, 9, 0, 0).unwrap(),
        ));
        let set = ObservationSet::from_observations(obs);
        let e = engine();

        assert_eq!(e.dominant_channel(&set), Some(Channel::SystolicBp));
        // slope (126 - 120) / 4 = 1.5 over 4 days: 30 + 1.5 * 7.5
        let p = e.project(&set, &result(30));
        assert_eq!(p.projected_score, 41);
        assert_eq!(p.trajectory, Trajectory::Worsening);
    }

    #[test]
    fn test_span_counts_days_across_all_channels() {
        let morning = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let mut obs = vec![
            Observation::new(Channel::HeartRate, 70.0, morning),
            Observation::new(Channel::HeartRate, 80.0, morning + Duration::hours(2)),
        ];
        obs.extend(daily(Channel::Glucose, &[100.0; 10]).iter().cloned());
        let set = ObservationSet::from_observations(obs);

        // slope (80 - 70) / 2 = 5 over 10 distinct days: 20 + 5 * 3
        let p = engine().project(&set, &result(20));
        assert!((p.slope - 5.0).abs() < 1e-9);
        assert_eq!(p.projected_score, 35);
        assert_eq!(p.trajectory, Trajectory::Worsening);
    }

    #[test]
    fn test_non_projection_channels_stay_stable() {
        let set = daily(Channel::Glucose, &[110.0, 140.0, 170.0, 200.0]);
        let e = engine();

        assert_eq!(e.dominant_channel(&set), None);
        let p = e.project(&set, &result(40));
        assert_eq!(p.trajectory, Trajectory::Stable);
        assert_eq!(p.projected_score, 40);
    }

    #[test]
    fn test_custom_horizon() {
        let set = daily(Channel::HeartRate, &[70.0, 75.0, 80.0, 85.0, 94.0]);
        let p = engine().project_with_horizon(&set, &result(20), 10.0);
        // 20 + 4.8 * 10 / 5 = 29.6
        assert_eq!(p.projected_score, 30);
        assert!((p.horizon_days - 10.0).abs() < f64::EPSILON);
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use crate::config::{ConfidenceConfig, EngineConfig};
    use crate::domain::{Observation, RiskCategory};
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    proptest! {
        /// Projected score never leaves [0, 100]
        #[test]
        fn projection_is_bounded(
            score in 0u8..=100,
            values in proptest::collection::vec(0.0..300.0f64, 0..30),
            horizon in 1.0..365.0f64,
        ) {
            let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let set = ObservationSet::from_observations(values.iter().enumerate().map(|(i, v)| {
                Observation::new(Channel::HeartRate, *v, start + Duration::hours(i as i64 * 7))
            }));
            let config = EngineConfig::default();
            let engine = ProjectionEngine::new(
                config.projection.clone(),
                ConfidenceEstimator::new(ConfidenceConfig::default(), config.projection.channels),
            );
            let result = RiskResult {
                score,
                category: RiskCategory::Low,
                factors: Vec::new(),
                confidence: 0.3,
            };

            let p = engine.project_with_horizon(&set, &result, horizon);
            prop_assert!(p.projected_score <= 100);
            prop_assert_eq!(p.current_score, score);
        }
    }
}
