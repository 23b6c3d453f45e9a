//! Risk engine: the numeric pipeline.
//!
//! ObservationSet → trend + anomaly analysis → scoring → confidence →
//! projection → alerts. Every stage is pure and holds only read-only
//! configuration, so one engine can serve any number of patients
//! concurrently.

mod alerts;
mod anomaly;
mod confidence;
mod projection;
mod scorer;
mod trend;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

pub use alerts::AlertGenerator;
pub use anomaly::{Anomaly, AnomalyDetector, AnomalyReason};
pub use confidence::ConfidenceEstimator;
pub use projection::ProjectionEngine;
pub use scorer::{ChannelAnalysis, RiskScorer, MAX_SCORE};
pub use trend::{two_point_slope, TrendAnalyzer};

use crate::config::EngineConfig;
use crate::domain::{Alert, Channel, ChannelSummary, ObservationSet, Projection, RiskResult};

/// Everything computed for one observation window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    #[serde(flatten)]
    pub result: RiskResult,

    pub prediction: Projection,

    pub alerts: Vec<Alert>,

    /// Per-channel statistics, in channel order
    pub channels: Vec<ChannelSummary>,
}

/// Owns one instance of each pipeline stage, built from a shared config.
#[derive(Debug, Clone)]
pub struct RiskEngine {
    config: Arc<EngineConfig>,
    scorer: RiskScorer,
    confidence: ConfidenceEstimator,
    projector: ProjectionEngine,
    alerts: AlertGenerator,
}

impl RiskEngine {
    /// Build the pipeline. The config is assumed validated.
    #[must_use]
    pub fn new(config: Arc<EngineConfig>) -> Self {
        let confidence = ConfidenceEstimator::new(
            config.confidence.clone(),
            config.projection.channels.clone(),
        );
        let scorer = RiskScorer::new(
            config.scoring.clone(),
            config.categories.clone(),
            TrendAnalyzer::new(config.trend.clone()),
            AnomalyDetector::new(config.anomaly.clone()),
            confidence.clone(),
        );
        let projector = ProjectionEngine::new(config.projection.clone(), confidence.clone());
        let alerts = AlertGenerator::new(config.alerts.clone());

        Self {
            config,
            scorer,
            confidence,
            projector,
            alerts,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    /// Run the full pipeline over one window.
    ///
    /// Never fails: sparse or empty windows yield the base score with the
    /// lowest confidence.
    #[must_use]
    pub fn assess(&self, set: &ObservationSet) -> RiskAssessment {
        let analyses = self.scorer.analyze(set);
        let summaries: BTreeMap<Channel, ChannelSummary> = analyses
            .iter()
            .map(|(channel, analysis)| (*channel, analysis.summary.clone()))
            .collect();

        let confidence = self.confidence.confidence(set);
        let result = self.scorer.aggregate(&summaries, confidence);
        let prediction = self.projector.project(set, &result);
        let alerts = self.alerts.alerts(&result, &prediction);

        tracing::info!(
            "Assessed {} observations: score {} ({}), trajectory {}, {} alert(s)",
            set.total_samples(),
            result.score,
            result.category,
            prediction.trajectory,
            alerts.len()
        );

        RiskAssessment {
            result,
            prediction,
            alerts,
            channels: summaries.into_values().collect(),
        }
    }

    /// Assess independent windows (one per patient).
    ///
    /// Output order matches input order. With the `parallel` feature the
    /// windows are processed on the rayon pool.
    #[must_use]
    pub fn assess_batch(&self, sets: &[ObservationSet]) -> Vec<RiskAssessment> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            sets.par_iter().map(|set| self.assess(set)).collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            sets.iter().map(|set| self.assess(set)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Observation, RiskCategory, Trajectory};
    use chrono::{Duration, TimeZone, Utc};

    fn engine() -> RiskEngine {
        RiskEngine::new(Arc::new(EngineConfig::default()))
    }

    fn heart_rate_window() -> ObservationSet {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        ObservationSet::from_observations(
            [70.0, 75.0, 80.0, 85.0, 94.0]
                .iter()
                .enumerate()
                .map(|(i, v)| Observation::new(Channel::HeartRate, *v, start + Duration::days(i as i64))),
        )
    }

    #[test]
    fn test_empty_window() {
        let a = engine().assess(&ObservationSet::empty());

        assert_eq!(a.result.score, 10);
        assert_eq!(a.result.category, RiskCategory::Low);
        assert!(a.result.factors.is_empty());
        assert_eq!(a.prediction.trajectory, Trajectory::Stable);
        assert!((a.prediction.confidence - 0.30).abs() < f64::EPSILON);
        assert!((a.result.confidence - 0.30).abs() < f64::EPSILON);
        assert!(a.alerts.is_empty());
        assert_eq!(a.channels.len(), Channel::ALL.len());
    }

    #[test]
    fn test_rising_heart_rate_end_to_end() {
        let a = engine().assess(&heart_rate_window());

        assert_eq!(a.result.score, 20);
        assert_eq!(a.prediction.projected_score, 49);
        assert_eq!(a.prediction.trajectory, Trajectory::Worsening);
        assert_eq!(a.alerts.len(), 1);
        assert!(a.alerts[0].message.contains("49"));
    }

    #[test]
    fn test_batch_preserves_order() {
        let e = engine();
        let sets = vec![heart_rate_window(), ObservationSet::empty(), heart_rate_window()];
        let scores: Vec<u8> = e.assess_batch(&sets).iter().map(|a| a.result.score).collect();
        assert_eq!(scores, vec![20, 10, 20]);
    }

    #[test]
    fn test_assessment_json_shape() {
        let a = engine().assess(&heart_rate_window());
        let json = serde_json::to_value(&a).expect("Serialize");

        assert_eq!(json["score"], 20);
        assert_eq!(json["category"]["label"], "Low Risk");
        assert_eq!(json["factors"][0]["factor"], "Rising Heart Rate Trend");
        assert_eq!(json["prediction"]["riskIn30Days"], 49);
        assert_eq!(json["prediction"]["trajectory"], "worsening");
        assert_eq!(json["alerts"][0]["severity"], "MODERATE");
        assert_eq!(json["alerts"][0]["actionRequired"], false);
        assert_eq!(json["channels"][0]["channel"], "HEART_RATE");
    }
}
