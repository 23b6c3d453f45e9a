//! Alert derivation from a scored window and its projection.

use chrono::{DateTime, Utc};

use crate::config::AlertConfig;
use crate::domain::{Alert, AlertSeverity, Projection, RiskResult, Trajectory};

#[derive(Debug, Clone)]
pub struct AlertGenerator {
    config: AlertConfig,
}

impl AlertGenerator {
    #[must_use]
    pub fn new(config: AlertConfig) -> Self {
        Self { config }
    }

    /// Alerts stamped with the current time.
    #[must_use]
    pub fn alerts(&self, result: &RiskResult, projection: &Projection) -> Vec<Alert> {
        self.alerts_at(result, projection, Utc::now())
    }

    /// Evaluate every rule independently; output order is HIGH trajectory,
    /// MODERATE trajectory, then one alert per high-impact factor in ranked
    /// order.
    #[must_use]
    pub fn alerts_at(
        &self,
        result: &RiskResult,
        projection: &Projection,
        at: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let worsening = projection.trajectory == Trajectory::Worsening;

        if worsening && result.score > self.config.high_score_threshold {
            alerts.push(Alert {
                severity: AlertSeverity::High,
                message: format!(
                    "Risk score {} is high and worsening; projected {} within {} days",
                    result.score, projection.projected_score, projection.horizon_days
                ),
                timestamp: at,
                action_required: true,
            });
        } else if worsening {
            alerts.push(Alert {
                severity: AlertSeverity::Moderate,
                message: format!(
                    "Risk trending upward: projected score {} within {} days",
                    projection.projected_score, projection.horizon_days
                ),
                timestamp: at,
                action_required: false,
            });
        }

        alerts.extend(
            result
                .factors
                .iter()
                .filter(|f| f.impact > self.config.factor_impact_threshold)
                .map(|f| Alert {
                    severity: AlertSeverity::Moderate,
                    message: format!("{}: {} ({})", f.name, f.description, f.value_description),
                    timestamp: at,
                    action_required: false,
                }),
        );

        if !alerts.is_empty() {
            tracing::debug!("Generated {} alert(s) for score {}", alerts.len(), result.score);
        }
        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RiskCategory, RiskFactor};
    use chrono::TimeZone;

    fn result(score: u8, factors: Vec<RiskFactor>) -> RiskResult {
        RiskResult {
            score,
            category: RiskCategory::Moderate,
            factors,
            confidence: 0.6,
        }
    }

    fn projection(current: u8, projected: u8, trajectory: Trajectory) -> Projection {
        Projection {
            current_score: current,
            projected_score: projected,
            slope: 1.0,
            trajectory,
            confidence: 0.6,
            horizon_days: 30.0,
        }
    }

    fn factor(name: &str, impact: u32) -> RiskFactor {
        RiskFactor {
            name: name.to_string(),
            value_description: "Mean 140.0 mmHg".to_string(),
            impact,
            description: "Average systolic pressure above 130 mmHg".to_string(),
        }
    }

    #[test]
    fn test_worsening_below_high_threshold() {
        let gen = AlertGenerator::new(AlertConfig::default());
        let alerts = gen.alerts(
            &result(62, Vec::new()),
            &projection(62, 72, Trajectory::Worsening),
        );

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Moderate);
        assert!(alerts[0].message.contains("72"));
        assert!(!alerts[0].action_required);
    }

    #[test]
    fn test_high_and_worsening() {
        let gen = AlertGenerator::new(AlertConfig::default());
        let alerts = gen.alerts(
            &result(75, Vec::new()),
            &projection(75, 90, Trajectory::Worsening),
        );

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::High);
        assert!(alerts[0].action_required);
        assert!(alerts[0].message.contains("90"));
    }

    #[test]
    fn test_threshold_score_is_not_high() {
        let gen = AlertGenerator::new(AlertConfig::default());
        let alerts = gen.alerts(
            &result(70, Vec::new()),
            &projection(70, 80, Trajectory::Worsening),
        );
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Moderate);
    }

    #[test]
    fn test_factor_alerts_follow_trajectory_alert() {
        let gen = AlertGenerator::new(AlertConfig::default());
        let factors = vec![
            factor("Elevated Systolic Blood Pressure", 20),
            factor("Elevated Glucose", 18),
            factor("Elevated Heart Rate", 15),
        ];
        let at = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        let alerts = gen.alerts_at(
            &result(80, factors),
            &projection(80, 95, Trajectory::Worsening),
            at,
        );

        let severities: Vec<AlertSeverity> = alerts.iter().map(|a| a.severity).collect();
        assert_eq!(
            severities,
            vec![AlertSeverity::High, AlertSeverity::Moderate, AlertSeverity::Moderate]
        );
        assert!(alerts[1].message.starts_with("Elevated Systolic Blood Pressure"));
        assert!(alerts[1].message.contains("Average systolic pressure above 130 mmHg"));
        assert!(alerts[2].message.starts_with("Elevated Glucose"));
        assert!(alerts.iter().all(|a| a.timestamp == at));
    }

    #[test]
    fn test_quiet_when_stable_or_improving() {
        let gen = AlertGenerator::new(AlertConfig::default());
        let low_impact = vec![factor("Rising Heart Rate Trend", 10), factor("Elevated Heart Rate", 15)];

        assert!(gen
            .alerts(&result(85, low_impact.clone()), &projection(85, 85, Trajectory::Stable))
            .is_empty());
        assert!(gen
            .alerts(&result(85, low_impact), &projection(85, 40, Trajectory::Improving))
            .is_empty());
    }
}
