//! Weighted risk aggregation.
//!
//! The score is `base_risk + Σ impacts` over the rules that fire, clamped to
//! [0, 100]. Rules come from `ScoringConfig::rules` and are evaluated
//! uniformly against each channel's summary; contributions are purely
//! additive so the single final clamp is the only cap.

use std::collections::BTreeMap;

use super::anomaly::{Anomaly, AnomalyDetector};
use super::confidence::ConfidenceEstimator;
use super::trend::TrendAnalyzer;
use crate::config::{CategoryConfig, RuleCondition, ScoringConfig, ScoringRule};
use crate::domain::{
    Channel, ChannelSummary, ObservationSet, RiskFactor, RiskResult, TrendDirection,
};

/// Score ceiling.
pub const MAX_SCORE: u8 = 100;

/// Trend statistics and flagged readings for one channel.
#[derive(Debug, Clone)]
pub struct ChannelAnalysis {
    pub summary: ChannelSummary,
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Clone)]
pub struct RiskScorer {
    scoring: ScoringConfig,
    categories: CategoryConfig,
    analyzer: TrendAnalyzer,
    detector: AnomalyDetector,
    confidence: ConfidenceEstimator,
}

impl RiskScorer {
    #[must_use]
    pub fn new(
        scoring: ScoringConfig,
        categories: CategoryConfig,
        analyzer: TrendAnalyzer,
        detector: AnomalyDetector,
        confidence: ConfidenceEstimator,
    ) -> Self {
        Self {
            scoring,
            categories,
            analyzer,
            detector,
            confidence,
        }
    }

    /// Analyze every channel independently.
    #[must_use]
    pub fn analyze(&self, set: &ObservationSet) -> BTreeMap<Channel, ChannelAnalysis> {
        Channel::ALL
            .iter()
            .map(|&channel| {
                let observations = set.channel(channel);
                let anomalies = self.detector.detect(channel, observations);
                let summary = self
                    .analyzer
                    .summarize(channel, observations, anomalies.len());

                if summary.sample_count < 2 {
                    tracing::debug!(
                        "{}: insufficient data ({} samples), using defaults",
                        channel,
                        summary.sample_count
                    );
                }

                (channel, ChannelAnalysis { summary, anomalies })
            })
            .collect()
    }

    /// Score an observation window.
    ///
    /// Pure: the same window always yields the same result.
    #[must_use]
    pub fn score(&self, set: &ObservationSet) -> RiskResult {
        let analyses = self.analyze(set);
        let summaries: BTreeMap<Channel, ChannelSummary> = analyses
            .into_iter()
            .map(|(channel, analysis)| (channel, analysis.summary))
            .collect();
        self.aggregate(&summaries, self.confidence.confidence(set))
    }

    /// Combine channel summaries into a bounded score and ranked factors.
    #[must_use]
    pub fn aggregate(
        &self,
        summaries: &BTreeMap<Channel, ChannelSummary>,
        confidence: f64,
    ) -> RiskResult {
        let mut fired: Vec<(u32, Channel, usize, RiskFactor)> = self
            .scoring
            .rules
            .iter()
            .enumerate()
            .filter_map(|(order, rule)| {
                let empty;
                let summary = match summaries.get(&rule.channel) {
                    Some(s) => s,
                    None => {
                        empty = ChannelSummary::empty(rule.channel);
                        &empty
                    }
                };
                evaluate(rule, summary).map(|factor| (factor.impact, rule.channel, order, factor))
            })
            .collect();

        // Highest impact first; ties by channel declaration order, then rule order.
        fired.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let raw: u64 = u64::from(self.scoring.base_risk)
            + fired.iter().map(|(impact, ..)| u64::from(*impact)).sum::<u64>();
        let score = raw.min(u64::from(MAX_SCORE)) as u8;

        RiskResult {
            score,
            category: self.categories.categorize(score),
            factors: fired.into_iter().map(|(.., factor)| factor).collect(),
            confidence,
        }
    }
}

/// Evaluate one rule against one channel summary.
fn evaluate(rule: &ScoringRule, summary: &ChannelSummary) -> Option<RiskFactor> {
    let unit = rule.channel.canonical_unit();

    let (impact, value_description) = match rule.condition {
        RuleCondition::MeanAbove { threshold } => {
            if summary.sample_count == 0 || summary.mean <= threshold {
                return None;
            }
            (rule.impact, format!("Mean {:.1} {}", summary.mean, unit))
        }
        RuleCondition::AnyReadingAbove { threshold } => {
            let peak = summary.peak.filter(|p| *p > threshold)?;
            (rule.impact, format!("Peak {:.1} {}", peak, unit))
        }
        RuleCondition::Rising => {
            if summary.trend_direction != TrendDirection::Rising {
                return None;
            }
            (rule.impact, format!("{:+.2} {} per reading", summary.slope, unit))
        }
        RuleCondition::VarianceAbove { threshold } => {
            if summary.variance <= threshold {
                return None;
            }
            (rule.impact, format!("Variance {:.1}", summary.variance))
        }
        RuleCondition::PerAnomaly => {
            if summary.anomaly_count == 0 {
                return None;
            }
            let count = u32::try_from(summary.anomaly_count).unwrap_or(u32::MAX);
            let noun = if count == 1 { "reading" } else { "readings" };
            (
                rule.impact.saturating_mul(count),
                format!("{count} anomalous {noun}"),
            )
        }
    };

    Some(RiskFactor {
        name: rule.name.clone(),
        value_description,
        impact,
        description: rule.description.clone(),
    })
}
