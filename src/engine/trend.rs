//! Per-channel trend statistics.

use crate::config::TrendConfig;
use crate::domain::{Channel, ChannelSummary, Observation, TrendDirection};

/// Arithmetic mean; 0 for an empty slice.
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1); 0 with fewer than two values.
pub(crate) fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Two-point slope: (last - first) / count.
///
/// Deliberately not a least-squares fit; only the window endpoints matter.
#[must_use]
pub fn two_point_slope(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) if values.len() >= 2 => (last - first) / values.len() as f64,
        _ => 0.0,
    }
}

/// Computes mean, variance and trend direction for one channel.
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    config: TrendConfig,
}

impl TrendAnalyzer {
    #[must_use]
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    /// Classify a slope against the configured epsilon.
    #[must_use]
    pub fn direction(&self, slope: f64) -> TrendDirection {
        if slope > self.config.epsilon {
            TrendDirection::Rising
        } else if slope < -self.config.epsilon {
            TrendDirection::Falling
        } else {
            TrendDirection::Flat
        }
    }

    /// Summarize a channel's time-ordered observations.
    ///
    /// Never fails: an empty or single-sample channel yields a flat trend
    /// with zero variance.
    #[must_use]
    pub fn summarize(
        &self,
        channel: Channel,
        observations: &[Observation],
        anomaly_count: usize,
    ) -> ChannelSummary {
        if observations.is_empty() {
            return ChannelSummary {
                anomaly_count,
                ..ChannelSummary::empty(channel)
            };
        }

        let values: Vec<f64> = observations.iter().map(|o| o.value).collect();
        let slope = two_point_slope(&values);

        ChannelSummary {
            channel,
            mean: mean(&values),
            trend_direction: self.direction(slope),
            slope,
            variance: sample_variance(&values),
            peak: values.iter().copied().reduce(f64::max),
            anomaly_count,
            sample_count: values.len(),
        }
    }
}
