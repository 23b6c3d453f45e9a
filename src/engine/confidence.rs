//! Data-volume confidence.

use crate::config::ConfidenceConfig;
use crate::domain::{Channel, ObservationSet};

/// Maps the sample count of the projection channels to a confidence tier.
///
/// A step function, never interpolated: downstream consumers rely on the
/// exact tier values.
#[derive(Debug, Clone)]
pub struct ConfidenceEstimator {
    config: ConfidenceConfig,
    channels: Vec<Channel>,
}

impl ConfidenceEstimator {
    #[must_use]
    pub fn new(config: ConfidenceConfig, channels: Vec<Channel>) -> Self {
        Self { config, channels }
    }

    /// Confidence for an observation window.
    #[must_use]
    pub fn confidence(&self, set: &ObservationSet) -> f64 {
        let samples = self.channels.iter().map(|c| set.sample_count(*c)).sum();
        self.for_samples(samples)
    }

    /// Confidence for a raw sample count.
    #[must_use]
    pub fn for_samples(&self, samples: usize) -> f64 {
        if samples >= self.config.high_min_samples {
            self.config.high
        } else if samples >= self.config.medium_min_samples {
            self.config.medium
        } else {
            self.config.low
        }
    }
}
