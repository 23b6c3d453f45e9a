//! Short-horizon risk projection.

use serde::{Deserialize, Serialize};

/// Classification of the projected risk trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trajectory {
    Worsening,
    Stable,
    Improving,
}

impl std::fmt::Display for Trajectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Worsening => write!(f, "worsening"),
            Self::Stable => write!(f, "stable"),
            Self::Improving => write!(f, "improving"),
        }
    }
}

/// Linear extrapolation of the current score to the configured horizon.
///
/// Field names follow the prediction payload consumed by the dashboard
/// (`currentRisk`, `riskIn30Days`, `trend`), whatever the horizon length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    #[serde(rename = "currentRisk")]
    pub current_score: u8,

    /// Clamped to [0, 100]
    #[serde(rename = "riskIn30Days")]
    pub projected_score: u8,

    /// Two-point slope of the dominant channel
    #[serde(rename = "trend")]
    pub slope: f64,

    pub trajectory: Trajectory,

    pub confidence: f64,

    #[serde(rename = "horizonDays")]
    pub horizon_days: f64,
}
