//! Risk result types.
//!
//! Represents the output of the rule-based vital-sign risk scorer.

use serde::{Deserialize, Serialize};

use super::observation::Channel;

/// Risk category for an aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "CategoryView", try_from = "CategoryView")]
pub enum RiskCategory {
    /// No significant indicators
    Low,
    /// Follow-up recommended
    Moderate,
    /// Prompt clinical review advised
    High,
}

impl RiskCategory {
    /// Stable display label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low Risk",
            Self::Moderate => "Moderate Risk",
            Self::High => "High Risk",
        }
    }

    /// Display color (RGB).
    #[must_use]
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            Self::Low => (16, 185, 129),      // Emerald
            Self::Moderate => (251, 191, 36), // Amber
            Self::High => (244, 63, 94),      // Rose
        }
    }

    /// Display color as a `#RRGGBB` string.
    #[must_use]
    pub fn color(&self) -> String {
        let (r, g, b) = self.rgb();
        format!("#{r:02X}{g:02X}{b:02X}")
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Moderate => "MODERATE",
            Self::High => "HIGH",
        }
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Wire shape of a category: `{"level": "HIGH", "label": "...", "color": "#..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CategoryView {
    level: String,
    label: String,
    color: String,
}

impl From<RiskCategory> for CategoryView {
    fn from(category: RiskCategory) -> Self {
        Self {
            level: category.code().to_string(),
            label: category.label().to_string(),
            color: category.color(),
        }
    }
}

impl TryFrom<CategoryView> for RiskCategory {
    type Error = String;

    fn try_from(view: CategoryView) -> Result<Self, Self::Error> {
        match view.level.as_str() {
            "LOW" => Ok(Self::Low),
            "MODERATE" => Ok(Self::Moderate),
            "HIGH" => Ok(Self::High),
            other => Err(format!("Unknown risk category: {other}")),
        }
    }
}

/// Direction of a channel's two-point trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    Flat,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rising => write!(f, "rising"),
            Self::Falling => write!(f, "falling"),
            Self::Flat => write!(f, "flat"),
        }
    }
}

/// Per-channel statistics for one request window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub channel: Channel,

    /// Window mean (0 when the channel has no samples)
    pub mean: f64,

    pub trend_direction: TrendDirection,

    /// (last - first) / count; 0 with fewer than two samples
    pub slope: f64,

    /// Sample variance; 0 with fewer than two samples
    pub variance: f64,

    /// Highest single reading, if any
    pub peak: Option<f64>,

    pub anomaly_count: usize,

    pub sample_count: usize,
}

impl ChannelSummary {
    /// Summary of a channel with no data.
    #[must_use]
    pub fn empty(channel: Channel) -> Self {
        Self {
            channel,
            mean: 0.0,
            trend_direction: TrendDirection::Flat,
            slope: 0.0,
            variance: 0.0,
            peak: None,
            anomaly_count: 0,
            sample_count: 0,
        }
    }
}

/// A named contributor to the aggregate score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    #[serde(rename = "factor")]
    pub name: String,

    #[serde(rename = "value")]
    pub value_description: String,

    pub impact: u32,

    pub description: String,
}

/// Outcome of scoring one observation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskResult {
    /// Clamped aggregate score in [0, 100]
    pub score: u8,

    pub category: RiskCategory,

    /// Factors that fired, highest impact first
    pub factors: Vec<RiskFactor>,

    /// Data-volume confidence in [0, 1]
    pub confidence: f64,
}
