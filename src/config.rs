//! Engine configuration: thresholds, weights and breakpoints.
//!
//! Every number the engine uses comes from here. The configuration is built
//! once at startup (defaults, then an optional JSON file, then environment
//! overrides), validated, and shared read-only behind an `Arc`.
//!
//! Supported environment overrides:
//! - `VITALRISK_BASE_RISK`
//! - `VITALRISK_HORIZON_DAYS`
//! - `VITALRISK_HIGH_ALERT_SCORE`
//! - `VITALRISK_FACTOR_ALERT_IMPACT`
//! - `VITALRISK_EXPLAIN_URL`
//! - `VITALRISK_EXPLAIN_TIMEOUT_MS`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{Channel, RiskCategory};

/// Errors raised while loading or validating configuration.
///
/// These are startup failures: the engine refuses to serve until fixed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// When a scoring rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Channel mean strictly above the threshold
    MeanAbove { threshold: f64 },
    /// Any single reading strictly above the threshold
    AnyReadingAbove { threshold: f64 },
    /// Channel trend direction is rising
    Rising,
    /// Channel variance strictly above the threshold
    VarianceAbove { threshold: f64 },
    /// Fires once per detected anomaly; the rule impact is per anomaly
    PerAnomaly,
}

/// One entry of the scoring rule table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRule {
    /// Factor name shown to users
    pub name: String,
    pub channel: Channel,
    pub condition: RuleCondition,
    pub impact: u32,
    pub description: String,
}

impl ScoringRule {
    fn new(
        name: &str,
        channel: Channel,
        condition: RuleCondition,
        impact: u32,
        description: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            channel,
            condition,
            impact,
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Score before any factor fires
    pub base_risk: u32,

    /// Evaluated in order; order also breaks ties between equal impacts
    pub rules: Vec<ScoringRule>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        use Channel::*;
        use RuleCondition::*;

        let rules = vec![
            ScoringRule::new("Elevated Heart Rate", HeartRate, MeanAbove { threshold: 90.0 }, 15,
                "Average heart rate above 90 bpm"),
            ScoringRule::new("Rising Heart Rate Trend", HeartRate, Rising, 10,
                "Heart rate is trending upward"),
            ScoringRule::new("Volatile Heart Rate", HeartRate, VarianceAbove { threshold: 100.0 }, 8,
                "Heart rate varies widely between readings"),
            ScoringRule::new("Heart Rate Anomalies", HeartRate, PerAnomaly, 5,
                "Heart rate readings outside the expected envelope"),
            ScoringRule::new("Elevated Systolic Blood Pressure", SystolicBp, MeanAbove { threshold: 130.0 }, 20,
                "Average systolic pressure above 130 mmHg"),
            ScoringRule::new("Severe Systolic Reading", SystolicBp, AnyReadingAbove { threshold: 160.0 }, 15,
                "At least one systolic reading above 160 mmHg"),
            ScoringRule::new("Rising Systolic Blood Pressure Trend", SystolicBp, Rising, 10,
                "Systolic pressure is trending upward"),
            ScoringRule::new("Volatile Systolic Blood Pressure", SystolicBp, VarianceAbove { threshold: 150.0 }, 8,
                "Systolic pressure varies widely between readings"),
            ScoringRule::new("Systolic Blood Pressure Anomalies", SystolicBp, PerAnomaly, 5,
                "Systolic readings outside the expected envelope"),
            ScoringRule::new("Rising Diastolic Blood Pressure Trend", DiastolicBp, Rising, 10,
                "Diastolic pressure is trending upward"),
            ScoringRule::new("Volatile Diastolic Blood Pressure", DiastolicBp, VarianceAbove { threshold: 100.0 }, 8,
                "Diastolic pressure varies widely between readings"),
            ScoringRule::new("Diastolic Blood Pressure Anomalies", DiastolicBp, PerAnomaly, 5,
                "Diastolic readings outside the expected envelope"),
            ScoringRule::new("Elevated Respiratory Rate", RespiratoryRate, MeanAbove { threshold: 20.0 }, 12,
                "Average respiratory rate above 20 breaths/min"),
            ScoringRule::new("Volatile Respiratory Rate", RespiratoryRate, VarianceAbove { threshold: 16.0 }, 8,
                "Respiratory rate varies widely between readings"),
            ScoringRule::new("Respiratory Rate Anomalies", RespiratoryRate, PerAnomaly, 5,
                "Respiratory rate readings above 20 breaths/min"),
            ScoringRule::new("Elevated Glucose", Glucose, MeanAbove { threshold: 125.0 }, 18,
                "Average glucose above 125 mg/dL"),
            ScoringRule::new("Volatile Glucose", Glucose, VarianceAbove { threshold: 900.0 }, 8,
                "Glucose varies widely between readings"),
            ScoringRule::new("Glucose Anomalies", Glucose, PerAnomaly, 5,
                "Glucose readings above 125 mg/dL"),
            ScoringRule::new("Volatile Cholesterol", Cholesterol, VarianceAbove { threshold: 900.0 }, 8,
                "Cholesterol varies widely between readings"),
            ScoringRule::new("Cholesterol Anomalies", Cholesterol, PerAnomaly, 5,
                "Cholesterol readings outside the expected envelope"),
        ];

        Self {
            base_risk: 10,
            rules,
        }
    }
}

/// How a channel's outliers are detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum AnomalyPolicy {
    /// Fixed clinical envelope; readings strictly outside are anomalous
    ClinicalRange {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// Farther than `z_threshold` standard deviations from the window mean
    Statistical { z_threshold: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Per-channel policy; channels not listed use `Statistical` with
    /// `default_z_threshold`
    pub policies: BTreeMap<Channel, AnomalyPolicy>,
    pub default_z_threshold: f64,
}

impl AnomalyConfig {
    #[must_use]
    pub fn policy_for(&self, channel: Channel) -> AnomalyPolicy {
        self.policies
            .get(&channel)
            .cloned()
            .unwrap_or(AnomalyPolicy::Statistical {
                z_threshold: self.default_z_threshold,
            })
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        let mut policies = BTreeMap::new();
        policies.insert(
            Channel::RespiratoryRate,
            AnomalyPolicy::ClinicalRange {
                min: None,
                max: Some(20.0),
            },
        );
        policies.insert(
            Channel::Glucose,
            AnomalyPolicy::ClinicalRange {
                min: None,
                max: Some(125.0),
            },
        );

        Self {
            policies,
            default_z_threshold: 2.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Slopes within ±epsilon are flat
    pub epsilon: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self { epsilon: 0.1 }
    }
}

/// Score breakpoints: [0, moderate_min) LOW, [moderate_min, high_min)
/// MODERATE, [high_min, 100] HIGH.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub moderate_min: u8,
    pub high_min: u8,
}

impl CategoryConfig {
    #[must_use]
    pub fn categorize(&self, score: u8) -> RiskCategory {
        if score >= self.high_min {
            RiskCategory::High
        } else if score >= self.moderate_min {
            RiskCategory::Moderate
        } else {
            RiskCategory::Low
        }
    }
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            moderate_min: 31,
            high_min: 61,
        }
    }
}

/// Step function from sample count to confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    /// Fewest samples that reach `medium`
    pub medium_min_samples: usize,
    /// Fewest samples that reach `high`
    pub high_min_samples: usize,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            low: 0.30,
            medium: 0.60,
            high: 0.90,
            medium_min_samples: 5,
            high_min_samples: 11,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub horizon_days: f64,

    /// |slope| above this is worsening/improving
    pub trajectory_threshold: f64,

    /// Channels that drive projection and confidence, in priority order.
    /// The first one with at least two samples supplies the slope.
    pub channels: Vec<Channel>,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            horizon_days: 30.0,
            trajectory_threshold: 0.5,
            channels: vec![Channel::HeartRate, Channel::SystolicBp],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Scores strictly above this with a worsening trajectory raise HIGH
    pub high_score_threshold: u8,

    /// Factors with impact strictly above this raise MODERATE
    pub factor_impact_threshold: u32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            high_score_threshold: 70,
            factor_impact_threshold: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplanationConfig {
    pub enabled: bool,

    /// HTTP endpoint of the explanation service; the templated fallback is
    /// used when unset
    pub endpoint: Option<String>,

    pub timeout_ms: u64,
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            timeout_ms: 2_000,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub anomaly: AnomalyConfig,
    pub trend: TrendConfig,
    pub categories: CategoryConfig,
    pub confidence: ConfidenceConfig,
    pub projection: ProjectionConfig,
    pub alerts: AlertConfig,
    pub explanation: ExplanationConfig,
}

impl EngineConfig {
    /// Load defaults, an optional JSON file, then environment overrides,
    /// and validate the result.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed, an
    /// override is malformed, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        cfg.apply_overrides(|var| std::env::var(var).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read a (possibly partial) JSON config file over the defaults.
    ///
    /// # Errors
    /// Returns `ConfigError::Io` or `ConfigError::Parse`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    ///
    /// # Errors
    /// Returns `ConfigError::Env` for values that do not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "VITALRISK_BASE_RISK")? {
            self.scoring.base_risk = v;
        }
        if let Some(v) = parse_var(&lookup, "VITALRISK_HORIZON_DAYS")? {
            self.projection.horizon_days = v;
        }
        if let Some(v) = parse_var(&lookup, "VITALRISK_HIGH_ALERT_SCORE")? {
            self.alerts.high_score_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "VITALRISK_FACTOR_ALERT_IMPACT")? {
            self.alerts.factor_impact_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "VITALRISK_EXPLAIN_TIMEOUT_MS")? {
            self.explanation.timeout_ms = v;
        }
        if let Some(url) = lookup("VITALRISK_EXPLAIN_URL") {
            let url = url.trim();
            self.explanation.endpoint = (!url.is_empty()).then(|| url.to_string());
        }
        Ok(())
    }

    /// Check internal consistency.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.scoring.base_risk > 100 {
            return invalid(format!("base_risk {} exceeds 100", self.scoring.base_risk));
        }
        for rule in &self.scoring.rules {
            if rule.name.trim().is_empty() {
                return invalid(format!("rule for {} has a blank name", rule.channel));
            }
            let threshold = match rule.condition {
                RuleCondition::MeanAbove { threshold }
                | RuleCondition::AnyReadingAbove { threshold }
                | RuleCondition::VarianceAbove { threshold } => Some(threshold),
                RuleCondition::Rising | RuleCondition::PerAnomaly => None,
            };
            if threshold.is_some_and(|t| !t.is_finite()) {
                return invalid(format!("rule '{}' has a non-finite threshold", rule.name));
            }
        }

        if !(self.anomaly.default_z_threshold.is_finite() && self.anomaly.default_z_threshold > 0.0) {
            return invalid("default_z_threshold must be positive".to_string());
        }
        for (channel, policy) in &self.anomaly.policies {
            match *policy {
                AnomalyPolicy::Statistical { z_threshold } => {
                    if !(z_threshold.is_finite() && z_threshold > 0.0) {
                        return invalid(format!("z_threshold for {channel} must be positive"));
                    }
                }
                AnomalyPolicy::ClinicalRange { min, max } => {
                    if min.is_none() && max.is_none() {
                        return invalid(format!("clinical range for {channel} has no bounds"));
                    }
                    if min.is_some_and(|v| !v.is_finite()) || max.is_some_and(|v| !v.is_finite()) {
                        return invalid(format!("clinical range for {channel} is not finite"));
                    }
                    if let (Some(lo), Some(hi)) = (min, max) {
                        if lo > hi {
                            return invalid(format!("clinical range for {channel} is inverted"));
                        }
                    }
                }
            }
        }

        if !(self.trend.epsilon.is_finite() && self.trend.epsilon >= 0.0) {
            return invalid("trend epsilon must be non-negative".to_string());
        }

        let c = &self.categories;
        if !(0 < c.moderate_min && c.moderate_min < c.high_min && c.high_min <= 100) {
            return invalid(format!(
                "category breakpoints must satisfy 0 < {} < {} <= 100",
                c.moderate_min, c.high_min
            ));
        }

        let k = &self.confidence;
        let tiers_in_range = [k.low, k.medium, k.high]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v));
        if !tiers_in_range || k.low > k.medium || k.medium > k.high {
            return invalid("confidence tiers must be ordered values in [0, 1]".to_string());
        }
        if k.medium_min_samples >= k.high_min_samples {
            return invalid("medium_min_samples must be below high_min_samples".to_string());
        }

        let p = &self.projection;
        if !(p.horizon_days.is_finite() && p.horizon_days > 0.0) {
            return invalid(format!("horizon_days {} must be positive", p.horizon_days));
        }
        if !(p.trajectory_threshold.is_finite() && p.trajectory_threshold >= 0.0) {
            return invalid("trajectory_threshold must be non-negative".to_string());
        }
        if p.channels.is_empty() {
            return invalid("projection needs at least one channel".to_string());
        }

        if self.alerts.high_score_threshold > 100 {
            return invalid("high_score_threshold exceeds 100".to_string());
        }

        if self.explanation.timeout_ms == 0 {
            return invalid("explanation timeout must be positive".to_string());
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value: raw }),
    }
}
