//! Explainer port: narrative text for a computed assessment.
//!
//! Implementations may be remote and slow. Callers bound every call with a
//! timeout and fall back to a deterministic template on any failure, so an
//! explainer error never reaches the scoring result.

use std::time::Duration;

use serde::Serialize;

use crate::domain::{Projection, RiskResult};

/// Errors an explainer may return. All are recoverable.
#[derive(Debug, thiserror::Error)]
pub enum ExplainError {
    #[error("Explanation service unavailable: {0}")]
    Unavailable(String),

    #[error("Explanation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed explanation response: {0}")]
    Malformed(String),
}

/// One ranked factor as sent to an explainer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorSummary {
    pub factor: String,
    pub value: String,
    pub impact: u32,
}

/// The numeric results an explanation is written for.
///
/// Carries no patient identifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationPayload {
    pub score: u8,
    pub category: String,
    pub confidence: f64,
    pub factors: Vec<FactorSummary>,
    pub trajectory: String,
    pub projected_score: u8,
    pub horizon_days: f64,
}

impl ExplanationPayload {
    #[must_use]
    pub fn new(result: &RiskResult, projection: &Projection) -> Self {
        Self {
            score: result.score,
            category: result.category.label().to_string(),
            confidence: result.confidence,
            factors: result
                .factors
                .iter()
                .map(|f| FactorSummary {
                    factor: f.name.clone(),
                    value: f.value_description.clone(),
                    impact: f.impact,
                })
                .collect(),
            trajectory: projection.trajectory.to_string(),
            projected_score: projection.projected_score,
            horizon_days: projection.horizon_days,
        }
    }
}

/// Produces narrative text for an assessment.
pub trait Explainer: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Explain the payload.
    ///
    /// # Errors
    /// Returns `ExplainError` when no text could be produced.
    fn explain(&self, payload: &ExplanationPayload) -> Result<String, ExplainError>;
}
