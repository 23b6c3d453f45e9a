//! Deterministic templated explanation.
//!
//! Used directly when no explanation service is configured, and as the
//! fallback whenever the service fails or times out.

use std::fmt::Write;

use crate::ports::{ExplainError, Explainer, ExplanationPayload};

/// Most factors named in the summary.
const MAX_LISTED_FACTORS: usize = 3;

/// Build the templated explanation. Same payload, same text.
#[must_use]
pub fn fallback_explanation(payload: &ExplanationPayload) -> String {
    let mut text = format!(
        "{} (score {}/100, confidence {:.0}%).",
        payload.category,
        payload.score,
        payload.confidence * 100.0
    );

    if payload.factors.is_empty() {
        text.push_str(" No contributing factors were identified.");
    } else {
        let listed: Vec<String> = payload
            .factors
            .iter()
            .take(MAX_LISTED_FACTORS)
            .map(|f| format!("{} ({}, +{})", f.factor, f.value, f.impact))
            .collect();
        let _ = write!(text, " Main contributors: {}", listed.join("; "));
        let rest = payload.factors.len().saturating_sub(MAX_LISTED_FACTORS);
        if rest > 0 {
            let _ = write!(text, "; and {rest} more");
        }
        text.push('.');
    }

    let horizon = payload.horizon_days;
    match payload.trajectory.as_str() {
        "worsening" => {
            let _ = write!(
                text,
                " Risk is trending upward and may reach {} within {} days.",
                payload.projected_score, horizon
            );
        }
        "improving" => {
            let _ = write!(
                text,
                " Risk is trending downward, toward {} within {} days.",
                payload.projected_score, horizon
            );
        }
        _ => text.push_str(" Risk is stable over the observed period."),
    }

    text
}

/// Explainer backed by `fallback_explanation`. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateExplainer;

impl Explainer for TemplateExplainer {
    fn name(&self) -> &str {
        "template"
    }

    fn explain(&self, payload: &ExplanationPayload) -> Result<String, ExplainError> {
        Ok(fallback_explanation(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FactorSummary;

    fn payload(trajectory: &str, factors: usize) -> ExplanationPayload {
        ExplanationPayload {
            score: 62,
            category: "High Risk".to_string(),
            confidence: 0.6,
            factors: (0..factors)
                .map(|i| FactorSummary {
                    factor: format!("Factor {i}"),
                    value: format!("Mean {i}.0"),
                    impact: 10,
                })
                .collect(),
            trajectory: trajectory.to_string(),
            projected_score: 72,
            horizon_days: 30.0,
        }
    }

    #[test]
    fn test_worsening_summary() {
        let text = fallback_explanation(&payload("worsening", 2));
        assert_eq!(
            text,
            "High Risk (score 62/100, confidence 60%). Main contributors: \
             Factor 0 (Mean 0.0, +10); Factor 1 (Mean 1.0, +10). \
             Risk is trending upward and may reach 72 within 30 days."
        );
    }

    #[test]
    fn test_lists_at_most_three_factors() {
        let text = fallback_explanation(&payload("stable", 5));
        assert!(text.contains("Factor 2"));
        assert!(!text.contains("Factor 3"));
        assert!(text.contains("and 2 more"));
        assert!(text.ends_with("Risk is stable over the observed period."));
    }

    #[test]
    fn test_no_factors_and_deterministic() {
        let p = payload("improving", 0);
        let text = TemplateExplainer.explain(&p).expect("Never fails");
        assert!(text.contains("No contributing factors"));
        assert!(text.contains("trending downward"));
        assert_eq!(text, fallback_explanation(&p));
    }
}
