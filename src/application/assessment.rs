//! Assessment service: scoring plus a bounded explanation step.
//!
//! The numeric pipeline always completes first. The explainer then runs on
//! a worker thread and is waited on for at most the configured timeout; a
//! failure, a timeout or a panicking explainer all degrade to the templated
//! text and are logged, never returned.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::adapters::{fallback_explanation, HttpExplainer};
use crate::config::EngineConfig;
use crate::domain::{ObservationSet, Projection, RawObservation, RejectedObservation, RiskResult};
use crate::engine::{RiskAssessment, RiskEngine};
use crate::ports::{ExplainError, Explainer, ExplanationPayload, ObservationSource};
use crate::VitalRiskError;

/// Where an explanation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationSource {
    /// The external explanation service
    Service,
    /// The deterministic template
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub text: String,
    pub source: ExplanationSource,
}

/// A raw record that was skipped during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: String,
}

impl From<RejectedObservation> for SkippedRecord {
    fn from(r: RejectedObservation) -> Self {
        Self {
            index: r.index,
            reason: r.error.to_string(),
        }
    }
}

/// Full response for one patient window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,

    #[serde(flatten)]
    pub assessment: RiskAssessment,

    /// `None` when explanations are disabled
    pub explanation: Option<Explanation>,

    pub skipped: Vec<SkippedRecord>,

    pub generated_at: DateTime<Utc>,
}

/// Service for scoring observation windows.
pub struct AssessmentService {
    engine: RiskEngine,
    explainer: Option<Arc<dyn Explainer>>,
    explain_enabled: bool,
    timeout: Duration,
}

impl AssessmentService {
    /// Create a service around an engine. With no explainer, explanations
    /// come from the template.
    #[must_use]
    pub fn new(engine: RiskEngine, explainer: Option<Arc<dyn Explainer>>, timeout: Duration) -> Self {
        Self {
            engine,
            explainer,
            explain_enabled: true,
            timeout,
        }
    }

    /// Wire the service from configuration: the HTTP explainer when an
    /// endpoint is configured, the template otherwise.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn from_config(config: Arc<EngineConfig>) -> Result<Self, VitalRiskError> {
        let explanation = config.explanation.clone();
        let timeout = Duration::from_millis(explanation.timeout_ms);

        let explainer: Option<Arc<dyn Explainer>> = match &explanation.endpoint {
            Some(url) if explanation.enabled => {
                tracing::info!("Explanations from {}", url);
                Some(Arc::new(HttpExplainer::new(url.clone(), timeout)?))
            }
            _ => None,
        };

        let mut service = Self::new(RiskEngine::new(config), explainer, timeout);
        service.explain_enabled = explanation.enabled;
        Ok(service)
    }

    /// Turn the explanation step on or off.
    #[must_use]
    pub fn with_explanations(mut self, enabled: bool) -> Self {
        self.explain_enabled = enabled;
        self
    }

    #[must_use]
    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }

    /// Assess a validated window.
    #[must_use]
    pub fn assess(&self, set: &ObservationSet) -> AssessmentReport {
        let assessment = self.engine.assess(set);
        self.report(None, assessment, Vec::new())
    }

    /// Validate raw records, then assess what survived.
    #[must_use]
    pub fn assess_raw(&self, records: &[RawObservation]) -> AssessmentReport {
        let (set, rejected) = ObservationSet::ingest(records);
        let assessment = self.engine.assess(&set);
        self.report(None, assessment, rejected)
    }

    /// Fetch a patient's window from a source and assess it.
    ///
    /// # Errors
    /// Returns error only if the source cannot be read.
    pub fn assess_patient<S>(
        &self,
        source: &S,
        patient_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<AssessmentReport, VitalRiskError>
    where
        S: ObservationSource,
        S::Error: Into<VitalRiskError>,
    {
        let records = source.fetch(patient_id, since).map_err(Into::into)?;
        let (set, rejected) = ObservationSet::ingest(&records);
        let assessment = self.engine.assess(&set);
        Ok(self.report(Some(patient_id.to_string()), assessment, rejected))
    }

    /// Assess several patients. Windows are scored as one batch, then
    /// explained concurrently under a single shared deadline.
    ///
    /// # Errors
    /// Returns error if the source cannot be read.
    pub fn assess_patients<S>(
        &self,
        source: &S,
        patient_ids: &[String],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AssessmentReport>, VitalRiskError>
    where
        S: ObservationSource,
        S::Error: Into<VitalRiskError>,
    {
        let mut sets = Vec::with_capacity(patient_ids.len());
        let mut rejections = Vec::with_capacity(patient_ids.len());
        for id in patient_ids {
            let records = source.fetch(id, since).map_err(Into::into)?;
            let (set, rejected) = ObservationSet::ingest(&records);
            sets.push(set);
            rejections.push(rejected);
        }

        let assessments = self.engine.assess_batch(&sets);
        let explanations = self.explain_all(&assessments);

        let reports = assessments
            .into_iter()
            .zip(explanations)
            .zip(rejections)
            .zip(patient_ids)
            .map(|(((assessment, explanation), rejected), id)| {
                build_report(Some(id.clone()), assessment, explanation, rejected)
            })
            .collect();
        Ok(reports)
    }

    fn report(
        &self,
        patient_id: Option<String>,
        assessment: RiskAssessment,
        rejected: Vec<RejectedObservation>,
    ) -> AssessmentReport {
        let explanation = self
            .explain_enabled
            .then(|| self.explain(&assessment.result, &assessment.prediction));
        build_report(patient_id, assessment, explanation, rejected)
    }

    /// Explain a result, bounded by the timeout.
    #[must_use]
    pub fn explain(&self, result: &RiskResult, projection: &Projection) -> Explanation {
        let payload = ExplanationPayload::new(result, projection);

        let Some(explainer) = &self.explainer else {
            return template(&payload);
        };

        let outcome = spawn_explainer(Arc::clone(explainer), payload.clone())
            .and_then(|rx| self.wait(&rx, self.timeout));
        settle(explainer.as_ref(), &payload, outcome)
    }

    /// Explain a batch. Every request starts at once and all of them share
    /// one deadline, so the batch waits at most one timeout in total.
    fn explain_all(&self, assessments: &[RiskAssessment]) -> Vec<Option<Explanation>> {
        if !self.explain_enabled {
            return vec![None; assessments.len()];
        }

        let payloads: Vec<ExplanationPayload> = assessments
            .iter()
            .map(|a| ExplanationPayload::new(&a.result, &a.prediction))
            .collect();

        let Some(explainer) = &self.explainer else {
            return payloads.iter().map(|p| Some(template(p))).collect();
        };

        let pending: Vec<_> = payloads
            .iter()
            .map(|p| spawn_explainer(Arc::clone(explainer), p.clone()))
            .collect();
        let deadline = Instant::now() + self.timeout;

        payloads
            .iter()
            .zip(pending)
            .map(|(payload, rx)| {
                let outcome = rx.and_then(|rx| {
                    self.wait(&rx, deadline.saturating_duration_since(Instant::now()))
                });
                Some(settle(explainer.as_ref(), payload, outcome))
            })
            .collect()
    }

    fn wait(
        &self,
        rx: &Receiver<Result<String, ExplainError>>,
        budget: Duration,
    ) -> Result<String, ExplainError> {
        match rx.recv_timeout(budget) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ExplainError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                Err(ExplainError::Unavailable("explainer worker exited".to_string()))
            }
        }
    }
}

fn spawn_explainer(
    explainer: Arc<dyn Explainer>,
    payload: ExplanationPayload,
) -> Result<Receiver<Result<String, ExplainError>>, ExplainError> {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("vitalrisk-explainer".to_string())
        .spawn(move || {
            // The receiver is gone after a timeout; nothing to report then.
            let _ = tx.send(explainer.explain(&payload));
        })
        .map_err(|e| ExplainError::Unavailable(format!("cannot spawn worker: {e}")))?;

    Ok(rx)
}

fn settle(
    explainer: &dyn Explainer,
    payload: &ExplanationPayload,
    outcome: Result<String, ExplainError>,
) -> Explanation {
    match outcome {
        Ok(text) => Explanation {
            text,
            source: ExplanationSource::Service,
        },
        Err(e) => {
            tracing::warn!("Degraded mode: {} explainer failed ({}), using template", explainer.name(), e);
            template(payload)
        }
    }
}

fn build_report(
    patient_id: Option<String>,
    assessment: RiskAssessment,
    explanation: Option<Explanation>,
    rejected: Vec<RejectedObservation>,
) -> AssessmentReport {
    AssessmentReport {
        patient_id,
        assessment,
        explanation,
        skipped: rejected.into_iter().map(SkippedRecord::from).collect(),
        generated_at: Utc::now(),
    }
}

fn template(payload: &ExplanationPayload) -> Explanation {
    Explanation {
        text: fallback_explanation(payload),
        source: ExplanationSource::Template,
    }
}
