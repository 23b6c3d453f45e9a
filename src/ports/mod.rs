//! Ports layer: Trait definitions for external operations.
//!
//! These traits are the boundaries between the risk engine and the
//! systems around it (observation storage, explanation service).

mod explainer;
mod observations;

pub use explainer::{ExplainError, Explainer, ExplanationPayload, FactorSummary};
pub use observations::ObservationSource;
